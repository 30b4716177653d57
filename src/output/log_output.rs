// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/log_output.rs - 日志输出
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, detect::DetectResult, frame::RgbFrame, output::Render,
};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

/// 每帧一行 JSON 记录，写到 info 级日志
///
/// URL 形式: `log://`，加上 `?skip-empty` 时不输出空结果
pub struct LogOutput {
  skip_empty: bool,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch);
    }
    Ok(LogOutput {
      skip_empty: url.query_pairs().any(|(k, _)| k == "skip-empty"),
    })
  }
}

impl LogOutput {
  pub fn format_result(result: &DetectResult) -> Result<String, LogOutputError> {
    Ok(serde_json::to_string(&result.records())?)
  }
}

impl Render for LogOutput {
  type Error = LogOutputError;

  fn render_result(&self, frame: &RgbFrame, result: &DetectResult) -> Result<(), Self::Error> {
    if self.skip_empty && result.is_empty() {
      return Ok(());
    }
    info!(
      "检测结果 ({}x{}): {}",
      frame.width(),
      frame.height(),
      Self::format_result(result)?
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::{BBox, ScaledDetection};

  #[test]
  fn formats_records_in_order() {
    let result = DetectResult {
      items: vec![
        ScaledDetection {
          bbox: BBox::new(0.0, 0.0, 10.0, 20.0),
          score: 0.75,
          class_id: 0,
          label: "person".to_string(),
        },
        ScaledDetection {
          bbox: BBox::new(5.0, 5.0, 6.0, 7.0),
          score: 0.25,
          class_id: 1,
          label: "dog".to_string(),
        },
      ]
      .into_boxed_slice(),
    };
    assert_eq!(
      LogOutput::format_result(&result).unwrap(),
      r#"[{"label":"person","bbox":[0.0,0.0,10.0,20.0],"score":0.75},{"label":"dog","bbox":[5.0,5.0,1.0,2.0],"score":0.25}]"#
    );
  }

  #[test]
  fn parses_skip_empty_flag() {
    let output = LogOutput::from_url(&Url::parse("log://?skip-empty").unwrap()).unwrap();
    assert!(output.skip_empty);
    assert!(
      output
        .render_result(&RgbFrame::filled(1, 1, [0, 0, 0]), &DetectResult::empty())
        .is_ok()
    );
  }
}
