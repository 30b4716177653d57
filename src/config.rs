// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 检测参数配置
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

use std::sync::Arc;

use thiserror::Error;

use crate::label::LabelTable;

pub const DEFAULT_MAX_OUTPUTS: usize = 500;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.2;
pub const DEFAULT_MODEL_INPUT: u32 = 640;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("阈值 {name} 超出范围 [0, 1]: {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("最大输出数量必须大于 0")]
  ZeroMaxOutputs,
  #[error("模型输入尺寸无效: {width}x{height}")]
  InvalidInputSize { width: u32, height: u32 },
}

/// 模型输入尺寸（来自模型元数据）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInputSize {
  pub width: u32,
  pub height: u32,
}

impl ModelInputSize {
  pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
    if width == 0 || height == 0 {
      return Err(ConfigError::InvalidInputSize { width, height });
    }
    Ok(Self { width, height })
  }
}

impl Default for ModelInputSize {
  fn default() -> Self {
    Self {
      width: DEFAULT_MODEL_INPUT,
      height: DEFAULT_MODEL_INPUT,
    }
  }
}

/// 后处理阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectConfig {
  pub max_outputs: usize,
  pub iou_threshold: f32,
  pub score_threshold: f32,
}

impl Default for DetectConfig {
  fn default() -> Self {
    Self {
      max_outputs: DEFAULT_MAX_OUTPUTS,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      score_threshold: DEFAULT_SCORE_THRESHOLD,
    }
  }
}

impl DetectConfig {
  pub fn with_max_outputs(mut self, max_outputs: usize) -> Self {
    self.max_outputs = max_outputs;
    self
  }

  pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn with_score_threshold(mut self, score_threshold: f32) -> Self {
    self.score_threshold = score_threshold;
    self
  }

  pub fn validate(self) -> Result<Self, ConfigError> {
    for (name, value) in [
      ("iou_threshold", self.iou_threshold),
      ("score_threshold", self.score_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }
    if self.max_outputs == 0 {
      return Err(ConfigError::ZeroMaxOutputs);
    }
    Ok(self)
  }
}

/// 启动时一次性构造、之后只读的检测上下文
///
/// 标签表与阈值一起显式传入解码和坐标映射，不使用全局状态。
#[derive(Debug, Clone)]
pub struct DetectContext {
  config: DetectConfig,
  labels: Arc<LabelTable>,
}

impl DetectContext {
  pub fn new(config: DetectConfig, labels: LabelTable) -> Result<Self, ConfigError> {
    Ok(Self {
      config: config.validate()?,
      labels: Arc::new(labels),
    })
  }

  pub fn config(&self) -> &DetectConfig {
    &self.config
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  /// 实际可用的类别数：模型输出类别数与标签数量中较小者
  pub fn usable_classes(&self, model_classes: usize) -> usize {
    model_classes.min(self.labels.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_documented_knobs() {
    let config = DetectConfig::default();
    assert_eq!(config.max_outputs, 500);
    assert_eq!(config.iou_threshold, 0.45);
    assert_eq!(config.score_threshold, 0.2);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn rejects_out_of_range_thresholds() {
    let err = DetectConfig::default()
      .with_iou_threshold(1.5)
      .validate()
      .unwrap_err();
    assert_eq!(
      err,
      ConfigError::ThresholdOutOfRange {
        name: "iou_threshold",
        value: 1.5
      }
    );
    assert!(
      DetectConfig::default()
        .with_score_threshold(f32::NAN)
        .validate()
        .is_err()
    );
    assert_eq!(
      DetectConfig::default().with_max_outputs(0).validate(),
      Err(ConfigError::ZeroMaxOutputs)
    );
  }

  #[test]
  fn usable_classes_is_bounded_by_labels() {
    let labels = LabelTable::new(vec!["a".into(), "b".into()]).unwrap();
    let context = DetectContext::new(DetectConfig::default(), labels).unwrap();
    assert_eq!(context.usable_classes(80), 2);
    assert_eq!(context.usable_classes(1), 1);
  }

  #[test]
  fn zero_input_size_is_invalid() {
    assert!(ModelInputSize::new(0, 640).is_err());
    assert_eq!(ModelInputSize::default(), ModelInputSize::new(640, 640).unwrap());
  }
}
