// 该文件是 Shanan （山南西风） 项目的一部分。
// src/label.rs - 类别标签表
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

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件格式错误（需要字符串数组）: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("标签表为空")]
  Empty,
}

/// 类别名称表，下标即类别编号
///
/// 启动时加载一次，此后只读。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  names: Box<[String]>,
}

impl LabelTable {
  pub fn new(names: Vec<String>) -> Result<Self, LabelError> {
    if names.is_empty() {
      return Err(LabelError::Empty);
    }
    Ok(Self {
      names: names.into_boxed_slice(),
    })
  }

  /// 从 JSON 字符串数组解析
  pub fn from_json_str(json: &str) -> Result<Self, LabelError> {
    let names: Vec<String> = serde_json::from_str(json)?;
    Self::new(names)
  }

  pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let table = Self::from_json_str(&content)?;
    debug!("共 {} 个类别", table.len());
    Ok(table)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn parses_json_array() {
    let table = LabelTable::from_json_str(r#"["person", "bicycle", "car"]"#).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.get(2), Some("car"));
    assert_eq!(table.get(3), None);
  }

  #[test]
  fn rejects_non_string_entries() {
    assert!(matches!(
      LabelTable::from_json_str(r#"["person", 1]"#),
      Err(LabelError::ParseError(_))
    ));
    assert!(matches!(
      LabelTable::from_json_str(r#"{"0": "person"}"#),
      Err(LabelError::ParseError(_))
    ));
  }

  #[test]
  fn rejects_empty_table() {
    assert!(matches!(
      LabelTable::from_json_str("[]"),
      Err(LabelError::Empty)
    ));
  }

  #[test]
  fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"["cat", "dog"]"#).unwrap();
    let table = LabelTable::from_path(file.path()).unwrap();
    assert_eq!(table.iter().collect::<Vec<_>>(), vec!["cat", "dog"]);
  }

  #[test]
  fn missing_file_is_io_error() {
    assert!(matches!(
      LabelTable::from_path("/nonexistent/labels.json"),
      Err(LabelError::IoError(_))
    ));
  }
}
