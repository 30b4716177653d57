// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use ndarray::{Array3, Array4, ArrayView3, ShapeError};
use thiserror::Error;

use crate::config::ModelInputSize;

/// 推理引擎契约
///
/// 输入为 `[1, H, W, 3]` 的 f32 张量（取值 `[0, 1]`），
/// 输出为 `[1, 4 + 类别数, 候选数]` 的 f32 张量。引擎内部实现不透明。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn input_size(&self) -> ModelInputSize;
  fn execute(&self, input: &InputTensor) -> Result<OutputTensor, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Error = M::Error;

  fn input_size(&self) -> ModelInputSize {
    (**self).input_size()
  }

  fn execute(&self, input: &InputTensor) -> Result<OutputTensor, Self::Error> {
    (**self).execute(input)
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("输出张量形状无效: {0:?}")]
  InvalidOutputShape(Vec<usize>),
  #[error("模型应只有一个输出, 实际有 {} 个: {shapes:?}", .shapes.len())]
  UnexpectedOutputCount { shapes: Vec<Vec<usize>> },
  #[error("张量形状错误: {0}")]
  ShapeError(#[from] ShapeError),
}

/// 模型输入张量，NHWC 布局，batch 固定为 1
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
  data: Array4<f32>,
}

impl InputTensor {
  pub fn new(data: Array4<f32>) -> Self {
    Self { data }
  }

  /// `[1, H, W, 3]`
  pub fn shape(&self) -> [usize; 4] {
    let s = self.data.shape();
    [s[0], s[1], s[2], s[3]]
  }

  pub fn view(&self) -> ndarray::ArrayView4<'_, f32> {
    self.data.view()
  }

  /// 标准布局下的连续数据
  pub fn to_contiguous(&self) -> Vec<f32> {
    self.data.iter().copied().collect()
  }
}

/// 模型原始输出 `[1, 属性数, 候选数]`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
  data: Array3<f32>,
}

impl OutputTensor {
  pub fn new(data: Array3<f32>) -> Self {
    Self { data }
  }

  /// 从任意维度的形状和连续数据构造，仅接受三维输出
  pub fn from_shape_vec(shape: &[usize], data: Vec<f32>) -> Result<Self, ModelError> {
    match *shape {
      [batch, attributes, detections] => {
        let data = Array3::from_shape_vec((batch, attributes, detections), data)?;
        Ok(Self { data })
      }
      _ => Err(ModelError::InvalidOutputShape(shape.to_vec())),
    }
  }

  pub fn shape(&self) -> [usize; 3] {
    let s = self.data.shape();
    [s[0], s[1], s[2]]
  }

  pub fn num_attributes(&self) -> usize {
    self.data.shape()[1]
  }

  pub fn num_detections(&self) -> usize {
    self.data.shape()[2]
  }

  /// 轴置换 `(0, 2, 1)`，得到 `[1, 候选数, 属性数]` 的视图
  pub fn transposed(&self) -> ArrayView3<'_, f32> {
    self.data.view().permuted_axes([0, 2, 1])
  }
}

#[cfg(feature = "backend_tract")]
mod onnx;
#[cfg(feature = "backend_tract")]
pub use self::onnx::{InputLayout, OnnxModel, OnnxModelBuilder};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transpose_swaps_attribute_and_detection_axes() {
    // 2 个属性, 3 个候选
    let output =
      OutputTensor::from_shape_vec(&[1, 2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let t = output.transposed();
    assert_eq!(t.shape(), &[1, 3, 2]);
    assert_eq!(t[[0, 0, 0]], 1.0);
    assert_eq!(t[[0, 0, 1]], 4.0);
    assert_eq!(t[[0, 2, 0]], 3.0);
    assert_eq!(t[[0, 2, 1]], 6.0);
  }

  #[test]
  fn rejects_non_three_dimensional_output() {
    assert!(matches!(
      OutputTensor::from_shape_vec(&[1, 84], vec![0.0; 84]),
      Err(ModelError::InvalidOutputShape(_))
    ));
    assert!(matches!(
      OutputTensor::from_shape_vec(&[1, 2, 3], vec![0.0; 5]),
      Err(ModelError::ShapeError(_))
    ));
  }
}
