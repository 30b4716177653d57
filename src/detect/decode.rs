// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detect/decode.rs - 模型输出解码
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

use ndarray::{ArrayView3, Axis};

use crate::{
  detect::{BBox, Detection},
  pipeline::DetectError,
};

const GEOMETRY_ATTRIBUTES: usize = 4;

/// 解码转置后的输出 `[1, 候选数, 4 + 类别数]`
///
/// 每一行都产出一个候选，不做任何阈值过滤。类别取分数最大者（并列取靠前者）。
pub fn decode(output: ArrayView3<'_, f32>, num_classes: usize) -> Result<Vec<Detection>, DetectError> {
  let &[batch, _, attributes] = output.shape() else {
    return Err(DetectError::Inference(format!(
      "输出维度错误: {:?}",
      output.shape()
    )));
  };

  if batch != 1 {
    return Err(DetectError::Inference(format!("batch 必须为 1, 实际为 {}", batch)));
  }
  if num_classes == 0 || attributes < GEOMETRY_ATTRIBUTES + num_classes {
    return Err(DetectError::Inference(format!(
      "属性数 {} 不足以容纳 {} 个类别",
      attributes, num_classes
    )));
  }

  let rows = output.index_axis(Axis(0), 0);
  let detections = rows
    .outer_iter()
    .map(|row| {
      let (class_id, max_score) = row
        .iter()
        .skip(GEOMETRY_ATTRIBUTES)
        .take(num_classes)
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |(best_idx, best), (idx, &score)| {
          if score > best { (idx, score) } else { (best_idx, best) }
        });

      Detection {
        bbox: BBox::from_center(row[0], row[1], row[2], row[3]),
        score: clamp_score(max_score),
        class_id,
      }
    })
    .collect();

  Ok(detections)
}

fn clamp_score(score: f32) -> f32 {
  if score.is_nan() {
    0.0
  } else {
    score.clamp(0.0, 1.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Array3;

  /// 按 `[1, 候选数, 属性数]` 的行构造输出
  fn rows(data: &[&[f32]]) -> Array3<f32> {
    let attributes = data[0].len();
    let flat = data.iter().flat_map(|r| r.iter().copied()).collect();
    Array3::from_shape_vec((1, data.len(), attributes), flat).unwrap()
  }

  #[test]
  fn argmax_scores_and_classes() {
    let output = rows(&[
      &[10.0, 10.0, 4.0, 4.0, 0.9, 0.1],
      &[20.0, 20.0, 4.0, 4.0, 0.2, 0.8],
      &[30.0, 30.0, 4.0, 4.0, 0.05, 0.05],
    ]);
    let detections = decode(output.view(), 2).unwrap();
    assert_eq!(detections.len(), 3);
    assert_eq!(
      detections.iter().map(|d| d.class_id).collect::<Vec<_>>(),
      vec![0, 1, 0]
    );
    assert_eq!(
      detections.iter().map(|d| d.score).collect::<Vec<_>>(),
      vec![0.9, 0.8, 0.05]
    );
  }

  #[test]
  fn corners_from_center_and_size() {
    let output = rows(&[&[100.0, 50.0, 40.0, 20.0, 0.7]]);
    let detections = decode(output.view(), 1).unwrap();
    assert_eq!(detections[0].bbox, BBox::new(80.0, 40.0, 120.0, 60.0));
  }

  #[test]
  fn class_slice_is_bounded_by_num_classes() {
    // 模型有 3 个类别，但只使用前 2 个
    let output = rows(&[&[0.0, 0.0, 1.0, 1.0, 0.3, 0.4, 0.99]]);
    let detections = decode(output.view(), 2).unwrap();
    assert_eq!(detections[0].class_id, 1);
    assert_eq!(detections[0].score, 0.4);
  }

  #[test]
  fn scores_are_clamped_into_unit_range() {
    let output = rows(&[&[0.0, 0.0, 1.0, 1.0, 1.7], &[0.0, 0.0, 1.0, 1.0, f32::NAN]]);
    let detections = decode(output.view(), 1).unwrap();
    assert_eq!(detections[0].score, 1.0);
    assert_eq!(detections[1].score, 0.0);
  }

  #[test]
  fn rejects_too_few_attributes() {
    let output = rows(&[&[0.0, 0.0, 1.0, 1.0]]);
    assert!(matches!(
      decode(output.view(), 1),
      Err(DetectError::Inference(_))
    ));
  }

  #[test]
  fn empty_output_decodes_to_nothing() {
    let output = Array3::<f32>::zeros((1, 0, 6));
    assert!(decode(output.view(), 2).unwrap().is_empty());
  }
}
