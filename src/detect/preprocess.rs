// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detect/preprocess.rs - letterbox 预处理
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

use image::{RgbImage, imageops};
use ndarray::Array4;

use crate::{
  config::ModelInputSize,
  frame::{RGB_CHANNELS, RgbFrame},
  model::InputTensor,
  pipeline::DetectError,
};

/// 将模型空间坐标还原到原始帧所需的缩放比例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
  pub x_ratio: f32,
  pub y_ratio: f32,
}

impl ScaleFactors {
  /// `max(w, h) / w` 与 `max(w, h) / h`
  pub fn for_frame(width: u32, height: u32) -> Result<Self, DetectError> {
    if width == 0 || height == 0 {
      return Err(DetectError::InvalidFrame(format!(
        "帧尺寸为零: {}x{}",
        width, height
      )));
    }
    let max_size = width.max(height) as f32;
    Ok(Self {
      x_ratio: max_size / width as f32,
      y_ratio: max_size / height as f32,
    })
  }

  /// 组合后的比例：模型像素 → 原始帧像素
  ///
  /// `x_ratio` 把坐标映射到铺满整帧的模型尺寸画布上，再乘以画布到帧的比例即为帧像素，
  /// 结果等于 `max(w, h) / 模型边长`。
  pub fn pixel_ratios(&self, frame_width: u32, frame_height: u32, input: ModelInputSize) -> (f32, f32) {
    (
      self.x_ratio * (frame_width as f32 / input.width as f32),
      self.y_ratio * (frame_height as f32 / input.height as f32),
    )
  }
}

/// 预处理：等价于在右侧与下方补零成正方形后双线性缩放到模型尺寸，再归一化到 `[0, 1]`
///
/// 只补右下角，使得还原时只需等比缩放、无需平移。实现上直接把原帧按
/// `模型边长 / max(w, h)` 缩放后贴到全零画布的左上角，不构造补齐后的大图。
pub fn preprocess(
  frame: &RgbFrame,
  input_size: ModelInputSize,
) -> Result<(InputTensor, ScaleFactors), DetectError> {
  let scale = ScaleFactors::for_frame(frame.width(), frame.height())?;
  let ModelInputSize { width, height } = input_size;
  let max_size = frame.width().max(frame.height()) as f64;

  let content_width = scaled_extent(frame.width(), width, max_size);
  let content_height = scaled_extent(frame.height(), height, max_size);

  let source = frame.to_rgb_image();
  let content = imageops::resize(
    &source,
    content_width,
    content_height,
    imageops::FilterType::Triangle,
  );
  let mut canvas = RgbImage::new(width, height);
  imageops::replace(&mut canvas, &content, 0, 0);
  let raw = canvas.as_raw();
  let w = width as usize;

  let data = Array4::from_shape_fn(
    (1, height as usize, w, RGB_CHANNELS),
    |(_, y, x, c)| raw[(y * w + x) * RGB_CHANNELS + c] as f32 / 255.0,
  );

  Ok((InputTensor::new(data), scale))
}

// 帧边长在模型画布上占据的像素数，至少 1 个像素
fn scaled_extent(extent: u32, model_side: u32, max_size: f64) -> u32 {
  ((extent as f64 * model_side as f64 / max_size).round() as u32).clamp(1, model_side)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn size(width: u32, height: u32) -> ModelInputSize {
    ModelInputSize::new(width, height).unwrap()
  }

  #[test]
  fn output_shape_is_independent_of_source_resolution() {
    for (w, h) in [(1280, 720), (720, 1280), (17, 3), (640, 640), (1, 1)] {
      let frame = RgbFrame::filled(w, h, [10, 20, 30]);
      let (tensor, _) = preprocess(&frame, size(64, 48)).unwrap();
      assert_eq!(tensor.shape(), [1, 48, 64, 3]);
    }
  }

  #[test]
  fn landscape_frame_ratios() {
    let scale = ScaleFactors::for_frame(1280, 720).unwrap();
    assert_eq!(scale.x_ratio, 1.0);
    assert!((scale.y_ratio - 1.777_777_8).abs() < 1e-5);
  }

  #[test]
  fn pixel_ratios_undo_letterbox() {
    let scale = ScaleFactors::for_frame(1280, 720).unwrap();
    let (rx, ry) = scale.pixel_ratios(1280, 720, size(640, 640));
    assert!((rx - 2.0).abs() < 1e-5);
    assert!((ry - 2.0).abs() < 1e-5);
  }

  #[test]
  fn ratios_are_at_least_one() {
    for (w, h) in [(1, 1000), (1000, 1), (333, 334), (500, 500)] {
      let scale = ScaleFactors::for_frame(w, h).unwrap();
      assert!(scale.x_ratio >= 1.0 && scale.y_ratio >= 1.0);
      assert_eq!(scale.x_ratio == 1.0, w == w.max(h));
      assert_eq!(scale.y_ratio == 1.0, h == w.max(h));
    }
  }

  #[test]
  fn zero_dimension_is_invalid_frame() {
    let frame = RgbFrame::new(0, 4, Vec::new()).unwrap();
    assert!(matches!(
      preprocess(&frame, size(32, 32)),
      Err(DetectError::InvalidFrame(_))
    ));
    let frame = RgbFrame::new(4, 0, Vec::new()).unwrap();
    assert!(matches!(
      preprocess(&frame, size(32, 32)),
      Err(DetectError::InvalidFrame(_))
    ));
  }

  #[test]
  fn extreme_aspect_ratio_stays_within_model_canvas() {
    let frame = RgbFrame::filled(20000, 1, [255, 255, 255]);
    let (tensor, scale) = preprocess(&frame, size(640, 640)).unwrap();
    let view = tensor.view();

    assert_eq!(tensor.shape(), [1, 640, 640, 3]);
    assert!((view[[0, 0, 0, 0]] - 1.0).abs() < 1e-2);
    assert!((view[[0, 0, 639, 2]] - 1.0).abs() < 1e-2);
    assert_eq!(view[[0, 1, 0, 0]], 0.0);
    assert_eq!(view[[0, 639, 639, 0]], 0.0);
    assert_eq!(scale.y_ratio, 20000.0);
  }

  #[test]
  fn landscape_content_fills_top_rows_only() {
    let frame = RgbFrame::filled(1280, 720, [255, 255, 255]);
    let (tensor, _) = preprocess(&frame, size(640, 640)).unwrap();
    let view = tensor.view();

    // 720 * 640 / 1280 = 360 行有内容
    assert!((view[[0, 359, 320, 1]] - 1.0).abs() < 1e-2);
    assert_eq!(view[[0, 360, 320, 1]], 0.0);
  }

  #[test]
  fn values_are_normalized_and_padding_is_bottom_right() {
    // 宽 8 高 4 的白色帧，补成 8x8 后下半部分为零
    let frame = RgbFrame::filled(8, 4, [255, 255, 255]);
    let (tensor, scale) = preprocess(&frame, size(8, 8)).unwrap();
    let view = tensor.view();

    assert!(view.iter().all(|v| (0.0..=1.0).contains(v)));
    assert!((view[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
    assert!((view[[0, 2, 7, 2]] - 1.0).abs() < 1e-6);
    assert_eq!(view[[0, 7, 0, 0]], 0.0);
    assert_eq!(view[[0, 6, 7, 1]], 0.0);
    assert_eq!(scale, ScaleFactors { x_ratio: 1.0, y_ratio: 2.0 });
  }
}
