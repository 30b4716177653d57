// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - RGB 帧定义
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

use image::RgbImage;
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: {width}x{height} 帧期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch {
    width: u32,
    height: u32,
    expected: usize,
    actual: usize,
  },
  #[error("帧尺寸溢出: {width}x{height}")]
  DimensionOverflow { width: u32, height: u32 },
}

/// 任意尺寸的 RGB 帧，数据按 HWC（行优先，RGB 交错）排列
///
/// 帧创建后不可修改，由接收它的那一次流水线调用独占。
#[derive(Debug, Clone, PartialEq)]
pub struct RgbFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl RgbFrame {
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = (width as usize)
      .checked_mul(height as usize)
      .and_then(|v| v.checked_mul(RGB_CHANNELS))
      .ok_or(FrameError::DimensionOverflow { width, height })?;

    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        width,
        height,
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 以单一颜色填充的帧，主要用于测试和占位
  pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
    let data = rgb
      .iter()
      .copied()
      .cycle()
      .take(width as usize * height as usize * RGB_CHANNELS)
      .collect::<Vec<u8>>();
    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_hwc(&self) -> &[u8] {
    &self.data
  }

  pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
    let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
    [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    // 长度已在构造时校验
    RgbImage::from_raw(self.width, self.height, self.data.to_vec())
      .unwrap_or_else(|| RgbImage::new(self.width, self.height))
  }
}

impl From<RgbImage> for RgbFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_mismatched_length() {
    let err = RgbFrame::new(2, 2, vec![0; 11]).unwrap_err();
    assert_eq!(
      err,
      FrameError::LengthMismatch {
        width: 2,
        height: 2,
        expected: 12,
        actual: 11
      }
    );
  }

  #[test]
  fn zero_sized_frame_is_constructible() {
    let frame = RgbFrame::new(0, 10, Vec::new()).unwrap();
    assert_eq!(frame.width(), 0);
    assert!(frame.as_hwc().is_empty());
  }

  #[test]
  fn image_conversion_keeps_pixels() {
    let mut image = RgbImage::new(3, 2);
    image.put_pixel(2, 1, image::Rgb([10, 20, 30]));
    let frame = RgbFrame::from(image.clone());
    assert_eq!(frame.pixel(2, 1), [10, 20, 30]);
    assert_eq!(frame.to_rgb_image(), image);
  }
}
