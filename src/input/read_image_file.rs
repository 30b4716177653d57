// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  input::{FrameSource, InputError},
  query_param,
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 把一张静态图片当作帧来源，可重复给出同一帧
///
/// URL 形式: `image:///path/to/picture.jpg?repeat=N`，不带 `repeat` 时无限重复。
/// 次数用尽后报告设备断开。
pub struct ImageFileInput {
  frame: RgbFrame,
  remaining: Option<usize>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?;
    debug!("读取图片 {}: {}x{}", path, image.width(), image.height());

    Ok(ImageFileInput {
      frame: RgbFrame::from(image.to_rgb8()),
      remaining: query_param(url, "repeat"),
    })
  }
}

impl ImageFileInput {
  pub fn from_frame(frame: RgbFrame, repeat: Option<usize>) -> Self {
    Self {
      frame,
      remaining: repeat,
    }
  }
}

impl FrameSource for ImageFileInput {
  fn poll_frame(&mut self) -> Result<Option<RgbFrame>, InputError> {
    match self.remaining.as_mut() {
      Some(0) => Err(InputError::Disconnected("图片帧已全部给出".to_string())),
      Some(n) => {
        *n -= 1;
        Ok(Some(self.frame.clone()))
      }
      None => Ok(Some(self.frame.clone())),
    }
  }
}
