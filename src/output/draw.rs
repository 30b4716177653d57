// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::{
  detect::{DetectResult, DetectionRecord, ScaledDetection},
  frame::RgbFrame,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const BOX_THICKNESS: u32 = 2;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 在帧上绘制检测框
///
/// 只有提供了字体时才绘制类别与分数文本。
pub struct Draw {
  font_size: f32,
  label_color: [u8; 3],
  font: Option<FontVec>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_color: LABEL_COLOR,
      font: None,
    }
  }
}

impl Draw {
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontVec::try_from_vec(data)?;
    debug!("加载标注字体: {}", path.as_ref().display());
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  /// 由可选的字体路径构造，`None` 时只画框
  pub fn from_font_option(path: Option<&str>) -> Result<Self, DrawError> {
    match path {
      Some(path) => Self::with_font_file(path),
      None => Ok(Self::default()),
    }
  }

  pub fn draw_detections(&self, frame: &RgbFrame, result: &DetectResult) -> RgbImage {
    let mut image = frame.to_rgb_image();
    for detection in result.items.iter() {
      self.draw_bbox_with_label(&mut image, detection);
    }
    image
  }

  // bbox 为原始帧像素坐标
  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &ScaledDetection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let bbox = &detection.bbox;

    let x_min = (bbox.x1.floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.y1.floor() as i32).clamp(0, h - 1);
    let x_max = (bbox.x2.ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox.y2.ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = Rgb(self.label_color);
    let (box_w, box_h) = ((x_max - x_min + 1) as u32, (y_max - y_min + 1) as u32);
    for t in 0..BOX_THICKNESS {
      let inner_w = box_w.saturating_sub(2 * t);
      let inner_h = box_h.saturating_sub(2 * t);
      if inner_w > 0 && inner_h > 0 {
        let rect = Rect::at(x_min + t as i32, y_min + t as i32).of_size(inner_w, inner_h);
        draw_hollow_rect_mut(image, rect, color);
      }
    }

    let Some(font) = self.font.as_ref() else {
      return;
    };

    let label = format!("{} {:.2}", detection.label, detection.score);
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, font, &label);
    let text_h = text_h as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 标签放在框的上方，放不下时贴着上边缘
    let label_x = x_min;
    let label_y = (y_min - text_h).max(0);
    let label_width = text_w.min((w - label_x) as u32);

    if label_width > 0 && text_h > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, text_h as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        scale,
        font,
        &label,
      );
    }
  }
}

/// 以 JSON 数组写出一帧的 `{label, bbox, score}` 记录
pub fn write_records(result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
  let records: Vec<DetectionRecord> = result.records();
  let json = serde_json::to_vec_pretty(&records)?;
  std::fs::write(path, json)
}
