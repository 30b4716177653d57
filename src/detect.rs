// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detect.rs - 检测前后处理
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

use serde::Serialize;

mod decode;
mod nms;
mod preprocess;
mod rescale;

pub use self::decode::decode;
pub use self::nms::{iou, suppress};
pub use self::preprocess::{ScaleFactors, preprocess};
pub use self::rescale::rescale;

/// 角点形式的边界框 `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  /// 由中心点与宽高构造
  pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
    let x1 = cx - width / 2.0;
    let y1 = cy - height / 2.0;
    Self {
      x1,
      y1,
      x2: x1 + width,
      y2: y1 + height,
    }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  /// `[x, y, width, height]`
  pub fn to_xywh(&self) -> [f32; 4] {
    [self.x1, self.y1, self.width(), self.height()]
  }
}

/// 模型输入空间中的单个候选
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub bbox: BBox,
  pub score: f32,
  pub class_id: usize,
}

/// 映射回原始帧坐标后的检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledDetection {
  pub bbox: BBox,
  pub score: f32,
  pub class_id: usize,
  pub label: String,
}

impl ScaledDetection {
  pub fn to_record(&self) -> DetectionRecord {
    DetectionRecord {
      label: self.label.clone(),
      bbox: self.bbox.to_xywh(),
      score: self.score,
    }
  }
}

/// 交给渲染端的输出格式 `{label, bbox: [x, y, width, height], score}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
  pub label: String,
  pub bbox: [f32; 4],
  pub score: f32,
}

/// 一帧的检测结果，按置信度降序排列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[ScaledDetection]>,
}

impl DetectResult {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn records(&self) -> Vec<DetectionRecord> {
    self.items.iter().map(ScaledDetection::to_record).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn center_form_converts_to_corners() {
    let bbox = BBox::from_center(50.0, 40.0, 20.0, 10.0);
    assert_eq!(bbox, BBox::new(40.0, 35.0, 60.0, 45.0));
    assert_eq!(bbox.to_xywh(), [40.0, 35.0, 20.0, 10.0]);
    assert_eq!(bbox.area(), 200.0);
  }

  #[test]
  fn record_serializes_as_label_bbox_score() {
    let detection = ScaledDetection {
      bbox: BBox::new(1.0, 2.0, 4.0, 6.0),
      score: 0.5,
      class_id: 0,
      label: "person".to_string(),
    };
    let json = serde_json::to_value(detection.to_record()).unwrap();
    assert_eq!(
      json,
      serde_json::json!({"label": "person", "bbox": [1.0, 2.0, 3.0, 4.0], "score": 0.5})
    );
  }
}
