// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detect/rescale.rs - 坐标还原
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

use crate::detect::BBox;

/// 模型空间坐标等比缩放到原始帧坐标
pub fn rescale(bbox: &BBox, x_ratio: f32, y_ratio: f32) -> BBox {
  BBox {
    x1: bbox.x1 * x_ratio,
    y1: bbox.y1 * y_ratio,
    x2: bbox.x2 * x_ratio,
    y2: bbox.y2 * y_ratio,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::ScaleFactors;

  #[test]
  fn scales_each_axis_independently() {
    let bbox = rescale(&BBox::new(10.0, 10.0, 20.0, 30.0), 2.0, 0.5);
    assert_eq!(bbox, BBox::new(20.0, 5.0, 40.0, 15.0));
    assert_eq!(bbox.width(), 20.0);
    assert_eq!(bbox.height(), 10.0);
  }

  #[test]
  fn inverse_ratios_round_trip() {
    let original = BBox::new(12.5, 301.25, 99.0, 640.0);
    let scale = ScaleFactors::for_frame(1280, 720).unwrap();
    let forward = rescale(&original, scale.x_ratio, scale.y_ratio);
    let back = rescale(&forward, 1.0 / scale.x_ratio, 1.0 / scale.y_ratio);

    for (a, b) in [
      (original.x1, back.x1),
      (original.y1, back.y1),
      (original.x2, back.x2),
      (original.y2, back.y2),
    ] {
      assert!((a - b).abs() < 1e-3, "{a} != {b}");
    }
  }
}
