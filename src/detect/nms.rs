// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detect/nms.rs - 非极大值抑制
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

use crate::{
  config::DetectConfig,
  detect::{BBox, Detection},
};

/// 计算两个边界框的 IoU，零面积时返回 0
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let x1 = a.x1.max(b.x1);
  let y1 = a.y1.max(b.y1);
  let x2 = a.x2.min(b.x2);
  let y2 = a.y2.min(b.y2);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.area() + b.area() - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 贪心 NMS，与类别无关
///
/// 返回保留候选在 `detections` 中的下标，按置信度降序。分数相同时下标小者优先。
/// 低于 `score_threshold` 的候选永远不会输出，最多输出 `max_outputs` 个。
/// 与已保留框的 IoU 不低于 `iou_threshold` 的候选被抑制。
pub fn suppress(detections: &[Detection], config: &DetectConfig) -> Vec<usize> {
  let mut order: Vec<usize> = (0..detections.len())
    .filter(|&i| detections[i].score >= config.score_threshold)
    .collect();
  // 稳定排序，保证并列时先出现者在前
  order.sort_by(|&a, &b| detections[b].score.total_cmp(&detections[a].score));

  let mut suppressed = vec![false; order.len()];
  let mut keep = Vec::with_capacity(order.len().min(config.max_outputs));

  for i in 0..order.len() {
    if keep.len() >= config.max_outputs {
      break;
    }
    if suppressed[i] {
      continue;
    }

    let best = &detections[order[i]].bbox;
    keep.push(order[i]);

    for j in (i + 1)..order.len() {
      if !suppressed[j] && iou(best, &detections[order[j]].bbox) >= config.iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  keep
}
