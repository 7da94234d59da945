// 该文件是 Linghe （凌河） 项目的一部分。
// src/predict.rs - 按类别展开的预测结果
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Linghe 开发者

use crate::model::DetectionSet;

pub const DEFAULT_MAX_DETS: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
  pub class_id: usize,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

impl Prediction {
  /// 裁剪到图像范围内的 `[left, top, right, bottom]`
  pub fn clipped(&self, width: f32, height: f32) -> [f32; 4] {
    [
      self.bbox[0].max(0.0),
      self.bbox[1].max(0.0),
      self.bbox[2].min(width),
      self.bbox[3].min(height),
    ]
  }
}

/// 将检测结果展开为每个类别一条预测
///
/// 分数低于 `threshold` 的类别被忽略；超过 `max_dets` 条时仅保留分数最高的部分。
pub fn flatten(
  dets: &DetectionSet,
  width: u32,
  height: u32,
  threshold: f32,
  max_dets: usize,
) -> Vec<Prediction> {
  let (w, h) = (width as f32, height as f32);
  let mut predictions: Vec<Prediction> = dets
    .iter()
    .flat_map(|det| {
      let bbox = det.bbox.to_xyxy(w, h);
      det
        .prob
        .iter()
        .enumerate()
        .filter(move |(_, score)| **score >= threshold && **score > 0.0)
        .map(move |(class_id, score)| Prediction {
          class_id,
          score: *score,
          bbox,
        })
    })
    .collect();

  if predictions.len() > max_dets {
    predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
    predictions.truncate(max_dets);
  }
  predictions
}
