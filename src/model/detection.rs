// 该文件是 Linghe （凌河） 项目的一部分。
// src/model/detection.rs - 检测结果
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

use ndarray::Array2;
use tracing::debug;

use crate::{frame::LetterboxTransform, model::DetectorError};

/// 每行固定字段数：cx, cy, w, h, objectness
pub const BOX_FIELDS: usize = 5;

/// 中心点格式的边界框，坐标归一化到图像尺寸
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
}

impl BBox {
  pub fn left(&self) -> f32 {
    self.x - self.w / 2.0
  }

  pub fn right(&self) -> f32 {
    self.x + self.w / 2.0
  }

  pub fn top(&self) -> f32 {
    self.y - self.h / 2.0
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.h / 2.0
  }

  pub fn area(&self) -> f32 {
    self.w * self.h
  }

  fn overlap(l1: f32, r1: f32, l2: f32, r2: f32) -> f32 {
    r1.min(r2) - l1.max(l2)
  }

  pub fn intersection(&self, other: &BBox) -> f32 {
    let w = Self::overlap(self.left(), self.right(), other.left(), other.right());
    let h = Self::overlap(self.top(), self.bottom(), other.top(), other.bottom());
    if w < 0.0 || h < 0.0 {
      return 0.0;
    }
    w * h
  }

  pub fn union(&self, other: &BBox) -> f32 {
    self.area() + other.area() - self.intersection(other)
  }

  pub fn iou(&self, other: &BBox) -> f32 {
    let union = self.union(other);
    if union <= 0.0 {
      return 0.0;
    }
    self.intersection(other) / union
  }

  /// 最小外接框对角线长度的平方
  pub fn enclosing_diagonal_sq(&self, other: &BBox) -> f32 {
    let w = self.right().max(other.right()) - self.left().min(other.left());
    let h = self.bottom().max(other.bottom()) - self.top().min(other.top());
    w * w + h * h
  }

  pub fn centre_distance_sq(&self, other: &BBox) -> f32 {
    (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
  }

  /// `[x_min, y_min, x_max, y_max]`，按 `width x height` 缩放
  pub fn to_xyxy(&self, width: f32, height: f32) -> [f32; 4] {
    [
      self.left() * width,
      self.top() * height,
      self.right() * width,
      self.bottom() * height,
    ]
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: BBox,
  pub objectness: f32,
  /// 每个类别一个分数，未超过阈值或被抑制的为 0
  pub prob: Box<[f32]>,
}

impl Detection {
  pub fn classes(&self) -> usize {
    self.prob.len()
  }

  /// 分数最高的类别
  pub fn best_class(&self) -> Option<(usize, f32)> {
    self
      .prob
      .iter()
      .copied()
      .enumerate()
      .filter(|(_, p)| *p > 0.0)
      .max_by(|a, b| a.1.total_cmp(&b.1))
  }

  /// 所有类别分数都为 0
  pub fn is_empty(&self) -> bool {
    self.prob.iter().all(|p| *p == 0.0)
  }
}

/// 一次检测得到的结果集合，由调用方持有
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet {
  items: Box<[Detection]>,
}

impl DetectionSet {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }

  pub fn as_slice(&self) -> &[Detection] {
    &self.items
  }

  pub fn into_vec(self) -> Vec<Detection> {
    self.items.into_vec()
  }
}

impl From<Vec<Detection>> for DetectionSet {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl IntoIterator for DetectionSet {
  type Item = Detection;
  type IntoIter = std::vec::IntoIter<Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.into_vec().into_iter()
  }
}

impl<'a> IntoIterator for &'a DetectionSet {
  type Item = &'a Detection;
  type IntoIter = std::slice::Iter<'a, Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

/// 从网络原始输出中收集候选框
///
/// objectness 不超过阈值的行被丢弃；类别分数为 `objectness * class_score`，
/// 未超过阈值时置 0。边界框从 letterbox 坐标还原到原图。
pub(crate) fn collect_candidates(
  output: &Array2<f32>,
  classes: usize,
  thresh: f32,
  transform: &LetterboxTransform,
) -> Result<Vec<Detection>, DetectorError> {
  let expected = BOX_FIELDS + classes;
  if output.ncols() != expected {
    return Err(DetectorError::ShapeMismatch(format!(
      "网络输出每行应有 {} 个值 (5 + {} 类), 实际为 {}",
      expected,
      classes,
      output.ncols()
    )));
  }

  let mut candidates = Vec::new();
  for row in output.rows() {
    let objectness = row[4];
    if objectness <= thresh {
      continue;
    }

    let bbox = transform.restore(BBox {
      x: row[0],
      y: row[1],
      w: row[2],
      h: row[3],
    });

    let prob = row
      .iter()
      .skip(BOX_FIELDS)
      .map(|score| {
        let p = objectness * score;
        if p > thresh { p } else { 0.0 }
      })
      .collect::<Vec<_>>()
      .into_boxed_slice();

    candidates.push(Detection {
      bbox,
      objectness,
      prob,
    });
  }

  debug!(
    "原始输出 {} 行，候选框 {} 个",
    output.nrows(),
    candidates.len()
  );
  Ok(candidates)
}
