// 该文件是 Linghe （凌河） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use crate::model::{BBox, Detection};

/// `beta_nms` 的默认值，也是 `greedynms` 使用的距离项指数
pub const DEFAULT_BETA_NMS: f32 = 0.6;

/// 抑制策略，在加载模型时根据最后一个检测层确定
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NmsStrategy {
  /// 标准贪心抑制，按 IoU 判断重叠
  #[default]
  Iou,
  /// 距离 IoU：`iou - (d² / c²)^beta`
  Diou { beta: f32 },
}

impl NmsStrategy {
  /// 由配置中的 `nms_kind` 与 `beta_nms` 得到策略
  pub fn from_kind(kind: &str, beta: f32) -> Self {
    match kind {
      "greedynms" => NmsStrategy::Diou {
        beta: DEFAULT_BETA_NMS,
      },
      "diounms" => NmsStrategy::Diou { beta },
      _ => NmsStrategy::Iou,
    }
  }

  pub fn overlap(&self, a: &BBox, b: &BBox) -> f32 {
    let iou = a.iou(b);
    match *self {
      NmsStrategy::Iou => iou,
      NmsStrategy::Diou { beta } => {
        let c = a.enclosing_diagonal_sq(b);
        if c == 0.0 {
          return iou;
        }
        iou - (a.centre_distance_sq(b) / c).powf(beta)
      }
    }
  }

  /// 按类别逐一抑制重叠框：分数较低且重叠超过 `thresh` 的框对应类别分数被置 0
  ///
  /// 检测框本身的顺序不变。
  pub fn suppress(&self, dets: &mut [Detection], classes: usize, thresh: f32) {
    let active: Vec<usize> = (0..dets.len())
      .filter(|&i| dets[i].objectness != 0.0)
      .collect();

    for k in 0..classes {
      let mut order = active.clone();
      order.sort_by(|&a, &b| score(&dets[b], k).total_cmp(&score(&dets[a], k)));

      for (pos, &i) in order.iter().enumerate() {
        if score(&dets[i], k) == 0.0 {
          continue;
        }
        let a = dets[i].bbox;
        for &j in &order[pos + 1..] {
          if self.overlap(&a, &dets[j].bbox) > thresh
            && let Some(p) = dets[j].prob.get_mut(k)
          {
            *p = 0.0;
          }
        }
      }
    }
  }
}

fn score(det: &Detection, class: usize) -> f32 {
  det.prob.get(class).copied().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(x: f32, y: f32, size: f32, prob: &[f32]) -> Detection {
    Detection {
      bbox: BBox {
        x,
        y,
        w: size,
        h: size,
      },
      objectness: 1.0,
      prob: prob.to_vec().into_boxed_slice(),
    }
  }

  #[test]
  fn kind_names_map_to_strategies() {
    assert_eq!(NmsStrategy::from_kind("default", 0.3), NmsStrategy::Iou);
    assert_eq!(NmsStrategy::from_kind("cornersnms", 0.3), NmsStrategy::Iou);
    assert_eq!(
      NmsStrategy::from_kind("greedynms", 0.3),
      NmsStrategy::Diou { beta: 0.6 }
    );
    assert_eq!(
      NmsStrategy::from_kind("diounms", 0.3),
      NmsStrategy::Diou { beta: 0.3 }
    );
  }

  #[test]
  fn overlapping_lower_score_is_suppressed() {
    let mut dets = vec![
      det(0.50, 0.5, 0.2, &[0.6]),
      det(0.51, 0.5, 0.2, &[0.9]),
      det(0.10, 0.1, 0.1, &[0.5]),
    ];
    NmsStrategy::Iou.suppress(&mut dets, 1, 0.45);

    assert_eq!(dets[0].prob[0], 0.0);
    assert_eq!(dets[1].prob[0], 0.9);
    assert_eq!(dets[2].prob[0], 0.5);
  }

  #[test]
  fn suppression_is_per_class() {
    let mut dets = vec![
      det(0.50, 0.5, 0.2, &[0.9, 0.0]),
      det(0.51, 0.5, 0.2, &[0.0, 0.8]),
    ];
    NmsStrategy::Iou.suppress(&mut dets, 2, 0.45);

    assert_eq!(dets[0].prob[0], 0.9);
    assert_eq!(dets[1].prob[1], 0.8);
  }

  #[test]
  fn zero_objectness_is_ignored() {
    let mut dets = vec![det(0.5, 0.5, 0.2, &[0.9]), det(0.5, 0.5, 0.2, &[0.8])];
    dets[0].objectness = 0.0;
    NmsStrategy::Iou.suppress(&mut dets, 1, 0.45);

    assert_eq!(dets[1].prob[0], 0.8);
  }

  #[test]
  fn diou_penalises_distant_centres() {
    let a = BBox {
      x: 0.5,
      y: 0.5,
      w: 0.4,
      h: 0.4,
    };
    let b = BBox {
      x: 0.6,
      y: 0.5,
      w: 0.4,
      h: 0.4,
    };
    let iou = NmsStrategy::Iou.overlap(&a, &b);
    let diou = NmsStrategy::Diou { beta: 0.6 }.overlap(&a, &b);
    assert!(diou < iou);
    assert!(diou > 0.0);
  }

  #[test]
  fn diou_keeps_boxes_plain_iou_would_remove() {
    // IoU 0.6，但中心距离较大时 DIoU 低于阈值
    let a = BBox {
      x: 0.5,
      y: 0.5,
      w: 0.4,
      h: 0.4,
    };
    let b = BBox {
      x: 0.6,
      y: 0.5,
      w: 0.4,
      h: 0.4,
    };
    let mut iou_dets = vec![
      det(a.x, a.y, a.w, &[0.9]),
      det(b.x, b.y, b.w, &[0.8]),
    ];
    let mut diou_dets = iou_dets.clone();

    NmsStrategy::Iou.suppress(&mut iou_dets, 1, 0.5);
    NmsStrategy::Diou { beta: 0.6 }.suppress(&mut diou_dets, 1, 0.5);

    assert_eq!(iou_dets[1].prob[0], 0.0);
    assert_eq!(diou_dets[1].prob[0], 0.8);
  }
}
