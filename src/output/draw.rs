// 该文件是 Linghe （凌河） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;

use crate::{model::Labels, predict::Prediction};

const TEXT_COLOR: [u8; 3] = [0, 0, 0];
const MIN_FONT_SIZE: f32 = 10.0;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体文件读取失败: {0}")]
  FontIoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 按类别着色绘制检测框，提供字体时附带类别与分数
pub struct Draw {
  font: Option<FontVec>,
  palette: Vec<[u8; 3]>,
}

/// 色相均匀分布的调色板，饱和度与亮度为 1
pub fn palette(classes: usize) -> Vec<[u8; 3]> {
  (0..classes)
    .map(|i| hsv_to_rgb(i as f32 / classes as f32))
    .collect()
}

fn hsv_to_rgb(hue: f32) -> [u8; 3] {
  let h = hue.rem_euclid(1.0) * 6.0;
  let f = h - h.floor();
  let (q, t) = (1.0 - f, f);
  let (r, g, b) = match h.floor() as u32 {
    0 => (1.0, t, 0.0),
    1 => (q, 1.0, 0.0),
    2 => (0.0, 1.0, t),
    3 => (0.0, q, 1.0),
    4 => (t, 0.0, 1.0),
    _ => (1.0, 0.0, q),
  };
  [
    (r * 255.0).round() as u8,
    (g * 255.0).round() as u8,
    (b * 255.0).round() as u8,
  ]
}

impl Draw {
  pub fn new(classes: usize) -> Self {
    Self {
      font: None,
      palette: palette(classes),
    }
  }

  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    self.font = Some(FontVec::try_from_vec(data)?);
    info!("加载字体 {}", path.display());
    Ok(self)
  }

  /// 保留字体，按新的类别数重建调色板
  pub fn with_classes(mut self, classes: usize) -> Self {
    self.palette = palette(classes);
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn color(&self, class_id: usize) -> [u8; 3] {
    if self.palette.is_empty() {
      return [255, 255, 255];
    }
    self.palette[class_id % self.palette.len()]
  }

  pub fn draw_predictions(&self, image: &mut RgbImage, predictions: &[Prediction], labels: &Labels) {
    let (w, h) = (image.width(), image.height());
    let thickness = ((w + h) / 300).max(1) as i32;
    let font_size = (3e-2 * h as f32 + 0.5).floor().max(MIN_FONT_SIZE);

    for prediction in predictions {
      let [left, top, right, bottom] = prediction.clipped(w as f32, h as f32);
      let (x0, y0) = (left.floor() as i32, top.floor() as i32);
      let (x1, y1) = (right.ceil() as i32, bottom.ceil() as i32);
      if x0 >= x1 || y0 >= y1 {
        continue;
      }
      let color = Rgb(self.color(prediction.class_id));

      for t in 0..thickness {
        let (bw, bh) = (x1 - x0 - 2 * t, y1 - y0 - 2 * t);
        if bw <= 0 || bh <= 0 {
          break;
        }
        draw_hollow_rect_mut(image, Rect::at(x0 + t, y0 + t).of_size(bw as u32, bh as u32), color);
      }

      if let Some(font) = &self.font {
        let text = format!("{} {:.2}", labels.name(prediction.class_id), prediction.score);
        let scale = PxScale::from(font_size);
        let (tw, th) = text_size(scale, font, &text);
        if tw == 0 || th == 0 {
          continue;
        }
        // 标签放在框上方，空间不足时放在框内
        let ty = if y0 >= th as i32 { y0 - th as i32 } else { y0 };
        draw_filled_rect_mut(image, Rect::at(x0, ty).of_size(tw, th), color);
        draw_text_mut(image, Rgb(TEXT_COLOR), x0, ty, scale, font, &text);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn palette_starts_at_red_and_is_distinct() {
    let colors = palette(6);
    assert_eq!(colors[0], [255, 0, 0]);
    assert_eq!(colors[2], [0, 255, 0]);
    assert_eq!(colors[4], [0, 0, 255]);
    for i in 0..colors.len() {
      for j in i + 1..colors.len() {
        assert_ne!(colors[i], colors[j]);
      }
    }
  }

  #[test]
  fn boxes_are_drawn_in_class_color() {
    let draw = Draw::new(3);
    let mut image = RgbImage::new(60, 40);
    draw.draw_predictions(
      &mut image,
      &[Prediction {
        class_id: 1,
        score: 0.9,
        bbox: [10.0, 5.0, 30.0, 25.0],
      }],
      &Labels::numeric(3),
    );

    assert_eq!(image.get_pixel(10, 5).0, draw.color(1));
    assert_eq!(image.get_pixel(20, 5).0, draw.color(1));
    assert_eq!(image.get_pixel(20, 15).0, [0, 0, 0]);
    assert!(!draw.has_font());
  }

  #[test]
  fn degenerate_boxes_are_skipped() {
    let draw = Draw::new(1);
    let mut image = RgbImage::new(10, 10);
    draw.draw_predictions(
      &mut image,
      &[Prediction {
        class_id: 0,
        score: 0.9,
        bbox: [20.0, 20.0, 30.0, 30.0],
      }],
      &Labels::numeric(1),
    );
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
  }

  #[test]
  fn invalid_font_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("font.ttf");
    std::fs::write(&path, b"not a font").unwrap();
    assert!(matches!(
      Draw::new(1).with_font_file(&path),
      Err(DrawError::InvalidFont(_))
    ));
  }
}
