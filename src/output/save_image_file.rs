// 该文件是 Linghe （凌河） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::InputFrame,
  model::{DetectionSet, Labels},
  output::{
    Render,
    draw::{Draw, DrawError},
  },
  predict::{DEFAULT_MAX_DETS, flatten},
  url_path,
};

/// 默认的绘制阈值
pub const DEFAULT_DRAW_THRESHOLD: f32 = 0.3;

pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
  labels: Labels,
  threshold: f32,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("绘制错误: {0}")]
  DrawError(#[from] DrawError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  /// `image:///out/dog.jpg?font=/usr/share/fonts/DejaVuSans.ttf&threshold=0.5`
  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let mut output = SaveImageFileOutput::new(url_path(uri), Labels::numeric(0));
    for (key, value) in uri.query_pairs() {
      match key.as_ref() {
        "font" => output = output.with_font_file(value.as_ref())?,
        "threshold" => {
          if let Ok(threshold) = value.parse() {
            output.threshold = threshold;
          }
        }
        _ => {}
      }
    }
    Ok(output)
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl AsRef<Path>, labels: Labels) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      draw: Draw::new(labels.len()),
      labels,
      threshold: DEFAULT_DRAW_THRESHOLD,
    }
  }

  /// 替换类别名称，调色板随类别数重建
  pub fn with_labels(mut self, labels: Labels) -> Self {
    self.draw = self.draw.with_classes(labels.len());
    self.labels = labels;
    self
  }

  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, SaveImageFileError> {
    self.draw = self.draw.with_font_file(path)?;
    Ok(self)
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<InputFrame, DetectionSet> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &InputFrame, result: &DetectionSet) -> Result<(), Self::Error> {
    let mut image = frame.image.to_rgb8();
    let predictions = flatten(
      result,
      image.width(),
      image.height(),
      self.threshold,
      DEFAULT_MAX_DETS,
    );
    self
      .draw
      .draw_predictions(&mut image, &predictions, &self.labels);
    self.save_image(image)
  }
}
