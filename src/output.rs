// 该文件是 Linghe （凌河） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;

use crate::{model::Labels, predict::Prediction};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

/// 收集多张图像的预测结果并写入文件
pub trait PredictionSink {
  fn add_image(&mut self, image: &ImageRecord<'_>, predictions: &[Prediction]);
  fn save(&self, path: &Path) -> Result<(), ExportError>;
}

/// 导出时需要的图像信息
#[derive(Debug, Clone, Copy)]
pub struct ImageRecord<'a> {
  pub name: &'a str,
  pub id: u64,
  pub width: u32,
  pub height: u32,
}

#[cfg(feature = "save_image_file")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{DEFAULT_DRAW_THRESHOLD, SaveImageFileError, SaveImageFileOutput};

mod coco;
mod cvat;
pub use self::coco::CocoExport;
pub use self::cvat::CvatExport;

#[derive(Error, Debug)]
pub enum ExportError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("XML 写入错误: {0}")]
  XmlError(#[from] quick_xml::Error),
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("导出错误: {0}")]
  ExportError(#[from] ExportError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 批量预测的导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
  Coco,
  Cvat,
}

pub enum Exporter {
  Coco(CocoExport),
  Cvat(CvatExport),
}

impl Exporter {
  pub fn new(
    format: ExportFormat,
    images: usize,
    labels: &Labels,
    detections_only: bool,
  ) -> Self {
    match format {
      ExportFormat::Coco => Exporter::Coco(CocoExport::new(labels).detections_only(detections_only)),
      ExportFormat::Cvat => Exporter::Cvat(CvatExport::new(images, labels)),
    }
  }
}

impl PredictionSink for Exporter {
  fn add_image(&mut self, image: &ImageRecord<'_>, predictions: &[Prediction]) {
    match self {
      Exporter::Coco(export) => export.add_image(image, predictions),
      Exporter::Cvat(export) => export.add_image(image, predictions),
    }
  }

  fn save(&self, path: &Path) -> Result<(), ExportError> {
    match self {
      Exporter::Coco(export) => export.save(path),
      Exporter::Cvat(export) => export.save(path),
    }
  }
}

/// 未指定输出时不做任何事
impl<Frame, Output, R: Render<Frame, Output>> Render<Frame, Output> for Option<R> {
  type Error = R::Error;

  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error> {
    match self {
      Some(render) => render.render_result(frame, result),
      None => Ok(()),
    }
  }
}
