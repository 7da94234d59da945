// 该文件是 Linghe （凌河） 项目的一部分。
// src/output/coco.rs - COCO 格式导出
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

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::Path,
};

use serde::Serialize;
use tracing::info;

use crate::{
  model::Labels,
  output::{ExportError, ImageRecord, PredictionSink},
  predict::Prediction,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CocoImage {
  pub id: u64,
  pub file_name: String,
  pub width: u32,
  pub height: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CocoAnnotation {
  pub id: u64,
  pub iscrowd: u8,
  pub image_id: u64,
  pub category_id: usize,
  pub bbox: [f32; 4], // [left, top, width, height]
  pub area: f32,
  pub score: f32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CocoCategory {
  pub name: String,
  pub id: usize,
}

#[derive(Debug, Default, Serialize)]
struct CocoDocument<'a> {
  images: &'a [CocoImage],
  annotations: &'a [CocoAnnotation],
  categories: &'a [CocoCategory],
}

/// COCO 检测结果，类别编号从 1 开始
#[derive(Debug, Default)]
pub struct CocoExport {
  images: Vec<CocoImage>,
  annotations: Vec<CocoAnnotation>,
  categories: Vec<CocoCategory>,
  detections_only: bool,
}

impl CocoExport {
  pub fn new(labels: &Labels) -> Self {
    Self {
      categories: labels
        .iter()
        .map(|(id, name)| CocoCategory {
          name: name.to_string(),
          id: id + 1,
        })
        .collect(),
      ..Default::default()
    }
  }

  /// 只输出 `annotations` 数组
  pub fn detections_only(mut self, detections_only: bool) -> Self {
    self.detections_only = detections_only;
    self
  }

  pub fn images(&self) -> &[CocoImage] {
    &self.images
  }

  pub fn annotations(&self) -> &[CocoAnnotation] {
    &self.annotations
  }

  pub fn to_json(&self) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    self.write_json(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
  }

  fn write_json<W: Write>(&self, writer: W) -> Result<(), ExportError> {
    if self.detections_only {
      serde_json::to_writer_pretty(writer, &self.annotations)?;
    } else {
      serde_json::to_writer_pretty(
        writer,
        &CocoDocument {
          images: &self.images,
          annotations: &self.annotations,
          categories: &self.categories,
        },
      )?;
    }
    Ok(())
  }
}

impl PredictionSink for CocoExport {
  fn add_image(&mut self, image: &ImageRecord<'_>, predictions: &[Prediction]) {
    self.images.push(CocoImage {
      id: image.id,
      file_name: image.name.to_string(),
      width: image.width,
      height: image.height,
    });

    for prediction in predictions {
      let [left, top, right, bottom] =
        prediction.clipped(image.width as f32, image.height as f32);
      let bbox = [left, top, right - left, bottom - top];
      let id = self.annotations.last().map(|a| a.id + 1).unwrap_or(1);
      self.annotations.push(CocoAnnotation {
        id,
        iscrowd: 0,
        image_id: image.id,
        category_id: prediction.class_id + 1,
        bbox,
        area: bbox[2] * bbox[3],
        score: prediction.score,
      });
    }
  }

  fn save(&self, path: &Path) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    self.write_json(&mut writer)?;
    writer.flush()?;
    info!(
      "COCO 结果已保存到 {}: {} 张图像, {} 个检测",
      path.display(),
      self.images.len(),
      self.annotations.len()
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(id: u64) -> ImageRecord<'static> {
    ImageRecord {
      name: "a.jpg",
      id,
      width: 100,
      height: 50,
    }
  }

  fn prediction(class_id: usize, bbox: [f32; 4]) -> Prediction {
    Prediction {
      class_id,
      score: 0.75,
      bbox,
    }
  }

  #[test]
  fn annotations_are_clipped_and_numbered() {
    let mut export = CocoExport::new(&Labels::from_lines("cat\ndog\n"));
    export.add_image(
      &record(7),
      &[
        prediction(1, [-10.0, 10.0, 30.0, 60.0]),
        prediction(0, [10.0, 10.0, 20.0, 20.0]),
      ],
    );
    export.add_image(&record(8), &[prediction(0, [0.0, 0.0, 1.0, 1.0])]);

    let anns = export.annotations();
    assert_eq!(anns.len(), 3);
    assert_eq!(anns[0].id, 1);
    assert_eq!(anns[0].category_id, 2);
    assert_eq!(anns[0].image_id, 7);
    assert_eq!(anns[0].bbox, [0.0, 10.0, 30.0, 40.0]);
    assert_eq!(anns[0].area, 1200.0);
    assert_eq!(anns[2].id, 3);
    assert_eq!(anns[2].image_id, 8);
    assert_eq!(export.images().len(), 2);
  }

  #[test]
  fn document_lists_categories_from_one() {
    let export = CocoExport::new(&Labels::from_lines("cat\ndog\n"));
    let value: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
    assert_eq!(value["categories"][0]["id"], 1);
    assert_eq!(value["categories"][1]["name"], "dog");
    assert!(value["images"].as_array().unwrap().is_empty());
  }

  #[test]
  fn detections_only_emits_annotation_array() {
    let mut export = CocoExport::new(&Labels::numeric(1)).detections_only(true);
    export.add_image(&record(1), &[prediction(0, [1.0, 1.0, 2.0, 2.0])]);
    let value: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 1);
    assert_eq!(value[0]["score"], 0.75);
  }

  #[test]
  fn saves_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.json");
    let mut export = CocoExport::new(&Labels::numeric(1));
    export.add_image(&record(1), &[]);
    export.save(&path).unwrap();

    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["images"][0]["file_name"], "a.jpg");
  }

  #[test]
  fn saved_file_matches_json_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dets.json");
    let mut export = CocoExport::new(&Labels::numeric(2)).detections_only(true);
    export.add_image(&record(4), &[prediction(1, [1.0, 2.0, 3.0, 4.0])]);
    export.save(&path).unwrap();

    assert_eq!(
      std::fs::read_to_string(&path).unwrap(),
      export.to_json().unwrap()
    );
  }
}
