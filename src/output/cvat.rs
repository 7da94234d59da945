// 该文件是 Linghe （凌河） 项目的一部分。
// src/output/cvat.rs - CVAT XML 格式导出
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

use std::{borrow::Cow, io::Write, path::Path};

use quick_xml::{
  Writer,
  events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use tracing::info;

use crate::{
  model::Labels,
  output::{ExportError, ImageRecord, PredictionSink},
  predict::Prediction,
};

#[derive(Debug, Clone)]
struct CvatBox {
  label: String,
  bbox: [f32; 4],
  score: f32,
}

#[derive(Debug, Clone)]
struct CvatImage {
  id: u64,
  name: String,
  width: u32,
  height: u32,
  boxes: Vec<CvatBox>,
}

/// CVAT 1.1 标注文档
#[derive(Debug)]
pub struct CvatExport {
  size: usize,
  labels: Labels,
  images: Vec<CvatImage>,
}

/// 去掉 XML 1.0 不允许出现的字符，转义交给 quick_xml
fn xml_chars(text: &str) -> Cow<'_, str> {
  let allowed = |c: char| {
    matches!(c, '\t' | '\n' | '\r')
      || ('\u{20}'..='\u{D7FF}').contains(&c)
      || ('\u{E000}'..='\u{FFFD}').contains(&c)
      || c >= '\u{10000}'
  };
  if text.chars().all(allowed) {
    Cow::Borrowed(text)
  } else {
    Cow::Owned(text.chars().filter(|&c| allowed(c)).collect())
  }
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<(), ExportError> {
  writer.write_event(Event::Start(BytesStart::new(name)))?;
  writer.write_event(Event::Text(BytesText::new(&xml_chars(text))))?;
  writer.write_event(Event::End(BytesEnd::new(name)))?;
  Ok(())
}

impl CvatExport {
  /// `size` 写入 `<task><size>`，为任务中的图像总数
  pub fn new(size: usize, labels: &Labels) -> Self {
    Self {
      size,
      labels: labels.clone(),
      images: Vec::new(),
    }
  }

  pub fn to_xml(&self) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    self.write_xml(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
  }

  fn write_xml<W: Write>(&self, out: W) -> Result<(), ExportError> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("annotations")))?;

    writer.write_event(Event::Start(BytesStart::new("meta")))?;
    writer.write_event(Event::Start(BytesStart::new("task")))?;
    text_element(&mut writer, "size", &self.size.to_string())?;
    text_element(&mut writer, "mode", "annotation")?;
    text_element(&mut writer, "overlap", "0")?;
    text_element(&mut writer, "flipped", "False")?;
    writer.write_event(Event::Start(BytesStart::new("labels")))?;
    for (_, name) in self.labels.iter() {
      writer.write_event(Event::Start(BytesStart::new("label")))?;
      text_element(&mut writer, "name", name)?;
      writer.write_event(Event::End(BytesEnd::new("label")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("labels")))?;
    writer.write_event(Event::End(BytesEnd::new("task")))?;
    writer.write_event(Event::End(BytesEnd::new("meta")))?;

    for image in &self.images {
      let (id, width, height) = (
        image.id.to_string(),
        image.width.to_string(),
        image.height.to_string(),
      );
      let name = xml_chars(&image.name);
      let start = BytesStart::new("image").with_attributes([
        ("id", id.as_str()),
        ("name", name.as_ref()),
        ("width", width.as_str()),
        ("height", height.as_str()),
      ]);
      if image.boxes.is_empty() {
        writer.write_event(Event::Empty(start))?;
        continue;
      }
      writer.write_event(Event::Start(start))?;
      for b in &image.boxes {
        let label = xml_chars(&b.label);
        let [xtl, ytl, xbr, ybr] = b.bbox.map(|v| v.to_string());
        let score = b.score.to_string();
        writer.write_event(Event::Empty(BytesStart::new("box").with_attributes([
          ("label", label.as_ref()),
          ("occluded", "0"),
          ("xtl", xtl.as_str()),
          ("ytl", ytl.as_str()),
          ("xbr", xbr.as_str()),
          ("ybr", ybr.as_str()),
          ("score", score.as_str()),
        ])))?;
      }
      writer.write_event(Event::End(BytesEnd::new("image")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("annotations")))?;
    Ok(())
  }
}

impl PredictionSink for CvatExport {
  fn add_image(&mut self, image: &ImageRecord<'_>, predictions: &[Prediction]) {
    let boxes = predictions
      .iter()
      .map(|p| CvatBox {
        label: self.labels.name(p.class_id),
        bbox: p.clipped(image.width as f32, image.height as f32),
        score: p.score,
      })
      .collect();
    self.images.push(CvatImage {
      id: image.id,
      name: image.name.to_string(),
      width: image.width,
      height: image.height,
      boxes,
    });
  }

  fn save(&self, path: &Path) -> Result<(), ExportError> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    self.write_xml(&mut file)?;
    file.flush()?;
    info!(
      "CVAT 结果已保存到 {}: {} 张图像",
      path.display(),
      self.images.len()
    );
    Ok(())
  }
}
