// 该文件是 Linghe （凌河） 项目的一部分。
// src/input/image_set.rs - 图像集合
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

use image::ImageReader;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::InputFrame, url_path};

#[derive(Error, Debug)]
pub enum ImageSetError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误 {0}: {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("图像 {0} 加载失败: {1}")]
  ImageError(PathBuf, image::ImageError),
  #[error("COCO 标注文件解析失败: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("不支持的图像列表文件: {0}")]
  UnsupportedList(PathBuf),
}

/// 集合中的一张图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
  pub name: String,
  pub id: u64,
  pub path: PathBuf,
}

/// 待预测的图像集合：目录、`.txt` 名称列表或 COCO `.json`
#[derive(Debug, Clone, Default)]
pub struct ImageSet {
  entries: Vec<ImageEntry>,
}

#[derive(Deserialize)]
struct CocoImageList {
  images: Vec<CocoImageRef>,
}

#[derive(Deserialize)]
struct CocoImageRef {
  file_name: String,
  id: u64,
}

impl ImageSet {
  /// 根据列表文件扩展名选择读取方式，未给出列表时读取整个目录
  pub fn discover(folder: &Path, list: Option<&Path>) -> Result<Self, ImageSetError> {
    let set = match list {
      None => Self::from_folder(folder)?,
      Some(list) => match list.extension().and_then(|e| e.to_str()) {
        Some("json") => Self::from_coco_json(folder, list)?,
        Some("txt") => Self::from_list(folder, list)?,
        _ => return Err(ImageSetError::UnsupportedList(list.to_path_buf())),
      },
    };
    info!("图像集合共 {} 张图像", set.len());
    Ok(set)
  }

  /// 目录下所有文件，按名称排序，编号从 0 开始
  pub fn from_folder(folder: &Path) -> Result<Self, ImageSetError> {
    let io_err = |e| ImageSetError::IoError(folder.to_path_buf(), e);
    let mut names = Vec::new();
    for entry in std::fs::read_dir(folder).map_err(io_err)? {
      let entry = entry.map_err(io_err)?;
      if entry.file_type().map_err(io_err)?.is_file() {
        names.push(entry.file_name().to_string_lossy().into_owned());
      }
    }
    names.sort();

    Ok(Self::from_names(folder, names))
  }

  /// 每行一个文件名，编号为从 0 开始的行号，空行跳过但占用编号
  pub fn from_list(folder: &Path, list: &Path) -> Result<Self, ImageSetError> {
    let text = std::fs::read_to_string(list)
      .map_err(|e| ImageSetError::IoError(list.to_path_buf(), e))?;
    let entries = text
      .lines()
      .enumerate()
      .map(|(line, name)| (line, name.trim_end_matches('\r')))
      .filter(|(_, name)| !name.is_empty())
      .map(|(line, name)| ImageEntry {
        path: folder.join(name),
        name: name.to_string(),
        id: line as u64,
      })
      .collect();
    Ok(Self { entries })
  }

  /// COCO 标注中的 `images[].file_name` 与 `images[].id`
  pub fn from_coco_json(folder: &Path, json: &Path) -> Result<Self, ImageSetError> {
    let text = std::fs::read_to_string(json)
      .map_err(|e| ImageSetError::IoError(json.to_path_buf(), e))?;
    let list: CocoImageList = serde_json::from_str(&text)?;
    let entries = list
      .images
      .into_iter()
      .map(|image| ImageEntry {
        path: folder.join(&image.file_name),
        name: image.file_name,
        id: image.id,
      })
      .collect();
    Ok(Self { entries })
  }

  fn from_names(folder: &Path, names: impl IntoIterator<Item = String>) -> Self {
    let entries = names
      .into_iter()
      .enumerate()
      .map(|(id, name)| ImageEntry {
        path: folder.join(&name),
        name,
        id: id as u64,
      })
      .collect();
    Self { entries }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn entries(&self) -> &[ImageEntry] {
    &self.entries
  }

  pub fn into_frames(self) -> ImageSetFrames {
    ImageSetFrames {
      entries: self.entries.into_iter(),
    }
  }
}

impl FromUrlWithScheme for ImageSet {
  const SCHEME: &'static str = "images";
}

impl FromUrl for ImageSet {
  type Error = ImageSetError;

  /// `images:///data/val?list=/data/val.txt`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageSetError::SchemeMismatch);
    }
    let folder = PathBuf::from(url_path(url));
    let list = url
      .query_pairs()
      .find(|(k, _)| k == "list")
      .map(|(_, v)| PathBuf::from(v.into_owned()));
    Self::discover(&folder, list.as_deref())
  }
}

/// 按顺序逐张解码图像
pub struct ImageSetFrames {
  entries: std::vec::IntoIter<ImageEntry>,
}

impl ImageEntry {
  pub fn load(&self) -> Result<InputFrame, ImageSetError> {
    debug!("读取图像 {}", self.path.display());
    let image = ImageReader::open(&self.path)
      .map_err(|e| ImageSetError::IoError(self.path.clone(), e))?
      .with_guessed_format()
      .map_err(|e| ImageSetError::IoError(self.path.clone(), e))?
      .decode()
      .map_err(|e| ImageSetError::ImageError(self.path.clone(), e))?;
    Ok(InputFrame {
      name: self.name.clone(),
      id: self.id,
      image,
    })
  }
}

impl Iterator for ImageSetFrames {
  type Item = Result<InputFrame, ImageSetError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.entries.next().map(|entry| entry.load())
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    self.entries.size_hint()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn write_image(dir: &Path, name: &str) {
    RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]))
      .save(dir.join(name))
      .unwrap();
  }

  #[test]
  fn folder_entries_are_sorted() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "b.png");
    write_image(dir.path(), "a.png");
    std::fs::create_dir(dir.path().join("nested")).unwrap();

    let set = ImageSet::discover(dir.path(), None).unwrap();
    let names: Vec<_> = set.entries().iter().map(|e| (e.name.as_str(), e.id)).collect();
    assert_eq!(names, vec![("a.png", 0), ("b.png", 1)]);
  }

  #[test]
  fn list_file_ids_follow_lines() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("val.txt");
    std::fs::write(&list, "x.jpg\r\ny.jpg\n").unwrap();

    let set = ImageSet::discover(dir.path(), Some(&list)).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.entries()[1].name, "y.jpg");
    assert_eq!(set.entries()[1].id, 1);
    assert_eq!(set.entries()[1].path, dir.path().join("y.jpg"));
  }

  #[test]
  fn blank_lines_keep_following_ids() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("val.txt");
    std::fs::write(&list, "x.jpg\n\ny.jpg\r\n\r\nz.jpg").unwrap();

    let set = ImageSet::discover(dir.path(), Some(&list)).unwrap();
    let ids: Vec<_> = set.entries().iter().map(|e| (e.name.as_str(), e.id)).collect();
    assert_eq!(ids, vec![("x.jpg", 0), ("y.jpg", 2), ("z.jpg", 4)]);
  }

  #[test]
  fn coco_json_keeps_image_ids() {
    let dir = tempfile::tempdir().unwrap();
    let json = dir.path().join("instances.json");
    std::fs::write(
      &json,
      r#"{"images": [{"file_name": "1.jpg", "id": 42, "width": 10}], "annotations": []}"#,
    )
    .unwrap();

    let set = ImageSet::discover(dir.path(), Some(&json)).unwrap();
    assert_eq!(
      set.entries(),
      &[ImageEntry {
        name: "1.jpg".to_string(),
        id: 42,
        path: dir.path().join("1.jpg"),
      }]
    );
  }

  #[test]
  fn unknown_list_extension_is_rejected() {
    let err = ImageSet::discover(Path::new("/tmp"), Some(Path::new("/tmp/list.csv"))).unwrap_err();
    assert!(matches!(err, ImageSetError::UnsupportedList(_)));
  }

  #[test]
  fn frames_decode_lazily() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png");
    let list = dir.path().join("val.txt");
    std::fs::write(&list, "a.png\nmissing.png\n").unwrap();

    let mut frames = ImageSet::discover(dir.path(), Some(&list)).unwrap().into_frames();
    let first = frames.next().unwrap().unwrap();
    assert_eq!(first.image.width(), 4);
    assert!(frames.next().unwrap().is_err());
    assert!(frames.next().is_none());
  }
}
