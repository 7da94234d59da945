// 该文件是 Linghe （凌河） 项目的一部分。
// src/model/label.rs - 类别名称
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

use tracing::{info, warn};

/// 类别编号到名称的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  /// 以编号作为名称
  pub fn numeric(classes: usize) -> Self {
    Self {
      names: (0..classes).map(|i| i.to_string()).collect(),
    }
  }

  /// 读取每行一个名称的类别文件
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let labels = Self::from_lines(&text);
    info!("从 {} 读取 {} 个类别名称", path.display(), labels.len());
    Ok(labels)
  }

  pub fn from_lines(text: &str) -> Self {
    Self {
      names: text
        .lines()
        .map(|l| l.trim_end_matches('\r').to_string())
        .filter(|l| !l.is_empty())
        .collect(),
    }
  }

  /// 读取类别文件，未提供时退化为编号
  pub fn load_or_numeric(
    path: Option<impl AsRef<Path>>,
    classes: usize,
  ) -> Result<Self, std::io::Error> {
    let labels = match path {
      Some(path) => Self::from_file(path)?,
      None => Self::numeric(classes),
    };
    if labels.len() != classes {
      warn!(
        "类别名称数量 {} 与模型类别数 {} 不一致",
        labels.len(),
        classes
      );
    }
    Ok(labels)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 类别名称，超出范围时返回编号
  pub fn name(&self, class_id: usize) -> String {
    self
      .names
      .get(class_id)
      .cloned()
      .unwrap_or_else(|| class_id.to_string())
  }

  pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
    self.names.iter().map(String::as_str).enumerate()
  }
}
