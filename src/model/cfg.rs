// 该文件是 Linghe （凌河） 项目的一部分。
// src/model/cfg.rs - 网络配置文件解析
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

use std::{path::Path, str::FromStr};

use tracing::debug;

use crate::model::{DetectorError, NmsStrategy, nms::DEFAULT_BETA_NMS};

const DEFAULT_CHANNELS: u32 = 3;
const DEFAULT_CLASSES: usize = 80;
const NET_SECTIONS: [&str; 2] = ["net", "network"];
const DETECTION_SECTIONS: [&str; 3] = ["yolo", "region", "gaussian_yolo"];

/// 从 darknet 风格配置中提取的网络元数据
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
  pub width: u32,
  pub height: u32,
  pub channels: u32,
  pub classes: usize,
  pub nms: NmsStrategy,
  /// `[net]` 之后的层数
  pub layers: usize,
}

struct Section {
  name: String,
  line: usize,
  options: Vec<(String, String, usize)>,
}

impl Section {
  fn find(&self, key: &str) -> Option<(&str, usize)> {
    self
      .options
      .iter()
      .rev()
      .find(|(k, _, _)| k == key)
      .map(|(_, v, line)| (v.as_str(), *line))
  }

  fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, DetectorError>
  where
    T::Err: std::fmt::Display,
  {
    match self.find(key) {
      Some((value, line)) => value
        .parse()
        .map_err(|e| DetectorError::config_at(line, format!("[{}] {}={}: {}", self.name, key, value, e))),
      None => Ok(default),
    }
  }

  fn parse_required<T: FromStr>(&self, key: &str) -> Result<T, DetectorError>
  where
    T::Err: std::fmt::Display,
  {
    let (value, line) = self
      .find(key)
      .ok_or_else(|| DetectorError::config_at(self.line, format!("[{}] 缺少 {}", self.name, key)))?;
    value
      .parse()
      .map_err(|e| DetectorError::config_at(line, format!("[{}] {}={}: {}", self.name, key, value, e)))
  }
}

fn read_sections(text: &str) -> Result<Vec<Section>, DetectorError> {
  let mut sections: Vec<Section> = Vec::new();

  for (idx, raw) in text.lines().enumerate() {
    let line_no = idx + 1;
    let line: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
      continue;
    }

    if let Some(rest) = line.strip_prefix('[') {
      let name = rest
        .strip_suffix(']')
        .ok_or_else(|| DetectorError::config_at(line_no, format!("段名未闭合: {}", raw.trim())))?;
      sections.push(Section {
        name: name.to_ascii_lowercase(),
        line: line_no,
        options: Vec::new(),
      });
      continue;
    }

    let (key, value) = line
      .split_once('=')
      .ok_or_else(|| DetectorError::config_at(line_no, format!("无法解析的配置行: {}", raw.trim())))?;
    let section = sections
      .last_mut()
      .ok_or_else(|| DetectorError::config_at(line_no, "配置项出现在任何段之前"))?;
    section
      .options
      .push((key.to_string(), value.to_string(), line_no));
  }

  Ok(sections)
}

impl NetworkConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
      DetectorError::ConfigParse(format!("无法读取配置文件 {}: {}", path.display(), e))
    })?;
    let config = Self::parse(&text)?;
    debug!("配置文件 {} 解析完成: {:?}", path.display(), config);
    Ok(config)
  }

  pub fn parse(text: &str) -> Result<Self, DetectorError> {
    let sections = read_sections(text)?;

    let net = sections
      .first()
      .ok_or_else(|| DetectorError::ConfigParse("配置文件为空".to_string()))?;
    if !NET_SECTIONS.contains(&net.name.as_str()) {
      return Err(DetectorError::config_at(
        net.line,
        format!("第一个段必须是 [net] 或 [network], 实际为 [{}]", net.name),
      ));
    }

    let width: u32 = net.parse_required("width")?;
    let height: u32 = net.parse_required("height")?;
    let channels: u32 = net.parse_or("channels", DEFAULT_CHANNELS)?;
    if width == 0 || height == 0 || channels == 0 {
      return Err(DetectorError::config_at(
        net.line,
        format!("输入尺寸必须为正: {}x{}x{}", width, height, channels),
      ));
    }

    let head = sections
      .iter()
      .rev()
      .find(|s| DETECTION_SECTIONS.contains(&s.name.as_str()))
      .ok_or_else(|| DetectorError::ConfigParse("配置中没有检测层 ([yolo] 或 [region])".to_string()))?;

    let classes: usize = head.parse_or("classes", DEFAULT_CLASSES)?;
    if classes == 0 {
      return Err(DetectorError::config_at(head.line, "classes 必须为正"));
    }
    let beta: f32 = head.parse_or("beta_nms", DEFAULT_BETA_NMS)?;
    let kind = head.find("nms_kind").map(|(v, _)| v).unwrap_or("default");

    Ok(Self {
      width,
      height,
      channels,
      classes,
      nms: NmsStrategy::from_kind(kind, beta),
      layers: sections.len() - 1,
    })
  }

  pub fn input_shape(&self) -> (u32, u32) {
    (self.width, self.height)
  }
}

impl FromStr for NetworkConfig {
  type Err = DetectorError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}
