// 该文件是 Linghe （凌河） 项目的一部分。
// src/model/error.rs - 检测器错误
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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("配置解析错误: {0}")]
  ConfigParse(String),
  #[error("权重加载错误: {0}")]
  WeightLoad(String),
  #[error("形状不匹配: {0}")]
  ShapeMismatch(String),
  #[error("资源耗尽: {0}")]
  ResourceExhausted(String),
  #[error("推理后端错误: {0}")]
  Backend(String),
  #[error("模型路径错误: {0}")]
  ModelPath(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

impl DetectorError {
  pub fn config_at(line: usize, msg: impl std::fmt::Display) -> Self {
    DetectorError::ConfigParse(format!("第 {} 行: {}", line, msg))
  }
}
