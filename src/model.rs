// 该文件是 Linghe （凌河） 项目的一部分。
// src/model.rs - 模型
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

use ndarray::Array2;

use crate::frame::PlanarFrame;

/// 推理后端
///
/// `forward` 返回形状为 `[N, 5 + classes]` 的原始输出，每行依次为
/// `cx, cy, w, h`（相对网络输入归一化）、objectness 以及各类别分数。
pub trait Network {
  fn forward(&mut self, input: &PlanarFrame) -> Result<Array2<f32>, DetectorError>;

  /// 网络输入尺寸变化时调用，后端不支持时返回错误
  fn resize(&mut self, _width: u32, _height: u32) -> Result<(), DetectorError> {
    Ok(())
  }
}

impl<N: Network + ?Sized> Network for Box<N> {
  fn forward(&mut self, input: &PlanarFrame) -> Result<Array2<f32>, DetectorError> {
    (**self).forward(input)
  }

  fn resize(&mut self, width: u32, height: u32) -> Result<(), DetectorError> {
    (**self).resize(width, height)
  }
}

mod cfg;
mod detection;
mod detector;
mod error;
mod label;
mod nms;
mod observer;
#[cfg(feature = "ort_backend")]
mod ort_backend;

pub use self::cfg::NetworkConfig;
pub use self::detection::{BBox, Detection, DetectionSet};
pub use self::detector::{Detector, DetectorBuilder};
pub use self::error::DetectorError;
pub use self::label::Labels;
pub use self::nms::NmsStrategy;
pub use self::observer::{AverageLatency, DetectObserver, DetectReport};
#[cfg(feature = "ort_backend")]
pub use self::ort_backend::OrtNetwork;
