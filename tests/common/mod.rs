// 该文件是 Linghe （凌河） 项目的一部分。
// tests/common/mod.rs - 集成测试共用的脚本化后端
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

#![allow(dead_code)]

use std::{
  cell::{Cell, RefCell},
  path::{Path, PathBuf},
  rc::Rc,
};

use image::{DynamicImage, Rgb, RgbImage};
use linghe::{
  frame::PlanarFrame,
  model::{Detector, DetectorError, Network, NetworkConfig},
};
use ndarray::{Array2, array};

pub const CFG: &str = "\
[net]
width=64
height=64
channels=3

[convolutional]
filters=21

[yolo]
classes=2
";

/// 每次前向都返回同一份输出的后端
pub struct ScriptedNetwork {
  output: Array2<f32>,
  inputs: Rc<RefCell<Vec<[usize; 4]>>>,
  resized: Rc<Cell<Option<(u32, u32)>>>,
  dropped: Rc<Cell<usize>>,
}

impl Network for ScriptedNetwork {
  fn forward(&mut self, input: &PlanarFrame) -> Result<Array2<f32>, DetectorError> {
    self.inputs.borrow_mut().push(input.shape());
    Ok(self.output.clone())
  }

  fn resize(&mut self, width: u32, height: u32) -> Result<(), DetectorError> {
    self.resized.set(Some((width, height)));
    Ok(())
  }
}

impl Drop for ScriptedNetwork {
  fn drop(&mut self) {
    self.dropped.set(self.dropped.get() + 1);
  }
}

/// 记录后端收到的输入、尺寸调整和释放次数
#[derive(Default)]
pub struct Traces {
  pub inputs: Rc<RefCell<Vec<[usize; 4]>>>,
  pub resized: Rc<Cell<Option<(u32, u32)>>>,
  pub dropped: Rc<Cell<usize>>,
}

impl Traces {
  pub fn network(&self, output: Array2<f32>) -> ScriptedNetwork {
    ScriptedNetwork {
      output,
      inputs: self.inputs.clone(),
      resized: self.resized.clone(),
      dropped: self.dropped.clone(),
    }
  }

  pub fn forwards(&self) -> usize {
    self.inputs.borrow().len()
  }
}

/// 两个重叠的 0 类框、一个 1 类框和一个低置信度框
///
/// 阈值 0.25 时有 3 个候选框；NMS 0.45 后剩下 0 类 0.81 与 1 类 0.63。
pub fn scripted_output() -> Array2<f32> {
  array![
    [0.50, 0.50, 0.40, 0.40, 0.9, 0.9, 0.1],
    [0.52, 0.50, 0.40, 0.40, 0.8, 0.8, 0.1],
    [0.10, 0.10, 0.10, 0.10, 0.7, 0.1, 0.9],
    [0.80, 0.80, 0.10, 0.10, 0.05, 1.0, 0.0],
  ]
}

pub fn detector(traces: &Traces) -> Detector<ScriptedNetwork> {
  let config = NetworkConfig::parse(CFG).unwrap();
  Detector::new(config, traces.network(scripted_output()))
}

pub fn image(width: u32, height: u32) -> DynamicImage {
  DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 60, 30])))
}

pub fn write_cfg(dir: &Path, text: &str) -> PathBuf {
  let path = dir.join("net.cfg");
  std::fs::write(&path, text).unwrap();
  path
}
