// 该文件是 Linghe （凌河） 项目的一部分。
// src/model/ort_backend.rs - ONNX Runtime 推理后端
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

use ndarray::{Array2, ArrayView4};
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::{TensorRef, ValueType},
};
use tracing::{debug, info};

use crate::{
  frame::PlanarFrame,
  model::{DetectorError, Network, NetworkConfig},
};

fn weight_err(e: impl std::fmt::Display) -> DetectorError {
  DetectorError::WeightLoad(e.to_string())
}

fn backend_err(e: impl std::fmt::Display) -> DetectorError {
  DetectorError::Backend(e.to_string())
}

/// ONNX Runtime 会话
///
/// 权重文件为导出的 ONNX 模型，唯一输出为 `[1, N, 5 + classes]` 或 `[N, 5 + classes]`。
pub struct OrtNetwork {
  session: Session,
  classes: usize,
  channels: u32,
  input_dims: Vec<i64>,
}

/// 校验模型输入 `[N, C, H, W]`，负数维度为动态维度
fn check_input_dims(
  dims: &[i64],
  channels: u32,
  width: u32,
  height: u32,
) -> Result<(), DetectorError> {
  let [_, c, h, w] = dims else {
    return Err(DetectorError::ShapeMismatch(format!(
      "模型输入应为 4 维 NCHW，实际为 {:?}",
      dims
    )));
  };
  let checks = [
    ("通道数", *c, channels),
    ("高度", *h, height),
    ("宽度", *w, width),
  ];
  for (name, actual, expected) in checks {
    if actual > 0 && actual != i64::from(expected) {
      return Err(DetectorError::ShapeMismatch(format!(
        "模型输入{}为 {}，配置要求 {}",
        name, actual, expected
      )));
    }
  }
  Ok(())
}

impl OrtNetwork {
  pub fn load(
    path: &Path,
    config: &NetworkConfig,
    intra_threads: usize,
  ) -> Result<Self, DetectorError> {
    if !path.is_file() {
      return Err(DetectorError::WeightLoad(format!(
        "权重文件不存在: {}",
        path.display()
      )));
    }

    let _ = ort::init().commit();

    // Level3 包含卷积与批归一化融合等全部图优化
    let session = Session::builder()
      .map_err(weight_err)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(weight_err)?
      .with_intra_threads(intra_threads)
      .map_err(weight_err)?
      .commit_from_file(path)
      .map_err(weight_err)?;

    let input_dims: Vec<i64> = match session.inputs().first().map(|input| input.dtype()) {
      Some(ValueType::Tensor { shape, .. }) => shape.iter().copied().collect(),
      _ => {
        return Err(DetectorError::WeightLoad(format!(
          "模型没有张量输入: {}",
          path.display()
        )));
      }
    };
    check_input_dims(&input_dims, config.channels, config.width, config.height)?;
    debug!("模型输入维度: {:?}", input_dims);

    info!(
      "ONNX Runtime 会话已创建: {} (线程数 {})",
      path.display(),
      intra_threads
    );

    Ok(Self {
      session,
      classes: config.classes,
      channels: config.channels,
      input_dims,
    })
  }
}

impl Network for OrtNetwork {
  fn forward(&mut self, input: &PlanarFrame) -> Result<Array2<f32>, DetectorError> {
    let view = ArrayView4::from_shape(input.shape(), input.as_nchw())
      .map_err(|e| DetectorError::ShapeMismatch(e.to_string()))?;

    let outputs = self
      .session
      .run(ort::inputs![TensorRef::from_array_view(view).map_err(backend_err)?])
      .map_err(backend_err)?;

    let output = outputs[0].try_extract_array::<f32>().map_err(backend_err)?;
    let (rows, cols) = match output.shape() {
      [rows, cols] => (*rows, *cols),
      [1, rows, cols] => (*rows, *cols),
      other => {
        return Err(DetectorError::ShapeMismatch(format!(
          "不支持的输出形状: {:?}",
          other
        )));
      }
    };
    debug!("网络输出 {} 行 x {} 列 ({} 类)", rows, cols, self.classes);

    Array2::from_shape_vec((rows, cols), output.iter().copied().collect())
      .map_err(|e| DetectorError::ShapeMismatch(e.to_string()))
  }

  /// 只有空间维度为动态的模型才能改变输入尺寸
  fn resize(&mut self, width: u32, height: u32) -> Result<(), DetectorError> {
    check_input_dims(&self.input_dims, self.channels, width, height)
  }
}
