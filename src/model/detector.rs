// 该文件是 Linghe （凌河） 项目的一部分。
// src/model/detector.rs - 检测器句柄
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
  collections::HashMap,
  path::{Path, PathBuf},
  time::Instant,
};

use image::DynamicImage;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::letterbox,
  model::{
    DetectObserver, DetectReport, DetectionSet, DetectorError, Network, NetworkConfig,
    NmsStrategy, detection::collect_candidates,
  },
  url_path,
};

#[cfg(feature = "ort_backend")]
use crate::model::OrtNetwork;

/// 网络输入尺寸需为该值的整数倍
const INPUT_STRIDE: u32 = 32;
const DEFAULT_INTRA_THREADS: usize = 4;

/// 模型句柄，独占推理后端资源
///
/// 句柄不可复制；`free` 或离开作用域时释放资源，且只释放一次。
pub struct Detector<N: Network> {
  network: N,
  config: NetworkConfig,
  observer: Option<Box<dyn DetectObserver>>,
}

impl<N: Network> Detector<N> {
  pub fn new(config: NetworkConfig, network: N) -> Self {
    info!(
      "检测器就绪: 输入 {}x{}x{}, {} 类, 抑制策略 {:?}",
      config.width, config.height, config.channels, config.classes, config.nms
    );
    Self {
      network,
      config,
      observer: None,
    }
  }

  pub fn with_observer(mut self, observer: impl DetectObserver + 'static) -> Self {
    self.observer = Some(Box::new(observer));
    self
  }

  pub fn set_observer(&mut self, observer: Option<Box<dyn DetectObserver>>) {
    self.observer = observer;
  }

  pub fn config(&self) -> &NetworkConfig {
    &self.config
  }

  /// 模型输入尺寸 `(width, height)`
  pub fn input_shape(&self) -> (u32, u32) {
    self.config.input_shape()
  }

  pub fn channels(&self) -> u32 {
    self.config.channels
  }

  pub fn classes(&self) -> usize {
    self.config.classes
  }

  pub fn nms_strategy(&self) -> NmsStrategy {
    self.config.nms
  }

  /// 调整网络输入尺寸，取最接近的 32 的倍数（最小 32），返回实际尺寸
  pub fn resize_input(&mut self, width: u32, height: u32) -> Result<(u32, u32), DetectorError> {
    let width = round_to_stride(width)?;
    let height = round_to_stride(height)?;
    self.network.resize(width, height)?;
    self.config.width = width;
    self.config.height = height;
    info!("网络输入尺寸调整为 {}x{}", width, height);
    Ok((width, height))
  }

  /// 检测图像中的目标
  ///
  /// `nms_threshold <= 0` 时跳过抑制，返回全部候选框。
  pub fn detect(
    &mut self,
    image: &DynamicImage,
    object_threshold: f32,
    nms_threshold: f32,
  ) -> Result<DetectionSet, DetectorError> {
    let (width, height) = self.input_shape();
    let classes = self.config.classes;

    let started = Instant::now();
    // letterbox 帧只在前向推理期间存在
    let boxed = letterbox(image, width, height, self.config.channels)?;
    let preprocessed = Instant::now();
    let output = self.network.forward(&boxed.frame)?;
    let transform = boxed.transform;
    drop(boxed);
    let inferred = Instant::now();

    let mut dets = collect_candidates(&output, classes, object_threshold, &transform)?;
    let raw_candidates = dets.len();

    if nms_threshold > 0.0 {
      self.config.nms.suppress(&mut dets, classes, nms_threshold);
      dets.retain(|d| !d.is_empty());
    }
    let finished = Instant::now();

    let report = DetectReport {
      preprocess: preprocessed - started,
      inference: inferred - preprocessed,
      postprocess: finished - inferred,
      raw_candidates,
      detections: dets.len(),
    };
    debug!(
      "检测完成: 候选 {} 个, 输出 {} 个, 耗时 {:.2?}",
      report.raw_candidates,
      report.detections,
      report.total()
    );
    if let Some(observer) = &self.observer {
      observer.on_detect(&report);
    }

    Ok(DetectionSet::from(dets))
  }

  /// 释放模型资源
  pub fn free(self) {
    drop(self);
  }
}

impl<N: Network> Drop for Detector<N> {
  fn drop(&mut self) {
    info!("释放模型资源");
  }
}

#[cfg(feature = "ort_backend")]
impl Detector<OrtNetwork> {
  /// 读取配置文件与权重文件并创建检测器
  pub fn init(
    cfg_path: impl AsRef<Path>,
    weights_path: impl AsRef<Path>,
  ) -> Result<Self, DetectorError> {
    DetectorBuilder::new(cfg_path, weights_path).build()
  }
}

/// 四舍六入五成双地取最接近的步长倍数，结果溢出时返回错误
fn round_to_stride(value: u32) -> Result<u32, DetectorError> {
  let (q, r) = (value / INPUT_STRIDE, value % INPUT_STRIDE);
  let half = INPUT_STRIDE / 2;
  let q = if r > half || (r == half && q % 2 == 1) {
    q + 1
  } else {
    q
  };
  q.checked_mul(INPUT_STRIDE)
    .map(|v| v.max(INPUT_STRIDE))
    .ok_or_else(|| DetectorError::ShapeMismatch(format!("输入尺寸 {} 过大", value)))
}

pub struct DetectorBuilder {
  cfg_path: PathBuf,
  weights_path: PathBuf,
  intra_threads: usize,
}

const DETECTOR_SCHEME: &str = "darknet";

impl FromUrlWithScheme for DetectorBuilder {
  const SCHEME: &'static str = DETECTOR_SCHEME;
}

impl FromUrl for DetectorBuilder {
  type Error = DetectorError;

  /// `darknet:///path/net.cfg?weights=/path/net.onnx&threads=4`
  ///
  /// 未给出 `weights` 时使用与配置文件同名的 `.onnx` 文件。
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "模型 URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DetectorError::ModelPath(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let cfg_path = PathBuf::from(url_path(url));
    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let weights_path = query
      .get("weights")
      .map(PathBuf::from)
      .unwrap_or_else(|| cfg_path.with_extension("onnx"));

    let intra_threads = match query.get("threads") {
      Some(v) => v
        .parse()
        .map_err(|e| DetectorError::ModelPath(format!("threads={} 无效: {}", v, e)))?,
      None => DEFAULT_INTRA_THREADS,
    };

    Ok(DetectorBuilder {
      cfg_path,
      weights_path,
      intra_threads,
    })
  }
}

impl DetectorBuilder {
  pub fn new(cfg_path: impl AsRef<Path>, weights_path: impl AsRef<Path>) -> Self {
    Self {
      cfg_path: cfg_path.as_ref().to_path_buf(),
      weights_path: weights_path.as_ref().to_path_buf(),
      intra_threads: DEFAULT_INTRA_THREADS,
    }
  }

  pub fn intra_threads(mut self, intra_threads: usize) -> Self {
    self.intra_threads = intra_threads.max(1);
    self
  }

  pub fn cfg_path(&self) -> &Path {
    &self.cfg_path
  }

  pub fn weights_path(&self) -> &Path {
    &self.weights_path
  }

  /// 解析配置后由 `load` 加载权重，创建任意后端的检测器
  pub fn build_with<N, F>(self, load: F) -> Result<Detector<N>, DetectorError>
  where
    N: Network,
    F: FnOnce(&Path, &NetworkConfig, usize) -> Result<N, DetectorError>,
  {
    info!("加载配置文件: {}", self.cfg_path.display());
    let config = NetworkConfig::from_file(&self.cfg_path)?;

    info!("加载权重文件: {}", self.weights_path.display());
    let network = load(&self.weights_path, &config, self.intra_threads)?;
    info!("模型加载完成");

    Ok(Detector::new(config, network))
  }

  #[cfg(feature = "ort_backend")]
  pub fn build(self) -> Result<Detector<OrtNetwork>, DetectorError> {
    self.build_with(OrtNetwork::load)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn input_sizes_round_to_stride() {
    assert_eq!(round_to_stride(416).unwrap(), 416);
    assert_eq!(round_to_stride(500).unwrap(), 512);
    assert_eq!(round_to_stride(15).unwrap(), 32);
    assert_eq!(round_to_stride(0).unwrap(), 32);
  }

  #[test]
  fn half_stride_rounds_to_even_multiple() {
    assert_eq!(round_to_stride(16).unwrap(), 32);
    assert_eq!(round_to_stride(48).unwrap(), 64);
    assert_eq!(round_to_stride(80).unwrap(), 64);
    assert_eq!(round_to_stride(144).unwrap(), 128);
    assert_eq!(round_to_stride(81).unwrap(), 96);
  }

  #[test]
  fn huge_sizes_are_rejected() {
    assert!(matches!(
      round_to_stride(u32::MAX - 8),
      Err(DetectorError::ShapeMismatch(_))
    ));
    assert_eq!(round_to_stride(u32::MAX - 31).unwrap(), u32::MAX - 31);
  }

  #[test]
  fn url_carries_weights_and_threads() {
    let url = Url::parse("darknet:///models/yolov4.cfg?weights=/models/yolov4.onnx&threads=2")
      .unwrap();
    let builder = DetectorBuilder::from_url(&url).unwrap();
    assert_eq!(builder.cfg_path(), Path::new("/models/yolov4.cfg"));
    assert_eq!(builder.weights_path(), Path::new("/models/yolov4.onnx"));
    assert_eq!(builder.intra_threads, 2);
  }

  #[test]
  fn weights_default_next_to_config() {
    let url = Url::parse("darknet:///models/yolov4-tiny.cfg").unwrap();
    let builder = DetectorBuilder::from_url(&url).unwrap();
    assert_eq!(builder.weights_path(), Path::new("/models/yolov4-tiny.onnx"));
    assert_eq!(builder.intra_threads, DEFAULT_INTRA_THREADS);
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("onnx:///models/a.onnx").unwrap();
    let err = DetectorBuilder::from_url(&url).err().unwrap();
    assert!(matches!(err, DetectorError::ModelPath(_)));
  }
}
