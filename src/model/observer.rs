// 该文件是 Linghe （凌河） 项目的一部分。
// src/model/observer.rs - 检测过程观测
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
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

/// 单次检测的耗时与数量统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectReport {
  /// letterbox 缩放耗时
  pub preprocess: Duration,
  /// 前向推理耗时
  pub inference: Duration,
  /// 候选框收集与抑制耗时
  pub postprocess: Duration,
  /// 抑制前的候选框数量
  pub raw_candidates: usize,
  /// 返回给调用方的检测数量
  pub detections: usize,
}

impl DetectReport {
  pub fn total(&self) -> Duration {
    self.preprocess + self.inference + self.postprocess
  }
}

/// 检测完成后的回调，由调用方注入
pub trait DetectObserver {
  fn on_detect(&self, report: &DetectReport);
}

impl<O: DetectObserver + ?Sized> DetectObserver for Arc<O> {
  fn on_detect(&self, report: &DetectReport) {
    (**self).on_detect(report)
  }
}

/// 累计平均耗时
#[derive(Debug, Default)]
pub struct AverageLatency {
  total_nanos: AtomicU64,
  count: AtomicU64,
}

impl AverageLatency {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn count(&self) -> u64 {
    self.count.load(Ordering::Relaxed)
  }

  pub fn average(&self) -> Option<Duration> {
    let count = self.count();
    if count == 0 {
      return None;
    }
    Some(Duration::from_nanos(
      self.total_nanos.load(Ordering::Relaxed) / count,
    ))
  }
}

impl DetectObserver for AverageLatency {
  fn on_detect(&self, report: &DetectReport) {
    let nanos = u64::try_from(report.total().as_nanos()).unwrap_or(u64::MAX);
    self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
    self.count.fetch_add(1, Ordering::Relaxed);
  }
}
