// 该文件是 Linghe （凌河） 项目的一部分。
// src/task.rs - 任务定义
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

use std::{path::PathBuf, sync::Arc, time::Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::{
  input::{ImageSet, InputFrame},
  model::{AverageLatency, DetectionSet, Detector, Network},
  output::{Exporter, ImageRecord, PredictionSink, Render},
  predict::{DEFAULT_MAX_DETS, flatten},
};

pub const DEFAULT_OBJECT_THRESHOLD: f32 = 0.3;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;
pub const DEFAULT_REPEAT_TIMES: usize = 1000;

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 检测阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
  pub object: f32,
  pub nms: f32,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      object: DEFAULT_OBJECT_THRESHOLD,
      nms: DEFAULT_NMS_THRESHOLD,
    }
  }
}

fn first_frame<I, E>(input: &mut I) -> anyhow::Result<InputFrame>
where
  I: Iterator<Item = Result<InputFrame, E>>,
  E: std::error::Error + Send + Sync + 'static,
{
  let frame = input
    .next()
    .ok_or_else(|| anyhow::anyhow!("没有输入图像"))??;
  info!(
    "输入图像 {} 获取成功: {}x{}",
    frame.name,
    frame.image.width(),
    frame.image.height()
  );
  Ok(frame)
}

/// 检测单张图像并输出
#[derive(Debug, Default)]
pub struct OneShotTask {
  thresholds: Thresholds,
}

impl OneShotTask {
  pub fn new(thresholds: Thresholds) -> Self {
    Self { thresholds }
  }
}

impl<N, I, E, O> Task<I, Detector<N>, O> for OneShotTask
where
  N: Network,
  I: Iterator<Item = Result<InputFrame, E>>,
  E: std::error::Error + Send + Sync + 'static,
  O: Render<InputFrame, DetectionSet>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: Detector<N>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = first_frame(&mut input)?;

    let now = Instant::now();
    let result = model.detect(&frame.image, self.thresholds.object, self.thresholds.nms)?;
    info!(
      "检测完成，共 {} 个目标，耗时: {:.2?}",
      result.len(),
      now.elapsed()
    );
    for det in &result {
      if let Some((class_id, score)) = det.best_class() {
        info!(
          "  类别 {} 分数 {:.3} 位置 ({:.3}, {:.3}, {:.3}, {:.3})",
          class_id, score, det.bbox.x, det.bbox.y, det.bbox.w, det.bbox.h
        );
      }
    }

    output.render_result(&frame, &result)?;
    model.free();
    Ok(())
  }
}

/// 重复检测同一张图像，统计平均耗时
#[derive(Debug)]
pub struct RepeatShotTask {
  thresholds: Thresholds,
  times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      thresholds: Thresholds::default(),
      times: DEFAULT_REPEAT_TIMES,
    }
  }
}

impl RepeatShotTask {
  pub fn new(thresholds: Thresholds, times: usize) -> Self {
    Self {
      thresholds,
      times: times.max(1),
    }
  }
}

impl<N, I, E, O> Task<I, Detector<N>, O> for RepeatShotTask
where
  N: Network,
  I: Iterator<Item = Result<InputFrame, E>>,
  E: std::error::Error + Send + Sync + 'static,
  O: Render<InputFrame, DetectionSet>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: Detector<N>, output: O) -> Result<(), Self::Error> {
    info!("开始任务，重复 {} 次...", self.times);
    let frame = first_frame(&mut input)?;

    let latency = Arc::new(AverageLatency::new());
    model.set_observer(Some(Box::new(latency.clone())));

    let mut result = DetectionSet::default();
    for i in 0..self.times {
      result = model.detect(&frame.image, self.thresholds.object, self.thresholds.nms)?;
      info!("({}) 检测完成，共 {} 个目标", i, result.len());
    }

    match latency.average() {
      Some(average) => warn!("平均检测时间: {:.2?} ({} 次)", average, latency.count()),
      None => warn!("没有完成任何检测"),
    }

    output.render_result(&frame, &result)?;
    model.free();
    Ok(())
  }
}

/// 批量预测图像集合并导出
#[derive(Debug)]
pub struct BatchPredictTask {
  thresholds: Thresholds,
  max_dets: usize,
  out_file: PathBuf,
  progress: bool,
}

impl BatchPredictTask {
  pub fn new(thresholds: Thresholds, out_file: impl Into<PathBuf>) -> Self {
    Self {
      thresholds,
      max_dets: DEFAULT_MAX_DETS,
      out_file: out_file.into(),
      progress: true,
    }
  }

  pub fn with_max_dets(mut self, max_dets: usize) -> Self {
    self.max_dets = max_dets;
    self
  }

  pub fn with_progress(mut self, progress: bool) -> Self {
    self.progress = progress;
    self
  }

  fn progress_bar(&self, len: usize) -> anyhow::Result<ProgressBar> {
    if !self.progress {
      return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
      ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")?
        .progress_chars("=>-"),
    );
    Ok(bar)
  }
}

impl<N: Network> Task<ImageSet, Detector<N>, Exporter> for BatchPredictTask {
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: ImageSet,
    mut model: Detector<N>,
    mut output: Exporter,
  ) -> Result<(), Self::Error> {
    info!("开始批量预测，共 {} 张图像...", input.len());
    let bar = self.progress_bar(input.len())?;
    let started = Instant::now();

    for frame in input.into_frames() {
      let frame = frame?;
      bar.set_message(frame.name.clone());
      let (width, height) = (frame.image.width(), frame.image.height());

      let dets = model.detect(&frame.image, self.thresholds.object, self.thresholds.nms)?;
      let predictions = flatten(&dets, width, height, self.thresholds.object, self.max_dets);
      output.add_image(
        &ImageRecord {
          name: &frame.name,
          id: frame.id,
          width,
          height,
        },
        &predictions,
      );
      bar.inc(1);
    }
    bar.finish_and_clear();
    info!("预测完成，耗时 {:.2?}", started.elapsed());

    output.save(&self.out_file)?;
    model.free();
    Ok(())
  }
}
