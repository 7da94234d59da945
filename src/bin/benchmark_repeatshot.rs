// 该文件是 Linghe （凌河） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复检测测速
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use linghe::{
  FromUrl,
  input::InputWrapper,
  model::DetectorBuilder,
  output::SaveImageFileOutput,
  task::{
    DEFAULT_NMS_THRESHOLD, DEFAULT_OBJECT_THRESHOLD, DEFAULT_REPEAT_TIMES, RepeatShotTask, Task,
    Thresholds,
  },
};

/// 对同一张图像重复检测并统计平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 darknet:///models/yolov4.cfg
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///data/dog.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 最后一次检测结果的保存路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 重复次数
  #[arg(long, default_value_t = DEFAULT_REPEAT_TIMES, value_name = "COUNT")]
  pub times: usize,
  /// 目标置信度阈值
  #[arg(long, default_value_t = DEFAULT_OBJECT_THRESHOLD, value_name = "THRESHOLD")]
  pub threshold: f32,
  /// NMS 阈值
  #[arg(long, default_value_t = DEFAULT_NMS_THRESHOLD, value_name = "THRESHOLD")]
  pub nms: f32,
}

fn main() -> Result<()> {
  linghe::logging::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);

  let input = InputWrapper::from_url(&args.input)?;
  let model = DetectorBuilder::from_url(&args.model)?.build()?;
  let output = args
    .output
    .as_ref()
    .map(SaveImageFileOutput::from_url)
    .transpose()?;

  let thresholds = Thresholds {
    object: args.threshold,
    nms: args.nms,
  };
  RepeatShotTask::new(thresholds, args.times).run_task(input, model, output)
}
