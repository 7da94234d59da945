// 该文件是 Linghe （凌河） 项目的一部分。
// src/bin/detect.rs - 单张图像检测
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use linghe::{
  FromUrl,
  input::InputWrapper,
  model::{DetectorBuilder, Labels},
  output::SaveImageFileOutput,
  task::{DEFAULT_NMS_THRESHOLD, DEFAULT_OBJECT_THRESHOLD, OneShotTask, Task, Thresholds},
};

/// 检测单张图像并保存标注结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 darknet:///models/yolov4.cfg?weights=/models/yolov4.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///data/dog.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 image:///data/dog_out.jpg
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 标签字体文件 (TTF/OTF)，未提供时只绘制边框
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 类别名称文件，每行一个
  #[arg(long, value_name = "FILE")]
  pub classes: Option<PathBuf>,
  /// 目标置信度阈值
  #[arg(long, default_value_t = DEFAULT_OBJECT_THRESHOLD, value_name = "THRESHOLD")]
  pub threshold: f32,
  /// NMS 阈值，不大于 0 时跳过抑制
  #[arg(long, default_value_t = DEFAULT_NMS_THRESHOLD, value_name = "THRESHOLD")]
  pub nms: f32,
}

fn main() -> Result<()> {
  linghe::logging::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let model = DetectorBuilder::from_url(&args.model)?.build()?;
  let labels = Labels::load_or_numeric(args.classes.as_ref(), model.classes())?;

  let mut output = SaveImageFileOutput::from_url(&args.output)?
    .with_labels(labels)
    .with_threshold(args.threshold);
  if let Some(font) = &args.font {
    output = output.with_font_file(font)?;
  }

  let thresholds = Thresholds {
    object: args.threshold,
    nms: args.nms,
  };
  OneShotTask::new(thresholds).run_task(input, model, output)
}
