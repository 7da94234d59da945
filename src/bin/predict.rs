// 该文件是 Linghe （凌河） 项目的一部分。
// src/bin/predict.rs - 批量预测并导出
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

use linghe::{
  input::ImageSet,
  model::{DetectorBuilder, Labels},
  output::{ExportFormat, Exporter},
  predict::DEFAULT_MAX_DETS,
  task::{BatchPredictTask, DEFAULT_NMS_THRESHOLD, Task, Thresholds},
};

const DEFAULT_PREDICT_THRESHOLD: f32 = 0.001;

/// 批量预测图像目录，导出为 COCO 或 CVAT 格式
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 网络配置文件 (.cfg)
  #[arg(long, visible_alias = "cfg", value_name = "FILE")]
  pub config_file: PathBuf,
  /// 网络权重文件 (.onnx)
  #[arg(long, visible_alias = "net", value_name = "FILE")]
  pub network_file: PathBuf,
  /// 图像目录
  #[arg(long, visible_alias = "img-fld", value_name = "DIR")]
  pub images_folder: PathBuf,
  /// 输出文件
  #[arg(long, visible_alias = "out", value_name = "FILE")]
  pub out_file: PathBuf,
  /// 输出格式
  #[arg(long, visible_alias = "to", value_enum, default_value_t = ExportFormat::Coco)]
  pub predict_to: ExportFormat,
  /// 仅输出检测结果 (COCO)
  #[arg(long, visible_alias = "dets-only")]
  pub detections_only: bool,
  /// 图像列表，`.txt` 每行一个文件名或 COCO `.json`
  #[arg(long, visible_alias = "img", value_name = "FILE")]
  pub images_file: Option<PathBuf>,
  /// 类别名称文件
  #[arg(long, visible_alias = "cls", value_name = "FILE")]
  pub classes_file: Option<PathBuf>,
  /// 分数阈值
  #[arg(long, visible_alias = "thr", default_value_t = DEFAULT_PREDICT_THRESHOLD)]
  pub threshold: f32,
  /// 每张图像的最大检测数
  #[arg(long, default_value_t = DEFAULT_MAX_DETS)]
  pub max_dets: usize,
  /// NMS 阈值，不大于 0 时跳过抑制
  #[arg(long, default_value_t = DEFAULT_NMS_THRESHOLD)]
  pub nms: f32,
  /// 网络输入尺寸 W H
  #[arg(long, visible_alias = "is", num_args = 2, value_names = ["W", "H"])]
  pub input_shape: Option<Vec<u32>>,
  /// 推理线程数
  #[arg(long, default_value_t = 4)]
  pub threads: usize,
  /// 不显示进度条
  #[arg(long)]
  pub quiet: bool,
}

fn main() -> Result<()> {
  linghe::logging::init();

  let args = Args::parse();

  info!("配置文件: {}", args.config_file.display());
  info!("权重文件: {}", args.network_file.display());
  info!("图像目录: {}", args.images_folder.display());

  let images = ImageSet::discover(&args.images_folder, args.images_file.as_deref())?;
  let mut model = DetectorBuilder::new(&args.config_file, &args.network_file)
    .intra_threads(args.threads)
    .build()?;
  if let Some([width, height]) = args.input_shape.as_deref() {
    model.resize_input(*width, *height)?;
  }
  let (width, height) = model.input_shape();
  info!("网络输入尺寸: {}x{}", width, height);

  let labels = Labels::load_or_numeric(args.classes_file.as_ref(), model.classes())?;
  let exporter = Exporter::new(args.predict_to, images.len(), &labels, args.detections_only);

  let thresholds = Thresholds {
    object: args.threshold,
    nms: args.nms,
  };
  BatchPredictTask::new(thresholds, &args.out_file)
    .with_max_dets(args.max_dets)
    .with_progress(!args.quiet)
    .run_task(images, model, exporter)
}
