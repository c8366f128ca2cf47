// 该文件是 Huoyan （火眼） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理同一张图像，测量吞吐
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use huoyan::{
  input::ImageFileInput,
  model::YoloPipelineFactory,
  output::{NoKeys, NullOutput},
  session::{SessionBuilder, StartupError},
  settings::{DEFAULT_INPUT_SIZE, DEFAULT_NMS_THRESHOLD, DEFAULT_THRESHOLD, Settings},
};

/// 在固定批宽度下重复推理同一张图像
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 网络类型: yolov2, yolov3, yolov3-tiny
  #[arg(long, value_name = "NETWORK")]
  pub network: String,
  /// ONNX 模型文件路径
  #[arg(long, value_name = "MODEL")]
  pub model: PathBuf,
  /// 类别名称文件
  #[arg(long, value_name = "NAMES")]
  pub names: PathBuf,
  /// 输入图像
  #[arg(long, value_name = "IMAGE")]
  pub input: PathBuf,
  /// 重复次数
  #[arg(long, default_value_t = 1000, value_name = "N")]
  pub repeat: usize,
  #[arg(long, default_value_t = NonZeroUsize::MIN, value_name = "N")]
  pub batch: NonZeroUsize,
  #[arg(long, value_name = "FILE")]
  pub anchors: Option<PathBuf>,
  #[arg(short = 't', long = "thresh", default_value_t = DEFAULT_THRESHOLD)]
  pub threshold: f32,
  #[arg(long = "nms-thresh", visible_alias = "nt", default_value_t = DEFAULT_NMS_THRESHOLD)]
  pub nms_threshold: f32,
  #[arg(long, default_value_t = DEFAULT_INPUT_SIZE)]
  pub input_width: u32,
  #[arg(long, default_value_t = DEFAULT_INPUT_SIZE)]
  pub input_height: u32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model.display());
  info!("输入图像: {} x {}", args.input.display(), args.repeat);

  let mut settings =
    Settings::load(&args.names, args.anchors.as_deref()).map_err(StartupError::from)?;
  settings.threshold = args.threshold;
  settings.nms_threshold = args.nms_threshold;
  settings.batch_size = args.batch;
  settings.input_width = args.input_width;
  settings.input_height = args.input_height;
  settings.enable_profiling = true;

  let session = SessionBuilder::new(settings, &args.network, &args.model).start(
    &YoloPipelineFactory::default(),
    || Ok(ImageFileInput::open(&args.input, args.repeat)?),
    || Ok(NullOutput::default()),
    NoKeys,
  )?;

  let summary = session.run()?;
  warn!("基准测试完成: {} 帧 (批大小 {})", summary.frames, args.batch);

  Ok(())
}
