// 该文件是 Huoyan （火眼） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

use huoyan::settings::{
  DEFAULT_INPUT_SIZE, DEFAULT_NMS_THRESHOLD, DEFAULT_THRESHOLD, Settings, SettingsError,
};

/// Huoyan 摄像头实时目标检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 网络类型: yolov2, yolov3, yolov3-tiny
  #[arg(value_name = "NETWORK")]
  pub network: String,

  /// ONNX 模型文件路径
  #[arg(value_name = "MODEL")]
  pub model: PathBuf,

  /// 类别名称文件，每行一个
  #[arg(value_name = "NAMES")]
  pub names: PathBuf,

  /// 摄像头索引，对应 /dev/video<N>
  #[arg(value_name = "CAMERA")]
  pub camera: usize,

  /// 会话结束时输出各阶段耗时统计
  #[arg(long)]
  pub profile: bool,

  /// 检测阈值
  #[arg(short = 't', long = "thresh", default_value_t = DEFAULT_THRESHOLD, value_name = "THRESHOLD")]
  pub threshold: f32,

  /// NMS 阈值
  #[arg(long = "nms-thresh", visible_alias = "nt", default_value_t = DEFAULT_NMS_THRESHOLD, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 批大小，同一帧复制到整个批次
  #[arg(long, default_value_t = NonZeroUsize::MIN, value_name = "N")]
  pub batch: NonZeroUsize,

  /// 锚框先验文件，每行一个数值
  #[arg(long, value_name = "FILE")]
  pub anchors: Option<PathBuf>,

  /// 输入来源 URI，指定时代替摄像头索引（v4l:///dev/video0, image:///a.png?repeat=10）
  #[arg(long, value_name = "SOURCE")]
  pub source: Option<Url>,

  /// 渲染输出 URI（image:///result.png, folder:///records?always, null:）
  #[arg(long, default_value = "image:result.png", value_name = "OUTPUT")]
  pub display: Url,

  /// 按 s 保存快照的目录
  #[arg(long, default_value = ".", value_name = "DIR")]
  pub snapshot_dir: PathBuf,

  /// 网络输入宽度
  #[arg(long, default_value_t = DEFAULT_INPUT_SIZE, value_name = "PIXELS")]
  pub input_width: u32,

  /// 网络输入高度
  #[arg(long, default_value_t = DEFAULT_INPUT_SIZE, value_name = "PIXELS")]
  pub input_height: u32,
}

impl Args {
  pub fn settings(&self) -> Result<Settings, SettingsError> {
    let mut settings = Settings::load(&self.names, self.anchors.as_deref())?;
    settings.threshold = self.threshold;
    settings.nms_threshold = self.nms_threshold;
    settings.batch_size = self.batch;
    settings.enable_profiling = self.profile;
    settings.input_width = self.input_width;
    settings.input_height = self.input_height;
    Ok(settings)
  }
}
