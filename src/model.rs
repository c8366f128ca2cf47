// 该文件是 Huoyan （火眼） 项目的一部分。
// src/model.rs - 检测流水线
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

use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::batch::Batch;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: usize,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，相对帧尺寸归一化
}

/// 单个批元素的检测结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("未知的网络类型: {0}")]
  UnknownNetwork(String),
  #[error("{network} 需要 {expected} 个锚框先验值, 实际为 {actual}")]
  AnchorCount {
    network: NetworkType,
    expected: usize,
    actual: usize,
  },
  #[error("模型加载错误: {0}")]
  ModelLoad(String),
  #[error("未启用任何推理后端")]
  BackendUnavailable,
  #[error("运行器尚未初始化")]
  NotInitialized,
  #[error("没有注册输入图像")]
  NoImages,
  #[error("输入帧尺寸无效: {width}x{height}")]
  InvalidFrame { width: usize, height: usize },
  #[error("推理错误: {0}")]
  Inference(String),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
  #[error("检测结果数量 {actual} 与批大小 {expected} 不一致")]
  ResultCountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
  Yolov2,
  Yolov3,
  Yolov3Tiny,
}

impl NetworkType {
  pub fn as_str(&self) -> &'static str {
    match self {
      NetworkType::Yolov2 => "yolov2",
      NetworkType::Yolov3 => "yolov3",
      NetworkType::Yolov3Tiny => "yolov3-tiny",
    }
  }
}

impl std::fmt::Display for NetworkType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for NetworkType {
  type Err = PipelineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "yolov2" => Ok(NetworkType::Yolov2),
      "yolov3" => Ok(NetworkType::Yolov3),
      "yolov3-tiny" => Ok(NetworkType::Yolov3Tiny),
      other => Err(PipelineError::UnknownNetwork(other.to_string())),
    }
  }
}

/// 检测流水线的能力集合：注册、运行、取结果、初始化、输出性能统计
pub trait Pipeline {
  fn init(&mut self, model_path: &Path) -> Result<(), PipelineError>;
  /// 将批次交给预处理器
  fn register_images(&mut self, batch: Batch);
  /// 预处理 + 推理 + 后处理，一次完整的同步调用
  fn run(&mut self) -> Result<(), PipelineError>;
  /// 按批次顺序返回每个元素的检测结果
  fn detections(&mut self) -> Vec<DetectResult>;
  fn print_profiling(&self);
}

impl<P: Pipeline + ?Sized> Pipeline for Box<P> {
  fn init(&mut self, model_path: &Path) -> Result<(), PipelineError> {
    (**self).init(model_path)
  }

  fn register_images(&mut self, batch: Batch) {
    (**self).register_images(batch)
  }

  fn run(&mut self) -> Result<(), PipelineError> {
    (**self).run()
  }

  fn detections(&mut self) -> Vec<DetectResult> {
    (**self).detections()
  }

  fn print_profiling(&self) {
    (**self).print_profiling()
  }
}

pub trait PipelineFactory {
  fn create(&self, network: &str, settings: &Settings)
  -> Result<Box<dyn Pipeline>, PipelineError>;
}

mod factory;
mod letterbox;
mod runner;
#[cfg(feature = "tract_backend")]
mod tract_backend;
mod yolo;

pub use self::factory::{YoloPipeline, YoloPipelineFactory, default_backend};
pub use self::letterbox::{InputTensor, LetterBox, LetterBoxPreProcessor};
pub use self::runner::{InferenceBackend, ModelRunner, OutputTensor, Profiler, UnavailableBackend};
#[cfg(feature = "tract_backend")]
pub use self::tract_backend::TractBackend;
pub use self::yolo::{OutputSpec, YoloKind, YoloPostProcessor, iou, nms};
