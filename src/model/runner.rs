// 该文件是 Huoyan （火眼） 项目的一部分。
// src/model/runner.rs - 模型运行器
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
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::model::{InputTensor, LetterBoxPreProcessor, PipelineError, YoloPostProcessor};

/// 预热次数，统计时跳过
const WARMUP_RUNS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
  pub shape: Vec<usize>,
  pub data: Vec<f32>,
}

/// 推理后端，负责加载模型并执行前向计算
pub trait InferenceBackend {
  fn name(&self) -> &'static str;
  fn load(&mut self, model_path: &Path, input_shape: [usize; 4]) -> Result<(), PipelineError>;
  fn infer(&mut self, input: &InputTensor) -> Result<Vec<OutputTensor>, PipelineError>;
}

/// 未编译任何后端时使用
#[derive(Debug, Default)]
pub struct UnavailableBackend;

impl InferenceBackend for UnavailableBackend {
  fn name(&self) -> &'static str {
    "unavailable"
  }

  fn load(&mut self, _model_path: &Path, _input_shape: [usize; 4]) -> Result<(), PipelineError> {
    Err(PipelineError::BackendUnavailable)
  }

  fn infer(&mut self, _input: &InputTensor) -> Result<Vec<OutputTensor>, PipelineError> {
    Err(PipelineError::BackendUnavailable)
  }
}

/// 单个阶段的累计统计
#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
  count: usize,
  total: Duration,
  min: Duration,
  max: Duration,
}

impl Accumulator {
  fn push(&mut self, sample: Duration) {
    if self.count == 0 {
      self.min = sample;
      self.max = sample;
    } else {
      self.min = self.min.min(sample);
      self.max = self.max.max(sample);
    }
    self.count += 1;
    self.total += sample;
  }

  fn summary(&self) -> Option<(usize, Duration, Duration, Duration)> {
    if self.count == 0 {
      return None;
    }
    let mean = self.total / self.count as u32;
    Some((self.count, mean, self.min, self.max))
  }
}

/// 前 WARMUP_RUNS 个样本单独累计，运行次数足够时不计入统计
#[derive(Debug, Default, Clone, Copy)]
struct StageTimes {
  warmup: Accumulator,
  steady: Accumulator,
}

impl StageTimes {
  fn push(&mut self, sample: Duration) {
    if self.warmup.count < WARMUP_RUNS {
      self.warmup.push(sample);
    } else {
      self.steady.push(sample);
    }
  }

  fn count(&self) -> usize {
    self.warmup.count + self.steady.count
  }

  fn summary(&self) -> Option<(usize, Duration, Duration, Duration)> {
    self.steady.summary().or_else(|| self.warmup.summary())
  }
}

/// 各阶段耗时统计
#[derive(Debug, Default, Clone)]
pub struct Profiler {
  pre: StageTimes,
  infer: StageTimes,
  post: StageTimes,
}

impl Profiler {
  pub fn runs(&self) -> usize {
    self.infer.count()
  }

  fn record(&mut self, pre: Duration, infer: Duration, post: Duration) {
    self.pre.push(pre);
    self.infer.push(infer);
    self.post.push(post);
  }

  pub fn print(&self) {
    if self.runs() == 0 {
      warn!("没有可用的性能统计数据");
      return;
    }
    info!("性能统计（共 {} 次运行）:", self.runs());
    for (name, stage) in [
      ("预处理", &self.pre),
      ("推理", &self.infer),
      ("后处理", &self.post),
    ] {
      if let Some((count, mean, min, max)) = stage.summary() {
        info!(
          "  {}: 样本 {} 平均 {:.2?} 最小 {:.2?} 最大 {:.2?}",
          name, count, mean, min, max
        );
      }
    }
  }
}

pub struct ModelRunner {
  backend: Box<dyn InferenceBackend>,
  batch_size: usize,
  initialized: bool,
  profiler: Option<Profiler>,
}

impl ModelRunner {
  pub fn new(backend: Box<dyn InferenceBackend>, batch_size: usize, enable_profiling: bool) -> Self {
    Self {
      backend,
      batch_size,
      initialized: false,
      profiler: enable_profiling.then(Profiler::default),
    }
  }

  pub fn profiler(&self) -> Option<&Profiler> {
    self.profiler.as_ref()
  }

  pub fn init(
    &mut self,
    model_path: &Path,
    pre: &LetterBoxPreProcessor,
  ) -> Result<(), PipelineError> {
    let (width, height) = pre.input_size();
    let shape = [self.batch_size, 3, height as usize, width as usize];
    info!(
      "使用 {} 后端加载模型: {} 输入形状 {:?}",
      self.backend.name(),
      model_path.display(),
      shape
    );
    self.backend.load(model_path, shape)?;
    self.initialized = true;
    Ok(())
  }

  /// 运行一次完整的 预处理 → 推理 → 后处理
  pub fn run(
    &mut self,
    pre: &mut LetterBoxPreProcessor,
    post: &mut YoloPostProcessor,
  ) -> Result<(), PipelineError> {
    if !self.initialized {
      return Err(PipelineError::NotInitialized);
    }

    let start = Instant::now();
    let input = pre.process()?;
    let pre_elapsed = start.elapsed();

    let start = Instant::now();
    let outputs = self.backend.infer(&input)?;
    let infer_elapsed = start.elapsed();

    let start = Instant::now();
    post.process(&outputs, pre.letterboxes())?;
    let post_elapsed = start.elapsed();

    debug!(
      "运行完成: 预处理 {:.2?} 推理 {:.2?} 后处理 {:.2?}",
      pre_elapsed, infer_elapsed, post_elapsed
    );
    if let Some(profiler) = self.profiler.as_mut() {
      profiler.record(pre_elapsed, infer_elapsed, post_elapsed);
    }
    Ok(())
  }

  pub fn print_profiling(&self) {
    if let Some(profiler) = &self.profiler {
      profiler.print();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn stage_of(millis: &[u64]) -> StageTimes {
    let mut stage = StageTimes::default();
    for &ms in millis {
      stage.push(Duration::from_millis(ms));
    }
    stage
  }

  #[test]
  fn summary_skips_warmup_runs() {
    let stage = stage_of(&[100, 90, 10, 20, 30]);
    let (count, mean, min, max) = stage.summary().unwrap();
    assert_eq!(count, 3);
    assert_eq!(mean, Duration::from_millis(20));
    assert_eq!(min, Duration::from_millis(10));
    assert_eq!(max, Duration::from_millis(30));
  }

  #[test]
  fn summary_keeps_short_series() {
    let stage = stage_of(&[5]);
    assert_eq!(stage.summary().map(|s| s.0), Some(1));
    let stage = stage_of(&[8, 4]);
    assert_eq!(
      stage.summary(),
      Some((2, Duration::from_millis(6), Duration::from_millis(4), Duration::from_millis(8)))
    );
    assert!(StageTimes::default().summary().is_none());
  }

  #[test]
  fn running_stats_cover_every_steady_run() {
    let mut profiler = Profiler::default();
    for i in 0..10_000u64 {
      let d = Duration::from_micros(i % 7 + 1);
      profiler.record(d, d, d);
    }
    assert_eq!(profiler.runs(), 10_000);
    let (count, _, min, max) = profiler.infer.summary().unwrap();
    assert_eq!(count, 10_000 - WARMUP_RUNS);
    assert_eq!(min, Duration::from_micros(1));
    assert_eq!(max, Duration::from_micros(7));
  }

  #[test]
  fn run_before_init_is_rejected() {
    let mut runner = ModelRunner::new(Box::new(UnavailableBackend), 1, false);
    let mut pre = LetterBoxPreProcessor::new(8, 8);
    let mut post = YoloPostProcessor::new(crate::model::YoloKind::V3, Vec::new(), 0.5, 0.45, 8, 8);
    assert!(matches!(
      runner.run(&mut pre, &mut post),
      Err(PipelineError::NotInitialized)
    ));
  }

  #[test]
  fn unavailable_backend_fails_init() {
    let mut runner = ModelRunner::new(Box::new(UnavailableBackend), 1, true);
    let pre = LetterBoxPreProcessor::new(8, 8);
    assert!(matches!(
      runner.init(Path::new("model.onnx"), &pre),
      Err(PipelineError::BackendUnavailable)
    ));
    assert_eq!(runner.profiler().map(Profiler::runs), Some(0));
  }
}
