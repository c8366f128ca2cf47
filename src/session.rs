// 该文件是 Huoyan （火眼） 项目的一部分。
// src/session.rs - 会话循环
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

//! 采集 → 组批 → 推理 → 渲染 → 交互，单线程逐帧执行。

use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::batch::{BatchPolicy, Replicate};
use crate::frame::RgbNhwcFrame;
use crate::input::InputError;
use crate::interaction::{Clock, InteractionController, SessionCommand, SystemClock};
use crate::invoker::PipelineInvoker;
use crate::model::{Pipeline, PipelineError, PipelineFactory};
use crate::output::{Draw, KeyInput, OutputError, Surface};
use crate::settings::{Settings, SettingsError};

/// 启动阶段的错误，每个阶段单独区分
#[derive(Error, Debug)]
pub enum StartupError {
  #[error("设置无效: {0}")]
  Settings(#[from] SettingsError),
  #[error("创建检测流水线失败: {0}")]
  Factory(#[source] PipelineError),
  #[error("模型初始化失败: {0}")]
  Init(#[source] PipelineError),
  #[error("打开输入源失败: {0}")]
  Source(#[from] InputError),
  #[error("创建渲染输出失败: {0}")]
  Surface(#[from] OutputError),
  #[error("初始化按键输入失败: {0}")]
  Keys(#[source] OutputError),
}

/// 运行阶段的致命错误
#[derive(Error, Debug)]
pub enum SessionError {
  #[error("流水线错误: {0}")]
  Pipeline(#[from] PipelineError),
  #[error("渲染错误: {0}")]
  Render(#[from] OutputError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
  /// 用户按下 `q`
  Quit,
  SourceExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
  /// 完成的 采集/推理/渲染 轮数
  pub frames: usize,
  pub end: SessionEnd,
}

pub struct SessionBuilder {
  settings: Settings,
  network: String,
  model_path: PathBuf,
  snapshot_dir: PathBuf,
  clock: Box<dyn Clock>,
  batch_policy: Box<dyn BatchPolicy>,
}

impl SessionBuilder {
  pub fn new(settings: Settings, network: impl Into<String>, model_path: impl Into<PathBuf>) -> Self {
    Self {
      settings,
      network: network.into(),
      model_path: model_path.into(),
      snapshot_dir: PathBuf::from("."),
      clock: Box::new(SystemClock),
      batch_policy: Box::new(Replicate),
    }
  }

  pub fn snapshot_dir(mut self, directory: impl Into<PathBuf>) -> Self {
    self.snapshot_dir = directory.into();
    self
  }

  /// 快照文件名使用的时钟
  pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Box::new(clock);
    self
  }

  pub fn batch_policy(mut self, policy: impl BatchPolicy + 'static) -> Self {
    self.batch_policy = Box::new(policy);
    self
  }

  /// 依次校验设置、创建流水线、初始化模型、打开输入源和渲染输出；
  /// 任一步失败都不会进入循环
  pub fn start<F, S, O, K>(
    self,
    factory: &F,
    open_source: impl FnOnce() -> Result<S, InputError>,
    open_surface: impl FnOnce() -> Result<O, OutputError>,
    keys: K,
  ) -> Result<Session<S, O, K>, StartupError>
  where
    F: PipelineFactory + ?Sized,
    S: Iterator<Item = RgbNhwcFrame>,
    O: Surface,
    K: KeyInput,
  {
    let settings = self.settings;
    settings.validate()?;
    info!("网络类型: {}", self.network);
    info!("模型文件: {}", self.model_path.display());
    info!(
      "类别数: {} 检测阈值: {} NMS 阈值: {} 批大小: {} 输入尺寸: {}x{}",
      settings.num_classes(),
      settings.threshold,
      settings.nms_threshold,
      settings.batch_size,
      settings.input_width,
      settings.input_height
    );

    let mut pipeline = factory.create(&self.network, &settings).map_err(|e| {
      error!("创建 {} 流水线失败: {}", self.network, e);
      StartupError::Factory(e)
    })?;
    pipeline.init(&self.model_path).map_err(|e| {
      error!("模型 {} 初始化失败: {}", self.model_path.display(), e);
      StartupError::Init(e)
    })?;

    let source = open_source().inspect_err(|e| error!("打开输入源失败: {}", e))?;
    let draw = Draw::new(settings.class_names.clone())?;
    let surface = open_surface().inspect_err(|e| error!("创建渲染输出失败: {}", e))?;
    info!("会话启动完成");

    Ok(Session {
      invoker: PipelineInvoker::new(pipeline),
      interaction: InteractionController::with_clock(self.snapshot_dir, self.clock),
      batch_policy: self.batch_policy,
      settings,
      source,
      surface,
      keys,
      draw,
    })
  }
}

pub struct Session<S, O, K> {
  settings: Settings,
  invoker: PipelineInvoker<Box<dyn Pipeline>>,
  batch_policy: Box<dyn BatchPolicy>,
  source: S,
  surface: O,
  keys: K,
  draw: Draw,
  interaction: InteractionController<Box<dyn Clock>>,
}

impl<S, O, K> Session<S, O, K>
where
  S: Iterator<Item = RgbNhwcFrame>,
  O: Surface,
  K: KeyInput,
{
  /// 运行直到退出命令、输入源结束或致命错误；收尾工作在所有情况下执行一次
  pub fn run(mut self) -> Result<SessionSummary, SessionError> {
    info!("开始会话循环...");
    let outcome = self.run_loop();
    self.teardown();

    match &outcome {
      Ok(summary) => info!("会话结束: {:?}, 共处理 {} 帧", summary.end, summary.frames),
      Err(e) => error!("会话异常终止: {}", e),
    }
    outcome
  }

  fn run_loop(&mut self) -> Result<SessionSummary, SessionError> {
    let mut frames = 0usize;

    let end = loop {
      let Some(frame) = self.source.next() else {
        info!("输入源已结束");
        break SessionEnd::SourceExhausted;
      };
      let started = Instant::now();

      let batch = self.batch_policy.build(&frame, self.settings.batch_size);
      let result = self.invoker.invoke(batch)?;
      let inferred = started.elapsed();

      let mut canvas = frame.to_rgb_image();
      self.draw.draw_detections(&mut canvas, &result);
      self.surface.show(&canvas, &result)?;
      frames += 1;
      debug!(
        "第 {} 帧: {} 个物体, 推理 {:.2?} / 总计 {:.2?}",
        frames,
        result.len(),
        inferred,
        started.elapsed()
      );

      let key = self.keys.poll();
      if self.interaction.handle(key, &frame) == SessionCommand::Quit {
        warn!("收到退出命令，退出会话循环");
        break SessionEnd::Quit;
      }
    };

    Ok(SessionSummary { frames, end })
  }

  fn teardown(&mut self) {
    info!("关闭渲染输出");
    self.surface.close();
    if self.settings.enable_profiling {
      self.invoker.print_profiling();
    }
  }
}
