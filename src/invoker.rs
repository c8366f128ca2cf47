// 该文件是 Huoyan （火眼） 项目的一部分。
// src/invoker.rs - 流水线调用
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

use tracing::{debug, error};

use crate::batch::Batch;
use crate::model::{DetectResult, Pipeline, PipelineError};

/// 每帧驱动一次 注册 → 运行 → 取结果
pub struct PipelineInvoker<P> {
  pipeline: P,
}

impl<P: Pipeline> PipelineInvoker<P> {
  pub fn new(pipeline: P) -> Self {
    Self { pipeline }
  }

  pub fn pipeline(&self) -> &P {
    &self.pipeline
  }

  /// 返回批次第 0 个元素的检测结果，其余结果只用于吞吐测量
  pub fn invoke(&mut self, batch: Batch) -> Result<DetectResult, PipelineError> {
    let expected = batch.len();
    self.pipeline.register_images(batch);

    if let Err(e) = self.pipeline.run() {
      error!("推理失败: {}", e);
      return Err(e);
    }

    let mut results = self.pipeline.detections();
    if results.len() != expected {
      error!(
        "检测结果数量 {} 与批大小 {} 不一致",
        results.len(),
        expected
      );
      return Err(PipelineError::ResultCountMismatch {
        expected,
        actual: results.len(),
      });
    }

    results.truncate(1);
    let first = results.pop().unwrap_or_default();
    debug!("检测到 {} 个物体", first.len());
    Ok(first)
  }

  pub fn print_profiling(&self) {
    self.pipeline.print_profiling();
  }
}
