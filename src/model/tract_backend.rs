// 该文件是 Huoyan （火眼） 项目的一部分。
// src/model/tract_backend.rs - 基于 tract 的 ONNX 推理后端
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

use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::model::{InferenceBackend, InputTensor, OutputTensor, PipelineError};

type Plan = TypedRunnableModel<TypedModel>;

#[derive(Default)]
pub struct TractBackend {
  plan: Option<Plan>,
}

impl InferenceBackend for TractBackend {
  fn name(&self) -> &'static str {
    "tract"
  }

  fn load(&mut self, model_path: &Path, input_shape: [usize; 4]) -> Result<(), PipelineError> {
    let model_load = |e: TractError| {
      PipelineError::ModelLoad(format!("{}: {:#}", model_path.display(), e))
    };

    info!("加载 ONNX 模型: {}", model_path.display());
    let [n, c, h, w] = input_shape;
    let plan = tract_onnx::onnx()
      .model_for_path(model_path)
      .map_err(model_load)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(n, c, h, w)),
      )
      .map_err(model_load)?
      .into_optimized()
      .map_err(model_load)?
      .into_runnable()
      .map_err(model_load)?;

    debug!("模型输出数量: {}", plan.model().outputs.len());
    self.plan = Some(plan);
    info!("模型加载完成");
    Ok(())
  }

  fn infer(&mut self, input: &InputTensor) -> Result<Vec<OutputTensor>, PipelineError> {
    let plan = self.plan.as_ref().ok_or(PipelineError::NotInitialized)?;

    let tensor = Tensor::from_shape(&input.shape, &input.data)
      .map_err(|e| PipelineError::Inference(format!("构建输入张量失败: {}", e)))?;
    let outputs = plan
      .run(tvec!(tensor.into()))
      .map_err(|e| PipelineError::Inference(format!("{:#}", e)))?;

    outputs
      .iter()
      .map(|output| {
        let data = output
          .as_slice::<f32>()
          .map_err(|e| PipelineError::InvalidOutput(format!("输出不是 f32 张量: {}", e)))?;
        Ok(OutputTensor {
          shape: output.shape().to_vec(),
          data: data.to_vec(),
        })
      })
      .collect()
  }
}
