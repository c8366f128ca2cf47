// 该文件是 Huoyan （火眼） 项目的一部分。
// src/model/factory.rs - 检测流水线工厂
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

use crate::batch::Batch;
use crate::model::{
  DetectResult, InferenceBackend, LetterBoxPreProcessor, ModelRunner, NetworkType, OutputSpec,
  Pipeline, PipelineError, PipelineFactory, YoloKind, YoloPostProcessor,
};
use crate::settings::Settings;

const YOLOV2_ANCHORS: [f32; 10] = [
  0.57273, 0.677385, 1.87446, 2.06253, 3.33843, 5.47434, 7.88282, 3.52778, 9.77052, 9.16828,
];

/// 从粗到细
const YOLOV3_ANCHORS: [[f32; 6]; 3] = [
  [116.0, 90.0, 156.0, 198.0, 373.0, 326.0],
  [30.0, 61.0, 62.0, 45.0, 59.0, 119.0],
  [10.0, 13.0, 16.0, 30.0, 33.0, 23.0],
];

const YOLOV3_TINY_ANCHORS: [[f32; 6]; 2] = [
  [81.0, 82.0, 135.0, 169.0, 344.0, 319.0],
  [10.0, 14.0, 23.0, 27.0, 37.0, 58.0],
];

/// 每个检测头 3 个锚框，每个锚框一对 (w, h)
const HEAD_ANCHOR_VALUES: usize = 6;

pub fn default_backend() -> Box<dyn InferenceBackend> {
  #[cfg(feature = "tract_backend")]
  {
    Box::new(crate::model::TractBackend::default())
  }
  #[cfg(not(feature = "tract_backend"))]
  {
    Box::new(crate::model::UnavailableBackend)
  }
}

impl NetworkType {
  fn kind(&self) -> YoloKind {
    match self {
      NetworkType::Yolov2 => YoloKind::V2,
      NetworkType::Yolov3 | NetworkType::Yolov3Tiny => YoloKind::V3,
    }
  }

  fn default_anchors(&self) -> Vec<Vec<f32>> {
    match self {
      NetworkType::Yolov2 => vec![YOLOV2_ANCHORS.to_vec()],
      NetworkType::Yolov3 => YOLOV3_ANCHORS.iter().map(|a| a.to_vec()).collect(),
      NetworkType::Yolov3Tiny => YOLOV3_TINY_ANCHORS.iter().map(|a| a.to_vec()).collect(),
    }
  }

  fn anchor_count(&self) -> usize {
    self.default_anchors().iter().map(Vec::len).sum()
  }

  /// 将自定义锚框按检测头拆分，结果从粗到细排列
  fn split_anchors(&self, priors: &[f32]) -> Result<Vec<Vec<f32>>, PipelineError> {
    let expected = self.anchor_count();
    if priors.len() != expected {
      return Err(PipelineError::AnchorCount {
        network: *self,
        expected,
        actual: priors.len(),
      });
    }

    Ok(match self {
      NetworkType::Yolov2 => vec![priors.to_vec()],
      // 配置文件中的锚框从小到大排列，最后一组属于最粗的网格
      NetworkType::Yolov3 | NetworkType::Yolov3Tiny => priors
        .chunks(HEAD_ANCHOR_VALUES)
        .rev()
        .map(<[f32]>::to_vec)
        .collect(),
    })
  }
}

/// 按网络类型组装 预处理 / 运行器 / 后处理 三元组
pub struct YoloPipelineFactory {
  backend: fn() -> Box<dyn InferenceBackend>,
}

impl Default for YoloPipelineFactory {
  fn default() -> Self {
    Self {
      backend: default_backend,
    }
  }
}

impl YoloPipelineFactory {
  pub fn with_backend(backend: fn() -> Box<dyn InferenceBackend>) -> Self {
    Self { backend }
  }
}

impl PipelineFactory for YoloPipelineFactory {
  fn create(
    &self,
    network: &str,
    settings: &Settings,
  ) -> Result<Box<dyn Pipeline>, PipelineError> {
    let network: NetworkType = network.parse()?;

    let anchors = if settings.anchor_priors.is_empty() {
      info!("{} 使用默认锚框", network);
      network.default_anchors()
    } else {
      info!(
        "{} 使用自定义锚框 ({} 个值)",
        network,
        settings.anchor_priors.len()
      );
      network.split_anchors(&settings.anchor_priors)?
    };

    let specs: Vec<OutputSpec> = anchors
      .into_iter()
      .map(|anchors| OutputSpec {
        anchors,
        num_classes: settings.num_classes(),
      })
      .collect();
    debug!("{} 检测头: {:?}", network, specs);

    let pre = LetterBoxPreProcessor::new(settings.input_width, settings.input_height);
    let runner = ModelRunner::new(
      (self.backend)(),
      settings.batch_size.get(),
      settings.enable_profiling,
    );
    let post = YoloPostProcessor::new(
      network.kind(),
      specs,
      settings.threshold,
      settings.nms_threshold,
      settings.input_width,
      settings.input_height,
    );

    Ok(Box::new(YoloPipeline {
      network,
      pre,
      runner,
      post,
    }))
  }
}

pub struct YoloPipeline {
  network: NetworkType,
  pre: LetterBoxPreProcessor,
  runner: ModelRunner,
  post: YoloPostProcessor,
}

impl YoloPipeline {
  pub fn network(&self) -> NetworkType {
    self.network
  }

  pub fn post_processor(&self) -> &YoloPostProcessor {
    &self.post
  }
}

impl Pipeline for YoloPipeline {
  fn init(&mut self, model_path: &Path) -> Result<(), PipelineError> {
    self.runner.init(model_path, &self.pre)
  }

  fn register_images(&mut self, batch: Batch) {
    self.pre.register_images(batch);
  }

  fn run(&mut self) -> Result<(), PipelineError> {
    self.runner.run(&mut self.pre, &mut self.post)
  }

  fn detections(&mut self) -> Vec<DetectResult> {
    self.post.get_detections()
  }

  fn print_profiling(&self) {
    self.runner.print_profiling();
  }
}

#[cfg(test)]
mod tests {
  use std::num::NonZeroUsize;

  use super::*;
  use crate::batch::{BatchPolicy, Replicate};
  use crate::frame::RgbNhwcFrame;
  use crate::model::{InputTensor, OutputTensor};

  /// 输出单个 1x1 网格、1 个类别的 yolov2 检测头，中心格子高置信度
  struct FakeBackend {
    shape: Option<[usize; 4]>,
  }

  impl InferenceBackend for FakeBackend {
    fn name(&self) -> &'static str {
      "fake"
    }

    fn load(&mut self, _model_path: &Path, input_shape: [usize; 4]) -> Result<(), PipelineError> {
      self.shape = Some(input_shape);
      Ok(())
    }

    fn infer(&mut self, input: &InputTensor) -> Result<Vec<OutputTensor>, PipelineError> {
      assert_eq!(Some(input.shape), self.shape);
      let batch = input.shape[0];
      let mut data = Vec::new();
      for _ in 0..batch {
        for _anchor in 0..5 {
          data.extend_from_slice(&[0.0, 0.0, -1.0, -1.0, 6.0, 3.0]);
        }
      }
      Ok(vec![OutputTensor {
        shape: vec![batch, 5 * 6, 1, 1],
        data,
      }])
    }
  }

  fn fake_backend() -> Box<dyn InferenceBackend> {
    Box::new(FakeBackend { shape: None })
  }

  fn settings(batch: usize) -> Settings {
    let mut settings = Settings::new(vec!["person".to_string()]);
    settings.batch_size = NonZeroUsize::new(batch).unwrap();
    settings.input_width = 32;
    settings.input_height = 32;
    settings
  }

  #[test]
  fn unknown_network_fails() {
    let factory = YoloPipelineFactory::with_backend(fake_backend);
    assert!(matches!(
      factory.create("yolov9", &settings(1)),
      Err(PipelineError::UnknownNetwork(_))
    ));
  }

  #[test]
  fn custom_anchor_count_must_match_network() {
    let factory = YoloPipelineFactory::with_backend(fake_backend);
    let mut settings = settings(1);
    settings.anchor_priors = vec![1.0; 12];
    assert!(matches!(
      factory.create("yolov3", &settings),
      Err(PipelineError::AnchorCount {
        expected: 18,
        actual: 12,
        ..
      })
    ));
    assert!(factory.create("yolov3-tiny", &settings).is_ok());
  }

  #[test]
  fn custom_anchors_are_split_coarse_first() {
    let priors: Vec<f32> = (0..18).map(|v| v as f32).collect();
    let heads = NetworkType::Yolov3.split_anchors(&priors).unwrap();
    assert_eq!(heads.len(), 3);
    assert_eq!(heads[0], (12..18).map(|v| v as f32).collect::<Vec<_>>());
    assert_eq!(heads[2], (0..6).map(|v| v as f32).collect::<Vec<_>>());

    let tiny: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let heads = NetworkType::Yolov3Tiny.split_anchors(&tiny).unwrap();
    assert_eq!(heads[0][0], 6.0);
    assert_eq!(heads[1][0], 0.0);
  }

  #[test]
  fn default_anchor_counts() {
    assert_eq!(NetworkType::Yolov2.anchor_count(), 10);
    assert_eq!(NetworkType::Yolov3.anchor_count(), 18);
    assert_eq!(NetworkType::Yolov3Tiny.anchor_count(), 12);
  }

  #[test]
  fn pipeline_yields_one_result_per_batch_element() {
    let factory = YoloPipelineFactory::with_backend(fake_backend);
    let mut settings = settings(3);
    settings.anchor_priors = vec![1.0; 10];
    let mut pipeline = factory.create("yolov2", &settings).unwrap();
    pipeline.init(Path::new("model.onnx")).unwrap();

    let frame = RgbNhwcFrame::with_shape(24, 32);
    pipeline.register_images(Replicate.build(&frame, NonZeroUsize::new(3).unwrap()));
    pipeline.run().unwrap();

    let detections = pipeline.detections();
    assert_eq!(detections.len(), 3);
    for result in &detections {
      // 5 个相同的锚框给出重合的框，NMS 后只剩一个
      assert_eq!(result.len(), 1);
      assert_eq!(result.items[0].class_id, 0);
    }
  }

  #[test]
  fn run_before_init_fails() {
    let factory = YoloPipelineFactory::with_backend(fake_backend);
    let mut pipeline = factory.create("yolov3-tiny", &settings(1)).unwrap();
    pipeline.register_images(Replicate.build(
      &RgbNhwcFrame::with_shape(8, 8),
      NonZeroUsize::new(1).unwrap(),
    ));
    assert!(matches!(pipeline.run(), Err(PipelineError::NotInitialized)));
  }
}
