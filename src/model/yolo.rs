// 该文件是 Huoyan （火眼） 项目的一部分。
// src/model/yolo.rs - YOLO 后处理
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

use crate::model::{DetectItem, DetectResult, LetterBox, OutputTensor, PipelineError};

/// 每个锚框的回归与置信度通道数: x, y, w, h, objectness
const BOX_CHANNELS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YoloKind {
  /// region 层：锚框以网格为单位，类别使用 softmax
  V2,
  /// yolo 层：锚框以输入像素为单位，类别使用独立 sigmoid
  V3,
}

/// 单个检测头的描述
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
  /// 成对出现的 (w, h)
  pub anchors: Vec<f32>,
  pub num_classes: usize,
}

impl OutputSpec {
  pub fn num_anchors(&self) -> usize {
    self.anchors.len() / 2
  }

  fn channels(&self) -> usize {
    self.num_anchors() * (BOX_CHANNELS + self.num_classes)
  }
}

pub struct YoloPostProcessor {
  kind: YoloKind,
  /// 从最粗的网格到最细的网格
  specs: Vec<OutputSpec>,
  threshold: f32,
  nms_threshold: f32,
  input_width: f32,
  input_height: f32,
  detections: Vec<DetectResult>,
}

/// 一个检测头在张量中的视图
struct Head<'a> {
  data: &'a [f32],
  channels: usize,
  grid_h: usize,
  grid_w: usize,
}

impl Head<'_> {
  fn at(&self, batch: usize, channel: usize, row: usize, col: usize) -> f32 {
    self.data[((batch * self.channels + channel) * self.grid_h + row) * self.grid_w + col]
  }
}

impl YoloPostProcessor {
  pub fn new(
    kind: YoloKind,
    specs: Vec<OutputSpec>,
    threshold: f32,
    nms_threshold: f32,
    input_width: u32,
    input_height: u32,
  ) -> Self {
    Self {
      kind,
      specs,
      threshold,
      nms_threshold,
      input_width: input_width as f32,
      input_height: input_height as f32,
      detections: Vec::new(),
    }
  }

  pub fn specs(&self) -> &[OutputSpec] {
    &self.specs
  }

  /// 取出最近一次处理的结果，每个批元素一个
  pub fn get_detections(&mut self) -> Vec<DetectResult> {
    std::mem::take(&mut self.detections)
  }

  pub fn process(
    &mut self,
    outputs: &[OutputTensor],
    letterboxes: &[LetterBox],
  ) -> Result<(), PipelineError> {
    if outputs.len() != self.specs.len() {
      return Err(PipelineError::InvalidOutput(format!(
        "期望 {} 个输出, 实际为 {}",
        self.specs.len(),
        outputs.len()
      )));
    }

    let batch_size = letterboxes.len();
    let heads = self.match_heads(outputs, batch_size)?;

    let mut detections = Vec::with_capacity(batch_size);
    for (b, letterbox) in letterboxes.iter().enumerate() {
      let mut items = Vec::new();
      for (head, spec) in heads.iter().zip(&self.specs) {
        self.decode_head(head, spec, b, letterbox, &mut items);
      }
      let items = nms(items, self.nms_threshold);
      debug!("批元素 {}: 检测到 {} 个物体", b, items.len());
      detections.push(DetectResult::from(items));
    }

    self.detections = detections;
    Ok(())
  }

  /// 按网格大小把输出张量与检测头描述配对，最粗的网格对应第一个描述
  fn match_heads<'a>(
    &self,
    outputs: &'a [OutputTensor],
    batch_size: usize,
  ) -> Result<Vec<Head<'a>>, PipelineError> {
    let mut order: Vec<&OutputTensor> = outputs.iter().collect();
    order.sort_by_key(|output| output.shape.get(3).copied().unwrap_or(0));

    order
      .into_iter()
      .zip(&self.specs)
      .enumerate()
      .map(|(idx, (output, spec))| {
        let [n, channels, grid_h, grid_w] = output.shape[..] else {
          error!("检测头 {}: 输出形状不是 NCHW: {:?}", idx, output.shape);
          return Err(PipelineError::InvalidOutput(format!(
            "输出形状不是 NCHW: {:?}",
            output.shape
          )));
        };
        if n != batch_size || channels != spec.channels() {
          error!(
            "检测头 {}: 形状 {:?} 与期望不符 (批大小 {}, 通道数 {})",
            idx,
            output.shape,
            batch_size,
            spec.channels()
          );
          return Err(PipelineError::InvalidOutput(format!(
            "形状 {:?} 与期望的批大小 {} 通道数 {} 不符",
            output.shape,
            batch_size,
            spec.channels()
          )));
        }
        if output.data.len() != n * channels * grid_h * grid_w {
          return Err(PipelineError::InvalidOutput(format!(
            "数据长度 {} 与形状 {:?} 不符",
            output.data.len(),
            output.shape
          )));
        }
        Ok(Head {
          data: &output.data,
          channels,
          grid_h,
          grid_w,
        })
      })
      .collect()
  }

  fn decode_head(
    &self,
    head: &Head<'_>,
    spec: &OutputSpec,
    b: usize,
    letterbox: &LetterBox,
    items: &mut Vec<DetectItem>,
  ) {
    let stride = BOX_CHANNELS + spec.num_classes;
    let (gw, gh) = (head.grid_w as f32, head.grid_h as f32);
    let mut probs = vec![0f32; spec.num_classes];

    for a in 0..spec.num_anchors() {
      let (anchor_w, anchor_h) = (spec.anchors[2 * a], spec.anchors[2 * a + 1]);
      let base = a * stride;

      for row in 0..head.grid_h {
        for col in 0..head.grid_w {
          let objectness = sigmoid(head.at(b, base + 4, row, col));
          if objectness <= self.threshold {
            continue;
          }

          for (c, prob) in probs.iter_mut().enumerate() {
            *prob = head.at(b, base + BOX_CHANNELS + c, row, col);
          }
          match self.kind {
            YoloKind::V2 => softmax(&mut probs),
            YoloKind::V3 => probs.iter_mut().for_each(|p| *p = sigmoid(*p)),
          }
          let Some((class_id, prob)) = argmax(&probs) else {
            continue;
          };

          let score = objectness * prob;
          if score <= self.threshold {
            continue;
          }

          let cx = (col as f32 + sigmoid(head.at(b, base, row, col))) / gw;
          let cy = (row as f32 + sigmoid(head.at(b, base + 1, row, col))) / gh;
          let (w, h) = match self.kind {
            YoloKind::V2 => (
              head.at(b, base + 2, row, col).exp() * anchor_w / gw,
              head.at(b, base + 3, row, col).exp() * anchor_h / gh,
            ),
            YoloKind::V3 => (
              head.at(b, base + 2, row, col).exp() * anchor_w / self.input_width,
              head.at(b, base + 3, row, col).exp() * anchor_h / self.input_height,
            ),
          };

          let (x_min, y_min) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
          let (x_max, y_max) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);
          let bbox = [
            x_min.clamp(0.0, 1.0),
            y_min.clamp(0.0, 1.0),
            x_max.clamp(0.0, 1.0),
            y_max.clamp(0.0, 1.0),
          ];
          if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
            continue;
          }

          items.push(DetectItem {
            class_id,
            score,
            bbox,
          });
        }
      }
    }
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

fn softmax(values: &mut [f32]) {
  let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let mut sum = 0.0;
  for v in values.iter_mut() {
    *v = (*v - max).exp();
    sum += *v;
  }
  if sum > 0.0 {
    values.iter_mut().for_each(|v| *v /= sum);
  }
}

fn argmax(values: &[f32]) -> Option<(usize, f32)> {
  values
    .iter()
    .copied()
    .enumerate()
    .fold(None, |best, (idx, v)| match best {
      Some((_, b)) if b >= v => best,
      _ => Some((idx, v)),
    })
}

/// 按类别的贪心非极大值抑制，结果按置信度降序
pub fn nms(mut detections: Vec<DetectItem>, nms_threshold: f32) -> Vec<DetectItem> {
  detections.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<DetectItem> = Vec::with_capacity(detections.len());
  for det in detections {
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == det.class_id && iou(&kept.bbox, &det.bbox) > nms_threshold);
    if !suppressed {
      result.push(det);
    }
  }
  result
}

/// 计算两个 [x_min, y_min, x_max, y_max] 边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: usize, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  /// 构造一个只有一个锚框、2 个类别、1x1 网格的 v3 输出
  fn single_cell_output(batch: usize, logits: [f32; 7]) -> OutputTensor {
    let mut data = Vec::new();
    for _ in 0..batch {
      data.extend_from_slice(&logits);
    }
    OutputTensor {
      shape: vec![batch, 7, 1, 1],
      data,
    }
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = [0.0, 0.0, 1.0, 1.0];
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    assert_eq!(iou(&a, &[2.0, 2.0, 3.0, 3.0]), 0.0);
  }

  #[test]
  fn nms_suppresses_same_class_overlaps_only() {
    let boxes = vec![
      item(0, 0.6, [0.0, 0.0, 0.5, 0.5]),
      item(0, 0.9, [0.0, 0.0, 0.5, 0.52]),
      item(1, 0.7, [0.0, 0.0, 0.5, 0.5]),
    ];
    let kept = nms(boxes, 0.45);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].class_id, 1);
  }

  #[test]
  fn softmax_normalises() {
    let mut v = [1.0, 2.0, 3.0];
    softmax(&mut v);
    assert!((v.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    assert!(v[2] > v[1] && v[1] > v[0]);
  }

  #[test]
  fn v3_decodes_a_confident_cell_per_batch_element() {
    let spec = OutputSpec {
      anchors: vec![32.0, 32.0],
      num_classes: 2,
    };
    let mut post = YoloPostProcessor::new(YoloKind::V3, vec![spec], 0.5, 0.45, 64, 64);
    // tx=ty=0 → 中心 (0.5, 0.5)；tw=th=0 → 尺寸为锚框 32/64
    let output = single_cell_output(2, [0.0, 0.0, 0.0, 0.0, 8.0, -8.0, 8.0]);
    let letterbox = LetterBox::compute(64, 64, 64, 64);

    post.process(&[output], &[letterbox, letterbox]).unwrap();
    let detections = post.get_detections();

    assert_eq!(detections.len(), 2);
    for result in &detections {
      assert_eq!(result.len(), 1);
      let det = &result.items[0];
      assert_eq!(det.class_id, 1);
      assert!(det.score > 0.99);
      for (got, want) in det.bbox.iter().zip([0.25, 0.25, 0.75, 0.75]) {
        assert!((got - want).abs() < 1e-5, "{:?}", det.bbox);
      }
    }
    assert!(post.get_detections().is_empty());
  }

  #[test]
  fn low_objectness_yields_empty_sets() {
    let spec = OutputSpec {
      anchors: vec![1.0, 1.0],
      num_classes: 2,
    };
    let mut post = YoloPostProcessor::new(YoloKind::V2, vec![spec], 0.24, 0.45, 32, 32);
    let output = single_cell_output(1, [0.0, 0.0, 0.0, 0.0, -8.0, 5.0, 0.0]);
    let letterbox = LetterBox::compute(32, 32, 32, 32);

    post.process(&[output], &[letterbox]).unwrap();
    let detections = post.get_detections();
    assert_eq!(detections.len(), 1);
    assert!(detections[0].is_empty());
  }

  #[test]
  fn mismatched_channels_are_rejected() {
    let spec = OutputSpec {
      anchors: vec![1.0, 1.0, 2.0, 2.0],
      num_classes: 2,
    };
    let mut post = YoloPostProcessor::new(YoloKind::V2, vec![spec], 0.24, 0.45, 32, 32);
    let output = single_cell_output(1, [0.0; 7]);
    let letterbox = LetterBox::compute(32, 32, 32, 32);
    assert!(matches!(
      post.process(&[output], &[letterbox]),
      Err(PipelineError::InvalidOutput(_))
    ));
  }

  #[test]
  fn heads_are_paired_by_grid_size() {
    let coarse = OutputSpec {
      anchors: vec![1.0, 1.0],
      num_classes: 1,
    };
    let fine = coarse.clone();
    let mut post = YoloPostProcessor::new(YoloKind::V3, vec![coarse, fine], 0.5, 0.45, 8, 8);
    // 细网格 (2x2) 排在前面，粗网格 (1x1) 排在后面
    let fine_out = OutputTensor {
      shape: vec![1, 6, 2, 2],
      data: vec![-8.0; 24],
    };
    let coarse_out = OutputTensor {
      shape: vec![1, 6, 1, 1],
      data: vec![-8.0; 6],
    };
    let letterbox = LetterBox::compute(8, 8, 8, 8);
    post.process(&[fine_out, coarse_out], &[letterbox]).unwrap();
    assert_eq!(post.get_detections().len(), 1);
  }
}
