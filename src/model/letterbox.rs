// 该文件是 Huoyan （火眼） 项目的一部分。
// src/model/letterbox.rs - 等比缩放填充预处理
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

use image::{Rgb, RgbImage, imageops::FilterType};
use tracing::debug;

use crate::{batch::Batch, frame::RGB_CHANNELS, model::PipelineError};

const LETTERBOX_FILL: u8 = 128;

/// NCHW 浮点输入张量，取值范围 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
  pub shape: [usize; 4],
  pub data: Vec<f32>,
}

/// 原始帧到网络输入的映射
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterBox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub src_width: f32,
  pub src_height: f32,
  pub dst_width: f32,
  pub dst_height: f32,
}

impl LetterBox {
  pub fn compute(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Self {
    let (sw, sh) = (src_width as f32, src_height as f32);
    let (dw, dh) = (dst_width as f32, dst_height as f32);
    let scale = (dw / sw).min(dh / sh);
    let new_w = (sw * scale).round();
    let new_h = (sh * scale).round();

    Self {
      scale,
      pad_x: ((dw - new_w) / 2.0).floor(),
      pad_y: ((dh - new_h) / 2.0).floor(),
      src_width: sw,
      src_height: sh,
      dst_width: dw,
      dst_height: dh,
    }
  }

  pub fn resized_size(&self) -> (u32, u32) {
    (
      ((self.src_width * self.scale).round() as u32).max(1),
      ((self.src_height * self.scale).round() as u32).max(1),
    )
  }

  /// 网络输入的归一化坐标 → 原始帧的归一化坐标
  pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
    let fx = (x * self.dst_width - self.pad_x) / self.scale / self.src_width;
    let fy = (y * self.dst_height - self.pad_y) / self.scale / self.src_height;
    (fx, fy)
  }
}

pub struct LetterBoxPreProcessor {
  width: u32,
  height: u32,
  images: Option<Batch>,
  letterboxes: Vec<LetterBox>,
}

impl LetterBoxPreProcessor {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      images: None,
      letterboxes: Vec::new(),
    }
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  /// 接管批次的所有权，直到下一次 `process`
  pub fn register_images(&mut self, batch: Batch) {
    self.images = Some(batch);
  }

  /// 最近一次处理的各帧映射关系，与批次顺序一致
  pub fn letterboxes(&self) -> &[LetterBox] {
    &self.letterboxes
  }

  pub fn process(&mut self) -> Result<InputTensor, PipelineError> {
    let batch = self.images.take().ok_or(PipelineError::NoImages)?;
    let (w, h) = (self.width as usize, self.height as usize);
    let plane = w * h;
    let mut data = vec![0f32; batch.len() * RGB_CHANNELS * plane];
    self.letterboxes.clear();

    for (n, frame) in batch.iter().enumerate() {
      if frame.width() == 0 || frame.height() == 0 {
        return Err(PipelineError::InvalidFrame {
          width: frame.width(),
          height: frame.height(),
        });
      }

      let letterbox = LetterBox::compute(
        frame.width() as u32,
        frame.height() as u32,
        self.width,
        self.height,
      );
      let canvas = self.letterbox_image(&frame.to_rgb_image(), &letterbox);

      let offset = n * RGB_CHANNELS * plane;
      for (idx, pixel) in canvas.pixels().enumerate() {
        for c in 0..RGB_CHANNELS {
          data[offset + c * plane + idx] = pixel[c] as f32 / 255.0;
        }
      }
      self.letterboxes.push(letterbox);
    }

    debug!("预处理完成: {} 帧 -> {}x{}", batch.len(), w, h);
    Ok(InputTensor {
      shape: [batch.len(), RGB_CHANNELS, h, w],
      data,
    })
  }

  fn letterbox_image(&self, image: &RgbImage, letterbox: &LetterBox) -> RgbImage {
    let (new_w, new_h) = letterbox.resized_size();
    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(self.width, self.height, Rgb([LETTERBOX_FILL; 3]));
    image::imageops::replace(
      &mut canvas,
      &resized,
      letterbox.pad_x as i64,
      letterbox.pad_y as i64,
    );
    canvas
  }
}

#[cfg(test)]
mod tests {
  use std::num::NonZeroUsize;

  use super::*;
  use crate::batch::{BatchPolicy, Replicate};
  use crate::frame::RgbNhwcFrame;

  #[test]
  fn letterbox_pads_the_short_side() {
    let lb = LetterBox::compute(640, 320, 416, 416);
    assert!((lb.scale - 0.65).abs() < 1e-6);
    assert_eq!(lb.resized_size(), (416, 208));
    assert_eq!(lb.pad_x, 0.0);
    assert_eq!(lb.pad_y, 104.0);
  }

  #[test]
  fn unmap_inverts_the_letterbox() {
    let lb = LetterBox::compute(640, 320, 416, 416);
    // 网络坐标中有效区域的左上角和右下角
    let (x0, y0) = lb.unmap(0.0, 104.0 / 416.0);
    let (x1, y1) = lb.unmap(1.0, 312.0 / 416.0);
    assert!(x0.abs() < 1e-5 && y0.abs() < 1e-5);
    assert!((x1 - 1.0).abs() < 1e-5 && (y1 - 1.0).abs() < 1e-5);
  }

  #[test]
  fn process_produces_nchw_tensor_per_batch_element() {
    let image = RgbImage::from_pixel(8, 4, Rgb([255, 0, 0]));
    let frame = RgbNhwcFrame::from(image);
    let batch = Replicate.build(&frame, NonZeroUsize::new(2).unwrap());

    let mut pre = LetterBoxPreProcessor::new(8, 8);
    pre.register_images(batch);
    let tensor = pre.process().unwrap();

    assert_eq!(tensor.shape, [2, 3, 8, 8]);
    assert_eq!(tensor.data.len(), 2 * 3 * 64);
    assert_eq!(pre.letterboxes().len(), 2);
    // 第 0 行是填充，第 4 行是图像（红色）
    let fill = LETTERBOX_FILL as f32 / 255.0;
    assert!((tensor.data[0] - fill).abs() < 1e-6);
    assert!((tensor.data[4 * 8] - 1.0).abs() < 1e-6);
    assert!(tensor.data[64 + 4 * 8].abs() < 1e-6);
  }

  #[test]
  fn process_without_images_fails() {
    let mut pre = LetterBoxPreProcessor::new(8, 8);
    assert!(matches!(pre.process(), Err(PipelineError::NoImages)));
  }
}
