// 该文件是 Huoyan （火眼） 项目的一部分。
// src/batch.rs - 批次构建
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

use crate::frame::RgbNhwcFrame;

/// 一次推理提交的帧序列，长度等于配置的批大小
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
  frames: Vec<RgbNhwcFrame>,
}

impl Batch {
  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  pub fn first(&self) -> Option<&RgbNhwcFrame> {
    self.frames.first()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, RgbNhwcFrame> {
    self.frames.iter()
  }

  pub fn into_frames(self) -> Vec<RgbNhwcFrame> {
    self.frames
  }
}

impl<'a> IntoIterator for &'a Batch {
  type Item = &'a RgbNhwcFrame;
  type IntoIter = std::slice::Iter<'a, RgbNhwcFrame>;

  fn into_iter(self) -> Self::IntoIter {
    self.frames.iter()
  }
}

/// 由单帧构建批次的策略
pub trait BatchPolicy {
  fn build(&self, frame: &RgbNhwcFrame, size: NonZeroUsize) -> Batch;
}

/// 将同一帧复制 N 次，使流水线在固定批宽度下运行
#[derive(Debug, Default, Clone, Copy)]
pub struct Replicate;

impl BatchPolicy for Replicate {
  fn build(&self, frame: &RgbNhwcFrame, size: NonZeroUsize) -> Batch {
    Batch {
      frames: vec![frame.clone(); size.get()],
    }
  }
}
