// 该文件是 Huoyan （火眼） 项目的一部分。
// src/input/v4l_input.rs - V4L 摄像头输入
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

use image::ImageFormat;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame};

const DEFAULT_DEVICE: &str = "/dev/video0";
const BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法打开设备 {device}: {source}")]
  Open {
    device: String,
    source: std::io::Error,
  },
  #[error("V4L 错误: {0}")]
  V4lError(#[from] std::io::Error),
  #[error("不支持的像素格式: {0}")]
  UnsupportedPixelFormat(String),
  #[error("图像解码错误: {0}")]
  Decode(#[from] image::ImageError),
  #[error("缓冲区大小 {actual} 小于期望的 {expected}")]
  BufferSize { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
  Rgb3,
  Yuyv,
  Mjpg,
}

impl PixelFormat {
  fn from_fourcc(fourcc: FourCC) -> Option<Self> {
    match &fourcc.repr {
      b"RGB3" => Some(PixelFormat::Rgb3),
      b"YUYV" => Some(PixelFormat::Yuyv),
      b"MJPG" => Some(PixelFormat::Mjpg),
      _ => None,
    }
  }
}

pub struct V4lInput {
  // 流在设备之前释放
  stream: Stream<'static>,
  _device: Device,
  format: PixelFormat,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  /// `v4l:///dev/video0`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = if url.path().is_empty() {
      DEFAULT_DEVICE
    } else {
      url.path()
    };
    let device = Device::with_path(path).map_err(|source| V4lInputError::Open {
      device: path.to_string(),
      source,
    })?;
    Self::with_device(device, path)
  }
}

impl V4lInput {
  pub fn open_index(index: usize) -> Result<Self, V4lInputError> {
    let name = format!("/dev/video{}", index);
    let device = Device::new(index).map_err(|source| V4lInputError::Open {
      device: name.clone(),
      source,
    })?;
    Self::with_device(device, &name)
  }

  fn with_device(device: Device, name: &str) -> Result<Self, V4lInputError> {
    // 保持设备当前的分辨率，优先请求 RGB24
    let mut format = device.format()?;
    format.fourcc = FourCC::new(b"RGB3");
    let format = device.set_format(&format)?;

    let pixel_format = PixelFormat::from_fourcc(format.fourcc)
      .ok_or_else(|| V4lInputError::UnsupportedPixelFormat(format.fourcc.to_string()))?;
    info!(
      "打开摄像头 {}: {}x{} {}",
      name, format.width, format.height, format.fourcc
    );

    let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;
    Ok(Self {
      stream,
      _device: device,
      format: pixel_format,
      width: format.width,
      height: format.height,
    })
  }

  fn capture(&mut self) -> Result<RgbNhwcFrame, V4lInputError> {
    let (buffer, meta) = CaptureStream::next(&mut self.stream)?;
    debug!("采集帧 #{} ({} 字节)", meta.sequence, meta.bytesused);
    let used = (meta.bytesused as usize).min(buffer.len());
    let buffer = &buffer[..used];

    let mut rgb = match self.format {
      PixelFormat::Rgb3 => buffer.to_vec(),
      PixelFormat::Yuyv => yuyv_to_rgb(buffer),
      PixelFormat::Mjpg => {
        let image = image::load_from_memory_with_format(buffer, ImageFormat::Jpeg)?;
        return Ok(RgbNhwcFrame::from(image.to_rgb8()));
      }
    };

    let (width, height) = (self.width as usize, self.height as usize);
    let expected = width * height * 3;
    if rgb.len() < expected {
      return Err(V4lInputError::BufferSize {
        expected,
        actual: rgb.len(),
      });
    }
    rgb.truncate(expected);
    RgbNhwcFrame::from_raw(width, height, rgb).map_err(|_| V4lInputError::BufferSize {
      expected,
      actual: used,
    })
  }
}

impl Iterator for V4lInput {
  type Item = RgbNhwcFrame;

  /// 采集失败视为流结束
  fn next(&mut self) -> Option<Self::Item> {
    match self.capture() {
      Ok(frame) => Some(frame),
      Err(e) => {
        error!("采集帧失败: {}", e);
        None
      }
    }
  }
}

/// YUYV (YUV 4:2:2) → RGB24
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);

  for chunk in yuyv.chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}
