// 该文件是 Huoyan （火眼） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("无效的重复次数: {0}")]
  InvalidRepeat(String),
}

/// 静态图像输入，同一帧产出 `repeat` 次
#[derive(Debug)]
pub struct ImageFileInput {
  frame: RgbNhwcFrame,
  remaining: usize,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut repeat = 1;
    for (k, v) in url.query_pairs() {
      if k == "repeat" {
        repeat = v
          .parse()
          .map_err(|_| ImageFileInputError::InvalidRepeat(v.to_string()))?;
      }
    }

    Self::open(url.path(), repeat)
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>, repeat: usize) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    info!(
      "读取图像 {} ({}x{}), 重复 {} 次",
      path.display(),
      image.width(),
      image.height(),
      repeat
    );
    Ok(Self {
      frame: RgbNhwcFrame::from(image),
      remaining: repeat,
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbNhwcFrame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    Some(self.frame.clone())
  }
}

#[cfg(test)]
mod tests {
  use image::{Rgb, RgbImage};

  use super::*;

  fn write_image(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("still.png");
    RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]))
      .save(&path)
      .unwrap();
    path
  }

  #[test]
  fn yields_the_image_repeat_times() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path());
    let url = Url::parse(&format!("image://{}?repeat=3", path.display())).unwrap();

    let frames: Vec<_> = ImageFileInput::from_url(&url).unwrap().collect();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].width(), 4);
    assert_eq!(frames[0].height(), 3);
    assert_eq!(frames[2].pixel(3, 2), [10, 20, 30]);
  }

  #[test]
  fn defaults_to_a_single_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path());
    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    assert_eq!(ImageFileInput::from_url(&url).unwrap().count(), 1);
  }

  #[test]
  fn rejects_other_schemes_and_bad_repeat() {
    let url = Url::parse("v4l:///dev/video0").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemeMismatch(_))
    ));

    let url = Url::parse("image:///x.png?repeat=many").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::InvalidRepeat(_))
    ));
  }

  #[test]
  fn missing_file_is_an_io_error() {
    assert!(matches!(
      ImageFileInput::open("/nonexistent/still.png", 1),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
