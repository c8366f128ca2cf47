// 该文件是 Huoyan （火眼） 项目的一部分。
// src/output/save_image_file.rs - 预览图像输出
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectResult,
  output::{OutputError, Surface},
};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("预览窗口已关闭")]
  Closed,
}

/// 每帧覆盖写入同一个预览文件
pub struct SaveImageFileOutput {
  path: PathBuf,
  frames: usize,
  closed: bool,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(Self::new(uri.path()))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      frames: 0,
      closed: false,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    debug!("保存预览图像: {}", self.path.display());
    Ok(())
  }
}

impl Surface for SaveImageFileOutput {
  fn show(&mut self, canvas: &RgbImage, _result: &DetectResult) -> Result<(), OutputError> {
    if self.closed {
      return Err(SaveImageFileError::Closed.into());
    }
    self.save_image(canvas)?;
    self.frames += 1;
    Ok(())
  }

  fn close(&mut self) {
    if !self.closed {
      self.closed = true;
      info!(
        "关闭预览输出 {} (共 {} 帧)",
        self.path.display(),
        self.frames
      );
    }
  }
}

impl Drop for SaveImageFileOutput {
  fn drop(&mut self) {
    self.close();
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  #[test]
  fn show_overwrites_the_preview_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("result.png");
    let mut output = SaveImageFileOutput::new(&path);

    let result = DetectResult::default();
    output
      .show(&RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])), &result)
      .unwrap();
    output
      .show(&RgbImage::from_pixel(4, 4, Rgb([9, 8, 7])), &result)
      .unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(*saved.get_pixel(0, 0), Rgb([9, 8, 7]));
  }

  #[test]
  fn close_is_idempotent_and_rejects_later_frames() {
    let dir = tempfile::tempdir().unwrap();
    let mut output = SaveImageFileOutput::new(dir.path().join("result.png"));
    output.close();
    output.close();
    assert!(
      output
        .show(&RgbImage::new(2, 2), &DetectResult::default())
        .is_err()
    );
  }

  #[test]
  fn from_url_takes_the_path() {
    let url = Url::parse("image:///tmp/preview.png").unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), Path::new("/tmp/preview.png"));

    let url = Url::parse("folder:///tmp").unwrap();
    assert!(SaveImageFileOutput::from_url(&url).is_err());
  }
}
