// 该文件是 Huoyan （火眼） 项目的一部分。
// src/output.rs - 渲染输出与按键输入
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

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::model::DetectResult;
use crate::{FromUrl, FromUrlWithScheme};

/// 渲染表面，会话结束时关闭
pub trait Surface {
  /// 显示一帧已叠加检测结果的画布
  fn show(&mut self, canvas: &RgbImage, result: &DetectResult) -> Result<(), OutputError>;
  /// 可重复调用
  fn close(&mut self);
}

impl<S: Surface + ?Sized> Surface for Box<S> {
  fn show(&mut self, canvas: &RgbImage, result: &DetectResult) -> Result<(), OutputError> {
    (**self).show(canvas, result)
  }

  fn close(&mut self) {
    (**self).close()
  }
}

/// 非阻塞按键轮询
pub trait KeyInput {
  fn poll(&mut self) -> Option<char>;
}

impl<K: KeyInput + ?Sized> KeyInput for Box<K> {
  fn poll(&mut self) -> Option<char> {
    (**self).poll()
  }
}

pub mod draw;
pub use self::draw::Draw;

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

mod directory_record;
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

mod terminal_keys;
pub use self::terminal_keys::{NoKeys, TerminalKeys};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("字体加载错误: {0}")]
  Font(#[from] ab_glyph::InvalidFont),
  #[error("设置中断信号处理失败: {0}")]
  Signal(#[from] ctrlc::Error),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("不支持的输出 URI 方案: {0}")]
  SchemeMismatch(String),
}

/// 不输出任何内容，用于无界面运行
#[derive(Debug, Default)]
pub struct NullOutput {
  frames: usize,
}

impl FromUrlWithScheme for NullOutput {
  const SCHEME: &'static str = "null";
}

impl FromUrl for NullOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(NullOutput::default())
  }
}

impl Surface for NullOutput {
  fn show(&mut self, _canvas: &RgbImage, _result: &DetectResult) -> Result<(), OutputError> {
    self.frames += 1;
    Ok(())
  }

  fn close(&mut self) {}
}

pub enum OutputWrapper {
  SaveImageFileOutput(SaveImageFileOutput),
  DirectoryRecordOutput(DirectoryRecordOutput),
  NullOutput(NullOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let output = match url.scheme() {
      SaveImageFileOutput::SCHEME => {
        OutputWrapper::SaveImageFileOutput(SaveImageFileOutput::from_url(url)?)
      }
      DirectoryRecordOutput::SCHEME => {
        OutputWrapper::DirectoryRecordOutput(DirectoryRecordOutput::from_url(url)?)
      }
      NullOutput::SCHEME => OutputWrapper::NullOutput(NullOutput::from_url(url)?),
      other => return Err(OutputError::SchemeMismatch(other.to_string())),
    };
    info!("渲染输出: {}", url);
    Ok(output)
  }
}

impl Surface for OutputWrapper {
  fn show(&mut self, canvas: &RgbImage, result: &DetectResult) -> Result<(), OutputError> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output.show(canvas, result),
      OutputWrapper::DirectoryRecordOutput(output) => output.show(canvas, result),
      OutputWrapper::NullOutput(output) => output.show(canvas, result),
    }
  }

  fn close(&mut self) {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output.close(),
      OutputWrapper::DirectoryRecordOutput(output) => output.close(),
      OutputWrapper::NullOutput(output) => output.close(),
    }
  }
}
