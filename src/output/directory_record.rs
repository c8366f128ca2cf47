// 该文件是 Huoyan （火眼） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use chrono::{DateTime, Datelike, Local};
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectResult,
  output::{OutputError, Surface},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期分目录保存每帧结果：`<dir>/<年>/<月>/<日>/<时-分-秒>-<序号>.png`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: u16,
  /// 没有检测结果的帧也保存
  always: bool,
  /// 额外写出同名 `.txt` 检测记录
  record: bool,
  saved: usize,
  closed: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch(
        uri.scheme().to_string(),
      ));
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");
    let record = uri.query_pairs().any(|(k, _)| k == "record");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      frame_counter: 0,
      always,
      record,
      saved: 0,
      closed: false,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&mut self) -> u16 {
    self.frame_counter = self.frame_counter.wrapping_add(1);
    self.frame_counter
  }

  fn frame_path(&mut self, now: DateTime<Local>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn write_record(path: &Path, result: &DetectResult) -> Result<(), std::io::Error> {
    let records: Vec<String> = result
      .iter()
      .map(|item| {
        format!(
          "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
          item.class_id, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
        )
      })
      .collect();
    std::fs::write(path.with_extension("txt"), records.join("\n"))
  }

  fn save(
    &mut self,
    canvas: &RgbImage,
    result: &DetectResult,
    now: DateTime<Local>,
  ) -> Result<Option<PathBuf>, DirectoryRecordOutputError> {
    if !self.always && result.is_empty() {
      return Ok(None);
    }

    let path = self.frame_path(now)?;
    canvas.save(&path)?;
    if self.record {
      Self::write_record(&path, result)?;
    }
    self.saved += 1;
    debug!("保存记录帧: {}", path.display());
    Ok(Some(path))
  }
}

impl Surface for DirectoryRecordOutput {
  fn show(&mut self, canvas: &RgbImage, result: &DetectResult) -> Result<(), OutputError> {
    self.save(canvas, result, Local::now())?;
    Ok(())
  }

  fn close(&mut self) {
    if !self.closed {
      self.closed = true;
      info!(
        "目录记录 {} 共保存 {} 帧",
        self.directory.display(),
        self.saved
      );
    }
  }
}

impl Drop for DirectoryRecordOutput {
  fn drop(&mut self) {
    self.close();
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::model::DetectItem;

  fn output(dir: &Path, query: &str) -> DirectoryRecordOutput {
    let url = url::Url::parse(&format!("folder://{}{}", dir.display(), query)).unwrap();
    DirectoryRecordOutput::from_url(&url).unwrap()
  }

  fn detections() -> DetectResult {
    DetectResult::from(vec![DetectItem {
      class_id: 2,
      score: 0.5,
      bbox: [0.1, 0.2, 0.3, 0.4],
    }])
  }

  #[test]
  fn frames_go_into_dated_directories() {
    let dir = tempfile::tempdir().unwrap();
    let mut out = output(dir.path(), "?record");
    let now = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();

    let path = out
      .save(&RgbImage::new(2, 2), &detections(), now)
      .unwrap()
      .unwrap();
    assert_eq!(path, dir.path().join("2026/01/02/03-04-05-0001.png"));
    assert!(path.exists());

    let record = std::fs::read_to_string(path.with_extension("txt")).unwrap();
    assert_eq!(record, "2, 0.5000, 0.1000, 0.2000, 0.3000, 0.4000");
  }

  #[test]
  fn empty_frames_are_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let now = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    let empty = DetectResult::default();

    let mut out = output(dir.path(), "");
    assert!(out.save(&RgbImage::new(2, 2), &empty, now).unwrap().is_none());

    let mut out = output(dir.path(), "?always");
    assert!(out.save(&RgbImage::new(2, 2), &empty, now).unwrap().is_some());
  }
}
