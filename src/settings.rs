// 该文件是 Huoyan （火眼） 项目的一部分。
// src/settings.rs - 会话设置
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
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub const DEFAULT_THRESHOLD: f32 = 0.24;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;
pub const DEFAULT_INPUT_SIZE: u32 = 416;

#[derive(Error, Debug)]
pub enum SettingsError {
  #[error("无法读取文件 {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("锚框先验第 {line} 行不是有效的浮点数: {value:?}")]
  InvalidAnchor { line: usize, value: String },
  #[error("类别名称列表为空")]
  EmptyClassNames,
  #[error("{name} 必须位于 [0, 1] 区间, 实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("锚框先验数量必须为偶数, 实际为 {0}")]
  OddAnchorCount(usize),
  #[error("网络输入尺寸必须为正数")]
  ZeroInputSize,
}

/// 会话设置，在循环开始前构造一次，之后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  pub class_names: Vec<String>,
  pub threshold: f32,
  pub nms_threshold: f32,
  pub batch_size: NonZeroUsize,
  /// 空表示使用网络默认的锚框
  pub anchor_priors: Vec<f32>,
  pub enable_profiling: bool,
  pub input_width: u32,
  pub input_height: u32,
}

impl Settings {
  pub fn new(class_names: Vec<String>) -> Self {
    Self {
      class_names,
      threshold: DEFAULT_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      batch_size: NonZeroUsize::MIN,
      anchor_priors: Vec::new(),
      enable_profiling: false,
      input_width: DEFAULT_INPUT_SIZE,
      input_height: DEFAULT_INPUT_SIZE,
    }
  }

  /// 从类别名称文件和可选的锚框文件构造，其余字段取默认值
  pub fn load(names: &Path, anchors: Option<&Path>) -> Result<Self, SettingsError> {
    let mut settings = Self::new(read_text_file(names)?);
    if let Some(anchors) = anchors {
      settings.anchor_priors = read_anchor_priors(anchors)?;
    }
    Ok(settings)
  }

  pub fn num_classes(&self) -> usize {
    self.class_names.len()
  }

  /// 按索引查找类别名称，越界时返回 None
  pub fn class_name(&self, index: usize) -> Option<&str> {
    self.class_names.get(index).map(String::as_str)
  }

  pub fn validate(&self) -> Result<(), SettingsError> {
    if self.class_names.is_empty() {
      return Err(SettingsError::EmptyClassNames);
    }
    for (name, value) in [
      ("检测阈值", self.threshold),
      ("NMS 阈值", self.nms_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(SettingsError::ThresholdOutOfRange { name, value });
      }
    }
    if self.anchor_priors.len() % 2 != 0 {
      return Err(SettingsError::OddAnchorCount(self.anchor_priors.len()));
    }
    if self.input_width == 0 || self.input_height == 0 {
      return Err(SettingsError::ZeroInputSize);
    }
    Ok(())
  }
}

/// 读取文件的全部行，去掉首尾空白，保留空行以维持行号
fn read_lines(path: &Path) -> Result<Vec<String>, SettingsError> {
  let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(content.lines().map(|line| line.trim().to_string()).collect())
}

/// 读取文本文件，每行一个条目，忽略空行
pub fn read_text_file(path: impl AsRef<Path>) -> Result<Vec<String>, SettingsError> {
  let path = path.as_ref();
  let lines: Vec<String> = read_lines(path)?
    .into_iter()
    .filter(|line| !line.is_empty())
    .collect();
  debug!("从 {} 读取 {} 行", path.display(), lines.len());
  Ok(lines)
}

/// 按文件行解析锚框先验，空行跳过，错误中的行号从 1 开始
pub fn parse_anchor_priors<S: AsRef<str>>(lines: &[S]) -> Result<Vec<f32>, SettingsError> {
  lines
    .iter()
    .enumerate()
    .map(|(idx, line)| (idx + 1, line.as_ref().trim()))
    .filter(|(_, value)| !value.is_empty())
    .map(|(line, value)| {
      value
        .parse::<f32>()
        .map_err(|_| SettingsError::InvalidAnchor {
          line,
          value: value.to_string(),
        })
    })
    .collect()
}

pub fn read_anchor_priors(path: impl AsRef<Path>) -> Result<Vec<f32>, SettingsError> {
  let lines = read_lines(path.as_ref())?;
  parse_anchor_priors(&lines)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn text_file_skips_blank_lines_and_carriage_returns() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "person\r\n\r\nbicycle\n  car  \n").unwrap();
    let lines = read_text_file(file.path()).unwrap();
    assert_eq!(lines, vec!["person", "bicycle", "car"]);
  }

  #[test]
  fn missing_file_reports_path() {
    let err = read_text_file("/nonexistent/names.txt").unwrap_err();
    assert!(matches!(err, SettingsError::Read { ref path, .. } if path.ends_with("names.txt")));
  }

  #[test]
  fn anchors_parse_as_floats() {
    let anchors = parse_anchor_priors(&["10", "13", "16.5", "30"]).unwrap();
    assert_eq!(anchors, vec![10.0, 13.0, 16.5, 30.0]);
  }

  #[test]
  fn non_numeric_anchor_is_rejected() {
    let err = parse_anchor_priors(&["10", "abc"]).unwrap_err();
    assert!(matches!(
      err,
      SettingsError::InvalidAnchor { line: 2, ref value } if value == "abc"
    ));
  }

  #[test]
  fn validate_checks_thresholds_and_anchors() {
    let mut settings = Settings::new(vec!["a".to_string()]);
    assert!(settings.validate().is_ok());

    settings.threshold = 1.5;
    assert!(matches!(
      settings.validate(),
      Err(SettingsError::ThresholdOutOfRange { .. })
    ));

    settings.threshold = DEFAULT_THRESHOLD;
    settings.anchor_priors = vec![1.0, 2.0, 3.0];
    assert!(matches!(
      settings.validate(),
      Err(SettingsError::OddAnchorCount(3))
    ));

    let empty = Settings::new(Vec::new());
    assert!(matches!(
      empty.validate(),
      Err(SettingsError::EmptyClassNames)
    ));
  }

  #[test]
  fn load_reads_names_and_optional_anchors() {
    let mut names = tempfile::NamedTempFile::new().unwrap();
    writeln!(names, "person\ncar").unwrap();
    let mut anchors = tempfile::NamedTempFile::new().unwrap();
    writeln!(anchors, "1.5\n2").unwrap();

    let settings = Settings::load(names.path(), None).unwrap();
    assert_eq!(settings.num_classes(), 2);
    assert!(settings.anchor_priors.is_empty());

    let settings = Settings::load(names.path(), Some(anchors.path())).unwrap();
    assert_eq!(settings.anchor_priors, vec![1.5, 2.0]);
  }

  #[test]
  fn anchor_error_points_at_the_file_line() {
    let mut anchors = tempfile::NamedTempFile::new().unwrap();
    write!(anchors, "10\n\n13\n\nabc\n").unwrap();
    let err = read_anchor_priors(anchors.path()).unwrap_err();
    assert!(matches!(
      err,
      SettingsError::InvalidAnchor { line: 5, ref value } if value == "abc"
    ));

    let mut anchors = tempfile::NamedTempFile::new().unwrap();
    write!(anchors, "10\r\n\r\n13\r\n").unwrap();
    assert_eq!(read_anchor_priors(anchors.path()).unwrap(), vec![10.0, 13.0]);
  }

  #[test]
  fn class_name_lookup_is_bounds_checked() {
    let settings = Settings::new(vec!["person".to_string()]);
    assert_eq!(settings.class_name(0), Some("person"));
    assert_eq!(settings.class_name(1), None);
  }
}
