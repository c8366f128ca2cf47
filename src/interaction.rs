// 该文件是 Huoyan （火眼） 项目的一部分。
// src/interaction.rs - 交互控制
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

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::frame::RgbNhwcFrame;

const SNAPSHOT_PREFIX: &str = "frame_";
const SNAPSHOT_TIME_FORMAT: &str = "%d%m%Y%H%M%S";
const SNAPSHOT_EXTENSION: &str = "png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
  Continue,
  Save,
  Quit,
}

impl SessionCommand {
  pub fn resolve(key: Option<char>) -> Self {
    match key {
      Some('q') => SessionCommand::Quit,
      Some('s') => SessionCommand::Save,
      _ => SessionCommand::Continue,
    }
  }
}

pub trait Clock {
  fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Local> {
    Local::now()
  }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
  fn now(&self) -> DateTime<Local> {
    (**self).now()
  }
}

/// `frame_<日><月><年><时><分><秒>.png`
pub fn snapshot_path(directory: &Path, now: DateTime<Local>) -> PathBuf {
  directory.join(format!(
    "{}{}.{}",
    SNAPSHOT_PREFIX,
    now.format(SNAPSHOT_TIME_FORMAT),
    SNAPSHOT_EXTENSION
  ))
}

pub struct InteractionController<C = SystemClock> {
  directory: PathBuf,
  clock: C,
}

impl<C: Clock> InteractionController<C> {
  pub fn with_clock(directory: impl Into<PathBuf>, clock: C) -> Self {
    Self {
      directory: directory.into(),
      clock,
    }
  }

  /// 解析按键并执行对应的副作用；保存失败不影响返回的命令
  pub fn handle(&self, key: Option<char>, frame: &RgbNhwcFrame) -> SessionCommand {
    let command = SessionCommand::resolve(key);
    if command == SessionCommand::Save {
      self.save_snapshot(frame);
    }
    command
  }

  fn save_snapshot(&self, frame: &RgbNhwcFrame) -> Option<PathBuf> {
    let path = snapshot_path(&self.directory, self.clock.now());
    match frame.to_rgb_image().save(&path) {
      Ok(()) => {
        info!("保存快照: {}", path.display());
        Some(path)
      }
      Err(e) => {
        warn!("保存快照 {} 失败: {}", path.display(), e);
        None
      }
    }
  }
}
