// 该文件是 Huoyan （火眼） 项目的一部分。
// src/output/terminal_keys.rs - 终端按键输入
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

use std::io::BufRead;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread;

use tracing::{info, warn};

use crate::output::{KeyInput, OutputError};

const QUIT_KEY: char = 'q';

/// 后台线程逐行读取标准输入，每行的第一个字符作为一次按键；Ctrl-C 等同于 `q`
pub struct TerminalKeys {
  rx: Receiver<char>,
}

impl TerminalKeys {
  pub fn spawn() -> Result<Self, OutputError> {
    let (tx, rx) = channel();

    let signal_tx = tx.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = signal_tx.send(QUIT_KEY);
    })?;

    thread::Builder::new()
      .name("terminal-keys".to_string())
      .spawn(move || read_keys(std::io::stdin().lock(), tx))?;

    info!("按键: 输入 q 回车退出, s 回车保存快照");
    Ok(Self { rx })
  }

  #[cfg(test)]
  fn from_channel(rx: Receiver<char>) -> Self {
    Self { rx }
  }
}

fn read_keys(input: impl BufRead, tx: Sender<char>) {
  for line in input.lines() {
    let line = match line {
      Ok(line) => line,
      Err(e) => {
        warn!("读取标准输入失败: {}", e);
        break;
      }
    };
    if let Some(key) = line.trim().chars().next()
      && tx.send(key).is_err()
    {
      break;
    }
  }
}

impl KeyInput for TerminalKeys {
  fn poll(&mut self) -> Option<char> {
    match self.rx.try_recv() {
      Ok(key) => Some(key),
      Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
    }
  }
}

/// 不接收任何按键
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeys;

impl KeyInput for NoKeys {
  fn poll(&mut self) -> Option<char> {
    None
  }
}
