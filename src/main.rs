// 该文件是 Huoyan （火眼） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use huoyan::{
  FromUrl,
  input::InputWrapper,
  model::YoloPipelineFactory,
  output::{OutputWrapper, TerminalKeys},
  session::{SessionBuilder, StartupError},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  let settings = args.settings().map_err(StartupError::from)?;
  match &args.source {
    Some(url) => info!("输入来源: {}", url),
    None => info!("输入来源: 摄像头 {}", args.camera),
  }
  info!("渲染输出: {}", args.display);

  let keys = TerminalKeys::spawn().map_err(StartupError::Keys)?;
  let session = SessionBuilder::new(settings, &args.network, &args.model)
    .snapshot_dir(&args.snapshot_dir)
    .start(
      &YoloPipelineFactory::default(),
      || match &args.source {
        Some(url) => InputWrapper::from_url(url),
        None => InputWrapper::camera(args.camera),
      },
      || OutputWrapper::from_url(&args.display),
      keys,
    )?;

  let summary = session.run()?;
  info!("共处理 {} 帧, 成功退出", summary.frames);

  Ok(())
}
