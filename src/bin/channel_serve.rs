// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/channel_serve.rs - 标准输入输出上的方法通道服务
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_bridge::{
  BridgeEndpoint, ConcurrencyPolicy, FromUrl, InferenceAdapter, ModelDescriptor, Preset,
  asset::AssetLocation,
  channel::CHANNEL_NAME,
  model::{InterpreterOptions, RknnRuntime},
  task::{ServeTask, Task},
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型文件路径，asset:///path/to/model
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  #[arg(long, value_enum, default_value = "raw-anchor")]
  pub preset: Preset,
  /// JSON 模型描述文件
  #[arg(long, value_name = "FILE")]
  pub descriptor: Option<PathBuf>,
  /// 并发调用策略
  #[arg(long, value_enum, default_value = "queue")]
  pub policy: ConcurrencyPolicy,
  /// 关闭扩展算子委托
  #[arg(long)]
  pub no_extended_ops: bool,
}

fn main() -> Result<()> {
  // 标准输出留给通道应答
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  info!("通道: {}", CHANNEL_NAME);
  info!("模型文件路径: {}", args.model);

  let descriptor = match &args.descriptor {
    Some(path) => ModelDescriptor::from_json_file(path)?,
    None => ModelDescriptor::from(args.preset),
  };

  let adapter = InferenceAdapter::new(RknnRuntime, AssetLocation::from_url(&args.model)?, descriptor)
    .with_options(InterpreterOptions::default().extended_operators(!args.no_extended_ops))
    .with_policy(args.policy);
  let endpoint = BridgeEndpoint::new(adapter);

  let stdin = std::io::stdin();
  let stdout = std::io::stdout();
  ServeTask.run_task(stdin.lock(), &endpoint, stdout.lock())?;

  Ok(())
}
