// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_oneshot.rs - 单次推理
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
  FromUrl, InferenceAdapter, ModelDescriptor, Preset,
  asset::AssetLocation,
  input::InputWrapper,
  model::{InterpreterOptions, RknnRuntime},
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Shanan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型文件路径，asset:///path/to/model
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，tensor:// 或 image://
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，json:// log:// 或 folder://
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  /// 内置模型描述
  #[arg(long, value_enum, default_value = "raw-anchor")]
  pub preset: Preset,
  /// JSON 模型描述文件，优先于内置描述
  #[arg(long, value_name = "FILE")]
  pub descriptor: Option<PathBuf>,
  /// 关闭扩展算子委托
  #[arg(long)]
  pub no_extended_ops: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let descriptor = match &args.descriptor {
    Some(path) => ModelDescriptor::from_json_file(path)?,
    None => ModelDescriptor::from(args.preset),
  };
  info!("模型描述: {}", descriptor.name);

  let adapter = InferenceAdapter::new(RknnRuntime, AssetLocation::from_url(&args.model)?, descriptor)
    .with_options(InterpreterOptions::default().extended_operators(!args.no_extended_ops));
  adapter.load_interpreter()?;

  let mut input = InputWrapper::from_url(&args.input)?;
  input.conform(&adapter.descriptor().input);
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask.run_task(input, &adapter, output)?;

  Ok(())
}
