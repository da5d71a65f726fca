// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理性能测试
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

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
  task::{RepeatShotTask, Task},
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型文件路径
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  #[arg(long, value_enum, default_value = "raw-anchor")]
  pub preset: Preset,
  /// JSON 模型描述文件，优先于内置描述
  #[arg(long, value_name = "FILE")]
  pub descriptor: Option<PathBuf>,
  /// 关闭扩展算子委托
  #[arg(long)]
  pub no_extended_ops: bool,
  /// 重复次数
  #[arg(long, default_value = "1000")]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("重复次数: {}", args.repeat);

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

  RepeatShotTask::default()
    .with_repeat_times(args.repeat)
    .run_task(input, &adapter, output)?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_descriptor_and_delegate_flags() {
    let args = Args::try_parse_from([
      "benchmark-repeatshot",
      "--model",
      "asset:///data/model.rknn",
      "--input",
      "tensor:///data/input.bin",
      "--descriptor",
      "/data/model.json",
      "--no-extended-ops",
    ])
    .unwrap();
    assert_eq!(args.descriptor, Some(PathBuf::from("/data/model.json")));
    assert!(args.no_extended_ops);
    assert_eq!(args.repeat, 1000);
  }
}
