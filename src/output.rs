// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  tensor::{DetectionOutputs, InputTensor, OutputValue},
};

pub trait Render<Input, Output>: Sized {
  type Error;
  fn render_result(&self, input: &Input, result: &Output) -> Result<(), Self::Error>;
}

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("路径编码错误: {0}")]
  PathError(#[from] std::string::FromUtf8Error),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 每个输出张量的简要描述
pub fn summarize(result: &DetectionOutputs) -> Vec<String> {
  result
    .iter()
    .map(|(name, value)| match value {
      OutputValue::Flat(values) => {
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        format!("{}: {} 个值, 最大值 {:.4}", name, values.len(), max)
      }
      OutputValue::Nested(rows) => format!(
        "{}: {} x {}",
        name,
        rows.len(),
        value.row_len().unwrap_or(0)
      ),
    })
    .collect()
}

/// 把结果写入 JSON 文件，`json:///path/to/result.json`
pub struct JsonFileOutput {
  path: PathBuf,
  pretty: bool,
}

impl FromUrlWithScheme for JsonFileOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonFileOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    let path = urlencoding::decode(url.path())?;
    Ok(JsonFileOutput {
      path: PathBuf::from(path.into_owned()),
      pretty: url.query_pairs().any(|(k, _)| k == "pretty"),
    })
  }
}

impl Render<InputTensor, DetectionOutputs> for JsonFileOutput {
  type Error = OutputError;

  fn render_result(&self, _input: &InputTensor, result: &DetectionOutputs) -> Result<(), Self::Error> {
    let file = std::io::BufWriter::new(std::fs::File::create(&self.path)?);
    if self.pretty {
      serde_json::to_writer_pretty(file, result)?;
    } else {
      serde_json::to_writer(file, result)?;
    }
    info!("结果已写入: {}", self.path.display());
    Ok(())
  }
}

/// 只在日志中输出摘要，`log://`
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(LogOutput)
  }
}

impl Render<InputTensor, DetectionOutputs> for LogOutput {
  type Error = OutputError;

  fn render_result(&self, input: &InputTensor, result: &DetectionOutputs) -> Result<(), Self::Error> {
    info!("输入 {} 字节, 输出 {} 个张量", input.len(), result.len());
    for line in summarize(result) {
      info!("  - {}", line);
    }
    Ok(())
  }
}

pub enum OutputWrapper {
  JsonFile(JsonFileOutput),
  Log(LogOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonFileOutput::SCHEME => Ok(OutputWrapper::JsonFile(JsonFileOutput::from_url(url)?)),
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecord(
        DirectoryRecordOutput::from_url(url)?,
      )),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<InputTensor, DetectionOutputs> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, input: &InputTensor, result: &DetectionOutputs) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonFile(output) => output.render_result(input, result),
      OutputWrapper::Log(output) => output.render_result(input, result),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output
        .render_result(input, result)
        .map_err(OutputError::from),
    }
  }
}
