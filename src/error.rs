// 该文件是 Shanan （山南西风） 项目的一部分。
// src/error.rs - 桥接错误定义
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

use thiserror::Error;

use crate::{descriptor::DescriptorError, model::RuntimeError};

/// 通道上返回的统一错误码
pub const CHANNEL_ERROR_CODE: &str = "ERROR";

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("input tensor has {actual} bytes, expected {expected}")]
  InputSizeMismatch { expected: usize, actual: usize },
  #[error("input tensor has {actual} bytes, not a multiple of element size {element_size}")]
  InputMisaligned { element_size: usize, actual: usize },
  #[error("interpreter is busy with another invocation")]
  Busy,
  #[error("runtime error: {0}")]
  Runtime(#[from] RuntimeError),
}

#[derive(Error, Debug)]
pub enum BridgeError {
  #[error("cannot access model asset {path}: {source}")]
  AssetAccess {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("cannot construct interpreter: {0}")]
  InterpreterConstruction(RuntimeError),
  #[error("invalid argument: {0}")]
  InvalidArgument(String),
  #[error("inference failed: {0}")]
  Inference(#[from] InferenceError),
  #[error("interpreter is not loaded")]
  NotLoaded,
  #[error("invalid model descriptor: {0}")]
  Descriptor(#[from] DescriptorError),
}

/// 错误种类，写入通道错误的 details 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  AssetAccess,
  InterpreterConstruction,
  InvalidArgument,
  Inference,
  NotLoaded,
}

impl ErrorKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorKind::AssetAccess => "AssetAccessError",
      ErrorKind::InterpreterConstruction => "InterpreterConstructionError",
      ErrorKind::InvalidArgument => "InvalidArgumentError",
      ErrorKind::Inference => "InferenceError",
      ErrorKind::NotLoaded => "NotLoadedError",
    }
  }
}

impl BridgeError {
  pub fn asset(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    BridgeError::AssetAccess {
      path: path.into(),
      source,
    }
  }

  pub fn invalid_argument(msg: impl Into<String>) -> Self {
    BridgeError::InvalidArgument(msg.into())
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      BridgeError::AssetAccess { .. } => ErrorKind::AssetAccess,
      BridgeError::InterpreterConstruction(_) | BridgeError::Descriptor(_) => {
        ErrorKind::InterpreterConstruction
      }
      BridgeError::InvalidArgument(_) => ErrorKind::InvalidArgument,
      BridgeError::Inference(_) => ErrorKind::Inference,
      BridgeError::NotLoaded => ErrorKind::NotLoaded,
    }
  }

  pub fn code(&self) -> &'static str {
    CHANNEL_ERROR_CODE
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_error_uses_the_generic_channel_code() {
    let errors = [
      BridgeError::asset("model.tflite", std::io::ErrorKind::NotFound.into()),
      BridgeError::invalid_argument("missing"),
      BridgeError::NotLoaded,
      BridgeError::from(InferenceError::Busy),
    ];
    for e in &errors {
      assert_eq!(e.code(), "ERROR");
    }
  }

  #[test]
  fn kinds_are_distinguished() {
    assert_eq!(
      BridgeError::invalid_argument("x").kind(),
      ErrorKind::InvalidArgument
    );
    assert_eq!(
      BridgeError::from(InferenceError::InputSizeMismatch {
        expected: 8,
        actual: 4
      })
      .kind(),
      ErrorKind::Inference
    );
    assert_eq!(BridgeError::NotLoaded.kind().as_str(), "NotLoadedError");
  }

  #[test]
  fn asset_error_message_names_the_path() {
    let e = BridgeError::asset("/no/such/model.tflite", std::io::ErrorKind::NotFound.into());
    assert!(e.to_string().contains("/no/such/model.tflite"));
  }
}
