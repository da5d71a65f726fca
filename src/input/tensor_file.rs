// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/tensor_file.rs - 原始张量文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, tensor::InputTensor};

#[derive(Error, Debug)]
pub enum TensorFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Bad path encoding: {0}")]
  PathError(std::string::FromUtf8Error),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 读取按本机字节序保存的原始输入张量
pub struct TensorFileInput {
  tensor: Option<InputTensor>,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorFileInput {
  type Error = TensorFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorFileInputError::SchemaMismatch);
    }

    let path = urlencoding::decode(url.path()).map_err(TensorFileInputError::PathError)?;
    let data = std::fs::read(path.as_ref())?;
    debug!("读取张量文件 {}: {} 字节", path, data.len());

    Ok(TensorFileInput {
      tensor: Some(InputTensor::from(data)),
    })
  }
}

impl Iterator for TensorFileInput {
  type Item = InputTensor;

  fn next(&mut self) -> Option<Self::Item> {
    self.tensor.take()
  }
}
