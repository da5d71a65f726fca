// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 输入张量来源
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

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, descriptor::InputSpec, tensor::InputTensor};

mod tensor_file;
pub use self::tensor_file::{TensorFileInput, TensorFileInputError};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Tensor file input error: {0}")]
  TensorFileInputError(#[from] TensorFileInputError),
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  TensorFile(TensorFileInput),
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() == TensorFileInput::SCHEME {
      let input = TensorFileInput::from_url(url)?;
      return Ok(InputWrapper::TensorFile(input));
    }
    #[cfg(feature = "read_image_file")]
    {
      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl InputWrapper {
  /// 按模型输入描述调整输入；原始张量文件原样传递
  pub fn conform(&mut self, spec: &InputSpec) {
    match self {
      InputWrapper::TensorFile(_) => {}
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.conform(spec),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = InputTensor;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::TensorFile(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
    }
  }
}
