// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 推理运行时抽象
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

use crate::{asset::ModelAsset, descriptor::ElementType, tensor::OutputTensor};

/// 同步推理模型
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

#[derive(Error, Debug)]
pub enum RuntimeError {
  #[error("invalid model: {0}")]
  InvalidModel(String),
  #[error("delegate error: {0}")]
  Delegate(String),
  #[error("model has {actual} {what}, expected {expected}")]
  TensorCount {
    what: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("input tensor has {actual} bytes, runtime expects {expected}")]
  InputShapeMismatch { expected: usize, actual: usize },
  #[error("output tensor {index} holds {actual} values, expected {expected}")]
  OutputShapeMismatch {
    index: usize,
    expected: usize,
    actual: usize,
  },
  #[error("execution failed: {0}")]
  Execution(String),
  #[cfg(feature = "npu")]
  #[error("RKNN error: {0}")]
  Rknn(rknpu::Error),
}

#[cfg(feature = "npu")]
impl From<rknpu::Error> for RuntimeError {
  fn from(err: rknpu::Error) -> Self {
    RuntimeError::Rknn(err)
  }
}

/// 构建解释器时的运行时选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterOptions {
  extended_operators: bool,
  input_element: ElementType,
  num_threads: Option<usize>,
}

impl Default for InterpreterOptions {
  fn default() -> Self {
    // 模型使用了核心算子集之外的算子，默认启用扩展算子委托
    Self {
      extended_operators: true,
      input_element: ElementType::default(),
      num_threads: None,
    }
  }
}

impl InterpreterOptions {
  pub fn extended_operators(mut self, enabled: bool) -> Self {
    self.extended_operators = enabled;
    self
  }

  pub fn input_element(mut self, element: ElementType) -> Self {
    self.input_element = element;
    self
  }

  pub fn num_threads(mut self, num_threads: Option<usize>) -> Self {
    self.num_threads = num_threads;
    self
  }

  pub fn has_extended_operators(&self) -> bool {
    self.extended_operators
  }

  pub fn element(&self) -> ElementType {
    self.input_element
  }

  pub fn threads(&self) -> Option<usize> {
    self.num_threads
  }
}

/// 已加载的模型图，一次只允许一个调用
pub trait Interpreter: Send {
  fn input_count(&self) -> Option<usize> {
    None
  }

  fn output_count(&self) -> Option<usize> {
    None
  }

  /// 运行时期望的输入字节数；未知时返回 None
  fn input_byte_len(&self) -> Option<usize> {
    None
  }

  /// 输入绑定到索引 0，输出按各自索引绑定，同步执行
  fn invoke(&mut self, input: &[u8], outputs: &mut [OutputTensor]) -> Result<(), RuntimeError>;
}

/// 外部推理运行时
pub trait Runtime: Send + Sync {
  type Interpreter: Interpreter;

  fn create_interpreter(
    &self,
    asset: ModelAsset,
    options: &InterpreterOptions,
  ) -> Result<Self::Interpreter, RuntimeError>;
}

#[cfg(feature = "npu")]
mod rknn;
#[cfg(feature = "npu")]
pub use self::rknn::{RknnInterpreter, RknnRuntime};
