// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 输入输出张量缓冲区
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

use std::{borrow::Cow, collections::BTreeMap};

use serde::Serialize;

use crate::{
  descriptor::{BufferMode, ElementType, InputSpec, OutputSpec},
  error::InferenceError,
  model::RuntimeError,
};

/// 调用方提供的原始输入字节，按本机字节序解释
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputTensor {
  data: Box<[u8]>,
}

impl From<Vec<u8>> for InputTensor {
  fn from(data: Vec<u8>) -> Self {
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl InputTensor {
  /// 将浮点数组按本机字节序打包
  pub fn from_f32(values: &[f32]) -> Self {
    let data: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
    Self::from(data)
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }
}

impl AsRef<[u8]> for InputTensor {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}

/// 校验输入长度并按缓冲模式准备输入
///
/// `expected` 来自模型描述或解释器，缺省时只校验元素对齐。
pub fn prepare_input<'a>(
  bytes: &'a [u8],
  spec: &InputSpec,
  expected: Option<usize>,
) -> Result<Cow<'a, [u8]>, InferenceError> {
  let element_size = spec.element.size();
  if bytes.is_empty() || bytes.len() % element_size != 0 {
    return Err(InferenceError::InputMisaligned {
      element_size,
      actual: bytes.len(),
    });
  }

  if let Some(expected) = expected {
    if bytes.len() != expected {
      return Err(InferenceError::InputSizeMismatch {
        expected,
        actual: bytes.len(),
      });
    }
  }

  Ok(match spec.buffer {
    BufferMode::Wrap => Cow::Borrowed(bytes),
    BufferMode::Copy => Cow::Owned(bytes.to_vec()),
  })
}

/// 按本机字节序把输入解释为浮点数
pub fn decode_native_f32(bytes: &[u8]) -> Vec<f32> {
  bytes
    .chunks_exact(ElementType::Float32.size())
    .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    .collect()
}

/// 预分配的输出缓冲区，形状固定
#[derive(Debug, Clone)]
pub struct OutputTensor {
  pub name: String,
  pub index: usize,
  pub shape: Vec<usize>,
  data: Vec<f32>,
}

impl OutputTensor {
  pub fn zeroed(spec: &OutputSpec) -> Self {
    Self {
      name: spec.name.clone(),
      index: spec.index,
      shape: spec.shape.clone(),
      // 溢出的形状已被 `ModelDescriptor::validate` 拒绝
      data: vec![0.0; spec.element_count().unwrap_or(0)],
    }
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn as_mut_slice(&mut self) -> &mut [f32] {
    &mut self.data
  }

  /// 从运行时输出复制数据，长度必须与形状一致
  pub fn fill(&mut self, values: &[f32]) -> Result<(), RuntimeError> {
    if values.len() != self.data.len() {
      return Err(RuntimeError::OutputShapeMismatch {
        index: self.index,
        expected: self.data.len(),
        actual: values.len(),
      });
    }
    self.data.copy_from_slice(values);
    Ok(())
  }

  /// 去掉大小为 1 的批次维度后转换为嵌套序列
  pub fn into_value(self) -> OutputValue {
    let dims: &[usize] = match self.shape.as_slice() {
      [1, rest @ ..] if !rest.is_empty() => rest,
      dims => dims,
    };

    if dims.len() <= 1 {
      return OutputValue::Flat(self.data);
    }

    let row_len: usize = dims[1..].iter().product();
    OutputValue::Nested(
      self
        .data
        .chunks_exact(row_len)
        .map(<[f32]>::to_vec)
        .collect(),
    )
  }
}

/// 单个输出张量的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputValue {
  Flat(Vec<f32>),
  Nested(Vec<Vec<f32>>),
}

impl OutputValue {
  /// 最外层序列长度
  pub fn len(&self) -> usize {
    match self {
      OutputValue::Flat(v) => v.len(),
      OutputValue::Nested(v) => v.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 每行的长度；平坦序列为 None
  pub fn row_len(&self) -> Option<usize> {
    match self {
      OutputValue::Flat(_) => None,
      OutputValue::Nested(rows) => rows.first().map(Vec::len),
    }
  }
}

/// 名称到输出结果的映射
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct DetectionOutputs {
  items: BTreeMap<String, OutputValue>,
}

impl DetectionOutputs {
  pub fn get(&self, name: &str) -> Option<&OutputValue> {
    self.items.get(name)
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.items.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputValue)> {
    self.items.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
  }
}

impl FromIterator<OutputTensor> for DetectionOutputs {
  fn from_iter<I: IntoIterator<Item = OutputTensor>>(iter: I) -> Self {
    Self {
      items: iter
        .into_iter()
        .map(|tensor| (tensor.name.clone(), tensor.into_value()))
        .collect(),
    }
  }
}
