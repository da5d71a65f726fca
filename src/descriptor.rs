// 该文件是 Shanan （山南西风） 项目的一部分。
// src/descriptor.rs - 模型输入输出描述
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

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const RAW_ANCHOR_NUM: usize = 81840;
const MAX_DETECTIONS: usize = 100;
const BOX_COORDS: usize = 4;
const MULTICLASS_SCORE_NUM: usize = 2;

#[derive(Error, Debug)]
pub enum DescriptorError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("descriptor declares no outputs")]
  NoOutputs,
  #[error("duplicate output name `{0}`")]
  DuplicateName(String),
  #[error("output indices must be exactly 0..{count}, found {index}")]
  BadIndex { index: usize, count: usize },
  #[error("tensor `{0}` has an empty or zero-sized shape")]
  BadShape(String),
  #[error("tensor `{0}` is too large to allocate")]
  ShapeOverflow(String),
}

/// 元素总数，溢出时返回 None
fn checked_elements(shape: &[usize]) -> Option<usize> {
  shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// 字节数，超过单次分配上限时返回 None
fn checked_bytes(shape: &[usize], element_size: usize) -> Option<usize> {
  checked_elements(shape)
    .and_then(|count| count.checked_mul(element_size))
    .filter(|&bytes| bytes <= isize::MAX as usize)
}

/// 输入张量的元素类型，按本机字节序解释
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
  #[default]
  Float32,
  UInt8,
}

impl ElementType {
  pub fn size(&self) -> usize {
    match self {
      ElementType::Float32 => 4,
      ElementType::UInt8 => 1,
    }
  }
}

/// 输入缓冲区的准备方式：直接借用调用方字节，或复制到新分配的缓冲区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferMode {
  #[default]
  Wrap,
  Copy,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputSpec {
  /// 输入形状；缺省时不校验长度，由调用方保证
  #[serde(default)]
  pub shape: Option<Vec<usize>>,
  #[serde(default)]
  pub element: ElementType,
  #[serde(default)]
  pub buffer: BufferMode,
}

impl InputSpec {
  /// 输入字节数；未声明形状或形状溢出时为 None（后者由 `validate` 拒绝）
  pub fn byte_len(&self) -> Option<usize> {
    self
      .shape
      .as_deref()
      .and_then(|shape| checked_bytes(shape, self.element.size()))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
  pub name: String,
  pub index: usize,
  pub shape: Vec<usize>,
}

impl OutputSpec {
  pub fn new(name: &str, index: usize, shape: &[usize]) -> Self {
    Self {
      name: name.to_string(),
      index,
      shape: shape.to_vec(),
    }
  }

  /// 元素总数；f32 缓冲区无法分配时为 None
  pub fn element_count(&self) -> Option<usize> {
    checked_bytes(&self.shape, size_of::<f32>()).map(|bytes| bytes / size_of::<f32>())
  }
}

/// 模型描述：输出张量名称到形状的映射，以及输入约定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
  pub name: String,
  #[serde(default)]
  pub input: InputSpec,
  pub outputs: Vec<OutputSpec>,
}

/// 内置的模型描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
  /// 原始锚框输出：boxes / scores / classes
  RawAnchor,
  /// 完整检测输出：后处理结果与原始锚框数据共 8 个张量
  FullDetection,
}

impl From<Preset> for ModelDescriptor {
  fn from(preset: Preset) -> Self {
    match preset {
      Preset::RawAnchor => ModelDescriptor::raw_anchor(),
      Preset::FullDetection => ModelDescriptor::full_detection(),
    }
  }
}

impl ModelDescriptor {
  pub fn raw_anchor() -> Self {
    Self {
      name: "raw-anchor".to_string(),
      input: InputSpec::default(),
      outputs: vec![
        OutputSpec::new("detection_boxes", 0, &[1, RAW_ANCHOR_NUM, BOX_COORDS]),
        OutputSpec::new("detection_scores", 1, &[MAX_DETECTIONS]),
        OutputSpec::new("detection_classes", 2, &[MAX_DETECTIONS]),
      ],
    }
  }

  pub fn full_detection() -> Self {
    Self {
      name: "full-detection".to_string(),
      input: InputSpec {
        buffer: BufferMode::Copy,
        ..InputSpec::default()
      },
      outputs: vec![
        OutputSpec::new("detection_anchor_indices", 0, &[1, MAX_DETECTIONS]),
        OutputSpec::new("detection_boxes", 1, &[1, MAX_DETECTIONS, BOX_COORDS]),
        OutputSpec::new("detection_classes", 2, &[1, MAX_DETECTIONS]),
        OutputSpec::new(
          "detection_multiclass_scores",
          3,
          &[1, MAX_DETECTIONS, MULTICLASS_SCORE_NUM],
        ),
        OutputSpec::new("detection_scores", 4, &[1, MAX_DETECTIONS]),
        OutputSpec::new("num_detections", 5, &[1]),
        OutputSpec::new("raw_detection_boxes", 6, &[1, RAW_ANCHOR_NUM, BOX_COORDS]),
        OutputSpec::new(
          "raw_detection_scores",
          7,
          &[1, RAW_ANCHOR_NUM, MULTICLASS_SCORE_NUM],
        ),
      ],
    }
  }

  pub fn with_input_shape(mut self, shape: &[usize], element: ElementType) -> Self {
    self.input.shape = Some(shape.to_vec());
    self.input.element = element;
    self
  }

  pub fn with_buffer_mode(mut self, buffer: BufferMode) -> Self {
    self.input.buffer = buffer;
    self
  }

  pub fn from_json_str(s: &str) -> Result<Self, DescriptorError> {
    let descriptor: ModelDescriptor = serde_json::from_str(s)?;
    descriptor.validate()?;
    Ok(descriptor)
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DescriptorError> {
    let path = path.as_ref();
    debug!("读取模型描述文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    Self::from_json_str(&content)
  }

  /// 校验：名称唯一，索引恰好覆盖 0..N-1，形状非空且无零维
  pub fn validate(&self) -> Result<(), DescriptorError> {
    if self.outputs.is_empty() {
      return Err(DescriptorError::NoOutputs);
    }

    let count = self.outputs.len();
    let mut names = HashSet::new();
    let mut indices = HashSet::new();
    for output in &self.outputs {
      if !names.insert(output.name.as_str()) {
        return Err(DescriptorError::DuplicateName(output.name.clone()));
      }
      if output.index >= count || !indices.insert(output.index) {
        return Err(DescriptorError::BadIndex {
          index: output.index,
          count,
        });
      }
      if output.shape.is_empty() || output.shape.contains(&0) {
        return Err(DescriptorError::BadShape(output.name.clone()));
      }
      if output.element_count().is_none() {
        return Err(DescriptorError::ShapeOverflow(output.name.clone()));
      }
    }

    if let Some(shape) = &self.input.shape {
      if shape.is_empty() || shape.contains(&0) {
        return Err(DescriptorError::BadShape("input".to_string()));
      }
      if self.input.byte_len().is_none() {
        return Err(DescriptorError::ShapeOverflow("input".to_string()));
      }
    }

    Ok(())
  }

  /// 按张量索引排序的输出描述
  pub fn outputs_by_index(&self) -> Vec<&OutputSpec> {
    let mut outputs: Vec<&OutputSpec> = self.outputs.iter().collect();
    outputs.sort_by_key(|o| o.index);
    outputs
  }
}
