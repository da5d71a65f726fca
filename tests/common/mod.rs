// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/common/mod.rs - 测试用模拟运行时
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

#![allow(dead_code)]

use std::{
  io::Write,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
    mpsc::Sender,
  },
  time::Duration,
};

use shanan_bridge::{
  BridgeEndpoint, InferenceAdapter, ModelDescriptor,
  asset::{AssetLocation, ModelAsset},
  model::{Interpreter, InterpreterOptions, Runtime, RuntimeError},
  tensor::{InputTensor, OutputTensor, decode_native_f32},
};

pub const MOCK_MAGIC: &[u8] = b"MOCKMODEL";
pub const INPUT_FLOATS: usize = 16;

/// 模拟的外部运行时：输出由输入确定性地生成
#[derive(Clone, Default)]
pub struct MockRuntime {
  pub stats: Arc<CallStats>,
  pub delay: Duration,
  pub entered: Option<Sender<()>>,
}

/// 记录调用次数和重叠执行次数
#[derive(Default)]
pub struct CallStats {
  pub busy: AtomicBool,
  pub overlaps: AtomicUsize,
  pub invocations: AtomicUsize,
  pub created: AtomicUsize,
}

pub struct MockInterpreter {
  stats: Arc<CallStats>,
  delay: Duration,
  entered: Option<Sender<()>>,
  extended_operators: bool,
}

impl Runtime for MockRuntime {
  type Interpreter = MockInterpreter;

  fn create_interpreter(
    &self,
    asset: ModelAsset,
    options: &InterpreterOptions,
  ) -> Result<Self::Interpreter, RuntimeError> {
    if !asset.starts_with(MOCK_MAGIC) {
      return Err(RuntimeError::InvalidModel("unknown model format".to_string()));
    }
    self.stats.created.fetch_add(1, Ordering::SeqCst);
    Ok(MockInterpreter {
      stats: Arc::clone(&self.stats),
      delay: self.delay,
      entered: self.entered.clone(),
      extended_operators: options.has_extended_operators(),
    })
  }
}

impl Interpreter for MockInterpreter {
  fn input_count(&self) -> Option<usize> {
    Some(1)
  }

  fn invoke(&mut self, input: &[u8], outputs: &mut [OutputTensor]) -> Result<(), RuntimeError> {
    if !self.extended_operators {
      return Err(RuntimeError::Delegate(
        "operator not in the core set".to_string(),
      ));
    }
    if input.len() != INPUT_FLOATS * 4 {
      return Err(RuntimeError::InputShapeMismatch {
        expected: INPUT_FLOATS * 4,
        actual: input.len(),
      });
    }

    if self.stats.busy.swap(true, Ordering::SeqCst) {
      self.stats.overlaps.fetch_add(1, Ordering::SeqCst);
    }
    self.stats.invocations.fetch_add(1, Ordering::SeqCst);
    if let Some(entered) = &self.entered {
      let _ = entered.send(());
    }

    let seed: f32 = decode_native_f32(input).iter().sum();
    for tensor in outputs.iter_mut() {
      let index = tensor.index as f32;
      for (j, value) in tensor.as_mut_slice().iter_mut().enumerate() {
        *value = (seed + index * 0.5 + j as f32 * 0.001).sin();
      }
      if !self.delay.is_zero() {
        std::thread::sleep(self.delay);
      }
    }

    self.stats.busy.store(false, Ordering::SeqCst);
    Ok(())
  }
}

pub fn model_file(content: &[u8]) -> tempfile::NamedTempFile {
  let mut file = tempfile::NamedTempFile::new().unwrap();
  file.write_all(content).unwrap();
  file.flush().unwrap();
  file
}

pub fn mock_model() -> tempfile::NamedTempFile {
  model_file(&[MOCK_MAGIC, &[0u8; 64][..]].concat())
}

pub fn input(seed: f32) -> InputTensor {
  let values: Vec<f32> = (0..INPUT_FLOATS).map(|i| seed + i as f32 * 0.25).collect();
  InputTensor::from_f32(&values)
}

pub fn adapter(
  runtime: MockRuntime,
  file: &tempfile::NamedTempFile,
  descriptor: ModelDescriptor,
) -> InferenceAdapter<MockRuntime> {
  InferenceAdapter::new(runtime, AssetLocation::new(file.path()), descriptor)
}

pub fn endpoint(
  file: &tempfile::NamedTempFile,
  descriptor: ModelDescriptor,
) -> BridgeEndpoint<MockRuntime> {
  BridgeEndpoint::new(adapter(MockRuntime::default(), file, descriptor))
}
