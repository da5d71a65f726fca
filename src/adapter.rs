// 该文件是 Shanan （山南西风） 项目的一部分。
// src/adapter.rs - 推理适配器
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

use std::{
  path::PathBuf,
  sync::{Mutex, MutexGuard, PoisonError, TryLockError},
  time::Instant,
};

use tracing::{debug, error, info, warn};

use crate::{
  asset::AssetLocation,
  descriptor::ModelDescriptor,
  error::{BridgeError, InferenceError},
  model::{Interpreter, InterpreterOptions, Model, Runtime, RuntimeError},
  tensor::{DetectionOutputs, InputTensor, OutputTensor, prepare_input},
};

/// 并发调用的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ConcurrencyPolicy {
  /// 排队等待，一次只执行一个调用
  #[default]
  Queue,
  /// 解释器忙时立即拒绝
  Reject,
}

/// 适配器生命周期状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterState {
  Uninitialized,
  Ready { generation: u64, asset: PathBuf },
}

struct LoadedInterpreter<I> {
  interpreter: I,
  generation: u64,
  asset: PathBuf,
}

/// 锁内状态：当前解释器与已分配的代数
struct Slot<I> {
  loaded: Option<LoadedInterpreter<I>>,
  generation: u64,
}

type SlotGuard<'a, I> = MutexGuard<'a, Slot<I>>;

/// 持有唯一解释器实例的推理适配器
///
/// 解释器在互斥锁内独占持有，`load_interpreter` 创建或替换，
/// `unload` 显式释放。
pub struct InferenceAdapter<R: Runtime> {
  runtime: R,
  location: AssetLocation,
  descriptor: ModelDescriptor,
  options: InterpreterOptions,
  policy: ConcurrencyPolicy,
  slot: Mutex<Slot<R::Interpreter>>,
}

impl<R: Runtime> InferenceAdapter<R> {
  pub fn new(runtime: R, location: AssetLocation, descriptor: ModelDescriptor) -> Self {
    let options = InterpreterOptions::default().input_element(descriptor.input.element);
    Self {
      runtime,
      location,
      descriptor,
      options,
      policy: ConcurrencyPolicy::default(),
      slot: Mutex::new(Slot {
        loaded: None,
        generation: 0,
      }),
    }
  }

  pub fn with_options(mut self, options: InterpreterOptions) -> Self {
    self.options = options.input_element(self.descriptor.input.element);
    self
  }

  pub fn with_policy(mut self, policy: ConcurrencyPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn descriptor(&self) -> &ModelDescriptor {
    &self.descriptor
  }

  pub fn location(&self) -> &AssetLocation {
    &self.location
  }

  fn lock_slot(&self) -> SlotGuard<'_, R::Interpreter> {
    self
      .slot
      .lock()
      .unwrap_or_else(|poisoned| self.recover_slot(poisoned))
  }

  /// 推理中途 panic 会使锁中毒：丢弃可能已损坏的解释器，回到未加载状态
  fn recover_slot<'a>(
    &'a self,
    poisoned: PoisonError<SlotGuard<'a, R::Interpreter>>,
  ) -> SlotGuard<'a, R::Interpreter> {
    let mut slot = poisoned.into_inner();
    if let Some(previous) = slot.loaded.take() {
      error!("解释器 #{} 在推理中崩溃，已丢弃", previous.generation);
    }
    self.slot.clear_poison();
    slot
  }

  /// 映射模型文件并创建解释器；已有解释器时替换之
  pub fn load_interpreter(&self) -> Result<(), BridgeError> {
    self.descriptor.validate()?;
    let asset = self.location.open()?;
    let path = asset.path().to_path_buf();

    info!("创建解释器, 扩展算子: {}", self.options.has_extended_operators());
    let interpreter = self
      .runtime
      .create_interpreter(asset, &self.options)
      .map_err(BridgeError::InterpreterConstruction)?;

    if let Some(inputs) = interpreter.input_count() {
      if inputs != 1 {
        error!("预期模型输入数量为 1, 实际为 {}", inputs);
        return Err(BridgeError::InterpreterConstruction(
          RuntimeError::TensorCount {
            what: "inputs",
            expected: 1,
            actual: inputs,
          },
        ));
      }
    }

    // 只绑定描述中列出的输出，模型可以有更多输出
    let wanted = self.descriptor.outputs.len();
    if let Some(outputs) = interpreter.output_count() {
      if outputs < wanted {
        error!("预期模型输出数量至少为 {}, 实际为 {}", wanted, outputs);
        return Err(BridgeError::InterpreterConstruction(
          RuntimeError::TensorCount {
            what: "outputs",
            expected: wanted,
            actual: outputs,
          },
        ));
      }
    }

    let mut slot = self.lock_slot();
    if let Some(previous) = slot.loaded.take() {
      info!("释放旧解释器 #{}", previous.generation);
    }
    slot.generation += 1;
    let generation = slot.generation;
    slot.loaded = Some(LoadedInterpreter {
      interpreter,
      generation,
      asset: path,
    });
    info!("解释器 #{} 加载完成", generation);

    Ok(())
  }

  /// 显式释放解释器，返回之前是否已加载
  pub fn unload(&self) -> bool {
    let mut slot = self.lock_slot();
    match slot.loaded.take() {
      Some(previous) => {
        info!("释放解释器 #{}", previous.generation);
        true
      }
      None => false,
    }
  }

  pub fn state(&self) -> AdapterState {
    let slot = self.lock_slot();
    match slot.loaded.as_ref() {
      Some(loaded) => AdapterState::Ready {
        generation: loaded.generation,
        asset: loaded.asset.clone(),
      },
      None => AdapterState::Uninitialized,
    }
  }

  pub fn is_loaded(&self) -> bool {
    matches!(self.state(), AdapterState::Ready { .. })
  }

  /// 对输入张量执行一次推理
  pub fn run_model(&self, input: &[u8]) -> Result<DetectionOutputs, BridgeError> {
    let mut slot = match self.policy {
      ConcurrencyPolicy::Queue => self.lock_slot(),
      ConcurrencyPolicy::Reject => match self.slot.try_lock() {
        Ok(slot) => slot,
        Err(TryLockError::WouldBlock) => {
          warn!("解释器正忙，拒绝本次调用");
          return Err(InferenceError::Busy.into());
        }
        Err(TryLockError::Poisoned(poisoned)) => self.recover_slot(poisoned),
      },
    };

    let loaded = slot.loaded.as_mut().ok_or(BridgeError::NotLoaded)?;

    let expected = self
      .descriptor
      .input
      .byte_len()
      .or_else(|| loaded.interpreter.input_byte_len());
    let buffer = prepare_input(input, &self.descriptor.input, expected)?;
    debug!("输入张量: {} 字节", buffer.len());

    let mut outputs: Vec<OutputTensor> = self
      .descriptor
      .outputs_by_index()
      .into_iter()
      .map(OutputTensor::zeroed)
      .collect();

    let now = Instant::now();
    loaded
      .interpreter
      .invoke(&buffer, &mut outputs)
      .map_err(InferenceError::from)?;
    debug!(
      "解释器 #{} 推理完成，耗时: {:.2?}",
      loaded.generation,
      now.elapsed()
    );

    Ok(outputs.into_iter().collect())
  }
}

impl<R: Runtime> Model for InferenceAdapter<R> {
  type Input = InputTensor;
  type Output = DetectionOutputs;
  type Error = BridgeError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.run_model(input.as_bytes())
  }
}
