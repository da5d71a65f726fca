// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/rknn.rs - RKNN 运行时后端
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};

use crate::{
  asset::ModelAsset,
  descriptor::ElementType,
  model::{Interpreter, InterpreterOptions, Runtime, RuntimeError},
  tensor::OutputTensor,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct RknnRuntime;

pub struct RknnInterpreter {
  context: Context,
  tensor_type: TensorType,
  num_inputs: usize,
  num_outputs: usize,
  // 上下文存活期间保持映射
  _asset: ModelAsset,
}

impl Runtime for RknnRuntime {
  type Interpreter = RknnInterpreter;

  fn create_interpreter(
    &self,
    asset: ModelAsset,
    options: &InterpreterOptions,
  ) -> Result<Self::Interpreter, RuntimeError> {
    if options.has_extended_operators() {
      // RKNN 模型在转换时已经编译了全部算子
      debug!("RKNN 运行时无需额外的算子委托");
    }
    if let Some(threads) = options.threads() {
      debug!("RKNN 运行时忽略线程数设置: {}", threads);
    }

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&asset[..], InitFlags::default())
      .map_err(|e| RuntimeError::InvalidModel(format!("无法创建上下文: {}", e)))?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(RuntimeError::InvalidModel(format!(
          "无法查询 SDK 版本: {}",
          e
        )));
      }
    }

    let num_inputs = context.num_inputs()? as usize;
    let num_outputs = context.num_outputs()? as usize;
    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", num_outputs);

    let tensor_type = match options.element() {
      ElementType::Float32 => TensorType::Float32,
      ElementType::UInt8 => TensorType::UInt8,
    };

    Ok(RknnInterpreter {
      context,
      tensor_type,
      num_inputs,
      num_outputs,
      _asset: asset,
    })
  }
}

impl Interpreter for RknnInterpreter {
  fn input_count(&self) -> Option<usize> {
    Some(self.num_inputs)
  }

  fn output_count(&self) -> Option<usize> {
    Some(self.num_outputs)
  }

  fn invoke(&mut self, input: &[u8], outputs: &mut [OutputTensor]) -> Result<(), RuntimeError> {
    debug!("设置模型输入");
    self
      .context
      .set_input(0, input, TensorFormat::NHWC, self.tensor_type)?;

    debug!("执行模型推理");
    self.context.run()?;

    debug!("获取模型输出");
    let output = self.context.get_outputs()?;
    for tensor in outputs.iter_mut() {
      let data = output.get_f32(tensor.index)?;
      debug!(
        "输出 {} ({}): {} 个值",
        tensor.index,
        tensor.name,
        data.len()
      );
      tensor.fill(data)?;
    }

    Ok(())
  }
}
