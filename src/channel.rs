// 该文件是 Shanan （山南西风） 项目的一部分。
// src/channel.rs - 方法通道端点
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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, error, info};

use crate::{
  adapter::InferenceAdapter,
  error::{BridgeError, CHANNEL_ERROR_CODE},
  model::Runtime,
};

pub mod stdio;

/// 通道名称
pub const CHANNEL_NAME: &str = "com.example.ocr_tf/tflite";

pub const METHOD_LOAD_INTERPRETER: &str = "loadInterpreter";
pub const METHOD_RUN_MODEL: &str = "runModel";
pub const ARG_INPUT_TENSOR: &str = "inputTensor";

pub const LOAD_SUCCESS_MESSAGE: &str = "Interpreter loaded successfully";

/// 宿主发来的一次方法调用
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodCall {
  pub method: String,
  #[serde(default)]
  pub arguments: Map<String, Value>,
}

impl MethodCall {
  pub fn new(method: &str) -> Self {
    Self {
      method: method.to_string(),
      arguments: Map::new(),
    }
  }

  pub fn with_argument(mut self, key: &str, value: Value) -> Self {
    self.arguments.insert(key.to_string(), value);
    self
  }

  /// 构造 runModel 调用，字节序列编码为整数数组
  pub fn run_model(input: &[u8]) -> Self {
    Self::new(METHOD_RUN_MODEL).with_argument(
      ARG_INPUT_TENSOR,
      Value::Array(input.iter().map(|b| Value::from(*b)).collect()),
    )
  }

  /// 读取字节序列参数
  pub fn bytes_argument(&self, key: &str) -> Result<Vec<u8>, BridgeError> {
    let value = self
      .arguments
      .get(key)
      .ok_or_else(|| BridgeError::invalid_argument(format!("missing required argument `{}`", key)))?;

    let items = value.as_array().ok_or_else(|| {
      BridgeError::invalid_argument(format!("argument `{}` must be a byte sequence", key))
    })?;

    items
      .iter()
      .enumerate()
      .map(|(i, item)| {
        item
          .as_u64()
          .and_then(|v| u8::try_from(v).ok())
          .ok_or_else(|| {
            BridgeError::invalid_argument(format!(
              "argument `{}` element {} is not a byte: {}",
              key, i, item
            ))
          })
      })
      .collect()
  }
}

/// 方法调用的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MethodResponse {
  Success(Value),
  Error {
    code: String,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
  },
  NotImplemented,
}

impl MethodResponse {
  fn from_error(context: &str, err: &BridgeError) -> Self {
    MethodResponse::Error {
      code: CHANNEL_ERROR_CODE.to_string(),
      message: format!("{}: {}", context, err),
      details: Some(json!({ "kind": err.kind().as_str() })),
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, MethodResponse::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, MethodResponse::Error { .. })
  }

  /// 错误种类，取自 details 字段
  pub fn error_kind(&self) -> Option<&str> {
    match self {
      MethodResponse::Error {
        details: Some(details),
        ..
      } => details.get("kind").and_then(Value::as_str),
      _ => None,
    }
  }
}

/// 通道端点：把方法调用分派给推理适配器
pub struct BridgeEndpoint<R: Runtime> {
  adapter: InferenceAdapter<R>,
}

impl<R: Runtime> BridgeEndpoint<R> {
  pub fn new(adapter: InferenceAdapter<R>) -> Self {
    Self { adapter }
  }

  pub fn adapter(&self) -> &InferenceAdapter<R> {
    &self.adapter
  }

  pub fn handle(&self, call: &MethodCall) -> MethodResponse {
    debug!("收到方法调用: {}", call.method);
    match call.method.as_str() {
      METHOD_LOAD_INTERPRETER => match self.adapter.load_interpreter() {
        Ok(()) => {
          info!("{}", LOAD_SUCCESS_MESSAGE);
          MethodResponse::Success(Value::String(LOAD_SUCCESS_MESSAGE.to_string()))
        }
        Err(e) => {
          error!("加载解释器失败: {}", e);
          MethodResponse::from_error("Failed to load interpreter", &e)
        }
      },
      METHOD_RUN_MODEL => match self.run_model(call) {
        Ok(value) => MethodResponse::Success(value),
        Err(e) => {
          error!("模型推理失败: {}", e);
          MethodResponse::from_error("Failed to run model inference", &e)
        }
      },
      other => {
        debug!("未实现的方法: {}", other);
        MethodResponse::NotImplemented
      }
    }
  }

  fn run_model(&self, call: &MethodCall) -> Result<Value, BridgeError> {
    let input = call.bytes_argument(ARG_INPUT_TENSOR)?;
    let outputs = self.adapter.run_model(&input)?;
    Ok(outputs.to_json())
  }
}
