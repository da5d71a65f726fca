// 该文件是 Shanan （山南西风） 项目的一部分。
// src/channel/stdio.rs - 按行分隔的 JSON 通道传输
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
  io::{BufRead, Write},
  sync::atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  channel::{BridgeEndpoint, MethodCall, MethodResponse},
  error::{CHANNEL_ERROR_CODE, ErrorKind},
  model::Runtime,
};

#[derive(Error, Debug)]
pub enum StdioError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 一行请求：`{"id": 1, "method": "runModel", "arguments": {...}}`
#[derive(Debug, Deserialize)]
struct Request {
  #[serde(default)]
  id: Option<Value>,
  method: String,
  #[serde(default)]
  arguments: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct Reply<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  id: Option<Value>,
  response: &'a MethodResponse,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
  pub calls: u64,
  pub errors: u64,
  pub malformed: u64,
}

/// 逐行读取请求并写回结果，直到输入结束或收到停止信号
pub fn serve<R, In, Out>(
  endpoint: &BridgeEndpoint<R>,
  input: In,
  mut output: Out,
  stop: &AtomicBool,
) -> Result<ServeStats, StdioError>
where
  R: Runtime,
  In: BufRead,
  Out: Write,
{
  info!("通道开始服务");
  let mut stats = ServeStats::default();

  for line in input.lines() {
    if stop.load(Ordering::SeqCst) {
      warn!("收到停止信号，退出服务循环");
      break;
    }

    let line = line?;
    if line.trim().is_empty() {
      continue;
    }

    let (id, response) = match serde_json::from_str::<Request>(&line) {
      Ok(request) => {
        let call = MethodCall {
          method: request.method,
          arguments: request.arguments,
        };
        (request.id, endpoint.handle(&call))
      }
      Err(e) => {
        debug!("无法解析请求: {}", e);
        stats.malformed += 1;
        (
          None,
          MethodResponse::Error {
            code: CHANNEL_ERROR_CODE.to_string(),
            message: format!("Malformed request: {}", e),
            details: Some(json!({ "kind": ErrorKind::InvalidArgument.as_str() })),
          },
        )
      }
    };

    stats.calls += 1;
    if response.is_error() {
      stats.errors += 1;
    }

    serde_json::to_writer(
      &mut output,
      &Reply {
        id,
        response: &response,
      },
    )?;
    output.write_all(b"\n")?;
    output.flush()?;
  }

  info!(
    "通道服务结束: {} 次调用, {} 次错误",
    stats.calls, stats.errors
  );
  Ok(stats)
}
