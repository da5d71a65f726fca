// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/stdio.rs - 按行 JSON 传输测试
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

mod common;

use std::{io::Cursor, sync::atomic::AtomicBool};

use serde_json::{Value, json};
use shanan_bridge::{ModelDescriptor, channel::stdio::serve, descriptor::OutputSpec};

use common::{endpoint, input, mock_model};

fn tiny_descriptor() -> ModelDescriptor {
  ModelDescriptor {
    name: "tiny".to_string(),
    input: Default::default(),
    outputs: vec![
      OutputSpec::new("detection_boxes", 0, &[1, 2, 4]),
      OutputSpec::new("detection_scores", 1, &[2]),
    ],
  }
}

fn replies(requests: &[String]) -> (Vec<Value>, shanan_bridge::channel::stdio::ServeStats) {
  let file = mock_model();
  let endpoint = endpoint(&file, tiny_descriptor());
  let stop = AtomicBool::new(false);
  let mut out = Vec::new();
  let stats = serve(
    &endpoint,
    Cursor::new(requests.join("\n")),
    &mut out,
    &stop,
  )
  .unwrap();

  let lines = String::from_utf8(out).unwrap();
  let replies = lines
    .lines()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect();
  (replies, stats)
}

#[test]
fn serves_a_session() {
  let bytes: Vec<u8> = input(1.0).as_bytes().to_vec();
  let requests = vec![
    json!({ "id": 1, "method": "runModel", "arguments": { "inputTensor": bytes } }).to_string(),
    json!({ "id": 2, "method": "loadInterpreter" }).to_string(),
    String::new(),
    json!({ "id": 3, "method": "runModel", "arguments": { "inputTensor": bytes } }).to_string(),
    json!({ "id": "x", "method": "shutdown" }).to_string(),
  ];

  let (replies, stats) = replies(&requests);
  assert_eq!(replies.len(), 4);

  assert_eq!(replies[0]["id"], json!(1));
  assert_eq!(replies[0]["response"]["error"]["code"], json!("ERROR"));
  assert_eq!(
    replies[0]["response"]["error"]["details"]["kind"],
    json!("NotLoadedError")
  );

  assert_eq!(
    replies[1],
    json!({ "id": 2, "response": { "success": "Interpreter loaded successfully" } })
  );

  let result = &replies[2]["response"]["success"];
  assert_eq!(result["detection_boxes"].as_array().unwrap().len(), 2);
  assert_eq!(result["detection_scores"].as_array().unwrap().len(), 2);

  assert_eq!(
    replies[3],
    json!({ "id": "x", "response": "notImplemented" })
  );

  assert_eq!(stats.calls, 4);
  assert_eq!(stats.errors, 1);
  assert_eq!(stats.malformed, 0);
}

#[test]
fn malformed_request_gets_an_error_reply() {
  let requests = vec![
    "{ not json".to_string(),
    json!({ "method": "loadInterpreter" }).to_string(),
  ];

  let (replies, stats) = replies(&requests);
  assert_eq!(replies.len(), 2);
  assert!(replies[0].get("id").is_none());
  assert_eq!(
    replies[0]["response"]["error"]["details"]["kind"],
    json!("InvalidArgumentError")
  );
  assert!(replies[1]["response"]["success"].is_string());
  assert_eq!(stats.malformed, 1);
}

#[test]
fn stop_flag_ends_the_loop() {
  let file = mock_model();
  let endpoint = endpoint(&file, tiny_descriptor());
  let stop = AtomicBool::new(true);
  let mut out = Vec::new();
  let stats = serve(
    &endpoint,
    Cursor::new(json!({ "method": "loadInterpreter" }).to_string()),
    &mut out,
    &stop,
  )
  .unwrap();
  assert_eq!(stats.calls, 0);
  assert!(out.is_empty());
}
