// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use chrono::{Datelike, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Render,
  tensor::{DetectionOutputs, InputTensor, OutputValue},
};

const SCORE_OUTPUT: &str = "detection_scores";

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("分数阈值无效: {0}")]
  BadThreshold(String),
  #[error("路径编码错误: {0}")]
  PathError(#[from] std::string::FromUtf8Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("计数器锁中毒")]
  LockPoisoned,
}

/// 按日期分目录记录推理结果
///
/// `folder:///var/record?score=0.5` 只记录最高分不低于阈值的结果，
/// 带 `always` 参数时记录所有结果。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counters: Arc<Mutex<u16>>,
  min_score: f32,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mut min_score = 0.0;
    for (k, v) in uri.query_pairs() {
      if k == "score" {
        min_score = v
          .parse()
          .map_err(|_| DirectoryRecordOutputError::BadThreshold(v.to_string()))?;
      }
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    let directory = urlencoding::decode(uri.path())?;

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(directory.as_ref()),
      frame_counters: Arc::new(Mutex::new(0)),
      min_score,
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counters
      .lock()
      .map_err(|_| DirectoryRecordOutputError::LockPoisoned)?;
    let id = counter.wrapping_add(1);
    *counter = id;
    Ok(id)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.json",
      now.format("%H-%M-%S"),
      self.frame_id()?
    )))
  }

  fn best_score(result: &DetectionOutputs) -> Option<f32> {
    match result.get(SCORE_OUTPUT)? {
      OutputValue::Flat(scores) => scores.iter().copied().reduce(f32::max),
      OutputValue::Nested(rows) => rows.iter().flatten().copied().reduce(f32::max),
    }
  }

  fn should_record(&self, result: &DetectionOutputs) -> bool {
    self.always
      || Self::best_score(result)
        .map(|score| score >= self.min_score)
        .unwrap_or(false)
  }
}

impl Render<InputTensor, DetectionOutputs> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    _input: &InputTensor,
    result: &DetectionOutputs,
  ) -> Result<(), Self::Error> {
    if !self.should_record(result) {
      debug!("结果低于分数阈值 {}, 跳过记录", self.min_score);
      return Ok(());
    }

    let path = self.frame_path()?;
    let file = std::io::BufWriter::new(std::fs::File::create(&path)?);
    serde_json::to_writer(file, result)?;
    debug!("结果已记录: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{descriptor::OutputSpec, tensor::OutputTensor};

  fn outputs(scores: &[f32]) -> DetectionOutputs {
    let mut tensor = OutputTensor::zeroed(&OutputSpec::new(SCORE_OUTPUT, 0, &[scores.len()]));
    tensor.fill(scores).unwrap();
    std::iter::once(tensor).collect()
  }

  fn recorded_files(dir: &std::path::Path) -> usize {
    fn walk(dir: &std::path::Path, count: &mut usize) {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          walk(&path, count);
        } else {
          *count += 1;
        }
      }
    }
    let mut count = 0;
    walk(dir, &mut count);
    count
  }

  #[test]
  fn records_only_above_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}?score=0.5", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    output
      .render_result(&InputTensor::default(), &outputs(&[0.1, 0.2]))
      .unwrap();
    assert_eq!(recorded_files(dir.path()), 0);

    output
      .render_result(&InputTensor::default(), &outputs(&[0.1, 0.7]))
      .unwrap();
    assert_eq!(recorded_files(dir.path()), 1);
  }

  #[test]
  fn always_records() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!(
      "folder://{}?score=0.9&always",
      dir.path().display()
    ))
    .unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output
      .render_result(&InputTensor::default(), &outputs(&[0.0]))
      .unwrap();
    assert_eq!(recorded_files(dir.path()), 1);
  }

  #[test]
  fn decodes_percent_encoded_directory() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("my dir");
    std::fs::create_dir(&target).unwrap();

    let url = url::Url::parse(&format!(
      "folder://{}/my%20dir?always",
      dir.path().display()
    ))
    .unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output
      .render_result(&InputTensor::default(), &outputs(&[0.3]))
      .unwrap();

    assert_eq!(recorded_files(&target), 1);
    assert!(!dir.path().join("my%20dir").exists());
  }
}
