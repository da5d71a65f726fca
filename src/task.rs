// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 推理任务
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::Duration,
};
use tracing::{info, warn};

use crate::{
  channel::{BridgeEndpoint, stdio},
  model::{Model, Runtime},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let tensor = input.next().ok_or_else(|| anyhow::anyhow!("没有输入张量"))?;
    info!("输入张量获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = model.infer(&tensor)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&tensor, &result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

pub struct RepeatShotTask {
  repeat_times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat_times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat_times(mut self, repeat_times: usize) -> Self {
    self.repeat_times = repeat_times.max(3);
    self
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let tensor = input.next().ok_or_else(|| anyhow::anyhow!("没有输入张量"))?;
    info!("输入张量获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat_times);
    let mut last = None;
    for i in 0..self.repeat_times {
      let now = std::time::Instant::now();
      let result = model.infer(&tensor)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(result);
    }

    if let Some(result) = last {
      output.render_result(&tensor, &result)?;
    }

    // 前两次包含预热开销，不计入平均值
    warn!(
      "平均推理时间: {:.2?}",
      times.iter().skip(2).sum::<Duration>() / (times.len() - 2) as u32
    );

    Ok(())
  }
}

/// 在标准输入输出上提供通道服务，Ctrl-C 后退出
#[derive(Default, Debug)]
pub struct ServeTask;

impl<R: Runtime, In: BufRead, Out: Write> Task<In, &BridgeEndpoint<R>, Out> for ServeTask {
  type Error = anyhow::Error;

  fn run_task(self, input: In, endpoint: &BridgeEndpoint<R>, output: Out) -> Result<(), Self::Error> {
    info!("开始任务...");
    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      handler_stop.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let stats = stdio::serve(endpoint, input, output, &stop)?;
    info!(
      "任务完成，退出: {} 次调用, {} 次错误, {} 次无效请求",
      stats.calls, stats.errors, stats.malformed
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;

  use super::*;

  struct Doubler {
    calls: Cell<usize>,
  }

  #[derive(Debug, thiserror::Error)]
  #[error("never")]
  struct Never;

  impl Model for Doubler {
    type Input = u32;
    type Output = u32;
    type Error = Never;

    fn infer(&self, input: &u32) -> Result<u32, Never> {
      self.calls.set(self.calls.get() + 1);
      Ok(input * 2)
    }
  }

  struct Collect(std::cell::RefCell<Vec<u32>>);

  impl Render<u32, u32> for &Collect {
    type Error = Never;

    fn render_result(&self, _input: &u32, result: &u32) -> Result<(), Never> {
      self.0.borrow_mut().push(*result);
      Ok(())
    }
  }

  #[test]
  fn oneshot_infers_once() {
    let sink = Collect(Default::default());
    let model = Doubler { calls: Cell::new(0) };
    OneShotTask
      .run_task(vec![21u32].into_iter(), &model, &sink)
      .unwrap();
    assert_eq!(*sink.0.borrow(), vec![42]);
    assert_eq!(model.calls.get(), 1);
  }

  #[test]
  fn oneshot_without_input_fails() {
    let sink = Collect(Default::default());
    let model = Doubler { calls: Cell::new(0) };
    assert!(
      OneShotTask
        .run_task(Vec::<u32>::new().into_iter(), &model, &sink)
        .is_err()
    );
  }

  #[test]
  fn repeatshot_renders_last_result() {
    let sink = Collect(Default::default());
    let model = Doubler { calls: Cell::new(0) };
    RepeatShotTask::default()
      .with_repeat_times(5)
      .run_task(vec![3u32].into_iter(), &model, &sink)
      .unwrap();
    assert_eq!(model.calls.get(), 5);
    assert_eq!(*sink.0.borrow(), vec![6]);
  }
}
