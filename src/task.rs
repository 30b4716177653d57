// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 任务调度
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use anyhow::Context;
use tracing::{debug, error, info, warn};

use crate::{
  input::FrameSource,
  model::Model,
  output::Render,
  pipeline::{DetectError, DetectionPipeline},
};

const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub trait Task<S, M, O>: Sized {
  type Error;
  fn run_task(
    self,
    input: S,
    pipeline: DetectionPipeline<M>,
    output: O,
  ) -> Result<TaskSummary, Self::Error>;
}

/// 任务结束时的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSummary {
  /// 实际处理的 tick 数
  pub ticks: usize,
  /// 完成检测并交给输出端的帧数
  pub frames: usize,
  /// 被跳过的单帧错误数
  pub failures: usize,
}

/// 取消标记，循环在两次迭代之间检查
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  /// 收到 Ctrl-C 时取消；若 30 秒内仍未退出则强制结束进程
  pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
    let token = self.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      token.cancel();
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
  }
}

/// 检测占用标记，由检测循环与 tick 线程共享
///
/// 循环在一次检测与渲染期间持有 [`InFlightGuard`]，tick 线程看到占用时不再投递 tick，
/// 因此同一时刻最多只有一次检测在执行，积压的 tick 也不会在检测结束后成批涌入。
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicBool>);

impl InFlight {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_busy(&self) -> bool {
    self.0.load(Ordering::Acquire)
  }

  pub fn try_acquire(&self) -> Option<InFlightGuard> {
    self
      .0
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| InFlightGuard {
        flag: Arc::clone(&self.0),
      })
  }
}

/// 释放时清除占用标记
pub struct InFlightGuard {
  flag: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    self.flag.store(false, Ordering::Release);
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOffer {
  Sent,
  /// 上一个 tick 尚未被消费，本次合并丢弃
  Coalesced,
  Closed,
}

pub fn offer_tick(tx: &SyncSender<()>) -> TickOffer {
  match tx.try_send(()) {
    Ok(()) => TickOffer::Sent,
    Err(TrySendError::Full(())) => TickOffer::Coalesced,
    Err(TrySendError::Disconnected(())) => TickOffer::Closed,
  }
}

/// 固定周期的 tick 源，容量为 1，来不及处理的 tick 直接合并；检测进行中时不投递
pub struct Ticker {
  receiver: Receiver<()>,
  handle: JoinHandle<()>,
}

impl Ticker {
  pub fn spawn(period: Duration, cancel: CancelToken, in_flight: InFlight) -> Self {
    let (tx, receiver) = mpsc::sync_channel(1);
    let handle = thread::spawn(move || {
      let mut next = Instant::now();
      while !cancel.is_cancelled() {
        next += period;
        if let Some(wait) = next.checked_duration_since(Instant::now()) {
          thread::sleep(wait);
        } else {
          next = Instant::now();
        }
        if in_flight.is_busy() {
          debug!("检测进行中，丢弃本次 tick");
          continue;
        }
        match offer_tick(&tx) {
          TickOffer::Sent => {}
          TickOffer::Coalesced => debug!("上一帧仍在处理，合并 tick"),
          TickOffer::Closed => break,
        }
      }
    });
    Self { receiver, handle }
  }

  pub fn wait(&self, timeout: Duration) -> Result<(), RecvTimeoutError> {
    self.receiver.recv_timeout(timeout)
  }

  pub fn join(self) {
    drop(self.receiver);
    if self.handle.join().is_err() {
      error!("tick 线程异常退出");
    }
  }
}

/// 单帧任务：等待第一帧，检测一次并输出
#[derive(Debug, Clone, Copy)]
pub struct OneShotTask {
  timeout: Duration,
}

impl Default for OneShotTask {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(5),
    }
  }
}

impl OneShotTask {
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

impl<S, M, O> Task<S, M, O> for OneShotTask
where
  S: FrameSource,
  M: Model,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: S,
    mut pipeline: DetectionPipeline<M>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let started = Instant::now();
    let mut ticks = 0;
    loop {
      ticks += 1;
      let now = Instant::now();
      let (result, frame) = pipeline.run_once(&mut input).context("单帧检测失败")?;
      let Some(frame) = frame else {
        if started.elapsed() > self.timeout {
          anyhow::bail!("等待输入帧超时 ({:.2?})", self.timeout);
        }
        thread::sleep(Duration::from_millis(10));
        continue;
      };
      info!("推理完成，耗时: {:.2?}", now.elapsed());
      output.render_result(&frame, &result).context("输出检测结果失败")?;
      info!("渲染完成，耗时: {:.2?}", now.elapsed());
      pipeline.stop();
      return Ok(TaskSummary {
        ticks,
        frames: 1,
        failures: 0,
      });
    }
  }
}

/// 基准任务：取一帧后反复检测，统计平均耗时
#[derive(Debug, Clone, Copy)]
pub struct RepeatShotTask {
  repeat: usize,
  warmup: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: 1000,
      warmup: 2,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }
}

impl<S, M, O> Task<S, M, O> for RepeatShotTask
where
  S: FrameSource,
  M: Model,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: S,
    mut pipeline: DetectionPipeline<M>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let frame = loop {
      if let Some(frame) = input.poll_frame().context("读取输入帧失败")? {
        break frame;
      }
      thread::sleep(Duration::from_millis(10));
    };
    info!("输入帧获取成功，开始推理...");

    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = pipeline.detect(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      times.push(elapsed);
    }

    let measured = &times[self.warmup.min(times.len())..];
    if !measured.is_empty() {
      warn!(
        "平均推理时间: {:.2?}",
        measured.iter().sum::<Duration>() / measured.len() as u32
      );
    }
    pipeline.stop();

    Ok(TaskSummary {
      ticks: self.repeat,
      frames: self.repeat,
      failures: 0,
    })
  }
}

/// 实时任务：按固定帧率的 tick 驱动检测，直到取消、设备断开或达到帧数
#[derive(Debug)]
pub struct ContinuousTask {
  fps: u32,
  frame_number: Option<usize>,
  cancel: CancelToken,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      fps: 30,
      frame_number: None,
      cancel: CancelToken::new(),
    }
  }
}

impl ContinuousTask {
  pub fn with_fps(mut self, fps: u32) -> Self {
    self.fps = fps.max(1);
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }
}

impl<S, M, O> Task<S, M, O> for ContinuousTask
where
  S: FrameSource,
  M: Model,
  O: Render,
  O::Error: std::fmt::Display,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: S,
    mut pipeline: DetectionPipeline<M>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务, 帧率 {}", self.fps);
    let in_flight = InFlight::new();
    let ticker = Ticker::spawn(
      Duration::from_secs(1) / self.fps,
      self.cancel.clone(),
      in_flight.clone(),
    );
    let mut summary = TaskSummary::default();

    let outcome = loop {
      if self.cancel.is_cancelled() {
        warn!("中断信号接收，退出任务循环");
        break Ok(());
      }
      match ticker.wait(CANCEL_POLL_INTERVAL) {
        Ok(()) => {}
        Err(RecvTimeoutError::Timeout) => continue,
        Err(RecvTimeoutError::Disconnected) => break Ok(()),
      }

      let Some(_guard) = in_flight.try_acquire() else {
        debug!("上一次检测尚未结束，跳过本次 tick");
        continue;
      };
      summary.ticks += 1;

      let now = Instant::now();
      match pipeline.run_once(&mut input) {
        Ok((_, None)) => continue,
        Ok((result, Some(frame))) => {
          summary.frames += 1;
          let elapsed_a = now.elapsed();
          if let Err(e) = output.render_result(&frame, &result) {
            error!("输出检测结果失败: {}", e);
          }
          info!(
            "第 {} 帧: {} 个目标, 耗时: {:.2?} / {:.2?}",
            summary.frames,
            result.len(),
            elapsed_a,
            now.elapsed()
          );
        }
        Err(DetectError::Input(e)) if e.is_disconnect() => {
          warn!("输入断开: {}", e);
          break Ok(());
        }
        Err(e) if e.is_fatal() => break Err(e),
        Err(e) => {
          summary.failures += 1;
          warn!("跳过当前帧: {}", e);
        }
      }

      if self.frame_number.is_some_and(|n| summary.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", summary.frames);
        break Ok(());
      }
    };

    self.cancel.cancel();
    ticker.join();
    pipeline.stop();

    outcome.context("检测循环异常终止")?;
    info!(
      "任务完成，退出: {} 个 tick, {} 帧, {} 次失败",
      summary.ticks, summary.frames, summary.failures
    );
    Ok(summary)
  }
}
