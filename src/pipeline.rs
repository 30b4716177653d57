// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 单帧检测流水线
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
  path::Path,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  config::{ConfigError, DetectConfig, DetectContext, ModelInputSize},
  detect::{self, DetectResult, ScaledDetection},
  frame::RgbFrame,
  input::{FrameSource, InputError},
  label::{LabelError, LabelTable},
  model::Model,
};

const GEOMETRY_ATTRIBUTES: usize = 4;

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("无效帧: {0}")]
  InvalidFrame(String),
  #[error("模型加载失败: {0}")]
  ModelLoad(String),
  #[error("标签加载失败: {0}")]
  LabelLoad(#[from] LabelError),
  #[error("推理失败: {0}")]
  Inference(String),
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("流水线已停止")]
  Stopped,
}

impl DetectError {
  /// 致命错误会终止循环；单帧错误只需记录并等待下一个 tick
  pub fn is_fatal(&self) -> bool {
    match self {
      DetectError::InvalidFrame(_) | DetectError::Inference(_) => false,
      DetectError::Input(e) => e.is_disconnect(),
      DetectError::ModelLoad(_)
      | DetectError::LabelLoad(_)
      | DetectError::Config(_)
      | DetectError::Stopped => true,
    }
  }
}

/// 启动时加载标签表并校验阈值
///
/// 标签表读取失败时拒绝启动，不使用占位标签。
pub fn load_context(
  config: DetectConfig,
  labels: impl AsRef<Path>,
) -> Result<DetectContext, DetectError> {
  let labels = LabelTable::from_path(labels)?;
  Ok(DetectContext::new(config, labels)?)
}

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Idle,
  AwaitingFrame,
  Preprocessing,
  Inferring,
  Decoding,
  Suppressing,
  Rescaling,
  Emitting,
  Stopped,
}

/// 单帧统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
  pub candidates: usize,
  pub kept: usize,
  pub preprocess: Duration,
  pub inference: Duration,
  pub postprocess: Duration,
}

/// 检测流水线：预处理 → 推理 → 解码 → NMS → 坐标还原
///
/// 每次调用独占它创建的所有张量，函数返回时（无论成功与否）全部释放。
pub struct DetectionPipeline<M> {
  model: M,
  context: DetectContext,
  input_size: ModelInputSize,
  state: PipelineState,
  last_report: Option<FrameReport>,
  class_mismatch_reported: bool,
}

impl<M: Model> DetectionPipeline<M> {
  pub fn new(model: M, context: DetectContext) -> Self {
    let input_size = model.input_size();
    info!(
      "检测流水线就绪: 输入 {}x{}, {} 个类别, 最多 {} 个输出, IoU 阈值 {}, 分数阈值 {}",
      input_size.width,
      input_size.height,
      context.labels().len(),
      context.config().max_outputs,
      context.config().iou_threshold,
      context.config().score_threshold
    );
    Self {
      model,
      context,
      input_size,
      state: PipelineState::Idle,
      last_report: None,
      class_mismatch_reported: false,
    }
  }

  pub fn state(&self) -> PipelineState {
    self.state
  }

  pub fn context(&self) -> &DetectContext {
    &self.context
  }

  pub fn last_report(&self) -> Option<FrameReport> {
    self.last_report
  }

  /// 进入终止状态，此后不再处理任何帧
  pub fn stop(&mut self) {
    if self.state != PipelineState::Stopped {
      info!("检测流水线停止");
    }
    self.transition(PipelineState::Stopped);
  }

  fn transition(&mut self, state: PipelineState) {
    debug!("流水线状态: {:?} -> {:?}", self.state, state);
    self.state = state;
  }

  /// 轮询一次帧来源并检测
  ///
  /// 来源未就绪时立即返回空结果，状态不变，也不会调用推理引擎。
  /// 设备丢失时流水线进入 `Stopped`。
  pub fn run_once<S: FrameSource + ?Sized>(
    &mut self,
    source: &mut S,
  ) -> Result<(DetectResult, Option<RgbFrame>), DetectError> {
    if self.state == PipelineState::Stopped {
      return Err(DetectError::Stopped);
    }

    let frame = match source.poll_frame() {
      Ok(Some(frame)) => frame,
      Ok(None) => return Ok((DetectResult::empty(), None)),
      Err(e) if e.is_disconnect() => {
        self.stop();
        return Err(e.into());
      }
      Err(InputError::MalformedFrame(e)) => return Err(DetectError::InvalidFrame(e.to_string())),
      Err(e) => return Err(e.into()),
    };
    if self.state == PipelineState::Idle {
      self.transition(PipelineState::AwaitingFrame);
    }

    let result = self.detect(&frame)?;
    Ok((result, Some(frame)))
  }

  /// 对单帧执行完整的检测流程
  pub fn detect(&mut self, frame: &RgbFrame) -> Result<DetectResult, DetectError> {
    if self.state == PipelineState::Stopped {
      return Err(DetectError::Stopped);
    }

    let result = self.detect_inner(frame);
    if self.state != PipelineState::Stopped {
      self.transition(PipelineState::AwaitingFrame);
    }
    result
  }

  fn detect_inner(&mut self, frame: &RgbFrame) -> Result<DetectResult, DetectError> {
    let mut report = FrameReport::default();

    self.transition(PipelineState::Preprocessing);
    let now = Instant::now();
    let (input, scale) = detect::preprocess(frame, self.input_size)?;
    report.preprocess = now.elapsed();

    self.transition(PipelineState::Inferring);
    let now = Instant::now();
    let output = self
      .model
      .execute(&input)
      .map_err(|e| DetectError::Inference(e.to_string()))?;
    drop(input);
    report.inference = now.elapsed();

    self.transition(PipelineState::Decoding);
    let now = Instant::now();
    let [_, attributes, _] = output.shape();
    if attributes <= GEOMETRY_ATTRIBUTES {
      return Err(DetectError::Inference(format!(
        "输出形状 {:?} 不包含类别分数",
        output.shape()
      )));
    }
    let model_classes = attributes - GEOMETRY_ATTRIBUTES;
    let num_classes = self.context.usable_classes(model_classes);
    if model_classes != self.context.labels().len() && !self.class_mismatch_reported {
      warn!(
        "模型类别数 {} 与标签数 {} 不一致, 仅使用前 {} 个类别",
        model_classes,
        self.context.labels().len(),
        num_classes
      );
      self.class_mismatch_reported = true;
    }
    let detections = detect::decode(output.transposed(), num_classes)?;
    drop(output);
    report.candidates = detections.len();

    self.transition(PipelineState::Suppressing);
    let keep = detect::suppress(&detections, self.context.config());
    report.kept = keep.len();

    self.transition(PipelineState::Rescaling);
    let (x_ratio, y_ratio) = scale.pixel_ratios(frame.width(), frame.height(), self.input_size);
    let labels = self.context.labels();
    let items = keep
      .into_iter()
      .map(|idx| {
        let detection = &detections[idx];
        let label = labels.get(detection.class_id).ok_or_else(|| {
          DetectError::Inference(format!("类别编号越界: {}", detection.class_id))
        })?;
        Ok(ScaledDetection {
          bbox: detect::rescale(&detection.bbox, x_ratio, y_ratio),
          score: detection.score,
          class_id: detection.class_id,
          label: label.to_string(),
        })
      })
      .collect::<Result<Vec<_>, DetectError>>()?;
    report.postprocess = now.elapsed();

    self.transition(PipelineState::Emitting);
    debug!(
      "候选 {} 个, 保留 {} 个, 预处理 {:.2?}, 推理 {:.2?}, 后处理 {:.2?}",
      report.candidates, report.kept, report.preprocess, report.inference, report.postprocess
    );
    self.last_report = Some(report);

    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}
