// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 实时检测主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use shanan_live::{
  FromUrl,
  config::{
    DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_OUTPUTS, DEFAULT_SCORE_THRESHOLD, DetectConfig,
  },
  input::InputWrapper,
  model::OnnxModelBuilder,
  output::OutputWrapper,
  pipeline::{DetectError, DetectionPipeline, load_context},
  task::{ContinuousTask, Task},
};

/// Shanan 实时检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，例如 onnx:///path/to/model.onnx?width=640&height=640
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 标签文件（JSON 字符串数组）
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,
  /// 输入来源，例如 gst://camera/dev/video0 或 image:///path/to/picture.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 log://、image:///path/to/out.png 或 folder:///path/to/dir
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  /// 每帧最多保留的目标数
  #[arg(long, default_value_t = DEFAULT_MAX_OUTPUTS)]
  pub max_outputs: usize,
  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD)]
  pub iou_threshold: f32,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD)]
  pub score_threshold: f32,
  /// tick 帧率
  #[arg(long, default_value_t = 30)]
  pub fps: u32,
  /// 处理指定帧数后退出
  #[arg(long)]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("标签文件: {}", args.labels.display());
  info!("输入来源: {}", args.input);
  info!("输出: {}", args.output);

  let config = DetectConfig::default()
    .with_max_outputs(args.max_outputs)
    .with_iou_threshold(args.iou_threshold)
    .with_score_threshold(args.score_threshold);
  let context = load_context(config, &args.labels).context("无法加载检测配置")?;

  let model = OnnxModelBuilder::from_url(&args.model)
    .and_then(|builder| builder.build())
    .map_err(|e| DetectError::ModelLoad(e.to_string()))?;
  let input = InputWrapper::from_url(&args.input).context("无法打开输入来源")?;
  let output = OutputWrapper::from_url(&args.output).context("无法创建输出")?;

  let task = ContinuousTask::default()
    .with_fps(args.fps)
    .with_frame_number(args.frame_number);
  task
    .cancel_token()
    .install_ctrlc_handler()
    .context("无法设置 Ctrl-C 处理函数")?;

  let pipeline = DetectionPipeline::new(model, context);
  task.run_task(input, pipeline, output)?;

  Ok(())
}
