// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/live_pipeline.rs - 端到端流水线测试
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

use std::sync::{
  Mutex,
  atomic::{AtomicUsize, Ordering},
};

use shanan_live::{
  config::{DetectConfig, ModelInputSize},
  detect::{DetectResult, DetectionRecord},
  frame::RgbFrame,
  input::{FrameSource, ImageFileInput, InputError},
  model::{InputTensor, Model, ModelError, OutputTensor},
  output::Render,
  pipeline::{DetectionPipeline, PipelineState, load_context},
  task::{ContinuousTask, Task},
};

/// 输出两个重叠的 "cat" 框与一个 "dog" 框，输入尺寸 320x320
struct StubDetector {
  calls: AtomicUsize,
}

impl Model for StubDetector {
  type Error = ModelError;

  fn input_size(&self) -> ModelInputSize {
    ModelInputSize::new(320, 320).unwrap()
  }

  fn execute(&self, input: &InputTensor) -> Result<OutputTensor, Self::Error> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    assert_eq!(input.shape(), [1, 320, 320, 3]);
    // 属性按行排列: cx, cy, w, h, cat, dog；每列一个候选
    #[rustfmt::skip]
    let data = vec![
      50.0, 52.0, 200.0,
      50.0, 50.0, 100.0,
      20.0, 20.0, 40.0,
      20.0, 20.0, 20.0,
      0.9,  0.85, 0.1,
      0.05, 0.1,  0.6,
    ];
    OutputTensor::from_shape_vec(&[1, 6, 3], data)
  }
}

#[derive(Default)]
struct Collect(Mutex<Vec<Vec<DetectionRecord>>>);

impl Render for Collect {
  type Error = std::convert::Infallible;

  fn render_result(&self, _frame: &RgbFrame, result: &DetectResult) -> Result<(), Self::Error> {
    self.0.lock().unwrap().push(result.records());
    Ok(())
  }
}

fn labels_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
  let path = dir.path().join("labels.json");
  std::fs::write(&path, r#"["cat", "dog"]"#).unwrap();
  path
}

#[test]
fn detections_come_back_in_source_pixels() {
  let dir = tempfile::tempdir().unwrap();
  let context = load_context(DetectConfig::default(), labels_file(&dir)).unwrap();
  let model = StubDetector {
    calls: AtomicUsize::new(0),
  };
  let mut pipeline = DetectionPipeline::new(&model, context);

  // 640x480 帧补成 640x640，缩放到 320，坐标放大 2 倍
  let result = pipeline
    .detect(&RgbFrame::filled(640, 480, [128, 128, 128]))
    .unwrap();
  let records = result.records();

  assert_eq!(records.len(), 2);
  assert_eq!(records[0].label, "cat");
  assert_eq!(records[0].bbox, [80.0, 80.0, 40.0, 40.0]);
  assert_eq!(records[1].label, "dog");
  assert_eq!(records[1].bbox, [360.0, 180.0, 80.0, 40.0]);
  assert!(records[0].score >= records[1].score);
  assert_eq!(pipeline.state(), PipelineState::AwaitingFrame);
}

#[test]
fn live_loop_over_repeated_image() {
  let dir = tempfile::tempdir().unwrap();
  let context = load_context(
    DetectConfig::default().with_score_threshold(0.7),
    labels_file(&dir),
  )
  .unwrap();
  let model = StubDetector {
    calls: AtomicUsize::new(0),
  };
  let source = ImageFileInput::from_frame(RgbFrame::filled(320, 320, [0, 0, 0]), Some(3));
  let output = Collect::default();

  let summary = ContinuousTask::default()
    .with_fps(500)
    .run_task(source, DetectionPipeline::new(&model, context), &output)
    .unwrap();

  assert_eq!(summary.frames, 3);
  assert_eq!(model.calls.load(Ordering::SeqCst), 3);
  let frames = output.0.lock().unwrap();
  assert_eq!(frames.len(), 3);
  assert!(frames.iter().all(|records| records.len() == 1 && records[0].label == "cat"));
}

struct NeverReady;

impl FrameSource for NeverReady {
  fn poll_frame(&mut self) -> Result<Option<RgbFrame>, InputError> {
    Ok(None)
  }
}

#[test]
fn idle_source_never_reaches_the_engine() {
  let dir = tempfile::tempdir().unwrap();
  let context = load_context(DetectConfig::default(), labels_file(&dir)).unwrap();
  let model = StubDetector {
    calls: AtomicUsize::new(0),
  };
  let mut pipeline = DetectionPipeline::new(&model, context);
  let mut source = NeverReady;

  for _ in 0..5 {
    let (result, frame) = pipeline.run_once(&mut source).unwrap();
    assert!(result.is_empty());
    assert!(frame.is_none());
  }
  assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}
