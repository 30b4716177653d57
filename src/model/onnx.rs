// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/onnx.rs - 基于 tract 的 ONNX 推理引擎
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tract_onnx::prelude::*;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::ModelInputSize,
  model::{InputTensor, Model, ModelError, OutputTensor},
  query_param,
};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// 模型声明的输入布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputLayout {
  /// `[1, H, W, 3]`
  #[default]
  Nhwc,
  /// `[1, 3, H, W]`，ultralytics 默认导出的布局
  Nchw,
}

impl std::str::FromStr for InputLayout {
  type Err = ModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nhwc" => Ok(InputLayout::Nhwc),
      "nchw" => Ok(InputLayout::Nchw),
      other => Err(ModelError::ModelPathError(format!("未知的输入布局: {}", other))),
    }
  }
}

impl InputLayout {
  fn shape(self, width: usize, height: usize) -> [usize; 4] {
    match self {
      InputLayout::Nhwc => [1, height, width, 3],
      InputLayout::Nchw => [1, 3, height, width],
    }
  }

  /// 按模型布局排列的形状与连续数据
  fn arrange(self, input: &InputTensor) -> (Vec<usize>, Vec<f32>) {
    match self {
      InputLayout::Nhwc => (input.shape().to_vec(), input.to_contiguous()),
      InputLayout::Nchw => {
        let view = input.view().permuted_axes([0, 3, 1, 2]);
        (view.shape().to_vec(), view.iter().copied().collect())
      }
    }
  }
}

/// ONNX 检测模型，输出 `[1, 4 + 类别数, 候选数]`
///
/// 流水线总是给出 `[1, H, W, 3]` 的张量，`Nchw` 布局的模型在执行前转置。
pub struct OnnxModel {
  plan: OnnxPlan,
  input_size: ModelInputSize,
  layout: InputLayout,
}

/// 模型构建器
///
/// URL 形式: `onnx:///path/to/model.onnx?width=640&height=640&layout=nchw`
///
/// 输入形状在加载时固定；`layout` 缺省为 `nhwc`，必须与模型声明的输入一致，
/// 否则加载失败。
pub struct OnnxModelBuilder {
  model_path: String,
  input_size: ModelInputSize,
  layout: InputLayout,
}

impl FromUrlWithScheme for OnnxModelBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let default = ModelInputSize::default();
    let width = query_param(url, "width").unwrap_or(default.width);
    let height = query_param(url, "height").unwrap_or(default.height);
    let input_size = ModelInputSize::new(width, height)
      .map_err(|e| ModelError::ModelPathError(e.to_string()))?;
    let layout = match url.query_pairs().find(|(k, _)| k == "layout") {
      Some((_, value)) => value.parse()?,
      None => InputLayout::default(),
    };

    Ok(OnnxModelBuilder {
      model_path: url.path().to_string(),
      input_size,
      layout,
    })
  }
}

impl OnnxModelBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      input_size: ModelInputSize::default(),
      layout: InputLayout::default(),
    }
  }

  pub fn input_size(mut self, input_size: ModelInputSize) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn layout(mut self, layout: InputLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn build(self) -> Result<OnnxModel, ModelError> {
    info!("加载模型文件: {}", self.model_path);
    let ModelInputSize { width, height } = self.input_size;
    let [n, d1, d2, d3] = self.layout.shape(width as usize, height as usize);

    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .map_err(|e| ModelError::ModelLoadError(format!("{}: {}", self.model_path, e)))?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(n, d1, d2, d3)),
      )
      .map_err(|e| ModelError::ModelLoadError(format!("无法设置输入形状: {}", e)))?
      .into_optimized()
      .map_err(|e| ModelError::ModelLoadError(format!("模型优化失败: {}", e)))?
      .into_runnable()
      .map_err(|e| ModelError::ModelLoadError(format!("无法构建可执行模型: {}", e)))?;

    info!(
      "模型加载完成, 输入尺寸 {}x{}, 布局 {:?}",
      width, height, self.layout
    );

    Ok(OnnxModel {
      plan,
      input_size: self.input_size,
      layout: self.layout,
    })
  }
}

impl Model for OnnxModel {
  type Error = ModelError;

  fn input_size(&self) -> ModelInputSize {
    self.input_size
  }

  fn execute(&self, input: &InputTensor) -> Result<OutputTensor, Self::Error> {
    let (shape, data) = self.layout.arrange(input);
    let tensor = Tensor::from_shape(&shape, &data)
      .map_err(|e| ModelError::InferenceError(format!("无法构造输入张量: {}", e)))?;

    debug!("执行模型推理, 输入形状 {:?}", shape);
    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(|e| ModelError::InferenceError(e.to_string()))?;

    let shapes: Vec<Vec<usize>> = outputs.iter().map(|o| o.shape().to_vec()).collect();
    ensure_single_output(shapes)?;
    let output = outputs
      .first()
      .ok_or_else(|| ModelError::InferenceError("模型没有输出".to_string()))?;

    let view = output
      .to_array_view::<f32>()
      .map_err(|e| ModelError::InferenceError(format!("输出张量不是 f32: {}", e)))?;
    let shape = view.shape().to_vec();
    debug!("模型输出形状 {:?}", shape);

    OutputTensor::from_shape_vec(&shape, view.iter().copied().collect())
  }
}

/// 分离的框/分数双输出属于另一种模型变体，这里不支持
fn ensure_single_output(shapes: Vec<Vec<usize>>) -> Result<(), ModelError> {
  match shapes.len() {
    0 => Err(ModelError::InferenceError("模型没有输出".to_string())),
    1 => Ok(()),
    _ => Err(ModelError::UnexpectedOutputCount { shapes }),
  }
}
