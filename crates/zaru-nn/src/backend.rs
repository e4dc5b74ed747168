//! Concrete backend adapters. Each backend is loaded once and exposes the same
//! `input_shapes`/`output_shapes`/`process` shape the [`crate::Network`] orchestrates uniformly,
//! so the pipeline never has to know which one is in use.

use std::path::Path;

use tract_onnx::prelude::{Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, TypedFact, TypedOp};
use wonnx::utils::{InputTensor, OutputTensor};
use zaru_tensor::{Blob, ElementType, Layout, Quant, TensorAttr};

use crate::NetworkError;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// The general-purpose CPU/GPU backend, powered by `tract-onnx`. Maps onto the spec's "general
/// purpose CPU/GPU" network kind (`nettype: OpenCV` in the zoo schema, named for the teacher
/// workspace's closest available general-purpose ONNX runtime).
pub struct GeneralBackend {
    model: TractModel,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl GeneralBackend {
    pub fn load(path: &Path) -> Result<Self, NetworkError> {
        let data = std::fs::read(path)
            .map_err(|e| NetworkError::BackendFailure(format!("failed to read '{}': {e}", path.display())))?;
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*data)
            .map_err(|e| NetworkError::BackendFailure(format!("failed to parse ONNX model: {e}")))?;
        let model = graph
            .into_optimized()
            .and_then(|g| g.into_runnable())
            .map_err(|e| NetworkError::BackendFailure(format!("failed to optimize model: {e}")))?;

        let input_names = model
            .model()
            .input_outlets()
            .map_err(|e| NetworkError::BackendFailure(e.to_string()))?
            .iter()
            .map(|outlet| model.model().node(outlet.node).name.clone())
            .collect();
        let output_names = model
            .model()
            .output_outlets()
            .map_err(|e| NetworkError::BackendFailure(e.to_string()))?
            .iter()
            .map(|outlet| model.model().node(outlet.node).name.clone())
            .collect();

        Ok(Self {
            model,
            input_names,
            output_names,
        })
    }

    pub fn num_inputs(&self) -> usize {
        self.input_names.len()
    }

    pub fn process(&self, blobs: &[Blob]) -> Result<Vec<Blob>, NetworkError> {
        let inputs: tract_onnx::prelude::TVec<tract_onnx::prelude::TValue> = blobs
            .iter()
            .map(|b| blob_to_tract(b).map(Into::into))
            .collect::<Result<_, _>>()?;

        let outputs = self
            .model
            .run(inputs)
            .map_err(|e| NetworkError::BackendFailure(format!("inference failed: {e}")))?;

        outputs.iter().map(|t| tract_to_blob(t)).collect()
    }
}

fn blob_to_tract(blob: &Blob) -> Result<tract_onnx::prelude::Tensor, NetworkError> {
    let dims: Vec<usize> = blob.attr().dims().to_vec();
    let tensor = match blob.attr().elem_type() {
        ElementType::F32 => {
            let arr = tract_onnx::prelude::tract_ndarray::ArrayD::from_shape_vec(
                dims,
                blob.as_f32()
                    .ok_or_else(|| NetworkError::BackendFailure("expected f32 input blob".into()))?
                    .to_vec(),
            )
            .map_err(|e| NetworkError::BackendFailure(e.to_string()))?;
            arr.into_tensor()
        }
        ElementType::U8 => {
            let arr = tract_onnx::prelude::tract_ndarray::ArrayD::from_shape_vec(
                dims,
                blob.as_u8()
                    .ok_or_else(|| NetworkError::BackendFailure("expected u8 input blob".into()))?
                    .to_vec(),
            )
            .map_err(|e| NetworkError::BackendFailure(e.to_string()))?;
            arr.into_tensor()
        }
        other => {
            return Err(NetworkError::BackendFailure(format!(
                "general backend does not support {other:?} input tensors"
            )))
        }
    };
    Ok(tensor)
}

fn tract_to_blob(tensor: &tract_onnx::prelude::Tensor) -> Result<Blob, NetworkError> {
    let view = tensor
        .to_array_view::<f32>()
        .map_err(|e| NetworkError::BackendFailure(format!("non-f32 model output: {e}")))?;
    let dims: Vec<usize> = view.shape().to_vec();
    let data: Vec<f32> = view.iter().copied().collect();
    let attr = TensorAttr::new(Layout::Na, ElementType::F32, dims, Quant::None)
        .map_err(|e| NetworkError::BackendFailure(e.to_string()))?;
    Blob::from_slice(attr, &data).map_err(|e| NetworkError::BackendFailure(e.to_string()))
}

/// The hardware-accelerator backend, powered by `wonnx`'s GPU compute pipeline. Stands in for
/// "NPU/TPU-class co-processor exposed via a vendor SDK" (the spec only requires *some*
/// documented backend interface beyond the general-purpose one; no real vendor NPU/TPU binding
/// is in scope).
pub struct AcceleratedBackend {
    session: wonnx::Session,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl AcceleratedBackend {
    /// Loads the model into the `wonnx` GPU compute pipeline. Input/output names are recovered
    /// by also parsing the same file with `tract-onnx` (without running it) purely for its graph
    /// metadata, since `wonnx` keys its tensor maps by the ONNX graph's own names.
    pub fn load(path: &Path) -> Result<Self, NetworkError> {
        let data = std::fs::read(path)
            .map_err(|e| NetworkError::BackendFailure(format!("failed to read '{}': {e}", path.display())))?;
        let session = pollster::block_on(wonnx::Session::from_bytes(&data))
            .map_err(|e| NetworkError::BackendFailure(format!("wonnx session failed: {e}")))?;

        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*data)
            .map_err(|e| NetworkError::BackendFailure(format!("failed to parse ONNX graph metadata: {e}")))?;
        let input_names = graph
            .input_outlets()
            .map_err(|e| NetworkError::BackendFailure(e.to_string()))?
            .iter()
            .map(|outlet| graph.node(outlet.node).name.clone())
            .collect();
        let output_names = graph
            .output_outlets()
            .map_err(|e| NetworkError::BackendFailure(e.to_string()))?
            .iter()
            .map(|outlet| graph.node(outlet.node).name.clone())
            .collect();

        Ok(Self {
            session,
            input_names,
            output_names,
        })
    }

    pub fn num_inputs(&self) -> usize {
        self.input_names.len()
    }

    pub fn process(&self, blobs: &[Blob]) -> Result<Vec<Blob>, NetworkError> {
        if blobs.len() != self.input_names.len() {
            return Err(NetworkError::BackendFailure(format!(
                "wonnx model expects {} inputs, got {}",
                self.input_names.len(),
                blobs.len()
            )));
        }

        let inputs = self
            .input_names
            .iter()
            .zip(blobs)
            .map(|(name, blob)| {
                let data = blob
                    .as_f32()
                    .ok_or_else(|| NetworkError::BackendFailure("expected f32 input blob".into()))?;
                Ok((name.clone(), InputTensor::F32(data.to_vec().into())))
            })
            .collect::<Result<_, NetworkError>>()?;

        let output_map = pollster::block_on(self.session.run(&inputs))
            .map_err(|e| NetworkError::BackendFailure(format!("wonnx run failed: {e}")))?;

        self.output_names
            .iter()
            .map(|name| {
                let tensor = output_map
                    .get(name)
                    .ok_or_else(|| NetworkError::BackendFailure(format!("missing output '{name}'")))?;
                match tensor {
                    OutputTensor::F32(data) => {
                        let attr = TensorAttr::new(
                            Layout::Na,
                            ElementType::F32,
                            vec![data.len()],
                            Quant::None,
                        )
                        .map_err(|e| NetworkError::BackendFailure(e.to_string()))?;
                        Blob::from_slice(attr, data).map_err(|e| NetworkError::BackendFailure(e.to_string()))
                    }
                    _ => Err(NetworkError::BackendFailure(
                        "non-f32 wonnx output tensors are not supported".into(),
                    )),
                }
            })
            .collect()
    }
}
