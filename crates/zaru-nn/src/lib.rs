//! The network stage (§4.3): loads model weights exactly once in the background, runs forward
//! passes on a chosen backend, and optionally dequantizes/flattens its outputs.
//!
//! Asynchronous `load()` is a single-producer/single-consumer handoff: the pipeline calls
//! `load()` once per (re)configuration, the actual backend construction happens on a dedicated
//! background thread, and the main thread polls `ready()`/`loading()` instead of blocking. The
//! only blocking wait is `wait_before_destroy()`, called when the network is torn down.

mod backend;
mod dequant;
mod errors;

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

pub use errors::NetworkError;
use zaru_tensor::{Blob, TensorAttr};

use backend::{AcceleratedBackend, GeneralBackend};

const STATE_NOT_STARTED: u8 = 0;
const STATE_LOADING: u8 = 1;
const STATE_READY: u8 = 2;
const STATE_FAILED: u8 = 3;

/// Which concrete backend a [`Network`] runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetKind {
    /// General-purpose CPU/GPU inference via `tract-onnx`.
    General,
    /// Hardware-accelerator inference via `wonnx`'s GPU compute pipeline, standing in for an
    /// NPU/TPU-class co-processor exposed through a vendor SDK.
    Accelerated,
    /// User-supplied backend implementation.
    Custom,
}

/// A user-supplied network implementation, installed via the pipeline's `setCustomNetwork` when
/// the zoo entry's `nettype` key is `Custom`.
pub trait CustomNetwork: Send {
    fn load(&mut self) -> Result<(), NetworkError>;
    fn process(&mut self, blobs: &[Blob]) -> Result<Vec<Blob>, NetworkError>;
}

enum LoadedBackend {
    General(GeneralBackend),
    Accelerated(AcceleratedBackend),
    Custom(Box<Mutex<dyn CustomNetwork>>),
}

enum Source {
    Model { path: PathBuf, kind: NetKind },
    Custom(Box<Mutex<dyn CustomNetwork>>),
}

struct LoadSlot {
    state: AtomicU8,
    result: Mutex<Option<Result<LoadedBackend, NetworkError>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LoadSlot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_NOT_STARTED),
            result: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }
}

/// The network stage: loads weights once, runs a forward pass, and optionally reshapes outputs.
pub struct Network {
    source: Mutex<Option<Source>>,
    slot: Arc<LoadSlot>,
    declared_inputs: Vec<TensorAttr>,
    declared_outputs: Option<Vec<TensorAttr>>,
    dequant: bool,
    flatten_outputs: bool,
    frozen: std::sync::atomic::AtomicBool,
}

impl Network {
    /// Builds an unloaded general-purpose or accelerated network stage from a model path. Call
    /// [`Network::load`] to kick off background loading.
    pub fn new(
        path: PathBuf,
        kind: NetKind,
        declared_inputs: Vec<TensorAttr>,
        declared_outputs: Option<Vec<TensorAttr>>,
        dequant: bool,
        flatten_outputs: bool,
    ) -> Self {
        assert_ne!(kind, NetKind::Custom, "use Network::new_custom for a custom backend");
        Self {
            source: Mutex::new(Some(Source::Model { path, kind })),
            slot: Arc::new(LoadSlot::new()),
            declared_inputs,
            declared_outputs,
            dequant,
            flatten_outputs,
            frozen: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Builds an unloaded network stage around a user-supplied [`CustomNetwork`] implementation.
    pub fn new_custom(
        custom: impl CustomNetwork + 'static,
        declared_inputs: Vec<TensorAttr>,
        declared_outputs: Option<Vec<TensorAttr>>,
        dequant: bool,
        flatten_outputs: bool,
    ) -> Self {
        Self {
            source: Mutex::new(Some(Source::Custom(Box::new(Mutex::new(custom))))),
            slot: Arc::new(LoadSlot::new()),
            declared_inputs,
            declared_outputs,
            dequant,
            flatten_outputs,
            frozen: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Starts loading the model in the background. Idempotent: calling this again while loading
    /// is already in progress, or after it finished, has no effect.
    pub fn load(&self) {
        if self
            .slot
            .state
            .compare_exchange(
                STATE_NOT_STARTED,
                STATE_LOADING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let source = self
            .source
            .lock()
            .unwrap()
            .take()
            .expect("load() called twice should have been caught by the state check above");
        let slot = Arc::clone(&self.slot);

        let handle = std::thread::spawn(move || {
            let result = match source {
                Source::Model {
                    path,
                    kind: NetKind::General,
                } => GeneralBackend::load(&path).map(LoadedBackend::General),
                Source::Model {
                    path,
                    kind: NetKind::Accelerated,
                } => AcceleratedBackend::load(&path).map(LoadedBackend::Accelerated),
                Source::Model {
                    kind: NetKind::Custom,
                    ..
                } => unreachable!("Custom NetKind is only produced by new_custom"),
                Source::Custom(custom) => {
                    let load_result = custom.lock().unwrap().load();
                    load_result.map(|()| LoadedBackend::Custom(custom))
                }
            };
            let failed = result.is_err();
            *slot.result.lock().unwrap() = Some(result);
            slot.state
                .store(if failed { STATE_FAILED } else { STATE_READY }, Ordering::Release);
        });

        *self.slot.handle.lock().unwrap() = Some(handle);
    }

    /// True while the background load is in progress.
    pub fn loading(&self) -> bool {
        self.slot.state.load(Ordering::Acquire) == STATE_LOADING
    }

    /// True once the background load has finished, successfully or not.
    pub fn ready(&self) -> bool {
        matches!(self.slot.state.load(Ordering::Acquire), STATE_READY | STATE_FAILED)
    }

    /// Blocks until any in-progress load finishes. Must be called before the network (and
    /// anything it references, like a pre-processor's tensor attrs) is torn down.
    pub fn wait_before_destroy(&self) {
        if let Some(handle) = self.slot.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Declared input tensor attributes, available once [`Network::load`] has been called.
    pub fn input_shapes(&self) -> Option<&[TensorAttr]> {
        (self.slot.state.load(Ordering::Acquire) != STATE_NOT_STARTED).then_some(&self.declared_inputs[..])
    }

    /// Declared output tensor attributes, if the zoo entry supplied an `outtensors` spec.
    pub fn output_shapes(&self) -> Option<&[TensorAttr]> {
        (self.slot.state.load(Ordering::Acquire) != STATE_NOT_STARTED)
            .then(|| self.declared_outputs.as_deref())
            .flatten()
    }

    /// Locks the parameters that determine this network's identity (model path, nettype,
    /// dequant/flatten flags) so that further attempts to change them are refused while the
    /// pipeline is running.
    pub fn freeze(&self, doit: bool) {
        self.frozen.store(doit, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Runs one forward pass, appending human-readable diagnostic lines to `info` (§4.3 "Info
    /// channel": a line starting with `"* "` is a header, `"- "` a bullet grouped under it).
    pub fn process(&self, blobs: &[Blob], info: &mut Vec<String>) -> Result<Vec<Blob>, NetworkError> {
        match self.slot.state.load(Ordering::Acquire) {
            STATE_NOT_STARTED | STATE_LOADING => return Err(NetworkError::ModelNotLoaded),
            _ => {}
        }

        for (blob, expected) in blobs.iter().zip(&self.declared_inputs) {
            if blob.attr() != expected {
                return Err(NetworkError::ShapeMismatch {
                    expected: expected.clone(),
                    actual: blob.attr().clone(),
                });
            }
        }

        let mut result_guard = self.slot.result.lock().unwrap();
        let backend = match result_guard.as_mut() {
            Some(Ok(backend)) => backend,
            Some(Err(e)) => return Err(e.clone()),
            None => return Err(NetworkError::ModelNotLoaded),
        };

        info.push("* network".to_string());
        let raw = match backend {
            LoadedBackend::General(b) => {
                info.push(format!("- backend: general (tract-onnx), {} input(s)", b.num_inputs()));
                b.process(blobs)?
            }
            LoadedBackend::Accelerated(b) => {
                info.push(format!("- backend: accelerated (wonnx), {} input(s)", b.num_inputs()));
                b.process(blobs)?
            }
            LoadedBackend::Custom(custom) => {
                info.push("- backend: custom".to_string());
                custom.lock().unwrap().process(blobs)?
            }
        };
        drop(result_guard);

        let mut outputs = raw;
        if self.dequant {
            outputs = outputs.iter().map(dequant::dequantize).collect();
            info.push(format!("- dequantized {} output tensor(s)", outputs.len()));
        }
        if self.flatten_outputs {
            let flat = dequant::flatten(&outputs);
            info.push(format!("- flattened into one {}-element vector", flat.attr().element_count()));
            outputs = vec![flat];
        }

        Ok(outputs)
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.wait_before_destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zaru_tensor::{ElementType, Layout, Quant};

    struct EchoNetwork {
        loaded: bool,
    }

    impl CustomNetwork for EchoNetwork {
        fn load(&mut self) -> Result<(), NetworkError> {
            self.loaded = true;
            Ok(())
        }

        fn process(&mut self, blobs: &[Blob]) -> Result<Vec<Blob>, NetworkError> {
            assert!(self.loaded);
            Ok(blobs.to_vec())
        }
    }

    fn attr() -> TensorAttr {
        TensorAttr::new(Layout::Na, ElementType::F32, vec![2], Quant::None).unwrap()
    }

    #[test]
    fn process_before_load_is_model_not_loaded() {
        let net = Network::new_custom(EchoNetwork { loaded: false }, vec![attr()], None, false, false);
        let mut info = Vec::new();
        let err = net.process(&[], &mut info).unwrap_err();
        assert!(matches!(err, NetworkError::ModelNotLoaded));
    }

    #[test]
    fn custom_network_round_trips_after_load() {
        let net = Network::new_custom(EchoNetwork { loaded: false }, vec![attr()], None, false, false);
        net.load();
        net.wait_before_destroy();
        assert!(net.ready());

        let blob = Blob::from_slice(attr(), &[1.0f32, 2.0]).unwrap();
        let mut info = Vec::new();
        let out = net.process(&[blob], &mut info).unwrap();
        assert_eq!(out[0].as_f32().unwrap(), &[1.0, 2.0]);
        assert!(info.iter().any(|l| l.starts_with("* ")));
    }

    #[test]
    fn rejects_mismatched_input_shape() {
        let net = Network::new_custom(EchoNetwork { loaded: false }, vec![attr()], None, false, false);
        net.load();
        net.wait_before_destroy();

        let wrong = TensorAttr::new(Layout::Na, ElementType::F32, vec![3], Quant::None).unwrap();
        let blob = Blob::from_slice(wrong, &[1.0f32, 2.0, 3.0]).unwrap();
        let mut info = Vec::new();
        let err = net.process(&[blob], &mut info).unwrap_err();
        assert!(matches!(err, NetworkError::ShapeMismatch { .. }));
    }

    struct FailingNetwork;
    impl CustomNetwork for FailingNetwork {
        fn load(&mut self) -> Result<(), NetworkError> {
            Err(NetworkError::BackendFailure("boom".into()))
        }
        fn process(&mut self, _blobs: &[Blob]) -> Result<Vec<Blob>, NetworkError> {
            unreachable!()
        }
    }

    #[test]
    fn load_failure_surfaces_on_process() {
        let net = Network::new_custom(FailingNetwork, vec![], None, false, false);
        net.load();
        net.wait_before_destroy();
        assert!(net.ready());
        let mut info = Vec::new();
        let err = net.process(&[], &mut info).unwrap_err();
        assert!(matches!(err, NetworkError::BackendFailure(_)));
    }
}
