//! The pipeline controller (§4.5): loads a zoo entry, constructs the three stages to match, and
//! sequences per-frame execution in sync or async mode so a slow network doesn't stall the
//! camera loop that drives [`Pipeline::process`].

mod error;
pub mod zoo;

use std::{
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

pub use error::PipelineError;
pub use zoo::{Filter, ZooEntry, ZooFile};

use zaru_image::{Image, ImageView, Resolution};
use zaru_nn::{CustomNetwork, NetKind, Network};
use zaru_postproc::{
    Classify, CustomPostProc, Detect, DetectType, LabelMap, PostProc, PostProcResult,
    PreProcContext, Segment, SegmentType,
};
use zaru_preproc::{BlobPreProc, CustomPreProc, PreProc};
use zaru_tensor::{parse_spec, TensorAttr};
use zaru_utils::timer::Timer;

/// One of the pipeline's lifecycle states (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loading,
    Ready,
    RunningSync,
    RunningAsyncInflight,
    Error,
}

struct Stages {
    preproc: PreProc,
    network: Arc<Network>,
    postproc: PostProc,
    input_attrs: Vec<TensorAttr>,
    net_size: Resolution,
}

struct AsyncInflight {
    receiver: crossbeam_channel::Receiver<Result<Vec<zaru_tensor::Blob>, zaru_nn::NetworkError>>,
    ctx: PreProcContext,
    started: Instant,
}

/// Loads a zoo entry, owns the three pipeline stages, and drives per-frame execution.
pub struct Pipeline {
    zoo: Option<ZooFile>,
    zoo_path: Option<PathBuf>,
    filter: Filter,
    pipe: Option<String>,
    nettype_override: Option<zoo::NetType>,

    custom_preproc: Option<Box<dyn CustomPreProc>>,
    custom_network: Option<Box<dyn CustomNetwork>>,
    custom_postproc: Option<Box<dyn CustomPostProc>>,

    stages: Option<Stages>,
    state: PipelineState,
    pending_reconfigure: bool,
    frozen: bool,
    async_mode: bool,

    inflight: Option<AsyncInflight>,
    last_result: Option<(PostProcResult, PreProcContext)>,

    preproc_timer: Timer,
    network_timer: Timer,
    postproc_timer: Timer,

    error_logged: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            zoo: None,
            zoo_path: None,
            filter: Filter::All,
            pipe: None,
            nettype_override: None,
            custom_preproc: None,
            custom_network: None,
            custom_postproc: None,
            stages: None,
            state: PipelineState::Idle,
            pending_reconfigure: false,
            frozen: false,
            async_mode: false,
            inflight: None,
            last_result: None,
            preproc_timer: Timer::new("preproc"),
            network_timer: Timer::new("network"),
            postproc_timer: Timer::new("postproc"),
            error_logged: false,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn timers(&self) -> [&Timer; 3] {
        [&self.preproc_timer, &self.network_timer, &self.postproc_timer]
    }

    /// Switches between synchronous and asynchronous per-frame execution (§4.5).
    pub fn set_async(&mut self, async_mode: bool) {
        self.async_mode = async_mode;
    }

    pub fn set_zoo(&mut self, path: impl Into<PathBuf>) {
        if self.frozen {
            return;
        }
        self.zoo_path = Some(path.into());
        self.zoo = None;
        self.pending_reconfigure = true;
    }

    pub fn set_filter(&mut self, filter: Filter) {
        if self.frozen {
            return;
        }
        self.filter = filter;
        self.pending_reconfigure = true;
    }

    pub fn set_pipe(&mut self, pipe: impl Into<String>) {
        if self.frozen {
            return;
        }
        self.pipe = Some(pipe.into());
        self.pending_reconfigure = true;
    }

    /// Forces a specific backend regardless of the zoo entry's declared `nettype`.
    pub fn set_nettype_override(&mut self, nettype: Option<zoo::NetType>) {
        if self.frozen {
            return;
        }
        self.nettype_override = nettype;
        self.pending_reconfigure = true;
    }

    /// Installs a user-supplied pre-processor. Only takes effect if the selected zoo entry's
    /// `preproc` key is `Custom`.
    pub fn set_custom_preproc(&mut self, custom: impl CustomPreProc + 'static) {
        self.custom_preproc = Some(Box::new(custom));
    }

    pub fn set_custom_network(&mut self, custom: impl CustomNetwork + 'static) {
        self.custom_network = Some(Box::new(custom));
    }

    pub fn set_custom_postproc(&mut self, custom: impl CustomPostProc + 'static) {
        self.custom_postproc = Some(Box::new(custom));
    }

    /// Locks the pipeline's identity-forming parameters (zoo, zooroot, filter, pipe, nettype,
    /// preproc, postproc) and propagates the freeze to the network stage (§4.5).
    pub fn freeze(&mut self, doit: bool) {
        self.frozen = doit;
        if let Some(stages) = &self.stages {
            stages.network.freeze(doit);
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// One frame, never throwing: any stage error is caught, logged once (until the next
    /// successful reconfiguration clears it), and surfaced as a single overlay/report line.
    pub fn process(&mut self, frame: ImageView<'_>, mut out_img: Option<&mut Image>, overlay: bool) -> Vec<String> {
        if self.pending_reconfigure {
            if let Err(e) = self.reconfigure() {
                if !self.error_logged {
                    log::error!("zoo reconfiguration failed: {e}");
                    self.error_logged = true;
                }
                if e.keeps_previous_pipe_active() && self.stages.is_some() {
                    self.pending_reconfigure = false;
                } else {
                    return vec![format!("error: {e}")];
                }
            } else {
                self.error_logged = false;
            }
        }

        if self.state == PipelineState::Error {
            return vec!["(pipeline is in error state; reconfigure to clear)".to_string()];
        }

        let result = if self.async_mode {
            self.process_async(frame, out_img.as_deref_mut(), overlay)
        } else {
            self.process_sync(frame, out_img.as_deref_mut(), overlay)
        };

        match result {
            Ok(lines) => {
                self.error_logged = false;
                lines
            }
            Err(e) if e.is_locally_recoverable() => vec!["Network loading...".to_string()],
            Err(e) => {
                self.state = PipelineState::Error;
                if !self.error_logged {
                    log::error!("pipeline error: {e}");
                    self.error_logged = true;
                }
                vec![format!("error: {e}")]
            }
        }
    }

    fn process_sync(
        &mut self,
        frame: ImageView<'_>,
        out_img: Option<&mut Image>,
        overlay: bool,
    ) -> Result<Vec<String>, PipelineError> {
        let stages = self.stages.as_mut().ok_or(PipelineError::NoPipeSelected)?;
        if !stages.network.ready() {
            return Err(PipelineError::from(zaru_nn::NetworkError::ModelNotLoaded));
        }

        self.state = PipelineState::RunningSync;
        let frame_size = frame.resolution();
        let crop = frame_size.rect();
        let ctx = PreProcContext::new(frame_size, crop, stages.net_size);

        let blobs = self
            .preproc_timer
            .time(|| stages.preproc.process(frame, &stages.input_attrs))?;

        let mut info = Vec::new();
        let outputs = self
            .network_timer
            .time(|| stages.network.process(&blobs, &mut info))?;

        let result = self
            .postproc_timer
            .time(|| stages.postproc.process(&outputs, &ctx))?;

        let mut lines = stages.postproc.report(&result, out_img, overlay);
        lines.extend(info);
        self.last_result = Some((result, ctx));
        self.state = PipelineState::Ready;
        Ok(lines)
    }

    fn process_async(
        &mut self,
        frame: ImageView<'_>,
        out_img: Option<&mut Image>,
        overlay: bool,
    ) -> Result<Vec<String>, PipelineError> {
        if !self
            .stages
            .as_ref()
            .ok_or(PipelineError::NoPipeSelected)?
            .network
            .ready()
        {
            return Err(PipelineError::from(zaru_nn::NetworkError::ModelNotLoaded));
        }

        let mut ready = None;
        if let Some(inflight) = self.inflight.take() {
            match inflight.receiver.try_recv() {
                Ok(outputs) => ready = Some((outputs, inflight.ctx, inflight.started)),
                Err(crossbeam_channel::TryRecvError::Empty) => {
                    self.inflight = Some(inflight);
                    self.state = PipelineState::RunningAsyncInflight;
                }
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    return Err(PipelineError::from(zaru_nn::NetworkError::BackendFailure(
                        "inference worker thread terminated without a result".to_string(),
                    )));
                }
            }
        }

        if let Some((outputs, ctx, started)) = ready {
            let outputs = outputs?;
            let result = {
                let stages = self.stages.as_mut().unwrap();
                stages.postproc.process(&outputs, &ctx)?
            };
            self.network_timer.record(started.elapsed());
            self.last_result = Some((result, ctx));
            self.launch_inference(frame)?;
        } else if self.inflight.is_none() {
            self.launch_inference(frame)?;
        }

        match &self.last_result {
            Some((result, _)) => Ok(self
                .stages
                .as_ref()
                .unwrap()
                .postproc
                .report(result, out_img, overlay)),
            None => Ok(vec!["(warming up)".to_string()]),
        }
    }

    /// Pre-processes `frame` and launches the network on a background thread, stashing the
    /// receiving end of a one-shot channel (§4.5, §5: at most one inference in flight).
    fn launch_inference(&mut self, frame: ImageView<'_>) -> Result<(), PipelineError> {
        let stages = self.stages.as_ref().unwrap();
        let frame_size = frame.resolution();
        let crop = frame_size.rect();
        let ctx = PreProcContext::new(frame_size, crop, stages.net_size);

        let stages_mut = self.stages.as_mut().unwrap();
        let blobs = self
            .preproc_timer
            .time(|| stages_mut.preproc.process(frame, &stages_mut.input_attrs))?;

        let network = Arc::clone(&stages_mut.network);
        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            let mut info = Vec::new();
            let _ = tx.send(network.process(&blobs, &mut info));
        });

        self.inflight = Some(AsyncInflight {
            receiver: rx,
            ctx,
            started: Instant::now(),
        });
        self.state = PipelineState::RunningAsyncInflight;
        Ok(())
    }

    /// Rebuilds the three stages from the currently selected zoo entry (§4.5, "Reconfiguration").
    fn reconfigure(&mut self) -> Result<(), PipelineError> {
        // Step 1: drain any outstanding background work before touching anything.
        if let Some(stages) = &self.stages {
            stages.network.wait_before_destroy();
        }
        if let Some(inflight) = self.inflight.take() {
            let _ = inflight.receiver.recv();
        }

        let zoo_path = self.zoo_path.clone().ok_or(PipelineError::NoZooLoaded)?;
        if self.zoo.is_none() {
            self.zoo = Some(ZooFile::load(&zoo_path)?);
        }
        let pipe = self.pipe.clone().ok_or(PipelineError::NoPipeSelected)?;
        let zoo = self.zoo.as_ref().unwrap();
        let entry = zoo.get(&pipe, self.filter)?.clone();
        let zooroot = zoo.zooroot.clone();

        // Only now, with a valid entry in hand, tear down the old stages (reverse construction
        // order: postproc, network, preproc) and construct the new ones.
        self.stages = None;
        self.pending_reconfigure = false;

        let input_attrs = parse_spec(&entry.intensors)?;
        let output_attrs = if entry.outtensors.trim().is_empty() {
            None
        } else {
            Some(parse_spec(&entry.outtensors)?)
        };
        let net_size = net_input_size(&input_attrs);

        let preproc = self.build_preproc(&entry)?;
        let network = self.build_network(&entry, &zooroot, input_attrs.clone(), output_attrs)?;
        let postproc = self.build_postproc(&entry, &zooroot, input_attrs.len())?;

        network.load();
        self.state = PipelineState::Loading;
        self.last_result = None;
        self.stages = Some(Stages {
            preproc,
            network: Arc::new(network),
            postproc,
            input_attrs,
            net_size,
        });
        Ok(())
    }

    fn build_preproc(&mut self, entry: &ZooEntry) -> Result<PreProc, PipelineError> {
        match entry.preproc {
            Some(zoo::PreProcType::Custom) | None if self.custom_preproc.is_some() => {
                Ok(PreProc::Custom(self.custom_preproc.take().unwrap()))
            }
            Some(zoo::PreProcType::Custom) => Err(PipelineError::MissingCustomStage("preproc")),
            _ => {
                let mut blob = BlobPreProc::new();
                if let Some(mean) = entry.mean {
                    blob.set_mean(mean);
                }
                blob.set_scale(entry.scale);
                blob.set_rgb(entry.rgb);
                Ok(PreProc::Blob(blob))
            }
        }
    }

    fn build_network(
        &mut self,
        entry: &ZooEntry,
        zooroot: &std::path::Path,
        input_attrs: Vec<TensorAttr>,
        output_attrs: Option<Vec<TensorAttr>>,
    ) -> Result<Network, PipelineError> {
        let nettype = self.nettype_override.unwrap_or(entry.nettype);
        if nettype == zoo::NetType::Custom {
            return match self.custom_network.take() {
                Some(custom) => Ok(Network::new_custom(
                    AnyCustomNetwork(custom),
                    input_attrs,
                    output_attrs,
                    entry.dequant,
                    entry.flattenoutputs,
                )),
                None => Err(PipelineError::MissingCustomStage("network")),
            };
        }

        let kind = match nettype {
            zoo::NetType::OpenCV => NetKind::General,
            zoo::NetType::Npu | zoo::NetType::Tpu => NetKind::Accelerated,
            zoo::NetType::Custom => unreachable!(),
        };
        let model = entry
            .model
            .as_deref()
            .map(|p| entry.resolve(zooroot, p))
            .ok_or(PipelineError::MissingModelPath)?;
        Ok(Network::new(model, kind, input_attrs, output_attrs, entry.dequant, entry.flattenoutputs))
    }

    fn build_postproc(&mut self, entry: &ZooEntry, zooroot: &std::path::Path, num_layers: usize) -> Result<PostProc, PipelineError> {
        match entry.postproc {
            Some(zoo::PostProcType::Custom) | None if self.custom_postproc.is_some() => {
                Ok(PostProc::Custom(self.custom_postproc.take().unwrap()))
            }
            Some(zoo::PostProcType::Custom) => Err(PipelineError::MissingCustomStage("postproc")),
            Some(zoo::PostProcType::Classify) | None => {
                let labels = load_labels(entry, zooroot);
                let mut c = Classify::new(labels);
                c.set_softmax(entry.softmax)
                    .set_score_scale(entry.scorescale)
                    .set_thresh_pct(entry.thresh)
                    .set_top(entry.top)
                    .set_class_offset(entry.classoffset);
                Ok(PostProc::Classify(c))
            }
            Some(zoo::PostProcType::Detect) => {
                let labels = load_labels(entry, zooroot);
                let num_classes = labels.len();
                let detect_type = detect_type_from_zoo(entry.detecttype)?;
                let mut d = Detect::new(detect_type, labels, num_classes);
                d.set_thresh(entry.thresh / 100.0).set_iou_thresh(entry.nms / 100.0);
                if matches!(
                    detect_type,
                    DetectType::RawYoloFace
                        | DetectType::RawYoloV2
                        | DetectType::RawYoloV3
                        | DetectType::RawYoloV4
                        | DetectType::RawYoloV3Tiny
                ) {
                    let anchors = entry.anchors.as_deref().unwrap_or("");
                    d.set_anchors(anchors, num_layers.max(1))?;
                }
                Ok(PostProc::Detect(d))
            }
            Some(zoo::PostProcType::Segment) => {
                let labels = load_labels(entry, zooroot);
                Ok(PostProc::Segment(Segment::new(SegmentType::Classes, labels)))
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts a `Box<dyn CustomNetwork>` so it can itself implement `CustomNetwork`, letting
/// `Network::new_custom` (which takes `impl CustomNetwork`) accept an already-boxed trait object.
struct AnyCustomNetwork(Box<dyn CustomNetwork>);

impl CustomNetwork for AnyCustomNetwork {
    fn load(&mut self) -> Result<(), zaru_nn::NetworkError> {
        self.0.load()
    }

    fn process(&mut self, blobs: &[zaru_tensor::Blob]) -> Result<Vec<zaru_tensor::Blob>, zaru_nn::NetworkError> {
        self.0.process(blobs)
    }
}

fn load_labels(entry: &ZooEntry, zooroot: &std::path::Path) -> LabelMap {
    match &entry.classes {
        Some(path) => {
            let resolved = entry.resolve(zooroot, path);
            LabelMap::load(&resolved).unwrap_or_else(|e| {
                log::warn!("failed to read labels file '{}': {e}", resolved.display());
                LabelMap::empty()
            })
        }
        None => LabelMap::empty(),
    }
}

fn detect_type_from_zoo(key: Option<zoo::DetectTypeKey>) -> Result<DetectType, PipelineError> {
    Ok(match key {
        Some(zoo::DetectTypeKey::Ssd) | None => DetectType::Ssd,
        Some(zoo::DetectTypeKey::TpuSsd) => DetectType::TpuSsd,
        Some(zoo::DetectTypeKey::FasterRcnn) => DetectType::FasterRcnn,
        Some(zoo::DetectTypeKey::Yolo) => DetectType::Yolo,
        Some(zoo::DetectTypeKey::RawYoloFace) => DetectType::RawYoloFace,
        Some(zoo::DetectTypeKey::RawYoloV2) => DetectType::RawYoloV2,
        Some(zoo::DetectTypeKey::RawYoloV3) => DetectType::RawYoloV3,
        Some(zoo::DetectTypeKey::RawYoloV4) => DetectType::RawYoloV4,
        Some(zoo::DetectTypeKey::RawYoloV3Tiny) => DetectType::RawYoloV3Tiny,
    })
}

/// Recovers the network's declared input (width, height) from its first input tensor's shape,
/// honoring NCHW/NHWC layout, for raw-YOLO stride computation and the default preproc context.
fn net_input_size(attrs: &[TensorAttr]) -> Resolution {
    let Some(attr) = attrs.first() else {
        return Resolution::new(1, 1);
    };
    let dims = attr.dims();
    match attr.layout() {
        zaru_tensor::Layout::Nchw if dims.len() >= 2 => {
            Resolution::new(dims[dims.len() - 1] as u32, dims[dims.len() - 2] as u32)
        }
        zaru_tensor::Layout::Nhwc if dims.len() >= 3 => {
            Resolution::new(dims[dims.len() - 2] as u32, dims[dims.len() - 3] as u32)
        }
        _ if dims.len() >= 2 => Resolution::new(dims[dims.len() - 1] as u32, dims[dims.len() - 2] as u32),
        _ => Resolution::new(1, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zaru_image::Image;

    #[test]
    fn idle_pipeline_reports_no_pipe_selected() {
        let mut p = Pipeline::new();
        let frame = Image::new(4, 4);
        let lines = p.process(frame.view(&frame.rect()), None, false);
        assert_eq!(lines, ["error: no pipe has been selected"]);
    }

    #[test]
    fn unknown_zoo_path_surfaces_as_error_without_crashing() {
        let mut p = Pipeline::new();
        p.set_zoo("/nonexistent/zoo.yaml");
        p.set_pipe("whatever");
        let frame = Image::new(4, 4);
        let lines = p.process(frame.view(&frame.rect()), None, false);
        assert!(lines[0].starts_with("error: "));
        assert_eq!(p.state(), PipelineState::Idle);
    }

    #[test]
    fn net_input_size_reads_nchw_last_two_dims() {
        use zaru_tensor::{ElementType, Quant};
        let attr = TensorAttr::new(zaru_tensor::Layout::Nchw, ElementType::F32, vec![1, 3, 224, 320], Quant::None).unwrap();
        assert_eq!(net_input_size(&[attr]), Resolution::new(320, 224));
    }
}
