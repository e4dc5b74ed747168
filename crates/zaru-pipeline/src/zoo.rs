//! The zoo file schema (§6): a YAML mapping of pipeline name → configuration entry. Parsing the
//! lexical layer itself (the YAML document) is `serde_yaml`'s job; this module only owns the
//! schema and the path-resolution rules spec.md §6 describes.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;

/// Everything that can go wrong turning zoo YAML text into a usable [`ZooEntry`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ZooParseError {
    #[error("failed to parse zoo file: {0}")]
    Yaml(String),
    #[error("zoo file has no entry named '{0}'")]
    UnknownPipe(String),
    #[error("zoo entry '{pipe}' is filtered out by filter {filter:?}")]
    FilteredOut { pipe: String, filter: Filter },
}

/// Narrows which zoo entries a UI offers, by the accelerator class each entry targets (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "PascalCase")]
pub enum Filter {
    All,
    OpenCV,
    Tpu,
    Npu,
    Vpu,
}

impl Filter {
    fn admits(&self, nettype: NetType) -> bool {
        match self {
            Filter::All => true,
            Filter::OpenCV => nettype == NetType::OpenCV,
            Filter::Tpu => nettype == NetType::Tpu,
            Filter::Npu => nettype == NetType::Npu,
            Filter::Vpu => false, // no VPU backend is implemented; always filtered
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum NetType {
    OpenCV,
    #[serde(rename = "NPU")]
    Npu,
    #[serde(rename = "TPU")]
    Tpu,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PreProcType {
    Blob,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PostProcType {
    Classify,
    Detect,
    Segment,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DetectTypeKey {
    #[serde(rename = "SSD")]
    Ssd,
    #[serde(rename = "TPUSSD")]
    TpuSsd,
    #[serde(rename = "FasterRCNN")]
    FasterRcnn,
    #[serde(rename = "YOLO")]
    Yolo,
    #[serde(rename = "RAWYOLOFace")]
    RawYoloFace,
    #[serde(rename = "RAWYOLOV2")]
    RawYoloV2,
    #[serde(rename = "RAWYOLOV3")]
    RawYoloV3,
    #[serde(rename = "RAWYOLOV4")]
    RawYoloV4,
    #[serde(rename = "RAWYOLOV3Tiny")]
    RawYoloV3Tiny,
}

fn default_rgb() -> bool {
    true
}
fn default_scale() -> f32 {
    1.0
}
fn default_scale_per_channel() -> [f32; 3] {
    [1.0; 3]
}
fn default_thresh() -> f32 {
    50.0
}
fn default_top() -> usize {
    5
}
fn default_nms() -> f32 {
    50.0
}

/// One zoo entry: everything needed to construct the three pipeline stages (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct ZooEntry {
    #[serde(default)]
    pub preproc: Option<PreProcType>,
    pub nettype: NetType,
    pub postproc: Option<PostProcType>,

    pub model: Option<PathBuf>,
    pub config: Option<PathBuf>,

    #[serde(default)]
    pub intensors: String,
    #[serde(default)]
    pub outtensors: String,

    pub mean: Option<[f32; 3]>,
    #[serde(default = "default_scale_per_channel")]
    pub scale: [f32; 3],
    #[serde(default = "default_rgb")]
    pub rgb: bool,
    pub resize: Option<String>,

    pub classes: Option<PathBuf>,

    pub anchors: Option<String>,
    pub detecttype: Option<DetectTypeKey>,
    #[serde(default = "default_nms")]
    pub nms: f32,
    #[serde(default = "default_thresh")]
    pub thresh: f32,
    #[serde(default = "default_top")]
    pub top: usize,
    #[serde(default)]
    pub classoffset: i64,
    #[serde(default)]
    pub softmax: bool,
    #[serde(default = "default_scale")]
    pub scorescale: f32,

    #[serde(default)]
    pub dequant: bool,
    #[serde(default)]
    pub flattenoutputs: bool,
    pub target: Option<String>,
    pub backend: Option<String>,
    #[serde(default)]
    pub tpunum: u32,

    pub extramodel: Option<PathBuf>,
    pub comment: Option<String>,
    pub accelerator: Option<String>,
}

impl ZooEntry {
    /// Resolves a path that may be relative against `zooroot` (for `model`/`config`/`classes`).
    pub fn resolve(&self, zooroot: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            zooroot.join(path)
        }
    }
}

/// A parsed zoo file: every named entry it declares, plus the directory it was loaded from (the
/// `zooroot` relative paths resolve against).
#[derive(Debug, Clone)]
pub struct ZooFile {
    pub zooroot: PathBuf,
    entries: BTreeMap<String, ZooEntry>,
}

impl ZooFile {
    pub fn load(path: &Path) -> Result<Self, ZooParseError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ZooParseError::Yaml(format!("reading '{}': {e}", path.display())))?;
        let entries: BTreeMap<String, ZooEntry> =
            serde_yaml::from_str(&text).map_err(|e| ZooParseError::Yaml(e.to_string()))?;
        let zooroot = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self { zooroot, entries })
    }

    pub fn parse(text: &str, zooroot: PathBuf) -> Result<Self, ZooParseError> {
        let entries: BTreeMap<String, ZooEntry> =
            serde_yaml::from_str(text).map_err(|e| ZooParseError::Yaml(e.to_string()))?;
        Ok(Self { zooroot, entries })
    }

    /// Looks up `pipe`, rejecting entries the `filter` excludes (§6, "a single global filter
    /// narrows which entries are offered").
    pub fn get(&self, pipe: &str, filter: Filter) -> Result<&ZooEntry, ZooParseError> {
        let entry = self
            .entries
            .get(pipe)
            .ok_or_else(|| ZooParseError::UnknownPipe(pipe.to_string()))?;
        if !filter.admits(entry.nettype) {
            return Err(ZooParseError::FilteredOut {
                pipe: pipe.to_string(),
                filter,
            });
        }
        Ok(entry)
    }

    /// Names of every entry admitted by `filter`, in file order.
    pub fn names(&self, filter: Filter) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| filter.admits(e.nettype))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
mobilenet:
  nettype: OpenCV
  preproc: Blob
  postproc: Classify
  model: mobilenet.onnx
  intensors: "NCHW:32F:1x3x224x224"
  outtensors: "NA:32F:1x1000"
  classes: imagenet.txt
  mean: [0.485, 0.456, 0.406]
  rgb: true

yolo_tpu:
  nettype: TPU
  preproc: Blob
  postproc: Detect
  model: yolo.tflite
  detecttype: RAWYOLOV3
  anchors: "10,14,23,27,37,58"
  classes: coco.txt
"#;

    #[test]
    fn parses_multiple_entries() {
        let zoo = ZooFile::parse(SAMPLE, PathBuf::from("/zoo")).unwrap();
        assert_eq!(zoo.names(Filter::All).len(), 2);
        let entry = zoo.get("mobilenet", Filter::All).unwrap();
        assert_eq!(entry.nettype, NetType::OpenCV);
        assert_eq!(entry.postproc, Some(PostProcType::Classify));
    }

    #[test]
    fn filter_excludes_non_matching_nettype() {
        let zoo = ZooFile::parse(SAMPLE, PathBuf::from("/zoo")).unwrap();
        let err = zoo.get("mobilenet", Filter::Tpu).unwrap_err();
        assert!(matches!(err, ZooParseError::FilteredOut { .. }));
        zoo.get("yolo_tpu", Filter::Tpu).unwrap();
    }

    #[test]
    fn unknown_pipe_is_an_error() {
        let zoo = ZooFile::parse(SAMPLE, PathBuf::from("/zoo")).unwrap();
        assert!(matches!(zoo.get("nope", Filter::All), Err(ZooParseError::UnknownPipe(_))));
    }

    #[test]
    fn relative_paths_resolve_against_zooroot() {
        let zoo = ZooFile::parse(SAMPLE, PathBuf::from("/zoo")).unwrap();
        let entry = zoo.get("mobilenet", Filter::All).unwrap();
        let resolved = entry.resolve(&zoo.zooroot, entry.model.as_deref().unwrap());
        assert_eq!(resolved, PathBuf::from("/zoo/mobilenet.onnx"));
    }
}
