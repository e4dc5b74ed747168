use std::collections::BTreeMap;

use zaru_image::{draw, Image};
use zaru_tensor::{label_to_color, Blob};

use crate::{LabelMap, PostProcError};

/// Which axis order a segmentation model's scores are laid out in (§4.4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    /// `[H, W, C]` of per-class scores; argmax over the last axis.
    Classes,
    /// `[C, H, W]` of per-class scores; argmax over the first axis.
    Classes2,
    /// `[H, W]` of class ids directly, no argmax needed.
    ArgMax,
}

/// A decoded per-pixel class-id grid, at the network's output resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentMap {
    pub width: u32,
    pub height: u32,
    pub class_ids: Vec<u32>,
}

impl SegmentMap {
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.class_ids[(y * self.width + x) as usize]
    }
}

/// §4.4.3: decodes a segmentation output into a per-pixel class-id grid and renders a colorized,
/// nearest-neighbor-upsampled overlay.
pub struct Segment {
    segtype: SegmentType,
    labels: LabelMap,
    bg_id: u32,
    alpha: u8,
}

impl Segment {
    pub fn new(segtype: SegmentType, labels: LabelMap) -> Self {
        Self {
            segtype,
            labels,
            bg_id: 0,
            alpha: 128,
        }
    }

    pub fn set_bg_id(&mut self, bg_id: u32) -> &mut Self {
        self.bg_id = bg_id;
        self
    }

    pub fn set_alpha(&mut self, alpha: u8) -> &mut Self {
        self.alpha = alpha;
        self
    }

    pub fn process(&mut self, outputs: &[Blob]) -> Result<SegmentMap, PostProcError> {
        if outputs.len() != 1 {
            return Err(PostProcError::UnexpectedOutputCount {
                expected: 1,
                actual: outputs.len(),
            });
        }
        let blob = &outputs[0];
        let dims = blob.attr().dims();
        let data = blob
            .as_f32()
            .expect("segmentation output must be f32 (network stage dequantizes integer outputs)");

        let map = match self.segtype {
            SegmentType::Classes => {
                let (h, w, c) = (dims[0], dims[1], dims[2]);
                let class_ids = argmax_over_axis(data, h * w, c, 1);
                SegmentMap {
                    width: w as u32,
                    height: h as u32,
                    class_ids,
                }
            }
            SegmentType::Classes2 => {
                let (c, h, w) = (dims[0], dims[1], dims[2]);
                let mut class_ids = vec![0u32; h * w];
                for pixel in 0..(h * w) {
                    let mut best = (0u32, f32::NEG_INFINITY);
                    for class in 0..c {
                        let v = data[class * h * w + pixel];
                        if v > best.1 {
                            best = (class as u32, v);
                        }
                    }
                    class_ids[pixel] = best.0;
                }
                SegmentMap {
                    width: w as u32,
                    height: h as u32,
                    class_ids,
                }
            }
            SegmentType::ArgMax => {
                let (h, w) = (dims[0], dims[1]);
                SegmentMap {
                    width: w as u32,
                    height: h as u32,
                    class_ids: data.iter().map(|v| v.round() as u32).collect(),
                }
            }
        };
        Ok(map)
    }

    pub fn report(&self, map: Option<&SegmentMap>, out_img: Option<&mut Image>, overlay: bool) -> Vec<String> {
        let Some(map) = map else {
            return vec!["(no segmentation result)".to_string()];
        };

        let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
        for &id in &map.class_ids {
            *counts.entry(id).or_default() += 1;
        }

        if overlay {
            if let Some(out_img) = out_img {
                self.draw_overlay(map, out_img);
            }
        }

        counts
            .into_iter()
            .filter(|(id, _)| *id != self.bg_id)
            .map(|(id, count)| format!("{}: {}: {} px", id, self.labels.get(id), count))
            .collect()
    }

    fn draw_overlay(&self, map: &SegmentMap, out_img: &mut Image) {
        let (out_w, out_h) = (out_img.width(), out_img.height());
        for y in 0..out_h {
            for x in 0..out_w {
                let sx = (x * map.width / out_w.max(1)).min(map.width - 1);
                let sy = (y * map.height / out_h.max(1)).min(map.height - 1);
                let id = map.get(sx, sy);
                if id == self.bg_id {
                    continue;
                }
                let color = label_to_color(&self.labels.get(id), self.alpha);
                draw::blend_pixel(out_img.as_raw_mut(), x, y, color);
            }
        }
    }
}

/// Argmaxes `data` (laid out as `outer` groups of `inner` contiguous per-class scores) over the
/// class axis, used for [`SegmentType::Classes`] (`inner` = `C`, contiguous per pixel).
fn argmax_over_axis(data: &[f32], outer: usize, inner: usize, _stride: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(outer);
    for pixel in 0..outer {
        let slice = &data[pixel * inner..(pixel + 1) * inner];
        let (best, _) = slice
            .iter()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |acc, (i, v)| {
                if *v > acc.1 {
                    (i, *v)
                } else {
                    acc
                }
            });
        out.push(best as u32);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use zaru_tensor::{ElementType, Layout, Quant, TensorAttr};

    fn blob(dims: Vec<usize>, values: &[f32]) -> Blob {
        let attr = TensorAttr::new(Layout::Na, ElementType::F32, dims, Quant::None).unwrap();
        Blob::from_slice(attr, values).unwrap()
    }

    #[test]
    fn argmax_mode_passes_through_ids() {
        let mut seg = Segment::new(SegmentType::ArgMax, LabelMap::empty());
        let out = seg
            .process(&[blob(vec![2, 2], &[0.0, 1.0, 2.0, 0.0])])
            .unwrap();
        assert_eq!(out.class_ids, [0, 1, 2, 0]);
    }

    #[test]
    fn classes_layout_argmaxes_over_last_axis() {
        let mut seg = Segment::new(SegmentType::Classes, LabelMap::empty());
        // 1x2 image, 3 classes; pixel 0 favors class 1, pixel 1 favors class 2
        let out = seg
            .process(&[blob(vec![1, 2, 3], &[0.1, 0.9, 0.0, 0.0, 0.1, 0.8])])
            .unwrap();
        assert_eq!(out.class_ids, [1, 2]);
    }

    #[test]
    fn classes2_layout_argmaxes_over_first_axis() {
        let mut seg = Segment::new(SegmentType::Classes2, LabelMap::empty());
        // 3 classes, 1x2 image: class0=[0.1,0.0], class1=[0.9,0.0], class2=[0.0,0.8]
        let out = seg
            .process(&[blob(vec![3, 1, 2], &[0.1, 0.0, 0.9, 0.0, 0.0, 0.8])])
            .unwrap();
        assert_eq!(out.class_ids, [1, 2]);
    }
}
