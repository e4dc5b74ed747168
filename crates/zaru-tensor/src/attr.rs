use tinyvec::TinyVec;

use crate::TensorSpecError;

/// The closed set of element types a tensor spec string can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ElementType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F16,
    F32,
    Bool,
}

impl ElementType {
    /// Parses the short type code used in tensor spec strings (`8U`, `32F`, ...).
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "8U" => Self::U8,
            "8S" => Self::I8,
            "16U" => Self::U16,
            "16S" => Self::I16,
            "32U" => Self::U32,
            "32S" => Self::I32,
            "16F" => Self::F16,
            "32F" => Self::F32,
            "Bool" => Self::Bool,
            _ => return None,
        })
    }

    /// Returns the short type code used in tensor spec strings.
    pub fn code(&self) -> &'static str {
        match self {
            Self::U8 => "8U",
            Self::I8 => "8S",
            Self::U16 => "16U",
            Self::I16 => "16S",
            Self::U32 => "32U",
            Self::I32 => "32S",
            Self::F16 => "16F",
            Self::F32 => "32F",
            Self::Bool => "Bool",
        }
    }

    /// Whether this type can legally carry quantization metadata (integer types only).
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::U8 | Self::I8 | Self::U16 | Self::I16 | Self::U32 | Self::I32
        )
    }
}

/// Informational data layout tag. Does not reorder or otherwise affect the underlying buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Layout {
    Nchw,
    Nhwc,
    /// Not applicable / unspecified.
    Na,
}

impl Layout {
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "NCHW" => Self::Nchw,
            "NHWC" => Self::Nhwc,
            "NA" => Self::Na,
            _ => return None,
        })
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Nchw => "NCHW",
            Self::Nhwc => "NHWC",
            Self::Na => "NA",
        }
    }
}

/// Quantization metadata attached to an integer-typed tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Quant {
    None,
    /// Dynamic fixed point: `real = raw / 2^fl`.
    DynamicFixedPoint { fl: i32 },
    /// Affine-asymmetric: `real = (raw - zero_point) * scale`.
    AffineAsymmetric { scale: f32, zero_point: i32 },
    /// Per-channel affine, one `(scale, zero_point)` pair per slice along `axis`.
    AffinePerChannel {
        axis: usize,
        scale: Vec<f32>,
        zero_point: Vec<i32>,
    },
}

/// The cross-runtime descriptor of a single tensor: layout, element type, shape and
/// quantization, used to bridge heterogeneous inference backends.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorAttr {
    layout: Layout,
    elem_type: ElementType,
    dims: TinyVec<[usize; 8]>,
    quant: Quant,
}

impl TensorAttr {
    /// Builds a tensor attribute, checking every cross-field invariant.
    ///
    /// Rejects rank outside `1..=8`, quantization on a non-integer element type, and an
    /// affine-per-channel descriptor whose axis or per-channel vector lengths don't match `dims`.
    pub fn new(
        layout: Layout,
        elem_type: ElementType,
        dims: Vec<usize>,
        quant: Quant,
    ) -> Result<Self, TensorSpecError> {
        if dims.is_empty() || dims.len() > 8 {
            return Err(TensorSpecError::MalformedSpec(format!(
                "tensor rank must be 1..=8, got {}",
                dims.len()
            )));
        }
        if !matches!(quant, Quant::None) && !elem_type.is_integer() {
            return Err(TensorSpecError::MalformedSpec(format!(
                "quantization is not valid on element type {:?}",
                elem_type
            )));
        }
        if let Quant::AffinePerChannel {
            axis,
            scale,
            zero_point,
        } = &quant
        {
            if *axis >= dims.len() {
                return Err(TensorSpecError::MalformedSpec(format!(
                    "affine-per-channel axis {} out of range for rank {}",
                    axis,
                    dims.len()
                )));
            }
            if scale.len() != zero_point.len() || scale.len() != dims[*axis] {
                return Err(TensorSpecError::MalformedSpec(
                    "affine-per-channel scale/zero_point length must match dim[axis]".into(),
                ));
            }
        }

        Ok(Self {
            layout,
            elem_type,
            dims: TinyVec::from(&dims[..]),
            quant,
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn elem_type(&self) -> ElementType {
        self.elem_type
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn quant(&self) -> &Quant {
        &self.quant
    }

    /// The total number of elements, i.e. the product of all dimension sizes.
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_quant_on_float_type() {
        let err = TensorAttr::new(
            Layout::Na,
            ElementType::F32,
            vec![4],
            Quant::AffineAsymmetric {
                scale: 1.0,
                zero_point: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TensorSpecError::MalformedSpec(_)));
    }

    #[test]
    fn rejects_per_channel_axis_out_of_range() {
        let err = TensorAttr::new(
            Layout::Nchw,
            ElementType::I8,
            vec![1, 3, 4, 4],
            Quant::AffinePerChannel {
                axis: 4,
                scale: vec![1.0],
                zero_point: vec![0],
            },
        )
        .unwrap_err();
        assert!(matches!(err, TensorSpecError::MalformedSpec(_)));
    }

    #[test]
    fn element_count_is_dim_product() {
        let attr = TensorAttr::new(Layout::Nchw, ElementType::U8, vec![1, 3, 224, 224], Quant::None)
            .unwrap();
        assert_eq!(attr.element_count(), 1 * 3 * 224 * 224);
    }
}
