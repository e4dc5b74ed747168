//! Post-network output shaping (§4.3): converting quantized integer outputs back to `f32`, and
//! flattening an output set into a single vector. Pure data transforms, independent of which
//! backend produced the blobs, so they can be exercised without a loaded model.

use zaru_tensor::{Blob, ElementType, Layout, Quant, TensorAttr};

/// Converts `blob` to `f32` using its declared quantization, if it carries one. Blobs with
/// `Quant::None`, or whose element type is already `F32`, pass through unchanged (cloned).
pub fn dequantize(blob: &Blob) -> Blob {
    let attr = blob.attr();
    if attr.elem_type() == ElementType::F32 {
        return blob.clone();
    }

    let values: Vec<f32> = match attr.quant() {
        Quant::None => return blob.clone(),
        Quant::AffineAsymmetric { scale, zero_point } => raw_i64(blob)
            .into_iter()
            .map(|raw| (raw - *zero_point as i64) as f32 * scale)
            .collect(),
        Quant::DynamicFixedPoint { fl } => {
            let factor = 2f32.powi(-*fl);
            raw_i64(blob).into_iter().map(|raw| raw as f32 * factor).collect()
        }
        Quant::AffinePerChannel {
            axis,
            scale,
            zero_point,
        } => {
            let dims = attr.dims();
            let raw = raw_i64(blob);
            let mut out = Vec::with_capacity(raw.len());
            let inner: usize = dims[*axis + 1..].iter().product::<usize>().max(1);
            for (i, v) in raw.into_iter().enumerate() {
                let channel = (i / inner) % dims[*axis];
                out.push((v - zero_point[channel] as i64) as f32 * scale[channel]);
            }
            out
        }
    };

    let new_attr = TensorAttr::new(
        attr.layout(),
        ElementType::F32,
        attr.dims().to_vec(),
        Quant::None,
    )
    .expect("dequantized attr always valid: same dims, no quant");
    Blob::from_slice(new_attr, &values).expect("value count matches original element count")
}

fn raw_i64(blob: &Blob) -> Vec<i64> {
    match blob.attr().elem_type() {
        ElementType::U8 => blob.as_slice::<u8>().iter().map(|v| *v as i64).collect(),
        ElementType::I8 => blob.as_slice::<i8>().iter().map(|v| *v as i64).collect(),
        ElementType::U16 => blob.as_slice::<u16>().iter().map(|v| *v as i64).collect(),
        ElementType::I16 => blob.as_slice::<i16>().iter().map(|v| *v as i64).collect(),
        ElementType::U32 => blob.as_slice::<u32>().iter().map(|v| *v as i64).collect(),
        ElementType::I32 => blob.as_slice::<i32>().iter().map(|v| *v as i64).collect(),
        ElementType::F32 | ElementType::F16 | ElementType::Bool => {
            unreachable!("quantization is never attached to non-integer element types")
        }
    }
}

/// Concatenates `blobs` (already dequantized to `f32`) into a single 1-D `f32` blob, in output
/// index order. Only meaningful when dequantization is also enabled.
pub fn flatten(blobs: &[Blob]) -> Blob {
    let mut data = Vec::new();
    for blob in blobs {
        data.extend_from_slice(blob.as_f32().expect("flatten is only called on dequantized f32 blobs"));
    }
    let attr = TensorAttr::new(Layout::Na, ElementType::F32, vec![data.len().max(1)], Quant::None)
        .expect("flat 1-D f32 attr is always valid");
    Blob::from_slice(attr, &data).expect("length matches declared element count")
}

#[cfg(test)]
mod tests {
    use super::*;
    use zaru_tensor::Layout;

    #[test]
    fn dequantizes_affine_asymmetric() {
        let attr = TensorAttr::new(
            Layout::Na,
            ElementType::U8,
            vec![3],
            Quant::AffineAsymmetric {
                scale: 0.5,
                zero_point: 10,
            },
        )
        .unwrap();
        let blob = Blob::from_slice(attr, &[10u8, 12, 20]).unwrap();
        let out = dequantize(&blob);
        assert_eq!(out.as_f32().unwrap(), &[0.0, 1.0, 5.0]);
    }

    #[test]
    fn passes_through_unquantized_f32() {
        let attr = TensorAttr::new(Layout::Na, ElementType::F32, vec![2], Quant::None).unwrap();
        let blob = Blob::from_slice(attr, &[1.5f32, -2.0]).unwrap();
        let out = dequantize(&blob);
        assert_eq!(out.as_f32().unwrap(), &[1.5, -2.0]);
    }

    #[test]
    fn flattens_in_output_order() {
        let a = TensorAttr::new(Layout::Na, ElementType::F32, vec![2], Quant::None).unwrap();
        let b = TensorAttr::new(Layout::Na, ElementType::F32, vec![2], Quant::None).unwrap();
        let blobs = [
            Blob::from_slice(a, &[1.0f32, 2.0]).unwrap(),
            Blob::from_slice(b, &[3.0f32, 4.0]).unwrap(),
        ];
        let flat = flatten(&blobs);
        assert_eq!(flat.as_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
