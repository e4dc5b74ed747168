use crate::{ElementType, TensorAttr};

/// A logically n-dimensional numeric buffer paired with its [`TensorAttr`].
///
/// Storage is always a flat byte buffer in row-major order; typed accessors reinterpret it
/// according to `attr.elem_type()`. Created by the pre-processor, owned by the pipeline for the
/// duration of one frame, and passed by shared reference to the network.
#[derive(Debug, Clone)]
pub struct Blob {
    attr: TensorAttr,
    bytes: Vec<u8>,
}

impl Blob {
    /// Builds a blob from raw bytes, checking that the buffer length matches the attribute's
    /// element count and element size.
    pub fn from_bytes(attr: TensorAttr, bytes: Vec<u8>) -> Result<Self, BlobError> {
        let expected = attr.element_count() * elem_size(attr.elem_type());
        if bytes.len() != expected {
            return Err(BlobError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self { attr, bytes })
    }

    /// Builds a blob from a typed slice, casting it to bytes. `T`'s size must match the declared
    /// element type's size.
    pub fn from_slice<T: bytemuck::Pod>(attr: TensorAttr, data: &[T]) -> Result<Self, BlobError> {
        Self::from_bytes(attr, bytemuck::cast_slice(data).to_vec())
    }

    pub fn attr(&self) -> &TensorAttr {
        &self.attr
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reinterprets the buffer as a slice of `T`. Panics if `T`'s size doesn't divide evenly.
    pub fn as_slice<T: bytemuck::Pod>(&self) -> &[T] {
        bytemuck::cast_slice(&self.bytes)
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        (self.attr.elem_type() == ElementType::F32).then(|| self.as_slice())
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        (self.attr.elem_type() == ElementType::U8).then(|| self.as_bytes())
    }

    pub fn as_i8(&self) -> Option<&[i8]> {
        (self.attr.elem_type() == ElementType::I8).then(|| self.as_slice())
    }
}

fn elem_size(elem_type: ElementType) -> usize {
    match elem_type {
        ElementType::U8 | ElementType::I8 | ElementType::Bool => 1,
        ElementType::U16 | ElementType::I16 | ElementType::F16 => 2,
        ElementType::U32 | ElementType::I32 | ElementType::F32 => 4,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob buffer length {actual} does not match expected {expected} for declared attr")]
    LengthMismatch { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Layout, Quant};

    #[test]
    fn rejects_mismatched_buffer_length() {
        let attr = TensorAttr::new(Layout::Na, ElementType::F32, vec![4], Quant::None).unwrap();
        let err = Blob::from_bytes(attr, vec![0u8; 3]).unwrap_err();
        assert!(matches!(err, BlobError::LengthMismatch { .. }));
    }

    #[test]
    fn roundtrips_f32_slice() {
        let attr = TensorAttr::new(Layout::Na, ElementType::F32, vec![3], Quant::None).unwrap();
        let blob = Blob::from_slice(attr, &[1.0f32, 2.0, 3.0]).unwrap();
        assert_eq!(blob.as_f32().unwrap(), &[1.0, 2.0, 3.0]);
    }
}
