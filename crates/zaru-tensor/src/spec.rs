use std::fmt;

use crate::{ElementType, Layout, Quant, TensorAttr};

/// Error returned when a tensor spec string cannot be parsed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TensorSpecError {
    #[error("malformed tensor spec: {0}")]
    MalformedSpec(String),
}

/// Parses a comma-separated list of tensor spec descriptors, e.g.
/// `"NCHW:8U:1x3x224x224:AA:0.017:114, NCHW:8U:1x3x224x224"`.
///
/// An empty (or all-whitespace) input is valid and yields an empty list.
pub fn parse_spec(s: &str) -> Result<Vec<TensorAttr>, TensorSpecError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }

    s.split(',').map(|part| parse_one(part.trim())).collect()
}

fn parse_one(descriptor: &str) -> Result<TensorAttr, TensorSpecError> {
    let fields: Vec<&str> = descriptor.split(':').collect();
    if fields.len() < 3 {
        return Err(TensorSpecError::MalformedSpec(format!(
            "expected at least layout:type:shape, got '{descriptor}'"
        )));
    }

    let layout = Layout::from_code(fields[0]).ok_or_else(|| {
        TensorSpecError::MalformedSpec(format!("unrecognized layout '{}'", fields[0]))
    })?;
    let elem_type = ElementType::from_code(fields[1]).ok_or_else(|| {
        TensorSpecError::MalformedSpec(format!("unrecognized element type '{}'", fields[1]))
    })?;
    let dims = parse_shape(fields[2])?;

    let quant = match fields.get(3).copied() {
        None => Quant::None,
        Some("AA") => {
            let scale = fields
                .get(4)
                .ok_or_else(|| TensorSpecError::MalformedSpec("AA missing scale".into()))?
                .parse::<f32>()
                .map_err(|_| TensorSpecError::MalformedSpec("AA scale is not a number".into()))?;
            let zero_point = fields
                .get(5)
                .ok_or_else(|| TensorSpecError::MalformedSpec("AA missing zero_point".into()))?
                .parse::<i32>()
                .map_err(|_| {
                    TensorSpecError::MalformedSpec("AA zero_point is not an integer".into())
                })?;
            Quant::AffineAsymmetric { scale, zero_point }
        }
        Some("DFP") => {
            let fl = fields
                .get(4)
                .ok_or_else(|| TensorSpecError::MalformedSpec("DFP missing fl".into()))?
                .parse::<i32>()
                .map_err(|_| TensorSpecError::MalformedSpec("DFP fl is not an integer".into()))?;
            Quant::DynamicFixedPoint { fl }
        }
        Some(other) => {
            return Err(TensorSpecError::MalformedSpec(format!(
                "unrecognized quant tag '{other}'"
            )))
        }
    };

    TensorAttr::new(layout, elem_type, dims, quant)
        .map_err(|_| TensorSpecError::MalformedSpec(format!("invalid tensor spec '{descriptor}'")))
}

fn parse_shape(s: &str) -> Result<Vec<usize>, TensorSpecError> {
    let dims: Result<Vec<usize>, _> = s.split('x').map(|d| d.parse::<usize>()).collect();
    let dims = dims.map_err(|_| {
        TensorSpecError::MalformedSpec(format!("malformed shape '{s}' (expected DxDxD...)"))
    })?;
    if dims.is_empty() {
        return Err(TensorSpecError::MalformedSpec(format!(
            "shape '{s}' must have at least one dimension"
        )));
    }
    Ok(dims)
}

impl fmt::Display for TensorAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = self
            .dims()
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x");
        write!(f, "{}:{}:{}", self.layout().code(), self.elem_type().code(), shape)?;
        match self.quant() {
            Quant::None => Ok(()),
            Quant::AffineAsymmetric { scale, zero_point } => {
                write!(f, ":AA:{scale}:{zero_point}")
            }
            Quant::DynamicFixedPoint { fl } => write!(f, ":DFP:{fl}"),
            Quant::AffinePerChannel { .. } => {
                // Per-channel quant has no spec-string wire format; it is only ever constructed
                // programmatically by a backend adapter.
                Ok(())
            }
        }
    }
}

/// Formats a list of attributes back into spec-string form, inverse of [`parse_spec`].
pub fn format_spec(attrs: &[TensorAttr]) -> String {
    attrs
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reference_scenario() {
        let attrs = parse_spec("NCHW:8U:1x3x224x224:AA:0.017:114").unwrap();
        assert_eq!(attrs.len(), 1);
        let attr = &attrs[0];
        assert_eq!(attr.rank(), 4);
        assert_eq!(attr.dims(), &[1, 3, 224, 224]);
        assert_eq!(attr.elem_type(), ElementType::U8);
        assert_eq!(
            attr.quant(),
            &Quant::AffineAsymmetric {
                scale: 0.017,
                zero_point: 114
            }
        );
    }

    #[test]
    fn parses_multiple_comma_separated_descriptors() {
        let attrs =
            parse_spec("NCHW:8U:1x3x224x224:AA:0.017:114, NCHW:8U:1x3x224x224:AA:0.017:114")
                .unwrap();
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn empty_input_yields_empty_list() {
        assert_eq!(parse_spec("").unwrap(), vec![]);
        assert_eq!(parse_spec("   ").unwrap(), vec![]);
    }

    #[test]
    fn rejects_unrecognized_layout() {
        assert!(parse_spec("XYZW:8U:1x3x224x224").is_err());
    }

    #[test]
    fn rejects_malformed_shape() {
        assert!(parse_spec("NCHW:8U:1x3xfoo").is_err());
    }

    #[test]
    fn rejects_quant_missing_fields() {
        assert!(parse_spec("NCHW:8U:1x3x224x224:AA:0.017").is_err());
    }

    #[test]
    fn parse_then_format_round_trips() {
        let original = "NCHW:8U:1x3x224x224:AA:0.017:114";
        let attrs = parse_spec(original).unwrap();
        let formatted = format_spec(&attrs);
        let reparsed = parse_spec(&formatted).unwrap();
        assert_eq!(attrs, reparsed);
    }

    #[test]
    fn dfp_round_trips() {
        let original = "NA:16S:1x10:DFP:7";
        let attrs = parse_spec(original).unwrap();
        assert_eq!(format_spec(&attrs), original);
    }
}
