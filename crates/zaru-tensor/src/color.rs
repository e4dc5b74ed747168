use zaru_image::Color;

/// Hashes `label` to a stable color, so that equal labels always render the same color and
/// different labels usually render differently. `alpha` is caller-controlled.
pub fn label_to_color(label: &str, alpha: u8) -> Color {
    // FNV-1a, chosen for being a simple, dependency-free, well-distributed string hash.
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in label.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    let r = (hash >> 16) as u8;
    let g = (hash >> 8) as u8;
    let b = hash as u8;
    Color::from_rgba8(r, g, b, alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_pure_and_stable() {
        let a = label_to_color("person", 255);
        let b = label_to_color("person", 255);
        assert_eq!(a, b);
    }

    #[test]
    fn ignores_alpha_for_rgb_channels() {
        let opaque = label_to_color("car", 255);
        let transparent = label_to_color("car", 0);
        assert_eq!(opaque.with_alpha(0), transparent);
    }

    #[test]
    fn different_labels_usually_differ() {
        let a = label_to_color("cat", 255);
        let b = label_to_color("dog", 255);
        assert_ne!(a, b);
    }
}
