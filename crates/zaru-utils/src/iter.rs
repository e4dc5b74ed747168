//! Iterator helpers.

/// Zips two iterators, panicking (in debug builds) if they don't produce the same number of
/// elements.
///
/// Plain [`Iterator::zip`] silently truncates to the shorter iterator, which tends to hide bugs
/// where two buffers that are supposed to be the same length (eg. per-channel scale and
/// zero-point arrays) have drifted apart.
pub fn zip_exact<A: IntoIterator, B: IntoIterator>(
    a: A,
    b: B,
) -> impl Iterator<Item = (A::Item, B::Item)>
where
    A::IntoIter: ExactSizeIterator,
    B::IntoIter: ExactSizeIterator,
{
    let a = a.into_iter();
    let b = b.into_iter();
    debug_assert_eq!(
        a.len(),
        b.len(),
        "zip_exact: iterators have different lengths ({} vs {})",
        a.len(),
        b.len(),
    );
    a.zip(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zips_equal_length() {
        let a = [1, 2, 3];
        let b = ["a", "b", "c"];
        let zipped: Vec<_> = zip_exact(&a, &b).collect();
        assert_eq!(zipped, [(&1, &"a"), (&2, &"b"), (&3, &"c")]);
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn panics_on_mismatched_length() {
        let a = [1, 2, 3];
        let b = ["a", "b"];
        zip_exact(&a, &b).for_each(drop);
    }
}
