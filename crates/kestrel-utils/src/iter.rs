//! Iterator adapters.

/// Zips two iterators of known, equal lengths.
///
/// # Panics
///
/// Panics if `a` and `b` yield a differing number of items. This is meant for iterating over
/// sequences that are kept in lockstep, where a length mismatch indicates a bug.
pub fn zip_exact<A, B>(a: A, b: B) -> std::iter::Zip<A::IntoIter, B::IntoIter>
where
    A: IntoIterator,
    A::IntoIter: ExactSizeIterator,
    B: IntoIterator,
    B::IntoIter: ExactSizeIterator,
{
    let a = a.into_iter();
    let b = b.into_iter();
    assert_eq!(
        a.len(),
        b.len(),
        "zip_exact: iterators yield a different number of items",
    );
    a.zip(b)
}
