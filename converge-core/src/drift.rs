//! Read-side canonicalization helpers shared by resource decoders.

use crate::set::UnorderedSet;

/// Split a combined primary+secondary collection.
///
/// The first entry flagged primary becomes the singular value; every other
/// entry lands in the secondary set in remote order. A value that repeats the
/// primary is dropped so it never counts twice.
pub fn split_primary<I>(entries: I) -> (Option<String>, UnorderedSet<String>)
where
    I: IntoIterator<Item = (String, bool)>,
{
    let mut primary: Option<String> = None;
    let mut rest = Vec::new();
    for (value, is_primary) in entries {
        if is_primary && primary.is_none() {
            primary = Some(value);
        } else {
            rest.push(value);
        }
    }
    let secondary = rest
        .into_iter()
        .filter(|v| primary.as_deref() != Some(v.as_str()))
        .collect();
    (primary, secondary)
}

/// Count derived from the collection itself, never from a separately
/// reported count field.
pub fn derived_count<T: Ord + Clone>(items: &UnorderedSet<T>) -> u32 {
    u32::try_from(items.len()).unwrap_or(u32::MAX)
}

/// Treat an empty string from the remote API as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Decode a nested single block. Only the first element is meaningful.
pub fn single<T: Clone>(items: &[T]) -> Option<T> {
    items.first().cloned()
}
