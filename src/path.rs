//! Path tokenization.

/// Splits a request path into its non-empty segments.
///
/// `/users//42/` tokenizes to `["users", "42"]`; `/` and the empty string
/// tokenize to no segments at all.
pub fn tokenize(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}
