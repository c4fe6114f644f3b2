//! Variant matcher: resolves a customer's chosen option-combination against a
//! product's enumerated SKU list.

use std::collections::BTreeMap;

use crate::product::Sku;

/// A chosen attribute→value assignment (e.g. Color=Red, Size=M).
///
/// `BTreeMap` keeps the combination canonical: key order never matters.
pub type VariantSelection = BTreeMap<String, String>;

/// String-normalized value comparison: whitespace-trimmed and
/// case-insensitive, so `"M"`/`"m"` and `"1"`/`" 1 "` compare equal. Values
/// arrive stringified from JSON, which makes integers and their string forms
/// meet here in the same representation.
pub fn values_equal(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn combination_matches(combination: &VariantSelection, requested: &VariantSelection) -> bool {
    if combination.len() != requested.len() {
        return false;
    }

    requested.iter().all(|(key, value)| {
        combination
            .iter()
            .any(|(ck, cv)| ck.trim().eq_ignore_ascii_case(key.trim()) && values_equal(cv, value))
    })
}

/// Indices of all SKUs whose combination has exactly the requested key set and
/// equal values under normalized comparison.
///
/// An empty `requested` selection never matches (legacy/non-varianted lines
/// have no variant-level stock to decrement). More than one index indicates a
/// data-integrity bug (duplicate combinations); callers take the first and
/// should log the anomaly.
pub fn matching_skus(skus: &[Sku], requested: &VariantSelection) -> Vec<usize> {
    if requested.is_empty() {
        return vec![];
    }

    skus.iter()
        .enumerate()
        .filter(|(_, sku)| combination_matches(&sku.combination, requested))
        .map(|(idx, _)| idx)
        .collect()
}
