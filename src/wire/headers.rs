//! Case-insensitive header merging.
//!
//! Defaults are applied first, per-request headers override them; keys are
//! compared lowercased. A `None` value masks a default so the header is
//! not sent at all.

/// Merges `defaults` under `user`, returning the headers to emit in a
/// stable order (defaults first, then user additions).
pub fn merge(
    defaults: &[(String, String)],
    user: &[(String, Option<String>)],
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, Option<String>)> = defaults
        .iter()
        .map(|(name, value)| (name.to_lowercase(), Some(value.clone())))
        .collect();
    for (name, value) in user {
        let name = name.to_lowercase();
        match merged.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value.clone(),
            None => merged.push((name, value.clone())),
        }
    }
    merged
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name, value)))
        .collect()
}
