//! Label selector matching for in-process reads

use crate::error::StoreError;
use std::collections::BTreeMap;

/// Equality-only label selector match (`a=b,c=d`, `a==b`).
///
/// Set-based requirements are not supported and fail with
/// [`StoreError::InvalidRequest`].
pub(crate) fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> Result<bool, StoreError> {
    for requirement in selector.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        let (label, value) = requirement
            .split_once('=')
            .filter(|(label, _)| !label.ends_with('!'))
            .ok_or_else(|| StoreError::InvalidRequest(format!("unsupported label selector {requirement:?}")))?;
        let value = value.trim_start_matches('=');
        if labels.and_then(|labels| labels.get(label.trim())).map(String::as_str) != Some(value.trim()) {
            return Ok(false);
        }
    }
    Ok(true)
}
