//! Result ordering.
//!
//! Validates the order expression against the resource's exposed fields and
//! its declared sortable set, then re-orders the materialized result set.
//! Both checks fail closed; a non-sortable field is an error, not a warning.

use crate::document::{sort_key_cmp, SearchDocument};
use crate::error::{ApiError, Result};
use crate::resource::{ResourceDef, DOCUMENT_ID};

pub fn apply_sort(
    resource: &ResourceDef,
    docs: &mut [SearchDocument],
    sort_expr: &str,
) -> Result<()> {
    let (descending, field) = match sort_expr.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, sort_expr),
    };

    if !resource.has_field(field) {
        return Err(ApiError::InvalidSort(format!(
            "No matching '{field}' field for ordering on."
        )));
    }

    if !resource.is_sortable(field) {
        return Err(ApiError::InvalidSort(format!(
            "The '{field}' field does not allow ordering."
        )));
    }

    docs.sort_by(|a, b| {
        let ord = if field == DOCUMENT_ID {
            a.id.cmp(&b.id)
        } else {
            sort_key_cmp(a.get(field), b.get(field))
        };
        if descending { ord.reverse() } else { ord }
    });

    Ok(())
}

/// Convenience check used by callers that validate without sorting.
pub fn validate_sort(resource: &ResourceDef, sort_expr: &str) -> Result<()> {
    apply_sort(resource, &mut [], sort_expr)
}
