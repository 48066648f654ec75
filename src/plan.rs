//! Plan feature resolution. Feature values are stored as opaque strings and
//! interpreted here as booleans or quotas.

/// Monthly message quota per plan.
pub const FEATURE_MONTHLY_MESSAGE_QUOTA: &str = "monthly_message_quota";

/// Collaborative review workflow (submit / approve / reject).
pub const FEATURE_COLLAB_APPROVAL_FLOW: &str = "collab_approval_flow";

/// Interpret a stored feature value as a boolean flag.
/// Only the exact lowercase string "true" (after trimming) enables a feature;
/// a missing row is always false.
pub fn feature_enabled(raw: Option<&str>) -> bool {
    raw.map(|v| v.trim().to_lowercase() == "true").unwrap_or(false)
}

/// Interpret a stored feature value as a quota.
///
/// Blank, boolean-looking ("true"/"false") and non-numeric values fall back
/// to the caller-supplied default; negatives clamp to zero. Never errors, so
/// a misconfigured plan row cannot break the chat flow.
pub fn parse_quota_value(raw: Option<&str>, default: i32) -> i32 {
    let raw = match raw {
        Some(v) => v.trim(),
        None => return default,
    };
    if raw.is_empty() {
        return default;
    }
    let lower = raw.to_lowercase();
    if lower == "true" || lower == "false" {
        return default;
    }
    match raw.parse::<i32>() {
        Ok(v) => v.max(0),
        Err(_) => default,
    }
}

/// The Básico plan restricts which models can be used. Accent-insensitive on
/// purpose: the name shows up both as "Básico" and "basico" in seed data.
pub fn is_basic_plan(name: &str) -> bool {
    let n = name.trim().to_lowercase();
    n == "básico" || n == "basico"
}
