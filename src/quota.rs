use chrono::Utc;
use serde::Serialize;

/// Month key for the usage ledger, UTC, format `YYYY-MM`.
pub fn current_month_key() -> String {
    Utc::now().format("%Y-%m").to_string()
}

/// Fraction of the monthly quota consumed, clamped to [0.0, 1.0].
///
/// A quota of zero or less counts as fully used. Plans without a configured
/// quota are therefore blocked, not unlimited (see DESIGN.md).
pub fn percent_used(used: i32, quota: i32) -> f64 {
    if quota <= 0 {
        return 1.0;
    }
    (used as f64 / quota as f64).min(1.0)
}

/// True when a generation request must be rejected before any provider call.
pub fn is_blocked(used: i32, quota: i32) -> bool {
    quota <= 0 || used >= quota
}

/// Read-side projection of the ledger; nothing here is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuotaState {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "WARN_80")]
    Warn80,
    #[serde(rename = "BLOCK_100")]
    Block100,
}

impl QuotaState {
    pub fn of(used: i32, quota: i32) -> Self {
        if quota <= 0 || used >= quota {
            QuotaState::Block100
        } else if used >= (0.8 * quota as f64).ceil() as i32 {
            QuotaState::Warn80
        } else {
            QuotaState::None
        }
    }

    pub fn can_send(self) -> bool {
        self != QuotaState::Block100
    }
}

/// Payload returned by the quota-status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub month_key: String,
    pub quota_messages: i32,
    pub used_messages: i32,
    pub percent_used: f64,
    pub state: QuotaState,
    pub actions: QuotaActions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaActions {
    pub can_send_message: bool,
    pub can_regenerate: bool,
}

impl QuotaStatus {
    pub fn project(month_key: String, used: i32, quota: i32) -> Self {
        let state = QuotaState::of(used, quota);
        let can_send = state.can_send();
        Self {
            month_key,
            quota_messages: quota,
            used_messages: used,
            percent_used: percent_used(used, quota),
            state,
            actions: QuotaActions {
                can_send_message: can_send,
                can_regenerate: can_send,
            },
        }
    }
}
