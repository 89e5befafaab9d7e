//! Retention windows for queued EDUs.

use std::collections::HashMap;

use time::{Duration, OffsetDateTime};

use crate::events::edu_types;

/// How long an EDU is kept for an unreachable destination when no override
/// matches its type.
pub const DEFAULT_EDU_EXPIRY: Duration = Duration::hours(24);

/// Decides when a queued EDU association may be dropped undelivered.
///
/// `m.direct_to_device` and `m.device_list_update` are never expired,
/// whatever the policy says, because end-to-end encryption depends on them
/// eventually arriving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryPolicy {
    default: Duration,
    overrides: HashMap<String, Duration>,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::without_overrides()
            .with_override(edu_types::TYPING, Duration::minutes(1))
            .with_override(edu_types::PRESENCE, Duration::minutes(10))
    }
}

impl ExpiryPolicy {
    /// A policy that applies [`DEFAULT_EDU_EXPIRY`] to every expirable type.
    pub fn without_overrides() -> Self {
        Self {
            default: DEFAULT_EDU_EXPIRY,
            overrides: HashMap::new(),
        }
    }

    /// Replaces the fallback retention window.
    pub fn with_default(mut self, default: Duration) -> Self {
        self.default = default;
        self
    }

    /// Sets the retention window for one EDU type.
    pub fn with_override(mut self, edu_type: impl Into<String>, window: Duration) -> Self {
        self.overrides.insert(edu_type.into(), window);
        self
    }

    /// Returns `true` for types that must never be dropped undelivered.
    pub fn never_expires(edu_type: &str) -> bool {
        edu_type == edu_types::DIRECT_TO_DEVICE || edu_type == edu_types::DEVICE_LIST_UPDATE
    }

    /// The retention window that applies to `edu_type`.
    pub fn window(&self, edu_type: &str) -> Option<Duration> {
        if Self::never_expires(edu_type) {
            return None;
        }
        Some(self.overrides.get(edu_type).copied().unwrap_or(self.default))
    }

    /// Absolute expiry for an EDU of `edu_type` queued at `now`, or `None` if
    /// it must be kept until delivered. A window too large to represent,
    /// such as [`Duration::MAX`], also means never.
    pub fn expires_at(&self, edu_type: &str, now: OffsetDateTime) -> Option<OffsetDateTime> {
        self.window(edu_type).and_then(|window| now.checked_add(window))
    }
}

/// Converts a timestamp into the unix milliseconds stored in
/// `federation_queue_edus.expires_at`.
pub(crate) fn to_unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}
