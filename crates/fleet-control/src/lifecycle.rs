//! Instance status state machine.
//!
//! Two independent channels write the status: the fabric (deployment
//! reports) and the instance process itself (action reports). They can
//! arrive out of order, so the main path never moves backwards.
//!
//! ```text
//!   REQUESTED ──▶ RUNNING ──▶ READY ──▶ STOPPING ──▶ (deleted)
//!        │           │          │          │
//!        └───────────┴────┬─────┴──────────┘
//!                         ▼
//!                  ERROR / UNKNOWN
//! ```
//!
//! `ERROR` and `UNKNOWN` are reachable from anywhere, and a later report
//! may move a record from either of them back onto the main path.

use fleet_store::InstanceStatus;

/// Position of a status on the main path, or `None` for off-path statuses.
#[must_use]
pub const fn main_path_rank(status: InstanceStatus) -> Option<u8> {
    match status {
        InstanceStatus::Requested => Some(0),
        InstanceStatus::Running => Some(1),
        InstanceStatus::Ready => Some(2),
        InstanceStatus::Stopping => Some(3),
        InstanceStatus::Error | InstanceStatus::Unknown => None,
    }
}

/// Check if a reported status should replace the current one.
#[must_use]
pub const fn should_apply(from: InstanceStatus, to: InstanceStatus) -> bool {
    match (main_path_rank(from), main_path_rank(to)) {
        (Some(current), Some(next)) => next >= current,
        _ => true,
    }
}

/// The status a record ends up in after a report of `to`.
#[must_use]
pub const fn resolve_transition(from: InstanceStatus, to: InstanceStatus) -> InstanceStatus {
    if should_apply(from, to) {
        to
    } else {
        from
    }
}

/// Returns true if the instance reported a failure or an unrecognised state.
#[must_use]
pub const fn is_faulted(status: InstanceStatus) -> bool {
    matches!(status, InstanceStatus::Error | InstanceStatus::Unknown)
}
