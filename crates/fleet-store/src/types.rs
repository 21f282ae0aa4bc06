//! Domain types stored in the database.
//!
//! An [`Instance`] is persisted as a single CBOR document. The seat ledger
//! is a first-class field next to the free-form metadata map, so reading
//! it never requires picking apart an untyped bag.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use fleet_core::{CallbackId, InstanceId, UserId};
use serde::{Deserialize, Serialize};

/// Free-form application metadata attached to an instance.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A provisioned dedicated-server instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Identifier assigned by the provisioning fabric.
    pub id: InstanceId,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Creation timestamp, set once.
    pub create_time: DateTime<Utc>,
    /// Number of live connections. Derived from the seat ledger.
    pub player_count: i32,
    /// Network endpoint, present once the deployment reports ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_info: Option<ConnectionInfo>,
    /// Application data supplied at create time and by instance reports.
    #[serde(default)]
    pub metadata: Metadata,
    /// Seat accounting for this instance.
    pub reservation: SeatLedger,
}

impl Instance {
    /// Build a freshly requested instance whose ledger reserves `user_ids`.
    ///
    /// Derived seat fields are left at zero; callers reconcile before
    /// persisting.
    #[must_use]
    pub fn requested(
        id: InstanceId,
        max_players: i32,
        user_ids: Vec<UserId>,
        metadata: Metadata,
        callback_id: CallbackId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: InstanceStatus::Requested,
            create_time: now,
            player_count: 0,
            connection_info: None,
            metadata,
            reservation: SeatLedger {
                max_players,
                reservations: user_ids,
                reservations_updated_at: now,
                connections: Vec::new(),
                available_seats: 0,
                reservations_count: 0,
                callback_id,
            },
        }
    }
}

/// Network endpoint of a running instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Public IP address.
    pub ip_address: String,
    /// Fully-qualified DNS name.
    pub dns_name: String,
    /// External port of the configured service port.
    pub port: u16,
}

/// Capacity, reservations and live connections of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatLedger {
    /// Seat capacity; any negative value means unlimited.
    pub max_players: i32,
    /// Users promised a seat but not yet connected, without duplicates.
    pub reservations: Vec<UserId>,
    /// When `reservations` last changed.
    pub reservations_updated_at: DateTime<Utc>,
    /// Users currently connected, as last reported by the instance.
    pub connections: Vec<UserId>,
    /// Cached free seat count, `-1` when unlimited.
    pub available_seats: i32,
    /// Cached `reservations.len()`.
    pub reservations_count: i32,
    /// Correlation id of the pending create call.
    pub callback_id: CallbackId,
}

impl SeatLedger {
    /// Whether seat checks are disabled for this ledger.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.max_players < 0
    }
}

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum InstanceStatus {
    /// Create accepted locally, fabric has not reported yet.
    Requested = 1,
    /// Deployment is up and has network endpoints.
    Running = 2,
    /// Instance process reports it accepts players.
    Ready = 3,
    /// Instance asked to terminate.
    Stopping = 4,
    /// Fabric or instance reported a failure.
    Error = 5,
    /// A report carried an unrecognised status or action.
    Unknown = 6,
}

impl InstanceStatus {
    /// Convert the status to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to an `InstanceStatus`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Requested),
            2 => Some(Self::Running),
            3 => Some(Self::Ready),
            4 => Some(Self::Stopping),
            5 => Some(Self::Error),
            6 => Some(Self::Unknown),
            _ => None,
        }
    }

    /// The wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Running => "RUNNING",
            Self::Ready => "READY",
            Self::Stopping => "STOPPING",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    /// Parse a status name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Requested,
            Self::Running,
            Self::Ready,
            Self::Stopping,
            Self::Error,
            Self::Unknown,
        ]
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown status: {s}"))
    }
}
