//! Seat accounting.
//!
//! Pure functions over an [`Instance`] and its [`SeatLedger`]. Nothing here
//! touches storage; the engine loads a fresh record, mutates it through
//! these functions and persists it after [`reconcile`].

use std::collections::HashSet;

use chrono::Utc;
use fleet_core::UserId;
use fleet_store::{Instance, SeatLedger};

use crate::error::{ControlError, Result};

/// Free seats on a ledger, or `-1` when capacity is unlimited.
#[must_use]
pub fn compute_available_seats(ledger: &SeatLedger) -> i32 {
    if ledger.is_unlimited() {
        return -1;
    }
    ledger.max_players - count(&ledger.reservations) - count(&ledger.connections)
}

/// Recompute every derived seat field from the current reservations and
/// connections.
///
/// Must run immediately before each write of the record.
pub fn reconcile(instance: &mut Instance) {
    let ledger = &mut instance.reservation;
    ledger.available_seats = compute_available_seats(ledger);
    ledger.reservations_count = count(&ledger.reservations);
    instance.player_count = count(&ledger.connections);
}

/// Reserve seats for `user_ids`.
///
/// Ids that already hold a seat, either reserved or connected, are ignored,
/// as are repeats within `user_ids`. Returns `true` if the ledger changed.
///
/// # Errors
///
/// Returns `ControlError::InvalidInput` for an empty request and
/// `ControlError::SeatLimitReached` when the new reservations would exceed
/// capacity. A rejected join leaves the ledger untouched.
pub fn join(instance: &mut Instance, user_ids: &[UserId]) -> Result<bool> {
    if user_ids.is_empty() {
        return Err(ControlError::InvalidInput(
            "at least one user id is required".to_string(),
        ));
    }

    let ledger = &instance.reservation;
    if ledger.is_unlimited() {
        return Ok(false);
    }

    let mut seen = HashSet::new();
    let fresh: Vec<UserId> = user_ids
        .iter()
        .filter(|id| !ledger.reservations.contains(id) && !ledger.connections.contains(id))
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect();

    if fresh.is_empty() {
        return Ok(false);
    }

    let occupied = instance.player_count + count(&ledger.reservations);
    if occupied + count(&fresh) > ledger.max_players {
        return Err(ControlError::SeatLimitReached {
            instance_id: instance.id.clone(),
            requested: fresh.len(),
            available: (ledger.max_players - occupied).max(0),
        });
    }

    let ledger = &mut instance.reservation;
    ledger.reservations.extend(fresh);
    ledger.reservations_updated_at = Utc::now();
    Ok(true)
}

/// Replace the connection set with `reported` and release the
/// reservations of every user that has arrived.
pub fn apply_connections(ledger: &mut SeatLedger, reported: Vec<UserId>) {
    let mut seen = HashSet::new();
    let connections: Vec<UserId> = reported
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();

    ledger.reservations.retain(|id| !connections.contains(id));
    ledger.connections = connections;
    ledger.reservations_updated_at = Utc::now();
}

fn count(ids: &[UserId]) -> i32 {
    i32::try_from(ids.len()).unwrap_or(i32::MAX)
}
