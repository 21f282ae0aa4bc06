//! Key encoding utilities for `RocksDB`.
//!
//! The load index orders instances by ascending player count and, within
//! the same player count, by descending creation time. Both numeric parts
//! are fixed-width big-endian so that byte order equals sort order.

use chrono::{DateTime, Utc};
use fleet_core::InstanceId;

/// Length of the fixed-width prefix of a load index key.
pub const LOAD_PREFIX_LEN: usize = 12;

/// Encode an instance key (the instance ID bytes).
#[must_use]
pub fn instance_key(instance_id: &InstanceId) -> Vec<u8> {
    instance_id.as_str().as_bytes().to_vec()
}

/// Encode a load index key: `player_count || !create_millis || instance_id`.
#[must_use]
pub fn load_key(player_count: i32, create_time: DateTime<Utc>, instance_id: &InstanceId) -> Vec<u8> {
    // Flipping the sign bit makes signed big-endian integers sort correctly.
    let mut count = player_count.to_be_bytes();
    count[0] ^= 0x80;

    let mut created = create_time.timestamp_millis().to_be_bytes();
    created[0] ^= 0x80;
    for byte in &mut created {
        *byte = !*byte;
    }

    let id = instance_id.as_str().as_bytes();
    let mut key = Vec::with_capacity(LOAD_PREFIX_LEN + id.len());
    key.extend_from_slice(&count);
    key.extend_from_slice(&created);
    key.extend_from_slice(id);
    key
}

/// Extract the instance ID from a load index key.
///
/// Returns `None` if the key is too short or the suffix is not a valid ID.
#[must_use]
pub fn extract_instance_id_from_load_key(key: &[u8]) -> Option<InstanceId> {
    let suffix = key.get(LOAD_PREFIX_LEN..)?;
    let id = std::str::from_utf8(suffix).ok()?;
    InstanceId::new(id).ok()
}

/// Encode a pagination cursor from the last index key returned.
#[must_use]
pub fn encode_cursor(key: &[u8]) -> String {
    hex::encode(key)
}

/// Decode a pagination cursor back into an index key.
#[must_use]
pub fn decode_cursor(cursor: &str) -> Option<Vec<u8>> {
    let key = hex::decode(cursor).ok()?;
    (key.len() > LOAD_PREFIX_LEN).then_some(key)
}
