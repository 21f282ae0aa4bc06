//! `RocksDB` storage layer for the fleet manager.
//!
//! This crate persists instance records, each of which embeds its seat
//! ledger, and serves filtered, paginated listings in placement order.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `instances`: Primary instance records, keyed by `instance_id`
//! - `instances_by_load`: Index ordering instances by ascending player
//!   count, then by descending creation time
//!
//! # Example
//!
//! ```no_run
//! use fleet_store::{InstanceQuery, PageRequest, RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/fleet-db").unwrap();
//!
//! // The emptiest, freshest ready instances first
//! let query = InstanceQuery::parse("status:READY available_seats:>0").unwrap();
//! let page = store.query_instances(&query, &PageRequest::new(Some(5), None)).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod query;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use query::{InstanceQuery, Page, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use rocks::RocksStore;
pub use types::{ConnectionInfo, Instance, InstanceStatus, Metadata, SeatLedger};

use fleet_core::InstanceId;

/// The storage trait defining all database operations.
///
/// A single record write is atomic. There is no cross-record transaction
/// and no compare-and-swap: concurrent writers to the same record see
/// last-write-wins.
pub trait Store: Send + Sync {
    /// Insert or update an instance record.
    ///
    /// This also maintains the load index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_instance(&self, instance: &Instance) -> Result<()>;

    /// Get an instance by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_instance(&self, instance_id: &InstanceId) -> Result<Option<Instance>>;

    /// Delete an instance by ID.
    ///
    /// Returns `false` if there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_instance(&self, instance_id: &InstanceId) -> Result<bool>;

    /// List instances matching `query` in placement order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidCursor` for a cursor this store did not
    /// issue, or an error if the database operation fails.
    fn query_instances(&self, query: &InstanceQuery, page: &PageRequest) -> Result<Page<Instance>>;

    /// List all instances in the database.
    ///
    /// Use with caution in production; prefer filtered queries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_all_instances(&self) -> Result<Vec<Instance>>;
}
