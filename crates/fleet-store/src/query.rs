//! Filter expressions and pagination for instance listing.
//!
//! A query is a whitespace-separated list of terms, all of which must
//! match:
//!
//! ```text
//! status:READY player_count:<4 available_seats:>=2 metadata.mode:ranked
//! ```
//!
//! Numeric fields accept `>`, `>=`, `<`, `<=` or `=` (the default) before
//! the value. `metadata.<key>:<value>` compares against the string form of
//! the metadata value.

use crate::error::{Result, StoreError};
use crate::types::{Instance, InstanceStatus};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// Comparison operator for numeric terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl CompareOp {
    const fn test(self, left: i64, right: i64) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Lt => left < right,
            Self::Le => left <= right,
        }
    }
}

/// A single filter term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `status:<STATUS>`
    Status(InstanceStatus),
    /// `player_count:<op><n>`
    PlayerCount(CompareOp, i64),
    /// `available_seats:<op><n>`
    AvailableSeats(CompareOp, i64),
    /// `max_players:<op><n>`
    MaxPlayers(CompareOp, i64),
    /// `metadata.<key>:<value>`
    Metadata {
        /// Metadata key.
        key: String,
        /// Expected string form of the value.
        value: String,
    },
}

impl Filter {
    fn matches(&self, instance: &Instance) -> bool {
        match self {
            Self::Status(status) => instance.status == *status,
            Self::PlayerCount(op, n) => op.test(i64::from(instance.player_count), *n),
            Self::AvailableSeats(op, n) => {
                op.test(i64::from(instance.reservation.available_seats), *n)
            }
            Self::MaxPlayers(op, n) => op.test(i64::from(instance.reservation.max_players), *n),
            Self::Metadata { key, value } => match instance.metadata.get(key) {
                Some(serde_json::Value::String(s)) => s == value,
                Some(other) => other.to_string() == *value,
                None => false,
            },
        }
    }
}

/// A parsed list query. The empty query matches every instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceQuery {
    filters: Vec<Filter>,
}

impl InstanceQuery {
    /// A query that matches every instance.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Parse a query string.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidQuery` naming the first malformed term.
    pub fn parse(input: &str) -> Result<Self> {
        let filters = input
            .split_whitespace()
            .map(parse_term)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { filters })
    }

    /// The parsed filter terms.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Whether `instance` satisfies every term.
    #[must_use]
    pub fn matches(&self, instance: &Instance) -> bool {
        self.filters.iter().all(|f| f.matches(instance))
    }
}

fn parse_term(term: &str) -> Result<Filter> {
    let invalid = |reason: &str| StoreError::InvalidQuery(format!("{term}: {reason}"));

    let (field, value) = term
        .split_once(':')
        .ok_or_else(|| invalid("expected field:value"))?;
    if value.is_empty() {
        return Err(invalid("missing value"));
    }

    if let Some(key) = field.strip_prefix("metadata.") {
        if key.is_empty() {
            return Err(invalid("missing metadata key"));
        }
        return Ok(Filter::Metadata {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    match field {
        "status" => value.parse().map(Filter::Status).map_err(|e| invalid(&e)),
        "player_count" => {
            let (op, n) = parse_comparison(value).ok_or_else(|| invalid("bad comparison"))?;
            Ok(Filter::PlayerCount(op, n))
        }
        "available_seats" => {
            let (op, n) = parse_comparison(value).ok_or_else(|| invalid("bad comparison"))?;
            Ok(Filter::AvailableSeats(op, n))
        }
        "max_players" => {
            let (op, n) = parse_comparison(value).ok_or_else(|| invalid("bad comparison"))?;
            Ok(Filter::MaxPlayers(op, n))
        }
        _ => Err(invalid("unknown field")),
    }
}

fn parse_comparison(value: &str) -> Option<(CompareOp, i64)> {
    // Two-character operators must be tried first.
    let (op, rest) = if let Some(rest) = value.strip_prefix(">=") {
        (CompareOp::Ge, rest)
    } else if let Some(rest) = value.strip_prefix("<=") {
        (CompareOp::Le, rest)
    } else if let Some(rest) = value.strip_prefix('>') {
        (CompareOp::Gt, rest)
    } else if let Some(rest) = value.strip_prefix('<') {
        (CompareOp::Lt, rest)
    } else if let Some(rest) = value.strip_prefix('=') {
        (CompareOp::Eq, rest)
    } else {
        (CompareOp::Eq, value)
    };
    rest.parse().ok().map(|n| (op, n))
}

/// Page size and resume point for a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Number of records to return, already clamped.
    pub limit: usize,
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
}

impl PageRequest {
    /// Build a page request, applying the default and maximum page size.
    #[must_use]
    pub fn new(limit: Option<usize>, cursor: Option<String>) -> Self {
        let limit = match limit {
            None | Some(0) => DEFAULT_PAGE_SIZE,
            Some(n) => n.min(MAX_PAGE_SIZE),
        };
        Self {
            limit,
            cursor: cursor.filter(|c| !c.is_empty()),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Records on this page.
    pub items: Vec<T>,
    /// Cursor for the next page, `None` when this is the last one.
    pub next_cursor: Option<String>,
}
