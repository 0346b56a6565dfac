//! Actor roles and pagination for admin reads.
//!
//! The HTTP layer resolves the bearer token once per request and passes
//! the resulting role into the core; core services gate admin
//! operations on it instead of re-deriving authorization ad hoc.

use serde::{Deserialize, Serialize};

/// Who is calling a core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Authenticated support/ops operator.
    Admin,
    /// Untrusted end-user client.
    Client,
}

impl ActorRole {
    /// Returns true for admin actors.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Default page size for admin listings.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Upper bound on page size for admin listings.
pub const MAX_PAGE_SIZE: u32 = 200;

/// A sanitized pagination request (1-based page numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    /// Entries per page.
    pub per_page: u32,
}

impl Page {
    /// Builds a page request, clamping out-of-range values.
    #[must_use]
    pub fn new(number: u32, per_page: u32) -> Self {
        Self {
            number: number.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Row offset for SQL queries. Computed in `u64` so an extreme
    /// page number cannot overflow.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.per_page)
    }

    /// Row limit for SQL queries.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.per_page
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}
