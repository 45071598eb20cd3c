//! Job listing query (§4.C, §6.1) and its paginated response envelope.

use serde::{Deserialize, Serialize};

pub const MIN_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;
pub const DEFAULT_PAGE_SIZE: u32 = MIN_PAGE_SIZE;

/// `status` query parameter, including the `in-progress` alias that expands
/// to `{Waiting, InProgress}` at the store layer (§4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusFilter {
    All,
    Success,
    Error,
    Queued,
    Building,
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    StartedAt,
    EndedAt,
    /// `ended_at - started_at`, computed at the SQL level (§4.C).
    Duration,
}

impl Default for SortField {
    fn default() -> Self {
        SortField::CreatedAt
    }
}

/// Filtered, sorted, paginated job listing request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobQuery {
    pub status: Option<StatusFilter>,
    #[serde(default)]
    pub target: Vec<String>,
    #[serde(default)]
    pub release: Vec<String>,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub sort_desc: bool,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

impl JobQuery {
    /// Page size clamped to `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`; `limit=0` clamps
    /// up, an oversized limit clamps down (§8 boundary behavior).
    pub fn clamped_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

/// A single page of results, with enough metadata to fetch the next one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, limit: u32, offset: u32) -> Self {
        Self {
            items,
            total,
            limit,
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_zero_up_to_minimum() {
        let q = JobQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(q.clamped_limit(), MIN_PAGE_SIZE);
    }

    #[test]
    fn clamps_oversized_down_to_maximum() {
        let q = JobQuery {
            limit: Some(1000),
            ..Default::default()
        };
        assert_eq!(q.clamped_limit(), MAX_PAGE_SIZE);
    }

    #[test]
    fn defaults_to_minimum_page_size() {
        assert_eq!(JobQuery::default().clamped_limit(), MIN_PAGE_SIZE);
    }
}
