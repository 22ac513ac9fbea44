//! Range query builder for the archive.
//!
//! [`ArchiveQuery`] encodes the boundary rules used by
//! `/fetch-archive-records`:
//!
//! | Parameters given            | Predicate                              |
//! |-----------------------------|----------------------------------------|
//! | `since`                     | `timestamp >= since`                   |
//! | `since`, `max`              | `timestamp > since AND timestamp <= max` |
//! | `since`, `limit`            | `timestamp > since`, first `limit`     |
//! | `since`, `max`, `limit`     | `timestamp > since AND timestamp <= max`, first `limit` |
//!
//! Adding either `max` or `limit` turns the lower bound exclusive: a client
//! that passes the timestamp of the last record it already holds gets only
//! what came after it. Results are always ordered oldest first.
//!
//! # Example
//!
//! ```
//! use airgradient_store::ArchiveQuery;
//!
//! let all_since = ArchiveQuery::since(100);
//! assert!(all_since.matches(100));
//!
//! let page = ArchiveQuery::since(100).max(200).limit(10);
//! assert!(!page.matches(100));
//! assert!(page.matches(200));
//! ```

/// Query over archived records, by timestamp (epoch seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveQuery {
    /// Lower bound. Inclusive only when neither `max` nor `limit` is set.
    pub since: i64,
    /// Inclusive upper bound.
    pub max: Option<i64>,
    /// Maximum number of records, earliest first.
    pub limit: Option<u32>,
}

impl ArchiveQuery {
    /// Start a query for records at or after `since`.
    pub fn since(since: i64) -> Self {
        Self {
            since,
            max: None,
            limit: None,
        }
    }

    /// Query every record in the archive.
    pub fn all() -> Self {
        Self::since(i64::MIN)
    }

    /// Bound the query above (inclusive). Makes the lower bound exclusive.
    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    /// Return at most `limit` records. Makes the lower bound exclusive.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `since` itself is part of the range.
    pub fn lower_bound_inclusive(&self) -> bool {
        self.max.is_none() && self.limit.is_none()
    }

    /// Evaluate the range predicate for one timestamp (ignores `limit`).
    pub fn matches(&self, timestamp: i64) -> bool {
        let above = if self.lower_bound_inclusive() {
            timestamp >= self.since
        } else {
            timestamp > self.since
        };
        above && self.max.is_none_or(|max| timestamp <= max)
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<i64>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if self.lower_bound_inclusive() {
            conditions.push("timestamp >= ?");
        } else {
            conditions.push("timestamp > ?");
        }
        params.push(self.since);

        if let Some(max) = self.max {
            conditions.push("timestamp <= ?");
            params.push(max);
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self, columns: &str) -> String {
        let (where_clause, _) = self.build_where();

        let mut sql = format!(
            "SELECT {} FROM archive {} ORDER BY timestamp ASC",
            columns, where_clause
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_only_is_inclusive() {
        let query = ArchiveQuery::since(100);
        assert!(query.lower_bound_inclusive());
        assert!(query.matches(100));
        assert!(query.matches(i64::MAX));
        assert!(!query.matches(99));
    }

    #[test]
    fn test_max_flips_lower_bound() {
        let query = ArchiveQuery::since(100).max(200);
        assert!(!query.lower_bound_inclusive());
        assert!(!query.matches(100));
        assert!(query.matches(101));
        assert!(query.matches(200));
        assert!(!query.matches(201));
    }

    #[test]
    fn test_limit_flips_lower_bound() {
        let query = ArchiveQuery::since(100).limit(1);
        assert!(!query.lower_bound_inclusive());
        assert!(!query.matches(100));
        assert!(query.matches(300));
    }

    #[test]
    fn test_all_matches_everything() {
        let query = ArchiveQuery::all();
        assert!(query.matches(i64::MIN));
        assert!(query.matches(0));
    }

    #[test]
    fn test_build_where_since_only() {
        let (clause, params) = ArchiveQuery::since(100).build_where();
        assert_eq!(clause, "WHERE timestamp >= ?");
        assert_eq!(params, vec![100]);
    }

    #[test]
    fn test_build_where_range() {
        let (clause, params) = ArchiveQuery::since(100).max(200).build_where();
        assert_eq!(clause, "WHERE timestamp > ? AND timestamp <= ?");
        assert_eq!(params, vec![100, 200]);
    }

    #[test]
    fn test_build_where_limit_only() {
        let (clause, params) = ArchiveQuery::since(5).limit(3).build_where();
        assert_eq!(clause, "WHERE timestamp > ?");
        assert_eq!(params, vec![5]);
    }

    #[test]
    fn test_build_sql_orders_ascending() {
        let sql = ArchiveQuery::since(0).build_sql("timestamp");
        assert_eq!(
            sql,
            "SELECT timestamp FROM archive WHERE timestamp >= ? ORDER BY timestamp ASC"
        );
    }

    #[test]
    fn test_build_sql_with_limit() {
        let sql = ArchiveQuery::since(0).max(10).limit(7).build_sql("timestamp");
        assert!(sql.ends_with("ORDER BY timestamp ASC LIMIT 7"));
        assert!(sql.contains("timestamp > ? AND timestamp <= ?"));
    }
}
