/// Represents pagination parameters for SQL queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Pagination {
    /// Create pagination with page number and per-page count.
    ///
    /// Pages are 1-indexed; `None` and `0` both mean the first page.
    pub fn new(page: Option<u32>, per_page: u32) -> Self {
        let page = normalize_page(page);
        Self {
            limit: Some(u64::from(per_page)),
            offset: Some(u64::from(page - 1) * u64::from(per_page)),
        }
    }

    /// Create pagination with only limit
    pub fn limit_only(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            offset: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }

    /// Convert to SQL string
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }
}

/// Clamp a requested page number to at least 1
pub fn normalize_page(page: Option<u32>) -> u32 {
    page.unwrap_or(1).max(1)
}

/// Ceiling division of a record count into pages
pub fn page_count(record_count: u64, per_page: u32) -> u64 {
    if per_page == 0 {
        return 0;
    }
    record_count.div_ceil(u64::from(per_page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_based_pagination() {
        let pagination = Pagination::new(Some(2), 10);
        assert_eq!(pagination.limit, Some(10));
        assert_eq!(pagination.offset, Some(10));
        assert_eq!(pagination.to_sql(), " LIMIT 10 OFFSET 10");
    }

    #[test]
    fn test_first_page_pagination() {
        for page in [None, Some(0), Some(1)] {
            let pagination = Pagination::new(page, 20);
            assert_eq!(pagination.offset, Some(0));
            assert_eq!(pagination.to_sql(), " LIMIT 20 OFFSET 0");
        }
    }

    #[test]
    fn test_limit_only() {
        let pagination = Pagination::limit_only(5);
        assert_eq!(pagination.offset, None);
        assert_eq!(pagination.to_sql(), " LIMIT 5");
    }

    #[test]
    fn test_page_count_calculation() {
        assert_eq!(page_count(25, 10), 3);
        assert_eq!(page_count(30, 10), 3);
        assert_eq!(page_count(31, 10), 4);
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(4, 2), 2);
    }
}
