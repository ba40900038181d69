use graphload_core::query_builder::pagination::{normalize_page, page_count, Pagination};

#[test]
fn test_page_based_pagination() {
    let pagination = Pagination::new(Some(2), 10); // Page 2, 10 per page
    assert_eq!(pagination.limit, Some(10));
    assert_eq!(pagination.offset, Some(10));
    assert_eq!(pagination.to_sql(), " LIMIT 10 OFFSET 10");
}

#[test]
fn test_first_page_pagination() {
    let pagination = Pagination::new(Some(1), 20);
    assert_eq!(pagination.limit, Some(20));
    assert_eq!(pagination.offset, Some(0));
    assert_eq!(pagination.to_sql(), " LIMIT 20 OFFSET 0");
}

#[test]
fn test_missing_and_zero_page_mean_first_page() {
    assert_eq!(Pagination::new(None, 5), Pagination::new(Some(1), 5));
    assert_eq!(Pagination::new(Some(0), 5), Pagination::new(Some(1), 5));
    assert_eq!(normalize_page(None), 1);
    assert_eq!(normalize_page(Some(0)), 1);
    assert_eq!(normalize_page(Some(7)), 7);
}

#[test]
fn test_limit_only() {
    let pagination = Pagination::limit_only(5);
    assert_eq!(pagination.limit, Some(5));
    assert_eq!(pagination.offset, None);
    assert_eq!(pagination.to_sql(), " LIMIT 5");
}

#[test]
fn test_empty_pagination() {
    let pagination = Pagination::default();
    assert!(pagination.is_empty());
    assert_eq!(pagination.to_sql(), "");
}

#[test]
fn test_page_count_calculation() {
    assert_eq!(page_count(25, 10), 3); // 25 items, 10 per page = 3 pages
    assert_eq!(page_count(30, 10), 3);
    assert_eq!(page_count(31, 10), 4);
    assert_eq!(page_count(0, 10), 0);
    assert_eq!(page_count(5, 0), 0);
}
