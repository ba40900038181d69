use crate::constants::{FOREIGN_KEY_SUFFIX, POLYMORPHIC_TYPE_SUFFIX};

/// Singularize the last word of a snake_case table name
pub fn singularize(table: &str) -> String {
    match table.rsplit_once('_') {
        Some((head, last)) => format!("{head}_{}", pluralizer::pluralize(last, 1, false)),
        None => pluralizer::pluralize(table, 1, false),
    }
}

/// `posts` -> `post_id`
pub fn foreign_key_for_table(table: &str) -> String {
    format!("{}{FOREIGN_KEY_SUFFIX}", singularize(table))
}

/// `rateable_id` -> `rateable_type`
pub fn polymorphic_type_field(foreign_key: &str) -> String {
    let stem = foreign_key
        .strip_suffix(FOREIGN_KEY_SUFFIX)
        .unwrap_or(foreign_key);
    format!("{stem}{POLYMORPHIC_TYPE_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_keys() {
        assert_eq!(foreign_key_for_table("users"), "user_id");
        assert_eq!(foreign_key_for_table("categories"), "category_id");
        assert_eq!(foreign_key_for_table("balloon_lines"), "balloon_line_id");
    }

    #[test]
    fn test_polymorphic_type_field() {
        assert_eq!(polymorphic_type_field("rateable_id"), "rateable_type");
        assert_eq!(polymorphic_type_field("owner"), "owner_type");
    }
}
