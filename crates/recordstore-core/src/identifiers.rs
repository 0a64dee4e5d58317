//! SQL identifier validation, quoting and default naming.

use std::sync::LazyLock;

use heck::ToSnakeCase;
use regex::Regex;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Whether `name` is a plain SQL identifier that needs no escaping beyond quotes.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Quote an identifier for PostgreSQL, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Default column name for a field: the snake_case field name.
pub fn default_column_name(field: &str) -> String {
    field.to_snake_case()
}

/// Default table name for a model: the snake_case model name.
pub fn default_table_name(model: &str) -> String {
    model.to_snake_case()
}

/// Default foreign key column pointing at `model`: `<snake_case model>_id`.
pub fn default_foreign_key(model: &str) -> String {
    format!("{}_id", model.to_snake_case())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier("person"));
        assert!(is_valid_identifier("_tmp1"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("drop table"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_default_names() {
        assert_eq!(default_column_name("createdAt"), "created_at");
        assert_eq!(default_table_name("PetOwner"), "pet_owner");
        assert_eq!(default_foreign_key("PetOwner"), "pet_owner_id");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("name"), "\"name\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
