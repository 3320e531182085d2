//! Literal quoting for the SQL fragments handed back to the host.

/// Quotes a string literal, doubling embedded single quotes.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\0' => {}
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Quotes every value and joins them for use inside `IN (...)`.
#[must_use]
pub fn quote_list<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| quote(v.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escapes LIKE wildcards so `value` matches literally under `ESCAPE '\'`.
#[must_use]
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A `LIKE` predicate on `column` matching rows that contain `needle` literally.
#[must_use]
pub fn like_contains(column: &str, needle: &str) -> String {
    format!(
        "{column} LIKE {} ESCAPE '\\'",
        quote(&format!("%{}%", escape_like(needle)))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_single_quotes() {
        assert_eq!(quote("editor"), "'editor'");
        assert_eq!(quote("o'brien"), "'o''brien'");
        assert_eq!(quote("a\0b"), "'ab'");
    }

    #[test]
    fn test_quote_list() {
        assert_eq!(quote_list(&["a", "b'c"]), "'a', 'b''c'");
    }

    #[test]
    fn test_like_contains_escapes_wildcards() {
        assert_eq!(
            like_contains("m.meta_value", "\"shop_manager\""),
            r#"m.meta_value LIKE '%"shop\_manager"%' ESCAPE '\'"#
        );
        assert_eq!(escape_like("100%"), "100\\%");
    }
}
