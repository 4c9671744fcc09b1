//! SQL LIKE pattern helpers.

/// Escape LIKE meta-characters so user input is treated literally.
pub(crate) fn escape_like_pattern(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// `%value%` pattern with the value itself escaped.
pub(crate) fn contains_pattern(s: &str) -> String {
    format!("%{}%", escape_like_pattern(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_like_metacharacters() {
        assert_eq!(escape_like_pattern("50%_done\\x"), "50\\%\\_done\\\\x");
        assert_eq!(escape_like_pattern("plain"), "plain");
    }

    #[test]
    fn contains_pattern_wraps_and_escapes() {
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
    }
}
