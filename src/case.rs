//! Identifier case conversion: declared type and field names to SQL names, SQL names to tags.

use std::sync::OnceLock;

use regex::Regex;

fn capital_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Z]+").expect("static pattern"))
}

/// Lowercases and prefixes every run of capitals with `_`, dropping leading underscores.
/// e.g. "BlogPost" -> "blog_post", "HTTPLog" -> "httplog", "author" -> "author"
pub fn to_sql_friendly(identifier: &str) -> String {
    let snake = capital_runs()
        .replace_all(identifier, |caps: &regex::Captures<'_>| format!("_{}", &caps[0]))
        .to_lowercase();
    snake.trim_start_matches('_').to_string()
}

/// Convert a single identifier from snake_case to camelCase.
/// e.g. "user_id" -> "userId", "blog_post" -> "blogPost"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.chars() {
        if c == '_' {
            capitalize_next = !out.is_empty();
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_friendly_names() {
        assert_eq!(to_sql_friendly("BlogPost"), "blog_post");
        assert_eq!(to_sql_friendly("HTTPLog"), "httplog");
        assert_eq!(to_sql_friendly("author"), "author");
        assert_eq!(to_sql_friendly("canRead"), "can_read");
        assert_eq!(to_sql_friendly("can_read"), "can_read");
    }

    #[test]
    fn camel_case_tags() {
        assert_eq!(to_camel_case("blog_post"), "blogPost");
        assert_eq!(to_camel_case("post"), "post");
        assert_eq!(to_camel_case("_private_table"), "privateTable");
    }
}
