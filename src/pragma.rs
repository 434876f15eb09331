//! Recognition and parameter extraction for tool directives.
//!
//! Directives use the `fortopt` keyword and carry their parameters as
//! `key(value)` clauses, e.g.
//! `!$fortopt loop-fusion group(a) collapse(2)`.

use crate::ir::Pragma;
use std::collections::HashMap;

/// Namespace keyword of our own directives.
pub const PRAGMA_KEYWORD: &str = "fortopt";

/// Whether a pragma is one of ours and its content starts with the given
/// directive name.
pub fn is_tool_pragma(pragma: &Pragma, starts_with: &str) -> bool {
    pragma.keyword.eq_ignore_ascii_case(PRAGMA_KEYWORD)
        && pragma.content.trim_start().to_lowercase().starts_with(&starts_with.to_lowercase())
}

/// Extract `key(value)` parameters from a directive's content, skipping
/// the leading directive name. Bare keys map to an empty value. Values
/// may contain nested parentheses (`range(1:min(n,m))`).
pub fn pragma_parameters(pragma: &Pragma, starts_with: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let content = pragma.content.trim_start();
    let rest = if content.len() >= starts_with.len()
        && content[..starts_with.len()].eq_ignore_ascii_case(starts_with)
    {
        &content[starts_with.len()..]
    } else {
        content
    };

    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        let key_start = i;
        while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '-' || chars[i] == '_')
        {
            i += 1;
        }
        if i == key_start {
            // Not a key character; skip it
            i += 1;
            continue;
        }
        let key: String = chars[key_start..i].iter().collect::<String>().to_lowercase();
        if i < chars.len() && chars[i] == '(' {
            i += 1;
            let value_start = i;
            let mut depth = 1usize;
            while i < chars.len() && depth > 0 {
                match chars[i] {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                if depth > 0 {
                    i += 1;
                }
            }
            let value: String = chars[value_start..i].iter().collect();
            if i < chars.len() {
                i += 1;
            }
            params.insert(key, value.trim().to_string());
        } else {
            params.insert(key, String::new());
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_tool_pragma() {
        let p = Pragma::new("fortopt", "loop-fusion group(a)");
        assert!(is_tool_pragma(&p, "loop-fusion"));
        assert!(!is_tool_pragma(&p, "loop-fission"));
        let foreign = Pragma::new("omp", "parallel do");
        assert!(!is_tool_pragma(&foreign, "parallel"));
    }

    #[test]
    fn test_parameters() {
        let p = Pragma::new("fortopt", "loop-fusion group(g1) collapse(2)");
        let params = pragma_parameters(&p, "loop-fusion");
        assert_eq!(params.get("group").map(String::as_str), Some("g1"));
        assert_eq!(params.get("collapse").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_bare_key_and_nested_parens() {
        let p = Pragma::new("fortopt", "loop-fission promote(a, b) verbose range(1:min(n,m))");
        let params = pragma_parameters(&p, "loop-fission");
        assert_eq!(params.get("promote").map(String::as_str), Some("a, b"));
        assert_eq!(params.get("verbose").map(String::as_str), Some(""));
        assert_eq!(params.get("range").map(String::as_str), Some("1:min(n,m)"));
    }

    #[test]
    fn test_no_parameters() {
        let p = Pragma::new("fortopt", "loop-fission");
        assert!(pragma_parameters(&p, "loop-fission").is_empty());
    }
}
