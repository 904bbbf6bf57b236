//! Registration-target grammar.

use once_cell::sync::Lazy;
use regex::Regex;

const MAX_TARGET_LEN: usize = 2048;

// Each segment is either URL-safe literal characters or a single-level
// `{name}` capture; the name may be empty.
static VALID_TARGET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(?:[A-Za-z0-9\-._~!$&'()*+,;=:@/?%#\[\]]|\{[A-Za-z0-9_\-]*\})*$").unwrap()
});

/// Validate a registration target.
///
/// Accepts absolute paths up to 2048 characters whose braces pair exactly
/// without nesting and whose literal part (parameters stripped) never
/// forms `..`.
pub(crate) fn is_valid_target(target: &str) -> bool {
    if target.is_empty() || target.len() > MAX_TARGET_LEN || !target.starts_with('/') {
        return false;
    }

    if !VALID_TARGET.is_match(target) {
        return false;
    }

    let mut in_brace = false;
    let mut literal = String::with_capacity(target.len());
    for c in target.chars() {
        match c {
            '{' => {
                if in_brace {
                    return false;
                }
                in_brace = true;
            }
            '}' => {
                if !in_brace {
                    return false;
                }
                in_brace = false;
            }
            _ if !in_brace => literal.push(c),
            _ => {}
        }
    }
    if in_brace {
        return false;
    }

    !literal.contains("..")
}
