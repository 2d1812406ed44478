//! Operation signature: normalized text and its stable hash.
//!
//! Normalization drops comments, commas and insignificant whitespace outside
//! string literals. A single space is kept only between two name/number
//! characters. The result is idempotent, so `operation_id` is stable across
//! formatting-only edits.

use sha2::{Digest, Sha256};

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn normalize(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut gap = false;
    let mut i = 0;

    while let Some(&c) = chars.get(i) {
        match c {
            '#' => {
                while chars.get(i).is_some_and(|c| *c != '\n' && *c != '\r') {
                    i += 1;
                }
                gap = true;
            }
            c if c.is_whitespace() || c == ',' || c == '\u{feff}' => {
                gap = true;
                i += 1;
            }
            '"' => {
                if gap && out.chars().last().is_some_and(is_word) {
                    out.push(' ');
                }
                gap = false;
                i = copy_string(&chars, i, &mut out);
            }
            c => {
                if gap && is_word(c) && out.chars().last().is_some_and(is_word) {
                    out.push(' ');
                }
                gap = false;
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Copy a string literal starting at `start` verbatim; returns the index after it.
/// Unterminated literals run to the end of the input.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let block = chars.get(start..start + 3) == Some(&['"', '"', '"'][..]);
    let mut i = start;

    if block {
        out.push_str("\"\"\"");
        i += 3;
        while let Some(&c) = chars.get(i) {
            if c == '\\' && chars.get(i + 1..i + 4) == Some(&['"', '"', '"'][..]) {
                out.push_str("\\\"\"\"");
                i += 4;
                continue;
            }
            if chars.get(i..i + 3) == Some(&['"', '"', '"'][..]) {
                out.push_str("\"\"\"");
                return i + 3;
            }
            out.push(c);
            i += 1;
        }
        return i;
    }

    out.push('"');
    i += 1;
    while let Some(&c) = chars.get(i) {
        out.push(c);
        i += 1;
        match c {
            '\\' => {
                if let Some(&next) = chars.get(i) {
                    out.push(next);
                    i += 1;
                }
            }
            '"' => return i,
            _ => {}
        }
    }
    i
}

/// Hex SHA-256 of the normalized text; the identity used by the safelist.
pub fn operation_id(text: &str) -> String {
    hex::encode(Sha256::digest(normalize(text).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_formatting() {
        let a = "query Products($n: Int) {\n  # list\n  products(first: $n, after: \"x, y\") { name }\n}";
        assert_eq!(
            normalize(a),
            "query Products($n:Int){products(first:$n after:\"x, y\"){name}}"
        );
    }

    #[test]
    fn formatting_does_not_change_identity() {
        let a = "{ products { name price } }";
        let b = "{\n  products {\n    name,\n    price\n  }\n}\n# trailing";
        assert_eq!(operation_id(a), operation_id(b));
        assert_ne!(operation_id(a), operation_id("{ products { name } }"));
        assert_eq!(operation_id(a).len(), 64);
    }

    #[test]
    fn keeps_block_strings_verbatim() {
        let q = "{ f(s: \"\"\"a  # not a comment\n b\"\"\") }";
        assert_eq!(normalize(q), "{f(s:\"\"\"a  # not a comment\n b\"\"\")}");
    }

    #[test]
    fn escaped_quotes_stay_inside_string() {
        assert_eq!(normalize("{ f(s: \"a\\\" ,b\") }"), "{f(s:\"a\\\" ,b\")}");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[a-z{}()$:, \\n#_0-9]{0,64}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once.clone());
        }
    }
}
