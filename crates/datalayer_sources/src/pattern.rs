//! Shell-style unit name patterns.
//!
//! Supported syntax:
//!
//! - `*` matches any run of characters, including none
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` match one character of a class; `[^..]` or `[!..]` negate
//! - `\c` matches `c` literally
//!
//! Patterns are compiled once into an anchored regular expression.

use datalayer_core::{LayerError, LayerResult};
use regex::Regex;
use std::fmt;

/// A compiled name pattern.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Configuration`] for an unterminated class, a
    /// trailing escape or an invalid class range.
    pub fn new(pattern: &str) -> LayerResult<Self> {
        let invalid = |why: &dyn fmt::Display| {
            LayerError::configuration(format!("file pattern {pattern:?}: {why}"))
        };
        let translated = glob_to_regex(pattern).map_err(|why| invalid(&why))?;
        let regex = Regex::new(&translated).map_err(|e| invalid(&e))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Whether `name` matches the whole pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn glob_to_regex(pattern: &str) -> Result<String, &'static str> {
    let mut out = String::from("(?s)^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                let literal = chars.next().ok_or("trailing escape")?;
                push_escaped(&mut out, literal);
            }
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('^' | '!')) {
                    chars.next();
                    out.push('^');
                }
                // A leading ']' is a literal member.
                let mut first = true;
                loop {
                    let member = chars.next().ok_or("unterminated class")?;
                    match member {
                        ']' if !first => break,
                        '-' if !first && chars.peek() != Some(&']') => out.push('-'),
                        '\\' => {
                            let literal = chars.next().ok_or("trailing escape")?;
                            push_escaped(&mut out, literal);
                        }
                        other => push_escaped(&mut out, other),
                    }
                    first = false;
                }
                out.push(']');
            }
            other => push_escaped(&mut out, other),
        }
    }
    out.push('$');
    Ok(out)
}

fn push_escaped(out: &mut String, c: char) {
    out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matches(pattern: &str, name: &str) -> bool {
        NamePattern::new(pattern).unwrap().matches(name)
    }

    #[test]
    fn wildcards() {
        assert!(matches("*", "anything.jsonl"));
        assert!(matches("*", ""));
        assert!(matches("*.jsonl", "people.jsonl"));
        assert!(!matches("*.jsonl", "people.cbor"));
        assert!(matches("people-*.jsonl", "people-2024.jsonl"));
        assert!(!matches("people-*.jsonl", "orders-2024.jsonl"));
        assert!(matches("part-?.cbor", "part-1.cbor"));
        assert!(!matches("part-?.cbor", "part-12.cbor"));
        assert!(matches("a*b*c", "aXXbYYbZc"));
        assert!(!matches("a*b*c", "aXXbYY"));
    }

    #[test]
    fn classes_and_escapes() {
        assert!(matches("part-[0-9].jsonl", "part-7.jsonl"));
        assert!(!matches("part-[0-9].jsonl", "part-x.jsonl"));
        assert!(matches("part-[^0-9].jsonl", "part-x.jsonl"));
        assert!(matches("part-[!0-9].jsonl", "part-x.jsonl"));
        assert!(matches("[]a]", "]"));
        assert!(matches("x[a-]", "x-"));
        assert!(matches(r"literal\*", "literal*"));
        assert!(!matches(r"literal\*", "literalX"));
    }

    #[test]
    fn malformed_patterns() {
        for pattern in ["[abc", r"trailing\", "[z-a]"] {
            assert!(matches!(
                NamePattern::new(pattern),
                Err(LayerError::Configuration { .. })
            ));
        }
    }

    proptest! {
        #[test]
        fn literal_patterns_match_only_themselves(name in "[a-z0-9._-]{0,16}", other in "[a-z0-9._-]{0,16}") {
            let pattern = NamePattern::new(&name).unwrap();
            prop_assert!(pattern.matches(&name));
            prop_assert_eq!(pattern.matches(&other), name == other);
        }

        #[test]
        fn prefix_star_matches_extensions(stem in "[a-z]{1,8}", rest in "[a-z0-9]{0,8}") {
            let pattern = NamePattern::new(&format!("{stem}*")).unwrap();
            let joined = format!("{stem}{rest}");
            prop_assert!(pattern.matches(&joined));
        }
    }
}
