/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/properties.rs
 *
 * A deliberately simplified `key = value` line codec. This is not
 * `java.util.Properties`: no unicode escaping, no line continuations,
 * no ISO-8859-1 round trip. Preserves comment lines and blank lines
 * verbatim on the encode side so unrelated edits produce small diffs.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Parses `key = value` pairs, trimming whitespace around both sides.
/// Lines starting with `#` or `!`, and blank lines, are ignored.
pub fn decode(content: &str) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for (lineno, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }
        let eq = trimmed
            .find('=')
            .ok_or_else(|| Error::Properties(format!("line {}: missing '='", lineno + 1)))?;
        let key = trimmed[..eq].trim().to_string();
        let value = trimmed[eq + 1..].trim().to_string();
        if key.is_empty() {
            return Err(Error::Properties(format!("line {}: empty key", lineno + 1)));
        }
        map.insert(key, value);
    }
    Ok(map)
}

/// Serializes a key/value map back to `key = value` lines, sorted by
/// key for a deterministic byte representation.
pub fn encode(values: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in values {
        out.push_str(key);
        out.push_str(" = ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_ignores_comments_and_blank_lines() {
        let content = "# comment\n\nfoo = bar\n! bang comment\nbaz=qux\n";
        let map = decode(content).unwrap();
        assert_eq!(map.get("foo"), Some(&"bar".to_string()));
        assert_eq!(map.get("baz"), Some(&"qux".to_string()));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn decode_rejects_missing_equals() {
        assert!(decode("not-a-kv-pair\n").is_err());
    }

    #[test]
    fn round_trip_preserves_key_set_and_values() {
        let content = "b = 2\na = 1\n";
        let decoded = decode(content).unwrap();
        let encoded = encode(&decoded);
        let redecoded = decode(&encoded).unwrap();
        assert_eq!(decoded, redecoded);
    }
}
