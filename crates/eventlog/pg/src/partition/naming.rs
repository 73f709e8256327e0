//! Deterministic physical table names for partitions.
//!
//! A name is `<level prefix>_<first 6 hex chars of SHA-256(logical key)>`.
//! Two different logical partitions can hash to the same name; the catalog
//! then walks the lexical successors of the name ([`next_table_name`]) until
//! it finds a free one.

use eventlog_core::PartitionLevel;
use sha2::{Digest, Sha256};

const DIGEST_LENGTH: usize = 6;
const KEY_SEPARATOR: char = '\u{1f}';

/// Initial table name of a partition.
pub fn table_name(
    level: PartitionLevel,
    context: &str,
    stream_name: Option<&str>,
    event_type: Option<&str>,
) -> String {
    let mut key = context.to_string();
    for part in [stream_name, event_type].into_iter().flatten() {
        key.push(KEY_SEPARATOR);
        key.push_str(part);
    }
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    format!("{}_{}", level.table_prefix(), &digest[..DIGEST_LENGTH])
}

/// Lexical successor of a table name.
///
/// Increments the rightmost alphanumeric character, carrying into the
/// alphanumerics to its left (`..._a9` → `..._b0`, `..._zz` → `..._aaa`).
/// Other characters are left untouched.
pub fn next_table_name(name: &str) -> String {
    let mut chars: Vec<char> = name.chars().collect();
    let Some(mut index) = chars.iter().rposition(|c| c.is_ascii_alphanumeric()) else {
        let mut next = name.to_string();
        next.push('a');
        return next;
    };

    loop {
        let (next, carry) = increment(chars[index]);
        chars[index] = next;
        if !carry {
            break;
        }
        match chars[..index]
            .iter()
            .rposition(|c| c.is_ascii_alphanumeric())
        {
            Some(left) if is_same_run(&chars, left, index) => index = left,
            _ => {
                chars.insert(index, carry_char(next));
                break;
            }
        }
    }

    chars.into_iter().collect()
}

fn increment(c: char) -> (char, bool) {
    match c {
        '9' => ('0', true),
        'z' => ('a', true),
        'Z' => ('A', true),
        c => (char::from(c as u8 + 1), false),
    }
}

fn carry_char(wrapped: char) -> char {
    match wrapped {
        '0' => '1',
        'A' => 'A',
        _ => 'a',
    }
}

/// Whether `left` and `right` belong to the same alphanumeric run, i.e. the
/// suffix of the name. The level prefix (`contexts_`) never absorbs a carry.
fn is_same_run(chars: &[char], left: usize, right: usize) -> bool {
    chars[left + 1..right]
        .iter()
        .all(|c| c.is_ascii_alphanumeric())
}

/// Quote a value as a SQL string literal.
///
/// Partition bounds are part of DDL, where parameters cannot be bound.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
