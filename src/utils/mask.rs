//! Key masks
//!
//! A mask is a key containing `*`. Each run of stars matches one or more
//! characters; every other character matches itself. Matching is anchored at
//! the start of the key only.

use crate::error::{CacheError, Result};
use regex::Regex;

/// Whether `key` is a mask rather than a literal key
pub fn is_mask(key: &str) -> bool {
    key.contains('*')
}

fn collapse_stars(mask: &str) -> String {
    let mut out = String::with_capacity(mask.len());
    let mut prev_star = false;
    for ch in mask.chars() {
        if ch == '*' && prev_star {
            continue;
        }
        prev_star = ch == '*';
        out.push(ch);
    }
    out
}

/// Translate a mask into a prefix-anchored regular expression
pub fn mask_to_regex(mask: &str) -> Result<Regex> {
    let collapsed = collapse_stars(mask);
    let pattern = collapsed
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".+");
    Regex::new(&format!("^{}", pattern))
        .map_err(|e| CacheError::protocol_error("mask", format!("Invalid mask {}: {}", mask, e)))
}

/// Translate a mask into a glob for `KEYS`/`SCAN MATCH`, escaping the glob
/// metacharacters the mask treats literally
pub fn mask_to_glob(mask: &str) -> String {
    let mut out = String::with_capacity(mask.len() + 1);
    for ch in collapse_stars(mask).chars() {
        if matches!(ch, '[' | ']' | '?' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    if !out.ends_with('*') {
        out.push('*');
    }
    out
}

/// Keys from `candidates` matched by `mask`, in their original order
pub fn filter_keys<I, S>(mask: &str, candidates: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let re = mask_to_regex(mask)?;
    Ok(candidates
        .into_iter()
        .filter(|k| re.is_match(k.as_ref()))
        .map(|k| k.as_ref().to_string())
        .collect())
}
