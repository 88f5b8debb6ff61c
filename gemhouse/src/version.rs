//! RubyGems version ordering.
//!
//! Versions are split into segments on `.` and on every boundary between a
//! run of digits and a run of letters, so `1.0.0.rc1` and `1.0.0rc1` both
//! become `[1, 0, 0, "rc", 1]`. Numeric segments compare numerically, any
//! letter segment marks a prerelease and sorts before a numeric segment in the
//! same position, and missing trailing segments count as zero.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    // Digits with leading zeros stripped; compared by length, then lexically.
    Number(&'a str),
    Text(&'a str),
}

const ZERO: Segment<'static> = Segment::Number("");

fn segments(version: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    for part in version.split('.') {
        let mut start = 0;
        let bytes = part.as_bytes();
        while start < bytes.len() {
            let digit = bytes[start].is_ascii_digit();
            let end = bytes[start..]
                .iter()
                .position(|b| b.is_ascii_digit() != digit)
                .map_or(bytes.len(), |offset| start + offset);
            let run = &part[start..end];
            out.push(if digit {
                Segment::Number(run.trim_start_matches('0'))
            } else {
                Segment::Text(run)
            });
            start = end;
        }
    }
    out
}

fn compare_segments(left: Segment<'_>, right: Segment<'_>) -> Ordering {
    match (left, right) {
        (Segment::Number(a), Segment::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
        (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
        (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
    }
}

/// Compare two version strings.
pub fn compare(left: &str, right: &str) -> Ordering {
    let left = segments(left);
    let right = segments(right);
    let len = left.len().max(right.len());
    (0..len)
        .map(|i| {
            compare_segments(
                left.get(i).copied().unwrap_or(ZERO),
                right.get(i).copied().unwrap_or(ZERO),
            )
        })
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Whether the version carries a letter segment (`1.0.0.beta2`, `2.0.pre`).
pub fn is_prerelease(version: &str) -> bool {
    version.bytes().any(|b| b.is_ascii_alphabetic())
}
