//! Sorted-set container: member → score with score-ordered enumeration.
//!
//! Scores are finite floats or ±infinity. Both score assignment and range
//! boundaries coerce through the parsers here so `inf`/`+inf`/`-inf` behave
//! identically everywhere. Range boundaries additionally accept the
//! exclusive prefix `(`, which applies the legacy integer nudge (`(1` →
//! effective lower bound 2) rather than a true open interval.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// Parse a score argument: signed decimal or `inf`/`+inf`/`-inf`
/// (case-insensitive).
pub fn parse_score(s: &str) -> Result<f64> {
    if let Some(inf) = parse_infinity(s) {
        return Ok(inf);
    }
    s.parse::<f64>().map_err(|_| KvError::NotFloat)
}

/// Parse a range boundary. `lower` selects the nudge direction for the
/// exclusive prefix: `(n` becomes n+1 for a lower bound and n-1 for an
/// upper bound, taking the leading integer part of n.
pub fn parse_bound(s: &str, lower: bool) -> Result<f64> {
    if let Some(inf) = parse_infinity(s) {
        return Ok(inf);
    }
    if let Some(rest) = s.strip_prefix('(') {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(KvError::NotFloat);
        }
        let n: i64 = digits.parse().map_err(|_| KvError::NotFloat)?;
        return Ok(if lower { (n + 1) as f64 } else { (n - 1) as f64 });
    }
    s.parse::<f64>().map_err(|_| KvError::NotFloat)
}

fn parse_infinity(s: &str) -> Option<f64> {
    let lower = s.to_lowercase();
    if let Some(rest) = lower.strip_prefix('-') {
        if rest.starts_with("inf") {
            return Some(f64::NEG_INFINITY);
        }
    } else if lower.strip_prefix('+').unwrap_or(&lower).starts_with("inf") {
        return Some(f64::INFINITY);
    }
    None
}

/// Member → score mapping with score-ordered views.
///
/// Insertion order of the backing map is what cursor-based scans page over;
/// ordered views are computed on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZSet {
    members: IndexMap<Vec<u8>, f64>,
}

impl ZSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a member. Returns true when the member was new.
    pub fn insert(&mut self, member: Vec<u8>, score: f64) -> bool {
        self.members.insert(member, score).is_none()
    }

    /// Add `delta` to the member's score (missing member starts at 0).
    /// Returns the new score.
    pub fn increment(&mut self, member: &[u8], delta: f64) -> f64 {
        let score = self.members.get(member).copied().unwrap_or(0.0) + delta;
        self.members.insert(member.to_vec(), score);
        score
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        self.members.shift_remove(member).is_some()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.members.get(member).copied()
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.members.contains_key(member)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, f64)> {
        self.members.iter().map(|(m, s)| (m, *s))
    }

    /// Members whose score lies in `[min, max]` after boundary coercion,
    /// in insertion order.
    pub fn select_by_score(&self, min: &str, max: &str) -> Result<Vec<(Vec<u8>, f64)>> {
        let min = parse_bound(min, true)?;
        let max = parse_bound(max, false)?;
        Ok(self
            .members
            .iter()
            .filter(|(_, &s)| s >= min && s <= max)
            .map(|(m, &s)| (m.clone(), s))
            .collect())
    }

    /// All members ordered by score ascending, ties broken by member bytes
    /// ascending.
    pub fn sorted(&self) -> Vec<(Vec<u8>, f64)> {
        let mut entries: Vec<(Vec<u8>, f64)> = self
            .members
            .iter()
            .map(|(m, &s)| (m.clone(), s))
            .collect();
        sort_entries(&mut entries);
        entries
    }
}

/// Order (member, score) pairs by score ascending, ties by member bytes.
pub fn sort_entries(entries: &mut [(Vec<u8>, f64)]) {
    entries.sort_by(|(m1, s1), (m2, s2)| s1.total_cmp(s2).then_with(|| m1.cmp(m2)));
}
