//! Weighted multi-key aggregation for ZUNIONSTORE/ZINTERSTORE.
//!
//! Sources are member→score snapshots (a plain set counts as a uniform
//! score-1 mapping, a missing key as an empty one). Each source's scores
//! are multiplied by its weight, then members are folded with the selected
//! aggregate.

use indexmap::IndexMap;

use crate::error::{KvError, Result};
use crate::types::Aggregate;
use crate::zset::ZSet;

/// One source key's member→score snapshot.
pub(crate) type ScoreMap = Vec<(Vec<u8>, f64)>;

/// Validated WEIGHTS clause: defaults to 1 per key, must match the key
/// count exactly.
pub(crate) fn resolve_weights(key_count: usize, weights: Option<&[f64]>) -> Result<Vec<f64>> {
    match weights {
        None => Ok(vec![1.0; key_count]),
        Some(w) if w.len() == key_count => Ok(w.to_vec()),
        Some(_) => Err(KvError::Syntax),
    }
}

/// Union of all sources: every member that appears anywhere, scores folded
/// with the aggregate (members absent from a source contribute nothing).
pub(crate) fn union(sources: &[ScoreMap], weights: &[f64], aggregate: Aggregate) -> ZSet {
    combine(sources, weights, aggregate, false)
}

/// Intersection: only members present in every source survive.
pub(crate) fn intersect(sources: &[ScoreMap], weights: &[f64], aggregate: Aggregate) -> ZSet {
    combine(sources, weights, aggregate, true)
}

fn combine(
    sources: &[ScoreMap],
    weights: &[f64],
    aggregate: Aggregate,
    require_all: bool,
) -> ZSet {
    let mut folded: IndexMap<Vec<u8>, (f64, usize)> = IndexMap::new();

    for (source, &weight) in sources.iter().zip(weights) {
        for (member, score) in source {
            let weighted = score * weight;
            folded
                .entry(member.clone())
                .and_modify(|(acc, seen)| {
                    *acc = match aggregate {
                        Aggregate::Sum => *acc + weighted,
                        Aggregate::Min => acc.min(weighted),
                        Aggregate::Max => acc.max(weighted),
                    };
                    *seen += 1;
                })
                .or_insert((weighted, 1));
        }
    }

    let mut out = ZSet::new();
    for (member, (score, seen)) in folded {
        if !require_all || seen == sources.len() {
            out.insert(member, score);
        }
    }
    out
}
