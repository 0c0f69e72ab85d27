//! SORT: project, weight, order, slice and optionally store elements of a
//! list, set or sorted set.
//!
//! Weights come from the element itself or, with BY, from another key
//! reached by substituting the element into a pattern (`weight_*`, or
//! `hash_*->field` for a hash field). GET projects the output the same
//! way; `#` stands for the element itself. Comparison is bytewise —
//! ALPHA is accepted but changes nothing.

use crate::db::Db;
use crate::error::Result;

/// Parsed SORT clauses.
#[derive(Debug, Clone, Default)]
pub struct SortOptions {
    pub by: Option<String>,
    /// (offset, count)
    pub limit: Option<(i64, i64)>,
    pub get: Vec<String>,
    pub desc: bool,
    pub store: Option<String>,
}

/// SORT result: the projected rows, or the stored list's length when STORE
/// was given.
#[derive(Debug, Clone, PartialEq)]
pub enum Sorted {
    Values(Vec<Option<Vec<u8>>>),
    Stored(i64),
}

pub(crate) fn run(db: &Db, key: &str, opts: &SortOptions) -> Result<Sorted> {
    let elements = match db.sort_elements(key)? {
        Some(elements) => elements,
        None => return Ok(Sorted::Values(Vec::new())),
    };

    // (weight, projected row) per element
    let mut projected: Vec<(Vec<u8>, Vec<Option<Vec<u8>>>)> = Vec::with_capacity(elements.len());
    for element in elements {
        let weight = match &opts.by {
            Some(pattern) => lookup(db, pattern, &element)?.unwrap_or_default(),
            None => element.clone(),
        };

        let row = if opts.get.is_empty() {
            vec![Some(element)]
        } else {
            let mut row = Vec::with_capacity(opts.get.len());
            for pattern in &opts.get {
                if pattern == "#" {
                    row.push(Some(element.clone()));
                } else {
                    row.push(lookup(db, pattern, &element)?);
                }
            }
            row
        };

        projected.push((weight, row));
    }

    if opts.desc {
        projected.sort_by(|(a, _), (b, _)| b.cmp(a));
    } else {
        projected.sort_by(|(a, _), (b, _)| a.cmp(b));
    }

    let sliced = slice(projected, opts.limit);
    let rows: Vec<Option<Vec<u8>>> = sliced.into_iter().flat_map(|(_, row)| row).collect();

    match &opts.store {
        Some(dest) => {
            db.del(&[dest.as_str()])?;
            if rows.is_empty() {
                return Ok(Sorted::Stored(0));
            }
            let stored: Vec<Vec<u8>> = rows
                .into_iter()
                .map(|v| v.unwrap_or_default())
                .collect();
            let refs: Vec<&[u8]> = stored.iter().map(|v| v.as_slice()).collect();
            let len = db.rpush(dest, &refs)?;
            Ok(Sorted::Stored(len))
        }
        None => Ok(Sorted::Values(rows)),
    }
}

/// LIMIT slicing with the original's behavior: an offset past the end
/// yields the whole list, a negative count an empty one.
fn slice<T>(rows: Vec<T>, limit: Option<(i64, i64)>) -> Vec<T> {
    let Some((offset, count)) = limit else {
        return rows;
    };
    let len = rows.len() as i64;
    if offset > len {
        return rows;
    }
    let start = offset.max(0);
    let end = (start + count.max(0)).min(len);
    rows.into_iter()
        .skip(start as usize)
        .take((end - start).max(0) as usize)
        .collect()
}

/// Substitute the element into the pattern and fetch the weight: a plain
/// key lookup, or a hash field when the pattern contains `->`.
fn lookup(db: &Db, pattern: &str, element: &[u8]) -> Result<Option<Vec<u8>>> {
    let element = String::from_utf8_lossy(element);
    let key = pattern.replacen('*', &element, 1);

    match key.split_once("->") {
        Some((hash_key, field)) => db.hget(hash_key, field),
        None => db.get(&key),
    }
}
