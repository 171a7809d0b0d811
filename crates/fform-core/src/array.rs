#![forbid(unsafe_code)]

//! Order-preserving sequence transforms for field arrays.
//!
//! Every function takes a borrowed slice and returns a new `Vec`; inputs are
//! never mutated, so the caller decides when a result becomes committed state.
//!
//! [`ArrayOp`] describes one transform without its payload so the same
//! surgery can be replayed over every sequence that mirrors an array: values,
//! identity keys, registry slots, errors, touched flags.
//!
//! # Invariants
//!
//! 1. `insert` clamps its index to `[0, len]`.
//! 2. `remove(None)` clears; `remove(Some(ix))` drops exactly the listed
//!    in-range positions, duplicates collapsing, survivors keeping order.
//! 3. `move_item` and `swap` with any index outside `[0, len)` return the
//!    input unchanged.
//! 4. `update` outside `[0, len)` returns the input unchanged.
//! 5. For equal-length inputs, replaying one `ArrayOp` yields equal-length
//!    outputs.

use serde::{Deserialize, Serialize};

/// Add `values` after the last entry.
#[must_use]
pub fn append<T: Clone>(data: &[T], values: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut out = data.to_vec();
    out.extend(values);
    out
}

/// Add `values` before the first entry.
#[must_use]
pub fn prepend<T: Clone>(data: &[T], values: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = values.into_iter().collect();
    out.extend_from_slice(data);
    out
}

/// Splice `values` in at `index`, clamped to `[0, len]`.
#[must_use]
pub fn insert<T: Clone>(data: &[T], index: usize, values: impl IntoIterator<Item = T>) -> Vec<T> {
    let at = index.min(data.len());
    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[..at]);
    out.extend(values);
    out.extend_from_slice(&data[at..]);
    out
}

/// Remove the listed positions, or everything when `indices` is `None`.
#[must_use]
pub fn remove<T: Clone>(data: &[T], indices: Option<&[usize]>) -> Vec<T> {
    let Some(indices) = indices else {
        return Vec::new();
    };
    data.iter()
        .enumerate()
        .filter(|(i, _)| !indices.contains(i))
        .map(|(_, v)| v.clone())
        .collect()
}

/// Move the entry at `from` so it ends up at `to`.
#[must_use]
pub fn move_item<T: Clone>(data: &[T], from: usize, to: usize) -> Vec<T> {
    let mut out = data.to_vec();
    if from >= data.len() || to >= data.len() {
        return out;
    }
    let item = out.remove(from);
    out.insert(to, item);
    out
}

/// Exchange the entries at `a` and `b`.
#[must_use]
pub fn swap<T: Clone>(data: &[T], a: usize, b: usize) -> Vec<T> {
    let mut out = data.to_vec();
    if a < out.len() && b < out.len() {
        out.swap(a, b);
    }
    out
}

/// Replace the entry at `index`.
#[must_use]
pub fn update<T: Clone>(data: &[T], index: usize, value: T) -> Vec<T> {
    let mut out = data.to_vec();
    if let Some(slot) = out.get_mut(index) {
        *slot = value;
    }
    out
}

/// Discard `data` and rebuild from `values`.
#[must_use]
pub fn replace<T>(values: impl IntoIterator<Item = T>) -> Vec<T> {
    values.into_iter().collect()
}

/// Sorted, de-duplicated copy of `indices`.
#[must_use]
pub fn normalize_indices(indices: &[usize]) -> Vec<usize> {
    let mut out = indices.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

// ─── ArrayOp ─────────────────────────────────────────────────────────────────

/// One field-array transform, minus the values it inserts.
///
/// Serializes tagged by [`ArrayOp::name`], e.g. `{"op":"move","from":0,"to":2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ArrayOp {
    Append { count: usize },
    Prepend { count: usize },
    Insert { index: usize, count: usize },
    /// `None` removes every entry.
    Remove { indices: Option<Vec<usize>> },
    Move { from: usize, to: usize },
    Swap { a: usize, b: usize },
    Update { index: usize },
    Replace { len: usize },
}

impl ArrayOp {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Append { .. } => "append",
            Self::Prepend { .. } => "prepend",
            Self::Insert { .. } => "insert",
            Self::Remove { .. } => "remove",
            Self::Move { .. } => "move",
            Self::Swap { .. } => "swap",
            Self::Update { .. } => "update",
            Self::Replace { .. } => "replace",
        }
    }

    /// Replay this transform over `data`, filling each new or replaced slot
    /// with `fresh()`.
    #[must_use]
    pub fn apply<T: Clone>(&self, data: &[T], mut fresh: impl FnMut() -> T) -> Vec<T> {
        match self {
            Self::Append { count } => append(data, (0..*count).map(|_| fresh())),
            Self::Prepend { count } => prepend(data, (0..*count).map(|_| fresh())),
            Self::Insert { index, count } => insert(data, *index, (0..*count).map(|_| fresh())),
            Self::Remove { indices } => remove(data, indices.as_deref()),
            Self::Move { from, to } => move_item(data, *from, *to),
            Self::Swap { a, b } => swap(data, *a, *b),
            Self::Update { index } => {
                if *index < data.len() {
                    update(data, *index, fresh())
                } else {
                    data.to_vec()
                }
            }
            Self::Replace { len } => replace((0..*len).map(|_| fresh())),
        }
    }

    /// Length of the result when applied to a sequence of `len` entries.
    #[must_use]
    pub fn result_len(&self, len: usize) -> usize {
        match self {
            Self::Append { count } | Self::Prepend { count } | Self::Insert { count, .. } => {
                len + count
            }
            Self::Remove { indices: None } => 0,
            Self::Remove {
                indices: Some(indices),
            } => len - normalize_indices(indices).iter().filter(|i| **i < len).count(),
            Self::Move { .. } | Self::Swap { .. } | Self::Update { .. } => len,
            Self::Replace { len: new_len } => *new_len,
        }
    }

    /// Where the entry at old position `old` lands, if it survives with its
    /// identity intact.
    #[must_use]
    pub fn map_index(&self, old: usize, len: usize) -> Option<usize> {
        if old >= len {
            return None;
        }
        match self {
            Self::Append { .. } => Some(old),
            Self::Prepend { count } => Some(old + count),
            Self::Insert { index, count } => {
                let at = (*index).min(len);
                Some(if old < at { old } else { old + count })
            }
            Self::Remove { indices: None } => None,
            Self::Remove {
                indices: Some(indices),
            } => {
                if indices.contains(&old) {
                    None
                } else {
                    let removed_before = normalize_indices(indices)
                        .iter()
                        .filter(|i| **i < old)
                        .count();
                    Some(old - removed_before)
                }
            }
            Self::Move { from, to } => {
                if *from >= len || *to >= len {
                    return Some(old);
                }
                Some(if old == *from {
                    *to
                } else if from < to && old > *from && old <= *to {
                    old - 1
                } else if to < from && old >= *to && old < *from {
                    old + 1
                } else {
                    old
                })
            }
            Self::Swap { a, b } => {
                if *a >= len || *b >= len {
                    Some(old)
                } else if old == *a {
                    Some(*b)
                } else if old == *b {
                    Some(*a)
                } else {
                    Some(old)
                }
            }
            Self::Update { index } => (old != *index).then_some(old),
            Self::Replace { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn op_serializes_under_its_name() {
        let op = ArrayOp::Move { from: 0, to: 2 };
        let encoded = serde_json::to_value(&op).expect("serialize");
        assert_eq!(encoded, json!({ "op": "move", "from": 0, "to": 2 }));
        let remove_all: ArrayOp =
            serde_json::from_value(json!({ "op": "remove", "indices": null })).expect("deserialize");
        assert_eq!(remove_all, ArrayOp::Remove { indices: None });
        assert_eq!(
            serde_json::from_value::<ArrayOp>(encoded).expect("deserialize"),
            op
        );
    }

    #[test]
    fn append_and_prepend() {
        assert_eq!(append(&[1, 2], [3, 4]), vec![1, 2, 3, 4]);
        assert_eq!(prepend(&[1, 2], [0]), vec![0, 1, 2]);
    }

    #[test]
    fn insert_clamps_index() {
        assert_eq!(insert(&[1, 2, 3], 1, [9]), vec![1, 9, 2, 3]);
        assert_eq!(insert(&[1, 2, 3], 99, [9]), vec![1, 2, 3, 9]);
        assert_eq!(insert(&[1, 2, 3], 0, [8, 9]), vec![8, 9, 1, 2, 3]);
    }

    #[test]
    fn remove_variants() {
        assert_eq!(remove(&[1, 2, 3], None), Vec::<i32>::new());
        assert_eq!(remove(&[1, 2, 3, 4], Some(&[3, 1, 1][..])), vec![1, 3]);
        assert_eq!(remove(&[1, 2, 3], Some(&[7][..])), vec![1, 2, 3]);
    }

    #[test]
    fn move_preserves_relative_order() {
        assert_eq!(move_item(&['a', 'b', 'c'], 0, 2), vec!['b', 'c', 'a']);
        assert_eq!(move_item(&['a', 'b', 'c'], 2, 0), vec!['c', 'a', 'b']);
        assert_eq!(move_item(&['a', 'b', 'c'], 0, 3), vec!['a', 'b', 'c']);
    }

    #[test]
    fn swap_out_of_range_is_noop() {
        assert_eq!(swap(&[1, 2, 3], 0, 2), vec![3, 2, 1]);
        assert_eq!(swap(&[1, 2, 3], 0, 5), vec![1, 2, 3]);
    }

    #[test]
    fn update_in_and_out_of_range() {
        assert_eq!(update(&[1, 2, 3], 1, 20), vec![1, 20, 3]);
        assert_eq!(update(&[1, 2, 3], 3, 20), vec![1, 2, 3]);
    }

    #[test]
    fn op_replay_keeps_parallel_lengths() {
        let values = vec!["a", "b", "c"];
        let keys = vec![1u32, 2, 3];
        let ops = [
            ArrayOp::Append { count: 2 },
            ArrayOp::Insert { index: 1, count: 1 },
            ArrayOp::Remove {
                indices: Some(vec![0, 0, 2]),
            },
            ArrayOp::Move { from: 0, to: 1 },
            ArrayOp::Replace { len: 4 },
        ];
        for op in &ops {
            let v = op.apply(&values, || "new");
            let mut next = 100;
            let k = op.apply(&keys, || {
                next += 1;
                next
            });
            assert_eq!(v.len(), k.len(), "{}", op.name());
            assert_eq!(v.len(), op.result_len(values.len()), "{}", op.name());
        }
    }

    #[test]
    fn update_op_refreshes_only_target_slot() {
        let keys = vec![1, 2, 3];
        let out = ArrayOp::Update { index: 1 }.apply(&keys, || 9);
        assert_eq!(out, vec![1, 9, 3]);
    }

    #[test]
    fn map_index_tracks_moves() {
        let op = ArrayOp::Move { from: 0, to: 2 };
        assert_eq!(op.map_index(0, 3), Some(2));
        assert_eq!(op.map_index(1, 3), Some(0));
        assert_eq!(op.map_index(2, 3), Some(1));

        let op = ArrayOp::Remove {
            indices: Some(vec![1, 1]),
        };
        assert_eq!(op.map_index(0, 3), Some(0));
        assert_eq!(op.map_index(1, 3), None);
        assert_eq!(op.map_index(2, 3), Some(1));

        let op = ArrayOp::Insert { index: 1, count: 2 };
        assert_eq!(op.map_index(0, 2), Some(0));
        assert_eq!(op.map_index(1, 2), Some(3));
    }
}
