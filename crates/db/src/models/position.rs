//! Dense, zero-based ordering of children inside a container.
//!
//! A board orders its columns and a column orders its tasks. Positions in a
//! container are always `0..len` with no repeats. Moves are expressed as a
//! [`Shift`] of the siblings plus one direct assignment of the moved row; a
//! shift range never contains the moved row, so the two never collide.

use sea_orm::{ColumnTrait, Condition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionRange {
    /// `lo..=hi`
    Between { lo: i32, hi: i32 },
    /// `lo..`
    From { lo: i32 },
}

impl PositionRange {
    pub fn contains(&self, position: i32) -> bool {
        match *self {
            PositionRange::Between { lo, hi } => lo <= position && position <= hi,
            PositionRange::From { lo } => lo <= position,
        }
    }
}

/// Add `delta` to every sibling whose position is in `range`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    pub range: PositionRange,
    pub delta: i32,
}

impl Shift {
    pub fn condition<C: ColumnTrait>(&self, position: C) -> Condition {
        match self.range {
            PositionRange::Between { lo, hi } => Condition::all()
                .add(position.gte(lo))
                .add(position.lte(hi)),
            PositionRange::From { lo } => Condition::all().add(position.gte(lo)),
        }
    }

    pub fn apply(&self, position: i32) -> i32 {
        if self.range.contains(position) {
            position + self.delta
        } else {
            position
        }
    }
}

/// Shift for moving an entity from `old` to `new` inside one container.
pub fn plan_reorder(old: i32, new: i32) -> Option<Shift> {
    if new > old {
        Some(Shift {
            range: PositionRange::Between { lo: old + 1, hi: new },
            delta: -1,
        })
    } else if new < old {
        Some(Shift {
            range: PositionRange::Between { lo: new, hi: old - 1 },
            delta: 1,
        })
    } else {
        None
    }
}

/// Closes the gap an entity leaves at `old`.
pub fn plan_removal(old: i32) -> Shift {
    Shift {
        range: PositionRange::From { lo: old + 1 },
        delta: -1,
    }
}

/// Opens a slot at `new`.
pub fn plan_insertion(new: i32) -> Shift {
    Shift {
        range: PositionRange::From { lo: new },
        delta: 1,
    }
}

pub fn clamp_position(requested: i32, max: i32) -> i32 {
    requested.clamp(0, max.max(0))
}

/// Position a new child gets when appended: `0` when empty, else one past
/// the highest existing position.
pub fn next_after(max_position: Option<i32>) -> i32 {
    max_position.map_or(0, |max| max + 1)
}

/// True when `positions` is exactly `0..positions.len()` in some order.
pub fn is_dense(positions: &[i32]) -> bool {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .enumerate()
        .all(|(index, position)| *position as usize == index && *position >= 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reorder(positions: &[i32], old: i32, new: i32) -> Vec<i32> {
        let shift = plan_reorder(old, new);
        positions
            .iter()
            .map(|&p| {
                if p == old {
                    new
                } else {
                    shift.map_or(p, |s| s.apply(p))
                }
            })
            .collect()
    }

    #[test]
    fn moving_later_pulls_range_down() {
        let shift = plan_reorder(0, 2).unwrap();
        assert_eq!(shift.range, PositionRange::Between { lo: 1, hi: 2 });
        assert_eq!(shift.delta, -1);
        assert_eq!(reorder(&[0, 1, 2], 0, 2), vec![2, 0, 1]);
    }

    #[test]
    fn moving_earlier_pushes_range_up() {
        let shift = plan_reorder(2, 0).unwrap();
        assert_eq!(shift.range, PositionRange::Between { lo: 0, hi: 1 });
        assert_eq!(shift.delta, 1);
        assert_eq!(reorder(&[0, 1, 2], 2, 0), vec![1, 2, 0]);
    }

    #[test]
    fn same_position_needs_no_shift() {
        assert_eq!(plan_reorder(1, 1), None);
    }

    #[test]
    fn every_reorder_stays_dense() {
        let positions: Vec<i32> = (0..6).collect();
        for old in 0..6 {
            for new in 0..6 {
                let moved = reorder(&positions, old, new);
                assert!(is_dense(&moved), "{old} -> {new}: {moved:?}");
                assert_eq!(moved[old as usize], new);
            }
        }
    }

    #[test]
    fn removal_and_insertion_keep_both_sides_dense() {
        let source = [0, 1, 2, 3];
        let removal = plan_removal(1);
        let remaining: Vec<i32> = source
            .iter()
            .filter(|&&p| p != 1)
            .map(|&p| removal.apply(p))
            .collect();
        assert_eq!(remaining, vec![0, 1, 2]);

        let target = [0, 1];
        let insertion = plan_insertion(1);
        let mut grown: Vec<i32> = target.iter().map(|&p| insertion.apply(p)).collect();
        grown.push(1);
        assert!(is_dense(&grown));
    }

    #[test]
    fn insertion_at_end_touches_nothing() {
        let insertion = plan_insertion(2);
        assert_eq!([0, 1].map(|p| insertion.apply(p)), [0, 1]);
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp_position(-3, 4), 0);
        assert_eq!(clamp_position(9, 4), 4);
        assert_eq!(clamp_position(2, 4), 2);
        assert_eq!(clamp_position(5, -1), 0);
    }

    #[test]
    fn next_after_empty_is_zero() {
        assert_eq!(next_after(None), 0);
        assert_eq!(next_after(Some(4)), 5);
    }

    #[test]
    fn density_check() {
        assert!(is_dense(&[]));
        assert!(is_dense(&[2, 0, 1]));
        assert!(!is_dense(&[0, 2]));
        assert!(!is_dense(&[0, 0, 1]));
    }
}
