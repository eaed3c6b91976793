//! Validation for drag-and-drop reordering of list items.
//!
//! Dashboards send the full new order of a list (categories, course chapters,
//! chapter sections, product images) as `{id, position}` pairs. Before the
//! positions are written the list must be internally consistent and must
//! cover exactly the children of the parent being reordered.

use std::collections::HashSet;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// A single `{id, position}` pair from a reorder request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate<Id> {
    /// Item being moved.
    pub id: Id,
    /// New zero-based position.
    pub position: i32,
}

/// Errors that can occur when validating a reorder request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReorderError {
    /// The request contains no items.
    #[error("reorder list cannot be empty")]
    Empty,
    /// An id appears more than once.
    #[error("item {0} appears more than once")]
    DuplicateId(String),
    /// Two items claim the same position.
    #[error("position {0} is used more than once")]
    DuplicatePosition(i32),
    /// A position is negative.
    #[error("position {0} is negative")]
    NegativePosition(i32),
    /// The list does not match the parent's current children.
    #[error("reorder list must contain exactly the current items ({expected} expected, {actual} given)")]
    MemberMismatch {
        /// Number of children the parent currently has.
        expected: usize,
        /// Number of ids in the request.
        actual: usize,
    },
}

/// Validate a reorder request and return it sorted by position.
///
/// # Errors
///
/// Returns a [`ReorderError`] if the list is empty or contains a duplicate
/// id, a duplicate position or a negative position.
pub fn validate_reorder<Id>(
    updates: &[PositionUpdate<Id>],
) -> Result<Vec<PositionUpdate<Id>>, ReorderError>
where
    Id: Copy + Eq + Hash + std::fmt::Display,
{
    if updates.is_empty() {
        return Err(ReorderError::Empty);
    }

    let mut ids = HashSet::with_capacity(updates.len());
    let mut positions = HashSet::with_capacity(updates.len());

    for update in updates {
        if update.position < 0 {
            return Err(ReorderError::NegativePosition(update.position));
        }
        if !ids.insert(update.id) {
            return Err(ReorderError::DuplicateId(update.id.to_string()));
        }
        if !positions.insert(update.position) {
            return Err(ReorderError::DuplicatePosition(update.position));
        }
    }

    let mut sorted = updates.to_vec();
    sorted.sort_by_key(|u| u.position);
    Ok(sorted)
}

/// Check that a validated reorder list names exactly `current` children.
///
/// # Errors
///
/// Returns [`ReorderError::MemberMismatch`] if an id is missing or foreign.
pub fn ensure_same_members<Id>(
    updates: &[PositionUpdate<Id>],
    current: &[Id],
) -> Result<(), ReorderError>
where
    Id: Copy + Eq + Hash,
{
    let current: HashSet<Id> = current.iter().copied().collect();
    let requested: HashSet<Id> = updates.iter().map(|u| u.id).collect();

    if current == requested {
        Ok(())
    } else {
        Err(ReorderError::MemberMismatch {
            expected: current.len(),
            actual: updates.len(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::CategoryId;

    fn update(id: i32, position: i32) -> PositionUpdate<CategoryId> {
        PositionUpdate {
            id: CategoryId::new(id),
            position,
        }
    }

    #[test]
    fn test_validate_sorts_by_position() {
        let sorted = validate_reorder(&[update(3, 2), update(1, 0), update(2, 1)]).unwrap();
        let ids: Vec<i32> = sorted.iter().map(|u| u.id.as_i32()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_validate_allows_gaps() {
        assert!(validate_reorder(&[update(1, 10), update(2, 20)]).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_lists() {
        assert_eq!(
            validate_reorder::<CategoryId>(&[]),
            Err(ReorderError::Empty)
        );
        assert_eq!(
            validate_reorder(&[update(1, 0), update(1, 1)]),
            Err(ReorderError::DuplicateId("1".to_string()))
        );
        assert_eq!(
            validate_reorder(&[update(1, 0), update(2, 0)]),
            Err(ReorderError::DuplicatePosition(0))
        );
        assert_eq!(
            validate_reorder(&[update(1, -1)]),
            Err(ReorderError::NegativePosition(-1))
        );
    }

    #[test]
    fn test_same_members() {
        let current = [CategoryId::new(1), CategoryId::new(2)];
        assert!(ensure_same_members(&[update(2, 0), update(1, 1)], &current).is_ok());
        assert_eq!(
            ensure_same_members(&[update(1, 0)], &current),
            Err(ReorderError::MemberMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert!(ensure_same_members(&[update(1, 0), update(9, 1)], &current).is_err());
    }
}
