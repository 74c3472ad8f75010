//! Doubly-linked list algorithms over stored rows.
//!
//! Rows only know their own `prev`/`next`. These functions walk a scope's
//! rows into display order, check the list invariants, and compute the
//! minimal set of pointer rewrites that turns one order into another. The
//! storage layer applies the rewrites inside a write transaction.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use apiflow_types::collection::{Assertion, CollectionItem, Example, KeyValue};
use apiflow_types::overlay::MovePosition;

/// A row that participates in a doubly-linked list.
pub trait Linked {
    type Id: Copy + Eq + Hash + Debug;

    fn link_id(&self) -> Self::Id;
    fn prev(&self) -> Option<Self::Id>;
    fn next(&self) -> Option<Self::Id>;
}

/// Bare pointer triple, as read back from a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Links<Id> {
    pub id: Id,
    pub prev: Option<Id>,
    pub next: Option<Id>,
}

impl<Id: Copy + Eq + Hash + Debug> Linked for Links<Id> {
    type Id = Id;

    fn link_id(&self) -> Id {
        self.id
    }

    fn prev(&self) -> Option<Id> {
        self.prev
    }

    fn next(&self) -> Option<Id> {
        self.next
    }
}

macro_rules! impl_linked {
    ($ty:ty, $id:ty) => {
        impl Linked for $ty {
            type Id = $id;

            fn link_id(&self) -> $id {
                self.id
            }

            fn prev(&self) -> Option<$id> {
                self.prev
            }

            fn next(&self) -> Option<$id> {
                self.next
            }
        }
    };
}

impl_linked!(KeyValue, apiflow_types::id::FieldId);
impl_linked!(Assertion, apiflow_types::id::AssertId);
impl_linked!(CollectionItem, apiflow_types::id::CollectionItemId);
impl_linked!(Example, apiflow_types::id::ExampleId);

/// A violation of the list invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListDefect<Id> {
    NoHead,
    MultipleHeads(Vec<Id>),
    NoTail,
    MultipleTails(Vec<Id>),
    /// `from.next` points at `to` but `to.prev` does not point back.
    BrokenLink { from: Id, to: Id },
    /// A pointer names a row outside the scope.
    Dangling { from: Id, missing: Id },
    /// The walk revisited `at`.
    Cycle { at: Id },
    /// Rows never reached from the head.
    Unreached(Vec<Id>),
}

/// Result of walking a scope from its head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Walk<Id> {
    /// Rows in list order, starting at the head.
    pub ordered: Vec<Id>,
    /// Rows the walk could not reach, in input order.
    pub unreached: Vec<Id>,
    /// Set when the walk stopped on a revisited row.
    pub cycle_at: Option<Id>,
}

impl<Id: Copy> Walk<Id> {
    /// Reached rows followed by unreached ones. Always contains every row.
    pub fn all(&self) -> Vec<Id> {
        let mut out = self.ordered.clone();
        out.extend(self.unreached.iter().copied());
        out
    }

    pub fn is_clean(&self) -> bool {
        self.unreached.is_empty() && self.cycle_at.is_none()
    }
}

/// Walk rows from the head following `next`.
///
/// Terminates on corrupted pointers: a revisited row stops the walk, a
/// dangling `next` ends it, and anything not reached is reported in
/// `unreached` so callers can still surface every row.
pub fn walk<T: Linked>(rows: &[T]) -> Walk<T::Id> {
    let by_id: HashMap<T::Id, &T> = rows.iter().map(|r| (r.link_id(), r)).collect();
    let head = rows
        .iter()
        .find(|r| r.prev().is_none_or(|p| !by_id.contains_key(&p)))
        .or_else(|| rows.first());

    let mut ordered = Vec::with_capacity(rows.len());
    let mut seen = HashSet::with_capacity(rows.len());
    let mut cycle_at = None;

    let mut cursor = head.map(|h| h.link_id());
    while let Some(id) = cursor {
        if !seen.insert(id) {
            cycle_at = Some(id);
            break;
        }
        ordered.push(id);
        cursor = by_id.get(&id).and_then(|r| r.next()).filter(|n| by_id.contains_key(n));
    }

    let unreached = rows
        .iter()
        .map(|r| r.link_id())
        .filter(|id| !seen.contains(id))
        .collect();

    Walk {
        ordered,
        unreached,
        cycle_at,
    }
}

/// Return `rows` sorted into list order. Rows the walk could not reach are
/// appended at the end, with a warning.
pub fn sort_linked<T: Linked>(rows: Vec<T>) -> Vec<T> {
    let walked = walk(&rows);
    if !walked.is_clean() {
        tracing::warn!(
            unreached = walked.unreached.len(),
            cycle = walked.cycle_at.is_some(),
            "linked list is corrupted; surfacing remaining rows at the end"
        );
    }
    let mut slots: HashMap<T::Id, T> = rows.into_iter().map(|r| (r.link_id(), r)).collect();
    walked
        .all()
        .into_iter()
        .filter_map(|id| slots.remove(&id))
        .collect()
}

/// Check every list invariant: one head, one tail, symmetric pointers, no
/// cycles, every row reachable.
pub fn check_well_formed<T: Linked>(rows: &[T]) -> Result<(), Vec<ListDefect<T::Id>>> {
    if rows.is_empty() {
        return Ok(());
    }

    let by_id: HashMap<T::Id, &T> = rows.iter().map(|r| (r.link_id(), r)).collect();
    let mut defects = Vec::new();

    let heads: Vec<_> = rows.iter().filter(|r| r.prev().is_none()).map(|r| r.link_id()).collect();
    let tails: Vec<_> = rows.iter().filter(|r| r.next().is_none()).map(|r| r.link_id()).collect();
    match heads.len() {
        0 => defects.push(ListDefect::NoHead),
        1 => {}
        _ => defects.push(ListDefect::MultipleHeads(heads)),
    }
    match tails.len() {
        0 => defects.push(ListDefect::NoTail),
        1 => {}
        _ => defects.push(ListDefect::MultipleTails(tails)),
    }

    for row in rows {
        let id = row.link_id();
        if let Some(next) = row.next() {
            match by_id.get(&next) {
                None => defects.push(ListDefect::Dangling { from: id, missing: next }),
                Some(n) if n.prev() != Some(id) => {
                    defects.push(ListDefect::BrokenLink { from: id, to: next })
                }
                Some(_) => {}
            }
        }
        if let Some(prev) = row.prev() {
            match by_id.get(&prev) {
                None => defects.push(ListDefect::Dangling { from: id, missing: prev }),
                Some(p) if p.next() != Some(id) => {
                    defects.push(ListDefect::BrokenLink { from: prev, to: id })
                }
                Some(_) => {}
            }
        }
    }

    let walked = walk(rows);
    if let Some(at) = walked.cycle_at {
        defects.push(ListDefect::Cycle { at });
    }
    if !walked.unreached.is_empty() {
        defects.push(ListDefect::Unreached(walked.unreached));
    }

    if defects.is_empty() {
        Ok(())
    } else {
        Err(defects)
    }
}

/// New pointer values for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerUpdate<Id> {
    pub id: Id,
    pub prev: Option<Id>,
    pub next: Option<Id>,
}

/// Pointer rewrites that turn the current links into `target` order.
///
/// Only rows whose `prev` or `next` actually change are returned, so an
/// append touches two rows and a move touches at most five.
pub fn relink_plan<T: Linked>(current: &[T], target: &[T::Id]) -> Vec<PointerUpdate<T::Id>> {
    let existing: HashMap<T::Id, (Option<T::Id>, Option<T::Id>)> = current
        .iter()
        .map(|r| (r.link_id(), (r.prev(), r.next())))
        .collect();

    let mut updates = Vec::new();
    for (i, id) in target.iter().enumerate() {
        let prev = if i == 0 { None } else { Some(target[i - 1]) };
        let next = target.get(i + 1).copied();
        if existing.get(id) != Some(&(prev, next)) {
            updates.push(PointerUpdate {
                id: *id,
                prev,
                next,
            });
        }
    }
    updates
}

/// Errors computing a new order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReorderError {
    #[error("item is not in this list")]
    UnknownItem,
    #[error("move target is not in this list")]
    UnknownTarget,
    #[error("an item cannot be moved relative to itself")]
    SelfTarget,
}

/// `order` with `item` detached and re-attached next to `target`.
pub fn moved_order<Id: Copy + Eq>(
    order: &[Id],
    item: Id,
    target: Id,
    position: MovePosition,
) -> Result<Vec<Id>, ReorderError> {
    if item == target {
        return Err(ReorderError::SelfTarget);
    }
    if !order.contains(&item) {
        return Err(ReorderError::UnknownItem);
    }
    let mut out: Vec<Id> = order.iter().copied().filter(|id| *id != item).collect();
    let at = out
        .iter()
        .position(|id| *id == target)
        .ok_or(ReorderError::UnknownTarget)?;
    let insert_at = match position {
        MovePosition::Before => at,
        MovePosition::After => at + 1,
    };
    out.insert(insert_at, item);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    type L = Links<u32>;

    fn chain(ids: &[u32]) -> Vec<L> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Links {
                id: *id,
                prev: if i == 0 { None } else { Some(ids[i - 1]) },
                next: ids.get(i + 1).copied(),
            })
            .collect()
    }

    fn apply(rows: &mut [L], updates: &[PointerUpdate<u32>]) {
        for u in updates {
            if let Some(r) = rows.iter_mut().find(|r| r.id == u.id) {
                r.prev = u.prev;
                r.next = u.next;
            }
        }
    }

    fn reorder(ids: &[u32], item: u32, target: u32, pos: MovePosition) -> (Vec<u32>, usize) {
        let mut rows = chain(ids);
        let order = walk(&rows).ordered;
        let target_order = moved_order(&order, item, target, pos).unwrap();
        let plan = relink_plan(&rows, &target_order);
        apply(&mut rows, &plan);
        assert!(check_well_formed(&rows).is_ok());
        (walk(&rows).ordered, plan.len())
    }

    #[test]
    fn walk_follows_pointers_not_input_order() {
        let mut rows = chain(&[1, 2, 3]);
        rows.reverse();
        assert_eq!(walk(&rows).ordered, vec![1, 2, 3]);
    }

    #[test]
    fn append_to_empty_list() {
        let mut rows: Vec<L> = Vec::new();
        rows.push(Links { id: 1, prev: None, next: None });
        let plan = relink_plan(&rows, &[1]);
        assert!(plan.is_empty());
        assert!(check_well_formed(&rows).is_ok());
    }

    #[test]
    fn append_to_tail_touches_two_rows() {
        let mut rows = chain(&[1, 2]);
        rows.push(Links { id: 3, prev: None, next: None });
        let plan = relink_plan(&rows, &[1, 2, 3]);
        assert_eq!(plan.len(), 2);
        apply(&mut rows, &plan);
        assert_eq!(walk(&rows).ordered, vec![1, 2, 3]);
        assert!(check_well_formed(&rows).is_ok());
    }

    #[test]
    fn move_to_head() {
        let (order, _) = reorder(&[1, 2, 3, 4], 3, 1, MovePosition::Before);
        assert_eq!(order, vec![3, 1, 2, 4]);
    }

    #[test]
    fn move_to_tail() {
        let (order, _) = reorder(&[1, 2, 3, 4], 1, 4, MovePosition::After);
        assert_eq!(order, vec![2, 3, 4, 1]);
    }

    #[test]
    fn move_adjacent_swaps_neighbours() {
        let (order, touched) = reorder(&[1, 2, 3, 4], 2, 3, MovePosition::After);
        assert_eq!(order, vec![1, 3, 2, 4]);
        assert!(touched <= 4);
    }

    #[test]
    fn move_onto_itself_is_rejected() {
        assert_eq!(
            moved_order(&[1, 2], 1, 1, MovePosition::After),
            Err(ReorderError::SelfTarget)
        );
        assert_eq!(
            moved_order(&[1, 2], 1, 9, MovePosition::After),
            Err(ReorderError::UnknownTarget)
        );
    }

    #[test]
    fn delete_head_tail_and_only() {
        for (ids, removed, expected) in [
            (vec![1, 2, 3], 1, vec![2, 3]),
            (vec![1, 2, 3], 3, vec![1, 2]),
            (vec![1], 1, vec![]),
        ] {
            let mut rows = chain(&ids);
            let remaining: Vec<u32> = ids.iter().copied().filter(|i| *i != removed).collect();
            rows.retain(|r| r.id != removed);
            let plan = relink_plan(&rows, &remaining);
            apply(&mut rows, &plan);
            assert_eq!(walk(&rows).ordered, expected);
            assert!(check_well_formed(&rows).is_ok());
        }
    }

    #[test]
    fn cycle_terminates_and_surfaces_remaining_rows() {
        // 1 -> 2 -> 3 -> 2 (cycle), 4 detached
        let rows = vec![
            Links { id: 1, prev: None, next: Some(2) },
            Links { id: 2, prev: Some(1), next: Some(3) },
            Links { id: 3, prev: Some(2), next: Some(2) },
            Links { id: 4, prev: Some(3), next: None },
        ];
        let walked = walk(&rows);
        assert_eq!(walked.ordered, vec![1, 2, 3]);
        assert_eq!(walked.cycle_at, Some(2));
        assert_eq!(walked.unreached, vec![4]);
        assert_eq!(walked.all(), vec![1, 2, 3, 4]);

        let defects = check_well_formed(&rows).unwrap_err();
        assert!(defects.contains(&ListDefect::Cycle { at: 2 }));
    }

    #[test]
    fn fully_circular_list_still_terminates() {
        let rows = vec![
            Links { id: 1, prev: Some(2), next: Some(2) },
            Links { id: 2, prev: Some(1), next: Some(1) },
        ];
        let walked = walk(&rows);
        assert_eq!(walked.all().len(), 2);
        assert!(check_well_formed(&rows).is_err());
    }

    #[test]
    fn asymmetric_pointer_is_reported() {
        let rows = vec![
            Links { id: 1, prev: None, next: Some(2) },
            Links { id: 2, prev: None, next: None },
        ];
        let defects = check_well_formed(&rows).unwrap_err();
        assert!(defects.contains(&ListDefect::BrokenLink { from: 1, to: 2 }));
        assert!(defects.iter().any(|d| matches!(d, ListDefect::MultipleHeads(_))));
    }

    #[test]
    fn sort_linked_keeps_every_row() {
        let rows = vec![
            Links { id: 2, prev: Some(1), next: None },
            Links { id: 1, prev: None, next: Some(2) },
            Links { id: 9, prev: Some(42), next: None },
        ];
        let sorted: Vec<u32> = sort_linked(rows).into_iter().map(|r| r.id).collect();
        assert_eq!(sorted.len(), 3);
        assert_eq!(&sorted[..2], &[1, 2]);
    }
}
