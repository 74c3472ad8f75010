//! Materialising the effective list of a delta example.

use std::collections::HashMap;

use apiflow_types::id::ExampleId;
use apiflow_types::overlay::{
    AssertFields, AssertPatch, Classification, KeyValueFields, KeyValuePatch, MovePosition,
    OrderRow, OverlayItem, RefKind, StateRow,
};
use uuid::Uuid;

use super::rank::{self, RankError};
use super::OverlayError;

/// Field set of one overlayed row kind.
pub trait OverlayFields: Clone + Send + Sync + 'static {
    /// Partial override stored in the state table.
    type Patch: Clone + Default + Send + Sync + 'static;

    /// `self` with every `Some` field of `patch` applied.
    fn apply(&self, patch: &Self::Patch) -> Self;

    /// Whether `patch` overrides anything.
    fn has_overrides(patch: &Self::Patch) -> bool;

    /// `base` updated with every `Some` field of `update`.
    fn merge_patch(base: &Self::Patch, update: &Self::Patch) -> Self::Patch;
}

impl OverlayFields for KeyValueFields {
    type Patch = KeyValuePatch;

    fn apply(&self, patch: &KeyValuePatch) -> Self {
        Self {
            key: patch.key.clone().unwrap_or_else(|| self.key.clone()),
            value: patch.value.clone().unwrap_or_else(|| self.value.clone()),
            description: patch
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            enabled: patch.enabled.unwrap_or(self.enabled),
        }
    }

    fn has_overrides(patch: &KeyValuePatch) -> bool {
        patch.key.is_some()
            || patch.value.is_some()
            || patch.description.is_some()
            || patch.enabled.is_some()
    }

    fn merge_patch(base: &KeyValuePatch, update: &KeyValuePatch) -> KeyValuePatch {
        KeyValuePatch {
            key: update.key.clone().or_else(|| base.key.clone()),
            value: update.value.clone().or_else(|| base.value.clone()),
            description: update.description.clone().or_else(|| base.description.clone()),
            enabled: update.enabled.or(base.enabled),
        }
    }
}

impl OverlayFields for AssertFields {
    type Patch = AssertPatch;

    fn apply(&self, patch: &AssertPatch) -> Self {
        Self {
            condition: patch
                .condition
                .clone()
                .unwrap_or_else(|| self.condition.clone()),
            enabled: patch.enabled.unwrap_or(self.enabled),
        }
    }

    fn has_overrides(patch: &AssertPatch) -> bool {
        patch.condition.is_some() || patch.enabled.is_some()
    }

    fn merge_patch(base: &AssertPatch, update: &AssertPatch) -> AssertPatch {
        AssertPatch {
            condition: update.condition.clone().or_else(|| base.condition.clone()),
            enabled: update.enabled.or(base.enabled),
        }
    }
}

/// Order rows sorted the canonical way: rank, then revision.
pub fn sort_order(rows: &mut [OrderRow]) {
    rows.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.revision.cmp(&b.revision)));
}

/// Classify and merge rows into the effective list.
///
/// Order rows whose referent is gone (deleted delta row, deleted parent
/// row) and suppressed origin rows are skipped.
pub fn resolve<F: OverlayFields>(
    order: &[OrderRow],
    origins: &HashMap<Uuid, F>,
    deltas: &HashMap<Uuid, F>,
    states: &HashMap<Uuid, StateRow<F::Patch>>,
) -> Vec<OverlayItem<F>> {
    let mut sorted = order.to_vec();
    sort_order(&mut sorted);

    let mut items = Vec::with_capacity(sorted.len());
    for row in &sorted {
        match row.ref_kind {
            RefKind::Delta => {
                let Some(fields) = deltas.get(&row.ref_id) else {
                    continue;
                };
                items.push(OverlayItem {
                    item_id: row.ref_id,
                    origin_id: None,
                    origin: None,
                    fields: fields.clone(),
                    classification: Classification::Delta,
                });
            }
            RefKind::Origin => {
                let Some(origin) = origins.get(&row.ref_id) else {
                    continue;
                };
                let state = states.get(&row.ref_id);
                if state.is_some_and(|s| s.suppressed) {
                    continue;
                }
                let (fields, classification) = match state {
                    Some(s) if F::has_overrides(&s.patch) => {
                        (origin.apply(&s.patch), Classification::Mixed)
                    }
                    _ => (origin.clone(), Classification::Origin),
                };
                items.push(OverlayItem {
                    item_id: row.ref_id,
                    origin_id: Some(row.ref_id),
                    origin: Some(origin.clone()),
                    fields,
                    classification,
                });
            }
        }
    }
    items
}

/// Order rows for a freshly seeded delta example, one per parent row in
/// parent order.
pub fn seed_rows(example_id: ExampleId, parent_ids: &[Uuid]) -> Vec<OrderRow> {
    rank::spread(parent_ids.len())
        .into_iter()
        .zip(parent_ids)
        .map(|(rank, id)| OrderRow {
            example_id,
            ref_kind: RefKind::Origin,
            ref_id: *id,
            rank,
            revision: 0,
        })
        .collect()
}

/// Parent rows added after seeding, in parent order.
pub fn unreferenced_origins(order: &[OrderRow], parent_ids: &[Uuid]) -> Vec<Uuid> {
    parent_ids
        .iter()
        .filter(|id| {
            !order
                .iter()
                .any(|r| r.ref_kind == RefKind::Origin && r.ref_id == **id)
        })
        .copied()
        .collect()
}

/// Highest revision in the list; the next write uses this plus one.
pub fn max_revision(order: &[OrderRow]) -> i64 {
    order.iter().map(|r| r.revision).max().unwrap_or(0)
}

/// Rank for a row appended after every existing row.
pub fn append_rank(order: &[OrderRow]) -> Result<String, RankError> {
    let last = order.iter().map(|r| r.rank.as_str()).max();
    rank::between(last, None)
}

/// How to apply a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovePlan {
    /// Update the moved row only.
    Single { ref_id: Uuid, rank: String, revision: i64 },
    /// Renumber every row (neighbour ranks collided or ran out of precision).
    Rebalance { ranks: Vec<(Uuid, String)>, revision: i64 },
}

/// Compute the new rank of `item` placed before or after `target`.
pub fn plan_move(
    order: &[OrderRow],
    item: Uuid,
    target: Uuid,
    position: MovePosition,
) -> Result<MovePlan, OverlayError> {
    if item == target {
        return Err(OverlayError::InvalidMove("an item cannot move relative to itself".into()));
    }
    let mut sorted = order.to_vec();
    sort_order(&mut sorted);

    if !sorted.iter().any(|r| r.ref_id == item) {
        return Err(OverlayError::ItemNotFound(item));
    }
    let without: Vec<&OrderRow> = sorted.iter().filter(|r| r.ref_id != item).collect();
    let at = without
        .iter()
        .position(|r| r.ref_id == target)
        .ok_or(OverlayError::TargetNotFound(target))?;

    let (low, high) = match position {
        MovePosition::Before => (at.checked_sub(1).map(|i| without[i]), Some(without[at])),
        MovePosition::After => (Some(without[at]), without.get(at + 1).copied()),
    };
    let revision = max_revision(order) + 1;

    match rank::between(low.map(|r| r.rank.as_str()), high.map(|r| r.rank.as_str())) {
        Ok(rank) => Ok(MovePlan::Single {
            ref_id: item,
            rank,
            revision,
        }),
        Err(e) => {
            tracing::warn!(item = %item, error = %e, "overlay ranks need rebalancing");
            let mut ids: Vec<Uuid> = without.iter().map(|r| r.ref_id).collect();
            let insert_at = match position {
                MovePosition::Before => at,
                MovePosition::After => at + 1,
            };
            ids.insert(insert_at, item);
            Ok(MovePlan::Rebalance {
                ranks: ids.into_iter().zip(rank::spread(sorted.len())).collect(),
                revision,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(key: &str, value: &str) -> KeyValueFields {
        KeyValueFields {
            key: key.into(),
            value: value.into(),
            description: String::new(),
            enabled: true,
        }
    }

    struct Fixture {
        example: ExampleId,
        order: Vec<OrderRow>,
        origins: HashMap<Uuid, KeyValueFields>,
        deltas: HashMap<Uuid, KeyValueFields>,
        states: HashMap<Uuid, StateRow<KeyValuePatch>>,
        a: Uuid,
        b: Uuid,
    }

    fn seeded() -> Fixture {
        let example = ExampleId::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let origins = HashMap::from([(a, kv("A", "va")), (b, kv("B", "vb"))]);
        Fixture {
            example,
            order: seed_rows(example, &[a, b]),
            origins,
            deltas: HashMap::new(),
            states: HashMap::new(),
            a,
            b,
        }
    }

    impl Fixture {
        fn list(&self) -> Vec<OverlayItem<KeyValueFields>> {
            resolve(&self.order, &self.origins, &self.deltas, &self.states)
        }

        fn keys(&self) -> Vec<String> {
            self.list().into_iter().map(|i| i.fields.key).collect()
        }

        fn add_delta(&mut self, key: &str) -> Uuid {
            let id = Uuid::now_v7();
            self.deltas.insert(id, kv(key, ""));
            let rank = append_rank(&self.order).unwrap();
            self.order.push(OrderRow {
                example_id: self.example,
                ref_kind: RefKind::Delta,
                ref_id: id,
                rank,
                revision: max_revision(&self.order) + 1,
            });
            id
        }

        fn apply_move(&mut self, item: Uuid, target: Uuid, pos: MovePosition) {
            match plan_move(&self.order, item, target, pos).unwrap() {
                MovePlan::Single { ref_id, rank, revision } => {
                    let row = self.order.iter_mut().find(|r| r.ref_id == ref_id).unwrap();
                    row.rank = rank;
                    row.revision = revision;
                }
                MovePlan::Rebalance { ranks, revision } => {
                    for (id, rank) in ranks {
                        let row = self.order.iter_mut().find(|r| r.ref_id == id).unwrap();
                        row.rank = rank;
                        row.revision = revision;
                    }
                }
            }
        }
    }

    #[test]
    fn overlay_order_scenario() {
        let mut f = seeded();
        let c = f.add_delta("C");
        assert_eq!(f.keys(), ["A", "B", "C"]);

        let (a, b) = (f.a, f.b);
        f.apply_move(a, b, MovePosition::After);
        assert_eq!(f.keys(), ["B", "A", "C"]);

        f.apply_move(c, b, MovePosition::Before);
        assert_eq!(f.keys(), ["C", "B", "A"]);
    }

    #[test]
    fn overlay_classification_scenario() {
        let mut f = seeded();
        let a = f.a;
        f.states.insert(
            a,
            StateRow {
                example_id: f.example,
                origin_id: a,
                suppressed: false,
                patch: KeyValuePatch {
                    value: Some("VA".into()),
                    ..Default::default()
                },
            },
        );
        let first = &f.list()[0];
        assert_eq!(first.classification, Classification::Mixed);
        assert_eq!(first.fields.value, "VA");
        assert_eq!(first.origin.as_ref().unwrap().value, "va");

        // reset clears overrides but keeps the state row
        f.states.get_mut(&a).unwrap().patch = KeyValuePatch::default();
        let first = &f.list()[0];
        assert_eq!(first.classification, Classification::Origin);
        assert_eq!(first.fields.value, "va");

        f.states.get_mut(&a).unwrap().suppressed = true;
        assert_eq!(f.keys(), ["B"]);
    }

    #[test]
    fn effective_length_counts_parent_plus_delta_minus_suppressed() {
        let mut f = seeded();
        f.add_delta("C");
        f.add_delta("D");
        let b = f.b;
        f.states.insert(
            b,
            StateRow {
                example_id: f.example,
                origin_id: b,
                suppressed: true,
                patch: KeyValuePatch::default(),
            },
        );
        assert_eq!(f.list().len(), 2 + 2 - 1);
    }

    #[test]
    fn unsuppressing_restores_original_position() {
        let mut f = seeded();
        let a = f.a;
        f.states.insert(
            a,
            StateRow {
                example_id: f.example,
                origin_id: a,
                suppressed: true,
                patch: KeyValuePatch::default(),
            },
        );
        assert_eq!(f.keys(), ["B"]);
        f.states.get_mut(&a).unwrap().suppressed = false;
        assert_eq!(f.keys(), ["A", "B"]);
    }

    #[test]
    fn overrides_survive_parent_reorder() {
        let mut f = seeded();
        let a = f.a;
        f.states.insert(
            a,
            StateRow {
                example_id: f.example,
                origin_id: a,
                suppressed: false,
                patch: KeyValuePatch {
                    key: Some("Renamed".into()),
                    ..Default::default()
                },
            },
        );
        // Parent order changes do not touch the delta's order or state rows.
        f.origins.insert(a, kv("A", "changed upstream"));
        let item = f.list().into_iter().find(|i| i.item_id == a).unwrap();
        assert_eq!(item.fields.key, "Renamed");
        assert_eq!(item.fields.value, "changed upstream");
    }

    #[test]
    fn missing_referents_are_skipped() {
        let mut f = seeded();
        let a = f.a;
        f.origins.remove(&a);
        let c = f.add_delta("C");
        f.deltas.remove(&c);
        assert_eq!(f.keys(), ["B"]);
    }

    #[test]
    fn seeding_on_empty_parent_yields_empty_order() {
        assert!(seed_rows(ExampleId::new(), &[]).is_empty());
    }

    #[test]
    fn seeding_is_deterministic() {
        let example = ExampleId::new();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::now_v7()).collect();
        assert_eq!(seed_rows(example, &ids), seed_rows(example, &ids));
    }

    #[test]
    fn new_parent_rows_are_detected() {
        let f = seeded();
        let late = Uuid::now_v7();
        assert_eq!(unreferenced_origins(&f.order, &[f.a, f.b, late]), vec![late]);
    }

    #[test]
    fn colliding_ranks_trigger_rebalance() {
        let mut f = seeded();
        let c = f.add_delta("C");
        for row in &mut f.order {
            row.rank = "i".into();
        }
        let (a, b) = (f.a, f.b);
        match plan_move(&f.order, c, b, MovePosition::After).unwrap() {
            MovePlan::Rebalance { ranks, .. } => {
                let ids: Vec<Uuid> = ranks.iter().map(|(id, _)| *id).collect();
                assert_eq!(ids.len(), 3);
                assert_eq!(ids.last(), Some(&c));
                assert!(ids.contains(&a));
            }
            other => panic!("expected rebalance, got {other:?}"),
        }
    }

    #[test]
    fn moving_unknown_items_fails() {
        let f = seeded();
        let stranger = Uuid::now_v7();
        assert!(matches!(
            plan_move(&f.order, stranger, f.a, MovePosition::After),
            Err(OverlayError::ItemNotFound(_))
        ));
        assert!(matches!(
            plan_move(&f.order, f.a, stranger, MovePosition::After),
            Err(OverlayError::TargetNotFound(_))
        ));
    }
}
