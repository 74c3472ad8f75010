//! Export filtering.
//!
//! A filtered export keeps the selected flows and examples plus everything
//! they need to be imported and run on their own: the endpoints and
//! collections they live in, the folder chain above those endpoints, delta
//! parents, and the examples request nodes point at.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use apiflow_types::collection::{CollectionItem, Example, ItemRef};
use apiflow_types::flow::NodeConfig;
use apiflow_types::id::{CollectionId, EndpointId, ExampleId, FlowId, FolderId};
use apiflow_types::snapshot::{ExportFilter, WorkspaceSnapshot};

use crate::ordering::{Linked, sort_linked};

/// Keep rows matching `keep`, relinking each scope's survivors in their
/// original list order.
fn retain_linked<T, K>(
    rows: Vec<T>,
    scope: impl Fn(&T) -> K,
    keep: impl Fn(&T) -> bool,
    set_links: impl Fn(&mut T, Option<T::Id>, Option<T::Id>),
) -> Vec<T>
where
    T: Linked,
    K: Eq + Hash + Clone,
{
    let mut scopes: Vec<K> = Vec::new();
    let mut groups: HashMap<K, Vec<T>> = HashMap::new();
    for row in rows {
        let key = scope(&row);
        if !groups.contains_key(&key) {
            scopes.push(key.clone());
        }
        groups.entry(key).or_default().push(row);
    }

    let mut out = Vec::new();
    for key in scopes {
        let Some(group) = groups.remove(&key) else {
            continue;
        };
        let mut kept: Vec<T> = sort_linked(group).into_iter().filter(|r| keep(r)).collect();
        let ids: Vec<T::Id> = kept.iter().map(|r| r.link_id()).collect();
        for (i, row) in kept.iter_mut().enumerate() {
            let prev = if i == 0 { None } else { Some(ids[i - 1]) };
            set_links(row, prev, ids.get(i + 1).copied());
        }
        out.extend(kept);
    }
    out
}

/// Restrict `snapshot` to `filter` and its transitive dependencies.
/// An empty filter returns the snapshot unchanged.
pub fn filter_snapshot(mut s: WorkspaceSnapshot, filter: &ExportFilter) -> WorkspaceSnapshot {
    if filter.is_empty() {
        return s;
    }

    let flows: HashSet<FlowId> = filter.flow_ids.iter().copied().collect();
    let mut examples: HashSet<ExampleId> = filter.example_ids.iter().copied().collect();
    let mut endpoints: HashSet<EndpointId> = HashSet::new();
    // Request nodes without an example run the endpoint's default one.
    let mut default_of: HashSet<EndpointId> = HashSet::new();

    for node in s.nodes.iter().filter(|n| flows.contains(&n.flow_id)) {
        if let NodeConfig::Request {
            endpoint_id,
            example_id,
            delta_endpoint_id,
            delta_example_id,
        } = &node.config
        {
            examples.extend(example_id.iter().chain(delta_example_id.iter()).copied());
            let node_endpoints = endpoint_id.iter().chain(delta_endpoint_id.iter()).copied();
            if example_id.is_none() {
                default_of.extend(node_endpoints.clone());
            }
            endpoints.extend(node_endpoints);
        }
    }
    examples.extend(
        s.examples
            .iter()
            .filter(|e| e.is_default && default_of.contains(&e.endpoint_id))
            .map(|e| e.id),
    );

    // Delta examples need their version parent to resolve.
    let by_example: HashMap<ExampleId, &Example> = s.examples.iter().map(|e| (e.id, e)).collect();
    let mut pending: Vec<ExampleId> = examples.iter().copied().collect();
    while let Some(id) = pending.pop() {
        if let Some(parent) = by_example.get(&id).and_then(|e| e.version_parent_id) {
            if examples.insert(parent) {
                pending.push(parent);
            }
        }
    }
    endpoints.extend(examples.iter().filter_map(|id| by_example.get(id).map(|e| e.endpoint_id)));

    let by_endpoint: HashMap<EndpointId, _> = s.endpoints.iter().map(|e| (e.id, e)).collect();
    let mut pending: Vec<EndpointId> = endpoints.iter().copied().collect();
    while let Some(id) = pending.pop() {
        if let Some(parent) = by_endpoint.get(&id).and_then(|e| e.delta_parent_id) {
            if endpoints.insert(parent) {
                pending.push(parent);
            }
        }
    }

    let collections: HashSet<CollectionId> = endpoints
        .iter()
        .filter_map(|id| by_endpoint.get(id).map(|e| e.collection_id))
        .collect();
    let folder_parent: HashMap<FolderId, Option<FolderId>> = s.folders.iter().map(|f| (f.id, f.parent_id)).collect();
    let mut folders: HashSet<FolderId> = HashSet::new();
    for ep in endpoints.iter().filter_map(|id| by_endpoint.get(id)) {
        let mut cursor = ep.folder_id;
        while let Some(folder) = cursor {
            if !folders.insert(folder) {
                break;
            }
            cursor = folder_parent.get(&folder).copied().flatten();
        }
    }

    s.flows.retain(|f| flows.contains(&f.id));
    s.flow_variables.retain(|v| flows.contains(&v.flow_id));
    s.nodes.retain(|n| flows.contains(&n.flow_id));
    s.edges.retain(|e| flows.contains(&e.flow_id));

    s.collections.retain(|c| collections.contains(&c.id));
    s.folders.retain(|f| folders.contains(&f.id));
    s.endpoints.retain(|e| endpoints.contains(&e.id));
    s.collection_items = retain_linked(
        std::mem::take(&mut s.collection_items),
        |i: &CollectionItem| (i.collection_id, i.parent_folder_id),
        |i| match i.item {
            ItemRef::Folder(f) => folders.contains(&f),
            ItemRef::Endpoint(e) => endpoints.contains(&e),
        },
        |i, prev, next| {
            i.prev = prev;
            i.next = next;
        },
    );
    s.examples = retain_linked(
        std::mem::take(&mut s.examples),
        |e: &Example| e.endpoint_id,
        |e| examples.contains(&e.id),
        |e, prev, next| {
            e.prev = prev;
            e.next = next;
        },
    );

    for rows in [&mut s.headers, &mut s.queries, &mut s.urlencoded, &mut s.form_fields] {
        rows.retain(|r| examples.contains(&r.example_id));
    }
    s.asserts.retain(|a| examples.contains(&a.example_id));
    s.raw_bodies.retain(|b| examples.contains(&b.example_id));
    s.overlay.orders.retain(|o| examples.contains(&o.row.example_id));
    s.overlay.kv_deltas.retain(|d| examples.contains(&d.row.example_id));
    s.overlay.kv_states.retain(|d| examples.contains(&d.row.example_id));
    s.overlay.assert_deltas.retain(|d| examples.contains(&d.example_id));
    s.overlay.assert_states.retain(|d| examples.contains(&d.example_id));

    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{fixture, validate_snapshot};

    #[test]
    fn empty_filter_keeps_everything() {
        let f = fixture::build();
        let out = filter_snapshot(f.snapshot.clone(), &ExportFilter::default());
        assert_eq!(out, f.snapshot);
    }

    #[test]
    fn flow_filter_pulls_in_referenced_examples_and_parents() {
        let f = fixture::build();
        let filter = ExportFilter {
            flow_ids: vec![f.flow_a],
            example_ids: vec![],
        };
        let out = filter_snapshot(f.snapshot, &filter);

        assert_eq!(out.flows.len(), 1);
        assert!(out.nodes.iter().all(|n| n.flow_id == f.flow_a));
        let ids: HashSet<ExampleId> = out.examples.iter().map(|e| e.id).collect();
        assert!(ids.contains(&f.used_example));
        assert!(ids.contains(&f.delta_example));
        assert!(!ids.contains(&f.unused_example));
        assert!(out.headers.iter().all(|h| h.example_id == f.used_example));
        assert_eq!(out.overlay.orders.len(), 1);
        assert!(!out.flows.iter().any(|fl| fl.id == f.flow_b));
        validate_snapshot(&out).unwrap();
    }

    #[test]
    fn flow_filter_keeps_the_default_example_of_an_endpoint_only_node() {
        let mut f = fixture::build();
        for example in &mut f.snapshot.examples {
            if example.id == f.used_example {
                example.is_default = true;
            }
        }
        for node in &mut f.snapshot.nodes {
            if let NodeConfig::Request {
                example_id,
                delta_endpoint_id,
                delta_example_id,
                ..
            } = &mut node.config
            {
                *example_id = None;
                *delta_endpoint_id = None;
                *delta_example_id = None;
            }
        }
        let filter = ExportFilter {
            flow_ids: vec![f.flow_a],
            example_ids: vec![],
        };
        let out = filter_snapshot(f.snapshot, &filter);

        let ids: Vec<ExampleId> = out.examples.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![f.used_example]);
        assert_eq!(out.headers.len(), 2);
        assert_eq!(out.raw_bodies.len(), 1);
        assert_eq!(out.endpoints.len(), 1);
        validate_snapshot(&out).unwrap();
    }

    #[test]
    fn dropped_rows_are_unlinked_from_their_scope() {
        let f = fixture::build();
        let filter = ExportFilter {
            flow_ids: vec![],
            example_ids: vec![f.used_example],
        };
        let out = filter_snapshot(f.snapshot, &filter);

        assert_eq!(out.collection_items.len(), 1);
        let item = &out.collection_items[0];
        assert_eq!(item.prev, None);
        assert_eq!(item.next, None);
        crate::ordering::check_well_formed(&out.examples).unwrap();
        validate_snapshot(&out).unwrap();
    }
}
