//! Consistent id rewriting for importing a snapshot next to the workspace
//! it came from.

use std::collections::HashMap;

use apiflow_types::collection::ItemRef;
use apiflow_types::flow::NodeConfig;
use apiflow_types::snapshot::WorkspaceSnapshot;
use uuid::Uuid;

/// Old id to fresh id. The same old id always maps to the same new one,
/// whatever its type, so foreign keys stay consistent.
#[derive(Debug, Default)]
pub struct IdMap {
    map: HashMap<Uuid, Uuid>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<I>(&mut self, id: I) -> I
    where
        I: Into<Uuid> + From<Uuid>,
    {
        let old: Uuid = id.into();
        I::from(*self.map.entry(old).or_insert_with(Uuid::now_v7))
    }

    pub fn get_opt<I>(&mut self, id: Option<I>) -> Option<I>
    where
        I: Into<Uuid> + From<Uuid>,
    {
        id.map(|i| self.get(i))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Give every entity in `s` a fresh id, rewriting all references.
pub fn remap_ids(mut s: WorkspaceSnapshot) -> (WorkspaceSnapshot, IdMap) {
    let mut m = IdMap::new();

    s.workspace.id = m.get(s.workspace.id);
    let ws = s.workspace.id;

    for env in &mut s.environments {
        env.id = m.get(env.id);
        env.workspace_id = ws;
    }
    for var in &mut s.variables {
        var.id = m.get(var.id);
        var.env_id = m.get(var.env_id);
    }
    for c in &mut s.collections {
        c.id = m.get(c.id);
        c.workspace_id = ws;
    }
    for f in &mut s.folders {
        f.id = m.get(f.id);
        f.collection_id = m.get(f.collection_id);
        f.parent_id = m.get_opt(f.parent_id);
    }
    for e in &mut s.endpoints {
        e.id = m.get(e.id);
        e.collection_id = m.get(e.collection_id);
        e.folder_id = m.get_opt(e.folder_id);
        e.delta_parent_id = m.get_opt(e.delta_parent_id);
    }
    for item in &mut s.collection_items {
        item.id = m.get(item.id);
        item.collection_id = m.get(item.collection_id);
        item.parent_folder_id = m.get_opt(item.parent_folder_id);
        item.item = match item.item {
            ItemRef::Folder(f) => ItemRef::Folder(m.get(f)),
            ItemRef::Endpoint(e) => ItemRef::Endpoint(m.get(e)),
        };
        item.prev = m.get_opt(item.prev);
        item.next = m.get_opt(item.next);
    }
    for ex in &mut s.examples {
        ex.id = m.get(ex.id);
        ex.endpoint_id = m.get(ex.endpoint_id);
        ex.version_parent_id = m.get_opt(ex.version_parent_id);
        ex.prev = m.get_opt(ex.prev);
        ex.next = m.get_opt(ex.next);
    }
    for rows in [&mut s.headers, &mut s.queries, &mut s.urlencoded, &mut s.form_fields] {
        for r in rows.iter_mut() {
            r.id = m.get(r.id);
            r.example_id = m.get(r.example_id);
            r.delta_parent_id = m.get_opt(r.delta_parent_id);
            r.prev = m.get_opt(r.prev);
            r.next = m.get_opt(r.next);
        }
    }
    for a in &mut s.asserts {
        a.id = m.get(a.id);
        a.example_id = m.get(a.example_id);
        a.delta_parent_id = m.get_opt(a.delta_parent_id);
        a.prev = m.get_opt(a.prev);
        a.next = m.get_opt(a.next);
    }
    for body in &mut s.raw_bodies {
        body.example_id = m.get(body.example_id);
    }

    let overlay = &mut s.overlay;
    for o in &mut overlay.orders {
        o.row.example_id = m.get(o.row.example_id);
        o.row.ref_id = m.get(o.row.ref_id);
    }
    for d in &mut overlay.kv_deltas {
        d.row.id = m.get(d.row.id);
        d.row.example_id = m.get(d.row.example_id);
    }
    for st in &mut overlay.kv_states {
        st.row.example_id = m.get(st.row.example_id);
        st.row.origin_id = m.get(st.row.origin_id);
    }
    for d in &mut overlay.assert_deltas {
        d.id = m.get(d.id);
        d.example_id = m.get(d.example_id);
    }
    for st in &mut overlay.assert_states {
        st.example_id = m.get(st.example_id);
        st.origin_id = m.get(st.origin_id);
    }

    for f in &mut s.flows {
        f.id = m.get(f.id);
        f.workspace_id = ws;
    }
    for v in &mut s.flow_variables {
        v.id = m.get(v.id);
        v.flow_id = m.get(v.flow_id);
    }
    for n in &mut s.nodes {
        n.id = m.get(n.id);
        n.flow_id = m.get(n.flow_id);
        if let NodeConfig::Request {
            endpoint_id,
            example_id,
            delta_endpoint_id,
            delta_example_id,
        } = &mut n.config
        {
            *endpoint_id = m.get_opt(*endpoint_id);
            *example_id = m.get_opt(*example_id);
            *delta_endpoint_id = m.get_opt(*delta_endpoint_id);
            *delta_example_id = m.get_opt(*delta_example_id);
        }
    }
    for e in &mut s.edges {
        e.id = m.get(e.id);
        e.flow_id = m.get(e.flow_id);
        e.source_id = m.get(e.source_id);
        e.target_id = m.get(e.target_id);
    }

    (s, m)
}
