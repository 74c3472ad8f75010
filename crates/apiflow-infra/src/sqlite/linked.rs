//! Prev/next maintenance for ordered tables.
//!
//! Every ordered table has `id`, `prev_id` and `next_id` columns and a set
//! of scope columns (the example for field rows, collection plus parent
//! folder for collection items). These helpers read a scope's pointers,
//! ask `apiflow_core::ordering` for the target order, and write back only
//! the rows whose pointers change. They run on whatever connection they
//! are given, which inside a write is the open transaction.

use apiflow_core::ordering::{Links, ReorderError, moved_order, relink_plan, walk};
use apiflow_types::error::RepositoryError;
use apiflow_types::overlay::MovePosition;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::util::{parse_id, parse_opt_id, query_err};

/// One list inside an ordered table.
#[derive(Debug, Clone)]
pub struct ListScope {
    table: &'static str,
    filters: Vec<(&'static str, Option<String>)>,
}

impl ListScope {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            filters: Vec::new(),
        }
    }

    /// Restrict to rows whose `column` equals `value` (NULL-safe).
    pub fn filter(mut self, column: &'static str, value: Option<String>) -> Self {
        self.filters.push((column, value));
        self
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    fn where_clause(&self) -> String {
        if self.filters.is_empty() {
            return "1 = 1".to_string();
        }
        self.filters
            .iter()
            .map(|(column, _)| format!("{column} IS ?"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Pointer triples of every row in the scope, in storage order.
pub async fn load_links(
    conn: &mut SqliteConnection,
    scope: &ListScope,
) -> Result<Vec<Links<Uuid>>, RepositoryError> {
    let sql = format!(
        "SELECT id, prev_id, next_id FROM {} WHERE {} ORDER BY rowid",
        scope.table,
        scope.where_clause()
    );
    let mut query = sqlx::query(&sql);
    for (_, value) in &scope.filters {
        query = query.bind(value.clone());
    }
    let rows = query.fetch_all(&mut *conn).await.map_err(query_err)?;

    rows.iter()
        .map(|row| {
            let id: String = row.try_get("id").map_err(query_err)?;
            let prev: Option<String> = row.try_get("prev_id").map_err(query_err)?;
            let next: Option<String> = row.try_get("next_id").map_err(query_err)?;
            Ok(Links {
                id: parse_id(&id)?,
                prev: parse_opt_id(prev)?,
                next: parse_opt_id(next)?,
            })
        })
        .collect()
}

/// Head-to-tail order of the scope.
///
/// Terminates on corrupted pointers; rows the walk could not reach are
/// appended at the end and a warning is logged.
pub async fn ordered_ids(
    conn: &mut SqliteConnection,
    scope: &ListScope,
) -> Result<Vec<Uuid>, RepositoryError> {
    let links = load_links(conn, scope).await?;
    let walked = walk(&links);
    if !walked.is_clean() {
        tracing::warn!(
            table = scope.table,
            unreached = walked.unreached.len(),
            cycle = walked.cycle_at.is_some(),
            "ordered list is corrupted; surfacing unreached rows at the end"
        );
    }
    Ok(walked.all())
}

/// Order of the scope before `id`, a freshly inserted unlinked row, joins it.
fn order_before_insert(links: &[Links<Uuid>], id: Uuid) -> Vec<Uuid> {
    let others: Vec<Links<Uuid>> = links.iter().filter(|l| l.id != id).copied().collect();
    walk(&others).all()
}

/// Order of the scope once `id` leaves it. Neighbours still point at `id`,
/// so the walk runs over the full list.
fn order_after_removal(links: &[Links<Uuid>], id: Uuid) -> Vec<Uuid> {
    walk(links).all().into_iter().filter(|other| *other != id).collect()
}

async fn relink(
    conn: &mut SqliteConnection,
    scope: &ListScope,
    current: &[Links<Uuid>],
    target: &[Uuid],
) -> Result<(), RepositoryError> {
    let sql = format!("UPDATE {} SET prev_id = ?, next_id = ? WHERE id = ?", scope.table);
    for update in relink_plan(current, target) {
        sqlx::query(&sql)
            .bind(update.prev.map(|p| p.to_string()))
            .bind(update.next.map(|n| n.to_string()))
            .bind(update.id.to_string())
            .execute(&mut *conn)
            .await
            .map_err(query_err)?;
    }
    Ok(())
}

/// Link an already inserted row at the tail of its scope.
pub async fn append(
    conn: &mut SqliteConnection,
    scope: &ListScope,
    id: Uuid,
) -> Result<(), RepositoryError> {
    insert_at(conn, scope, id, usize::MAX).await
}

/// Link an already inserted row at `index` (clamped to the tail).
pub async fn insert_at(
    conn: &mut SqliteConnection,
    scope: &ListScope,
    id: Uuid,
    index: usize,
) -> Result<(), RepositoryError> {
    let links = load_links(conn, scope).await?;
    let mut target = order_before_insert(&links, id);
    target.insert(index.min(target.len()), id);
    relink(conn, scope, &links, &target).await
}

/// Link already inserted rows after the current tail, in the order given.
pub async fn append_many(
    conn: &mut SqliteConnection,
    scope: &ListScope,
    ids: &[Uuid],
) -> Result<(), RepositoryError> {
    let links = load_links(conn, scope).await?;
    let existing: Vec<Links<Uuid>> = links
        .iter()
        .filter(|l| !ids.contains(&l.id))
        .copied()
        .collect();
    let mut target = walk(&existing).all();
    target.extend_from_slice(ids);
    relink(conn, scope, &links, &target).await
}

/// Detach `id` and reattach it next to `target_id`.
pub async fn move_item(
    conn: &mut SqliteConnection,
    scope: &ListScope,
    id: Uuid,
    target_id: Uuid,
    position: MovePosition,
) -> Result<(), RepositoryError> {
    let links = load_links(conn, scope).await?;
    let order = walk(&links).all();
    let target = moved_order(&order, id, target_id, position).map_err(|e| match e {
        ReorderError::UnknownItem => RepositoryError::NotFound,
        other => RepositoryError::Invalid(other.to_string()),
    })?;
    relink(conn, scope, &links, &target).await
}

pub async fn move_before(
    conn: &mut SqliteConnection,
    scope: &ListScope,
    id: Uuid,
    target_id: Uuid,
) -> Result<(), RepositoryError> {
    move_item(conn, scope, id, target_id, MovePosition::Before).await
}

pub async fn move_after(
    conn: &mut SqliteConnection,
    scope: &ListScope,
    id: Uuid,
    target_id: Uuid,
) -> Result<(), RepositoryError> {
    move_item(conn, scope, id, target_id, MovePosition::After).await
}

/// Write one row's pointers verbatim, for lists restored from a snapshot.
pub async fn set_links(
    conn: &mut SqliteConnection,
    table: &str,
    links: &Links<Uuid>,
) -> Result<(), RepositoryError> {
    let sql = format!("UPDATE {table} SET prev_id = ?, next_id = ? WHERE id = ?");
    sqlx::query(&sql)
        .bind(links.prev.map(|p| p.to_string()))
        .bind(links.next.map(|n| n.to_string()))
        .bind(links.id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(query_err)?;
    Ok(())
}

/// Join `id`'s neighbours and clear its own pointers. The row itself is
/// left in place for the caller to delete.
pub async fn unlink(
    conn: &mut SqliteConnection,
    scope: &ListScope,
    id: Uuid,
) -> Result<(), RepositoryError> {
    let links = load_links(conn, scope).await?;
    if !links.iter().any(|l| l.id == id) {
        return Err(RepositoryError::NotFound);
    }
    let target = order_after_removal(&links, id);
    relink(conn, scope, &links, &target).await?;

    let sql = format!("UPDATE {} SET prev_id = NULL, next_id = NULL WHERE id = ?", scope.table);
    sqlx::query(&sql)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(query_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiflow_core::ordering::check_well_formed;
    use sqlx::Connection;

    async fn conn() -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE items (id TEXT PRIMARY KEY, scope_id TEXT, prev_id TEXT, next_id TEXT)",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        conn
    }

    fn scope(name: &str) -> ListScope {
        ListScope::new("items").filter("scope_id", Some(name.to_string()))
    }

    async fn push(conn: &mut SqliteConnection, s: &ListScope, name: &str) -> Uuid {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO items (id, scope_id) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(name)
            .execute(&mut *conn)
            .await
            .unwrap();
        append(conn, s, id).await.unwrap();
        id
    }

    async fn assert_order(conn: &mut SqliteConnection, s: &ListScope, expected: &[Uuid]) {
        assert_eq!(ordered_ids(conn, s).await.unwrap(), expected);
        let links = load_links(conn, s).await.unwrap();
        check_well_formed(&links).unwrap();
    }

    #[tokio::test]
    async fn append_to_empty_and_to_tail() {
        let mut c = conn().await;
        let s = scope("a");
        let first = push(&mut c, &s, "a").await;
        assert_order(&mut c, &s, &[first]).await;
        let second = push(&mut c, &s, "a").await;
        let third = push(&mut c, &s, "a").await;
        assert_order(&mut c, &s, &[first, second, third]).await;
    }

    #[tokio::test]
    async fn scopes_do_not_interfere() {
        let mut c = conn().await;
        let (a, b) = (scope("a"), scope("b"));
        let a1 = push(&mut c, &a, "a").await;
        let b1 = push(&mut c, &b, "b").await;
        let a2 = push(&mut c, &a, "a").await;
        assert_order(&mut c, &a, &[a1, a2]).await;
        assert_order(&mut c, &b, &[b1]).await;
    }

    #[tokio::test]
    async fn null_scope_columns_match_null() {
        let mut c = conn().await;
        let root = ListScope::new("items").filter("scope_id", None);
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO items (id, scope_id) VALUES (?, NULL)")
            .bind(id.to_string())
            .execute(&mut c)
            .await
            .unwrap();
        append(&mut c, &root, id).await.unwrap();
        assert_order(&mut c, &root, &[id]).await;
    }

    #[tokio::test]
    async fn moves_to_head_tail_and_adjacent() {
        let mut c = conn().await;
        let s = scope("a");
        let a = push(&mut c, &s, "a").await;
        let b = push(&mut c, &s, "a").await;
        let d = push(&mut c, &s, "a").await;

        move_before(&mut c, &s, d, a).await.unwrap();
        assert_order(&mut c, &s, &[d, a, b]).await;

        move_after(&mut c, &s, d, b).await.unwrap();
        assert_order(&mut c, &s, &[a, b, d]).await;

        move_after(&mut c, &s, a, b).await.unwrap();
        assert_order(&mut c, &s, &[b, a, d]).await;

        assert!(matches!(
            move_before(&mut c, &s, a, a).await,
            Err(RepositoryError::Invalid(_))
        ));
        assert!(matches!(
            move_before(&mut c, &s, Uuid::now_v7(), a).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn unlink_head_tail_and_only() {
        let mut c = conn().await;
        let s = scope("a");
        let a = push(&mut c, &s, "a").await;
        let b = push(&mut c, &s, "a").await;
        let d = push(&mut c, &s, "a").await;

        unlink(&mut c, &s, a).await.unwrap();
        sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(a.to_string())
            .execute(&mut c)
            .await
            .unwrap();
        assert_order(&mut c, &s, &[b, d]).await;

        unlink(&mut c, &s, d).await.unwrap();
        sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(d.to_string())
            .execute(&mut c)
            .await
            .unwrap();
        assert_order(&mut c, &s, &[b]).await;

        unlink(&mut c, &s, b).await.unwrap();
        sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(b.to_string())
            .execute(&mut c)
            .await
            .unwrap();
        assert_order(&mut c, &s, &[]).await;
    }

    #[tokio::test]
    async fn insert_at_and_bulk_append_keep_given_order() {
        let mut c = conn().await;
        let s = scope("a");
        let a = push(&mut c, &s, "a").await;
        let b = push(&mut c, &s, "a").await;

        let mid = Uuid::now_v7();
        sqlx::query("INSERT INTO items (id, scope_id) VALUES (?, 'a')")
            .bind(mid.to_string())
            .execute(&mut c)
            .await
            .unwrap();
        insert_at(&mut c, &s, mid, 1).await.unwrap();
        assert_order(&mut c, &s, &[a, mid, b]).await;

        let bulk: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();
        for id in &bulk {
            sqlx::query("INSERT INTO items (id, scope_id) VALUES (?, 'a')")
                .bind(id.to_string())
                .execute(&mut c)
                .await
                .unwrap();
        }
        append_many(&mut c, &s, &bulk).await.unwrap();
        let mut expected = vec![a, mid, b];
        expected.extend(bulk);
        assert_order(&mut c, &s, &expected).await;
    }

    #[tokio::test]
    async fn corrupted_cycle_still_surfaces_every_row() {
        let mut c = conn().await;
        let s = scope("a");
        let a = push(&mut c, &s, "a").await;
        let b = push(&mut c, &s, "a").await;
        let d = push(&mut c, &s, "a").await;
        // b -> a closes a loop and leaves d unreachable.
        sqlx::query("UPDATE items SET next_id = ? WHERE id = ?")
            .bind(a.to_string())
            .bind(b.to_string())
            .execute(&mut c)
            .await
            .unwrap();

        let order = ordered_ids(&mut c, &s).await.unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(&order[..2], &[a, b]);
        assert!(order.contains(&d));
    }
}
