//! SQLite collection repository: collections, folders, endpoints and the
//! ordered item tree.
//!
//! Folders and endpoints each get a `collection_items` row in the scope
//! (collection, parent folder). Delta endpoints are variants of a visible
//! endpoint and get no item row.

use apiflow_core::event::{EventBus, SyncTracker};
use apiflow_core::ordering::sort_linked;
use apiflow_core::repository::CollectionRepository;
use apiflow_types::collection::{Collection, CollectionItem, Endpoint, Folder, ItemRef};
use apiflow_types::error::RepositoryError;
use apiflow_types::event::{SyncEvent, SyncOp, SyncTopic};
use apiflow_types::id::{CollectionId, CollectionItemId, EndpointId, FolderId, WorkspaceId};
use apiflow_types::overlay::MovePosition;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::linked::{self, ListScope};
use super::pool::DatabasePool;
use super::util::{
    commit, format_datetime, opt_id, parse_datetime, parse_id, parse_opt_id, query_err,
    workspace_of_collection, write_err,
};

/// SQLite-backed implementation of `CollectionRepository`.
pub struct SqliteCollectionRepository {
    pool: DatabasePool,
    sync: Option<EventBus<SyncEvent>>,
}

impl SqliteCollectionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool, sync: None }
    }

    pub fn with_sync(mut self, bus: EventBus<SyncEvent>) -> Self {
        self.sync = Some(bus);
        self
    }

    pub fn tx<'c>(&self, conn: &'c mut SqliteConnection) -> CollectionQueries<'c> {
        CollectionQueries { conn }
    }
}

/// The list a collection item lives in.
pub(crate) fn item_scope(collection_id: &CollectionId, parent: Option<FolderId>) -> ListScope {
    ListScope::new("collection_items")
        .filter("collection_id", Some(collection_id.to_string()))
        .filter("parent_folder_id", opt_id(parent))
}

pub(crate) fn row_to_collection(row: &SqliteRow) -> Result<Collection, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let workspace_id: String = row.try_get("workspace_id").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    Ok(Collection {
        id: parse_id(&id)?,
        workspace_id: parse_id(&workspace_id)?,
        name: row.try_get("name").map_err(query_err)?,
        created_at: parse_datetime(&created_at)?,
    })
}

pub(crate) fn row_to_folder(row: &SqliteRow) -> Result<Folder, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let collection_id: String = row.try_get("collection_id").map_err(query_err)?;
    Ok(Folder {
        id: parse_id(&id)?,
        collection_id: parse_id(&collection_id)?,
        parent_id: parse_opt_id(row.try_get("parent_id").map_err(query_err)?)?,
        name: row.try_get("name").map_err(query_err)?,
    })
}

pub(crate) fn row_to_endpoint(row: &SqliteRow) -> Result<Endpoint, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let collection_id: String = row.try_get("collection_id").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    Ok(Endpoint {
        id: parse_id(&id)?,
        collection_id: parse_id(&collection_id)?,
        folder_id: parse_opt_id(row.try_get("folder_id").map_err(query_err)?)?,
        name: row.try_get("name").map_err(query_err)?,
        method: row.try_get("method").map_err(query_err)?,
        url: row.try_get("url").map_err(query_err)?,
        delta_parent_id: parse_opt_id(row.try_get("delta_parent_id").map_err(query_err)?)?,
        created_at: parse_datetime(&created_at)?,
    })
}

pub(crate) fn row_to_item(row: &SqliteRow) -> Result<CollectionItem, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let collection_id: String = row.try_get("collection_id").map_err(query_err)?;
    let item_type: String = row.try_get("item_type").map_err(query_err)?;
    let folder_id: Option<FolderId> = parse_opt_id(row.try_get("folder_id").map_err(query_err)?)?;
    let endpoint_id: Option<EndpointId> = parse_opt_id(row.try_get("endpoint_id").map_err(query_err)?)?;
    let item = match (item_type.as_str(), folder_id, endpoint_id) {
        ("folder", Some(f), _) => ItemRef::Folder(f),
        ("endpoint", _, Some(e)) => ItemRef::Endpoint(e),
        _ => {
            return Err(RepositoryError::Query(format!(
                "collection item {id} has no {item_type} reference"
            )));
        }
    };
    Ok(CollectionItem {
        id: parse_id(&id)?,
        collection_id: parse_id(&collection_id)?,
        parent_folder_id: parse_opt_id(row.try_get("parent_folder_id").map_err(query_err)?)?,
        item,
        prev: parse_opt_id(row.try_get("prev_id").map_err(query_err)?)?,
        next: parse_opt_id(row.try_get("next_id").map_err(query_err)?)?,
    })
}

/// Collection queries bound to one connection.
pub struct CollectionQueries<'c> {
    conn: &'c mut SqliteConnection,
}

impl CollectionQueries<'_> {
    pub async fn insert_collection(&mut self, c: &Collection) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO collections (id, workspace_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(c.id.to_string())
            .bind(c.workspace_id.to_string())
            .bind(&c.name)
            .bind(format_datetime(&c.created_at))
            .execute(&mut *self.conn)
            .await
            .map_err(|e| write_err(e, "collection"))?;
        Ok(())
    }

    pub async fn get_collection(&mut self, id: &CollectionId) -> Result<Option<Collection>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM collections WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_collection).transpose()
    }

    pub async fn list_collections(&mut self, workspace_id: &WorkspaceId) -> Result<Vec<Collection>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM collections WHERE workspace_id = ? ORDER BY created_at ASC, id ASC")
            .bind(workspace_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        rows.iter().map(row_to_collection).collect()
    }

    pub async fn update_collection(&mut self, c: &Collection) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE collections SET name = ? WHERE id = ?")
            .bind(&c.name)
            .bind(c.id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_collection(&mut self, id: &CollectionId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn insert_folder(&mut self, f: &Folder) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO folders (id, collection_id, parent_id, name) VALUES (?, ?, ?, ?)")
            .bind(f.id.to_string())
            .bind(f.collection_id.to_string())
            .bind(opt_id(f.parent_id))
            .bind(&f.name)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| write_err(e, "folder"))?;
        Ok(())
    }

    pub async fn get_folder(&mut self, id: &FolderId) -> Result<Option<Folder>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM folders WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_folder).transpose()
    }

    pub async fn update_folder_row(&mut self, f: &Folder) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE folders SET parent_id = ?, name = ? WHERE id = ?")
            .bind(opt_id(f.parent_id))
            .bind(&f.name)
            .bind(f.id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn insert_endpoint(&mut self, e: &Endpoint) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO endpoints (id, collection_id, folder_id, name, method, url, delta_parent_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(e.id.to_string())
        .bind(e.collection_id.to_string())
        .bind(opt_id(e.folder_id))
        .bind(&e.name)
        .bind(&e.method)
        .bind(&e.url)
        .bind(opt_id(e.delta_parent_id))
        .bind(format_datetime(&e.created_at))
        .execute(&mut *self.conn)
        .await
        .map_err(|err| write_err(err, "endpoint"))?;
        Ok(())
    }

    pub async fn get_endpoint(&mut self, id: &EndpointId) -> Result<Option<Endpoint>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM endpoints WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_endpoint).transpose()
    }

    pub async fn list_endpoints(&mut self, collection_id: &CollectionId) -> Result<Vec<Endpoint>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM endpoints WHERE collection_id = ? ORDER BY created_at ASC, id ASC")
            .bind(collection_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        rows.iter().map(row_to_endpoint).collect()
    }

    pub async fn update_endpoint_row(&mut self, e: &Endpoint) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE endpoints SET folder_id = ?, name = ?, method = ?, url = ?, delta_parent_id = ? WHERE id = ?",
        )
        .bind(opt_id(e.folder_id))
        .bind(&e.name)
        .bind(&e.method)
        .bind(&e.url)
        .bind(opt_id(e.delta_parent_id))
        .bind(e.id.to_string())
        .execute(&mut *self.conn)
        .await
        .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn get_item(&mut self, id: &CollectionItemId) -> Result<Option<CollectionItem>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM collection_items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_item).transpose()
    }

    pub async fn item_for(&mut self, item: ItemRef) -> Result<Option<CollectionItem>, RepositoryError> {
        let (sql, id) = match item {
            ItemRef::Folder(f) => ("SELECT * FROM collection_items WHERE folder_id = ? AND item_type = 'folder'", f.to_string()),
            ItemRef::Endpoint(e) => ("SELECT * FROM collection_items WHERE endpoint_id = ? AND item_type = 'endpoint'", e.to_string()),
        };
        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_item).transpose()
    }

    pub async fn list_items(
        &mut self,
        collection_id: &CollectionId,
        parent: Option<FolderId>,
    ) -> Result<Vec<CollectionItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM collection_items WHERE collection_id = ? AND parent_folder_id IS ? ORDER BY rowid",
        )
        .bind(collection_id.to_string())
        .bind(opt_id(parent))
        .fetch_all(&mut *self.conn)
        .await
        .map_err(query_err)?;
        let items = rows.iter().map(row_to_item).collect::<Result<Vec<_>, _>>()?;
        Ok(sort_linked(items))
    }

    /// Insert an item row for `item` and append it to its scope.
    pub async fn append_item(
        &mut self,
        collection_id: &CollectionId,
        parent: Option<FolderId>,
        item: ItemRef,
    ) -> Result<CollectionItemId, RepositoryError> {
        let id = CollectionItemId::new();
        let (item_type, folder_id, endpoint_id) = match item {
            ItemRef::Folder(f) => ("folder", Some(f.to_string()), None),
            ItemRef::Endpoint(e) => ("endpoint", None, Some(e.to_string())),
        };
        sqlx::query(
            "INSERT INTO collection_items (id, collection_id, parent_folder_id, item_type, folder_id, endpoint_id)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(collection_id.to_string())
        .bind(opt_id(parent))
        .bind(item_type)
        .bind(folder_id)
        .bind(endpoint_id)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| write_err(e, "collection item"))?;
        linked::append(&mut *self.conn, &item_scope(collection_id, parent), id.0).await?;
        Ok(id)
    }

    /// Unlink and delete the item row pointing at `item`, if there is one.
    pub async fn remove_item(&mut self, item: ItemRef) -> Result<Option<CollectionItemId>, RepositoryError> {
        let Some(row) = self.item_for(item).await? else {
            return Ok(None);
        };
        linked::unlink(&mut *self.conn, &item_scope(&row.collection_id, row.parent_folder_id), row.id.0).await?;
        sqlx::query("DELETE FROM collection_items WHERE id = ?")
            .bind(row.id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(Some(row.id))
    }

    /// Move an item row to the tail of another scope.
    pub async fn reparent_item(&mut self, item: ItemRef, parent: Option<FolderId>) -> Result<(), RepositoryError> {
        let Some(row) = self.item_for(item).await? else {
            return Ok(());
        };
        if row.parent_folder_id == parent {
            return Ok(());
        }
        linked::unlink(&mut *self.conn, &item_scope(&row.collection_id, row.parent_folder_id), row.id.0).await?;
        sqlx::query("UPDATE collection_items SET parent_folder_id = ? WHERE id = ?")
            .bind(opt_id(parent))
            .bind(row.id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        linked::append(&mut *self.conn, &item_scope(&row.collection_id, parent), row.id.0).await
    }

    /// Whether `candidate` is `folder` or one of its descendants.
    pub async fn is_within(&mut self, candidate: FolderId, folder: FolderId) -> Result<bool, RepositoryError> {
        let mut cursor = Some(candidate);
        let mut depth = 0usize;
        while let Some(id) = cursor {
            if id == folder {
                return Ok(true);
            }
            depth += 1;
            if depth > 1024 {
                return Err(RepositoryError::Invalid("folder nesting is cyclic".into()));
            }
            cursor = self.get_folder(&id).await?.and_then(|f| f.parent_id);
        }
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// CollectionRepository impl
// ---------------------------------------------------------------------------

impl SqliteCollectionRepository {
    async fn reader(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, RepositoryError> {
        self.pool.reader.acquire().await.map_err(query_err)
    }
}

impl CollectionRepository for SqliteCollectionRepository {
    async fn create_collection(&self, collection: &Collection) -> Result<Collection, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).insert_collection(collection).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(collection.workspace_id, SyncTopic::Collection, SyncOp::Insert, collection.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(collection.clone())
    }

    async fn get_collection(&self, id: &CollectionId) -> Result<Option<Collection>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_collection(id).await
    }

    async fn list_collections(&self, workspace_id: &WorkspaceId) -> Result<Vec<Collection>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_collections(workspace_id).await
    }

    async fn update_collection(&self, collection: &Collection) -> Result<Collection, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).update_collection(collection).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(collection.workspace_id, SyncTopic::Collection, SyncOp::Update, collection.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(collection.clone())
    }

    async fn delete_collection(&self, id: &CollectionId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let workspace_id = workspace_of_collection(&mut tx, id).await?;
        self.tx(&mut tx).delete_collection(id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Collection, SyncOp::Delete, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn create_folder(&self, folder: &Folder) -> Result<Folder, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        if let Some(parent) = folder.parent_id {
            match queries.get_folder(&parent).await? {
                Some(p) if p.collection_id == folder.collection_id => {}
                _ => return Err(RepositoryError::Invalid("parent folder is not in this collection".into())),
            }
        }
        queries.insert_folder(folder).await?;
        let item_id = queries
            .append_item(&folder.collection_id, folder.parent_id, ItemRef::Folder(folder.id))
            .await?;
        let workspace_id = workspace_of_collection(&mut tx, &folder.collection_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Collection, SyncOp::Insert, folder.id);
        tracker.track(workspace_id, SyncTopic::CollectionItem, SyncOp::Insert, item_id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(folder.clone())
    }

    async fn get_folder(&self, id: &FolderId) -> Result<Option<Folder>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_folder(id).await
    }

    async fn update_folder(&self, folder: &Folder) -> Result<Folder, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let Some(current) = queries.get_folder(&folder.id).await? else {
            return Err(RepositoryError::NotFound);
        };
        if current.collection_id != folder.collection_id {
            return Err(RepositoryError::Invalid("a folder cannot change collection".into()));
        }
        if let Some(parent) = folder.parent_id {
            if queries.is_within(parent, folder.id).await? {
                return Err(RepositoryError::Invalid("a folder cannot move into itself".into()));
            }
        }
        queries.update_folder_row(folder).await?;
        queries.reparent_item(ItemRef::Folder(folder.id), folder.parent_id).await?;
        let workspace_id = workspace_of_collection(&mut tx, &folder.collection_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Collection, SyncOp::Update, folder.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(folder.clone())
    }

    async fn delete_folder(&self, id: &FolderId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let Some(folder) = queries.get_folder(id).await? else {
            return Err(RepositoryError::NotFound);
        };
        let item_id = queries.remove_item(ItemRef::Folder(*id)).await?;
        // Nested folders, endpoints and their items cascade.
        sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        let workspace_id = workspace_of_collection(&mut tx, &folder.collection_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Collection, SyncOp::Delete, *id);
        if let Some(item_id) = item_id {
            tracker.track(workspace_id, SyncTopic::CollectionItem, SyncOp::Delete, item_id);
        }
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn create_endpoint(&self, endpoint: &Endpoint) -> Result<Endpoint, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.insert_endpoint(endpoint).await?;
        let item_id = if endpoint.delta_parent_id.is_none() {
            Some(
                queries
                    .append_item(&endpoint.collection_id, endpoint.folder_id, ItemRef::Endpoint(endpoint.id))
                    .await?,
            )
        } else {
            None
        };
        let workspace_id = workspace_of_collection(&mut tx, &endpoint.collection_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Endpoint, SyncOp::Insert, endpoint.id);
        if let Some(item_id) = item_id {
            tracker.track(workspace_id, SyncTopic::CollectionItem, SyncOp::Insert, item_id);
        }
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(endpoint.clone())
    }

    async fn get_endpoint(&self, id: &EndpointId) -> Result<Option<Endpoint>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_endpoint(id).await
    }

    async fn list_endpoints(&self, collection_id: &CollectionId) -> Result<Vec<Endpoint>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_endpoints(collection_id).await
    }

    async fn update_endpoint(&self, endpoint: &Endpoint) -> Result<Endpoint, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let Some(current) = queries.get_endpoint(&endpoint.id).await? else {
            return Err(RepositoryError::NotFound);
        };
        if current.collection_id != endpoint.collection_id {
            return Err(RepositoryError::Invalid("an endpoint cannot change collection".into()));
        }
        queries.update_endpoint_row(endpoint).await?;
        queries.reparent_item(ItemRef::Endpoint(endpoint.id), endpoint.folder_id).await?;
        let workspace_id = workspace_of_collection(&mut tx, &endpoint.collection_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Endpoint, SyncOp::Update, endpoint.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(endpoint.clone())
    }

    async fn delete_endpoint(&self, id: &EndpointId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let Some(endpoint) = queries.get_endpoint(id).await? else {
            return Err(RepositoryError::NotFound);
        };
        queries.remove_item(ItemRef::Endpoint(*id)).await?;
        sqlx::query("DELETE FROM endpoints WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        let workspace_id = workspace_of_collection(&mut tx, &endpoint.collection_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Endpoint, SyncOp::Delete, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn list_items(
        &self,
        collection_id: &CollectionId,
        parent: Option<FolderId>,
    ) -> Result<Vec<CollectionItem>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_items(collection_id, parent).await
    }

    async fn move_item(
        &self,
        item_id: &CollectionItemId,
        target_id: &CollectionItemId,
        position: MovePosition,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let Some(item) = queries.get_item(item_id).await? else {
            return Err(RepositoryError::NotFound);
        };
        let scope = item_scope(&item.collection_id, item.parent_folder_id);
        linked::move_item(&mut tx, &scope, item_id.0, target_id.0, position).await?;
        let workspace_id = workspace_of_collection(&mut tx, &item.collection_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::CollectionItem, SyncOp::Update, *item_id);
        commit(tx, tracker, self.sync.as_ref()).await
    }
}
