//! Collections, folders, endpoints and the ordered item tree.

use apiflow_types::collection::{Collection, CollectionItem, Endpoint, Folder};
use apiflow_types::error::RepositoryError;
use apiflow_types::id::{CollectionId, CollectionItemId, EndpointId, FolderId, WorkspaceId};
use apiflow_types::overlay::MovePosition;

pub trait CollectionRepository: Send + Sync {
    fn create_collection(
        &self,
        collection: &Collection,
    ) -> impl std::future::Future<Output = Result<Collection, RepositoryError>> + Send;

    fn get_collection(
        &self,
        id: &CollectionId,
    ) -> impl std::future::Future<Output = Result<Option<Collection>, RepositoryError>> + Send;

    fn list_collections(
        &self,
        workspace_id: &WorkspaceId,
    ) -> impl std::future::Future<Output = Result<Vec<Collection>, RepositoryError>> + Send;

    fn update_collection(
        &self,
        collection: &Collection,
    ) -> impl std::future::Future<Output = Result<Collection, RepositoryError>> + Send;

    fn delete_collection(
        &self,
        id: &CollectionId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert the folder and append it to its parent's item list.
    fn create_folder(
        &self,
        folder: &Folder,
    ) -> impl std::future::Future<Output = Result<Folder, RepositoryError>> + Send;

    fn get_folder(
        &self,
        id: &FolderId,
    ) -> impl std::future::Future<Output = Result<Option<Folder>, RepositoryError>> + Send;

    fn update_folder(
        &self,
        folder: &Folder,
    ) -> impl std::future::Future<Output = Result<Folder, RepositoryError>> + Send;

    /// Unlink and delete the folder with everything below it.
    fn delete_folder(
        &self,
        id: &FolderId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert the endpoint and append it to its folder's item list.
    fn create_endpoint(
        &self,
        endpoint: &Endpoint,
    ) -> impl std::future::Future<Output = Result<Endpoint, RepositoryError>> + Send;

    fn get_endpoint(
        &self,
        id: &EndpointId,
    ) -> impl std::future::Future<Output = Result<Option<Endpoint>, RepositoryError>> + Send;

    fn list_endpoints(
        &self,
        collection_id: &CollectionId,
    ) -> impl std::future::Future<Output = Result<Vec<Endpoint>, RepositoryError>> + Send;

    fn update_endpoint(
        &self,
        endpoint: &Endpoint,
    ) -> impl std::future::Future<Output = Result<Endpoint, RepositoryError>> + Send;

    fn delete_endpoint(
        &self,
        id: &EndpointId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Items directly under `parent` (the collection root when `None`), in order.
    fn list_items(
        &self,
        collection_id: &CollectionId,
        parent: Option<FolderId>,
    ) -> impl std::future::Future<Output = Result<Vec<CollectionItem>, RepositoryError>> + Send;

    fn move_item(
        &self,
        item_id: &CollectionItemId,
        target_id: &CollectionItemId,
        position: MovePosition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
