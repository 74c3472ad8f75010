//! Delta-overlay engine.
//!
//! A delta example never copies its parent's headers, queries, url-encoded
//! fields or assertions. It stores rank-ordered references to them plus
//! its own delta-only rows and per-row overrides, and [`resolve`] merges
//! the three into the effective list.

pub mod rank;
pub mod resolve;

use apiflow_types::error::RepositoryError;
use uuid::Uuid;

pub use rank::RankError;
pub use resolve::{
    MovePlan, OverlayFields, append_rank, max_revision, plan_move, resolve, seed_rows,
    sort_order, unreferenced_origins,
};

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("overlay item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("move target not found: {0}")]
    TargetNotFound(Uuid),

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("example is not a delta example")]
    NotDelta,

    #[error(transparent)]
    Rank(#[from] RankError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
