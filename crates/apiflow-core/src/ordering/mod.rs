//! Ordered-list storage algorithms (prev/next linked rows).

pub mod linked;

pub use linked::{
    Linked, Links, ListDefect, PointerUpdate, ReorderError, Walk, check_well_formed, moved_order,
    relink_plan, sort_linked, walk,
};
