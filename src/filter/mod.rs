//! Cross-filter engine: one dataset per view, selections from any view
//! propagated as predicates to every linked view.

mod engine;
pub mod predicate;
pub mod spatial;
mod view;

pub use engine::{
    CacheState, CrossFilterEngine, FilterOrigin, Selection, SelectionEvent, SelectionOutcome,
};
pub use predicate::{Constraint, FilterPredicate};
pub use spatial::{IdRange, SpatialSelection, ids_to_range, selected_record_ids, spatial_to_predicate};
pub use view::{
    Dataset, NullViewRenderer, ProjectedRow, ViewBinding, ViewId, ViewKind, ViewRenderer,
};
