pub mod primitives;
pub mod time_window;
pub mod types;
pub mod windowing;

pub use time_window::{
    MAX_MARK_TARGET_COUNT, TimeWindow, TimeWindowTuning, WindowOutcome, build_time_window,
    build_time_window_tuned,
};
pub use types::{
    Collection, CollectionKind, FIELD_END_AT, FIELD_ID, FIELD_START_AT, FieldValue, Record,
};
pub use windowing::records_in_time_window;
