use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::Collection;
use crate::core::primitives::{datetime_to_unix_millis, unix_millis_to_datetime};
use crate::error::{DashError, DashResult};

const DAY_MILLIS: i64 = 86_400_000;

/// Largest accepted mark target; the slider cannot show more labels than this.
pub const MAX_MARK_TARGET_COUNT: usize = 1_000;

/// Tuning controls for slider bounds and mark generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeWindowTuning {
    /// Upper bound for the number of generated marks.
    pub mark_target_count: usize,
    /// Step used when the window collapses to a single instant.
    pub min_step_millis: f64,
}

impl Default for TimeWindowTuning {
    fn default() -> Self {
        Self {
            mark_target_count: 12,
            min_step_millis: 1.0,
        }
    }
}

impl TimeWindowTuning {
    pub fn validate(self) -> DashResult<Self> {
        if self.mark_target_count == 0 {
            return Err(DashError::InvalidConfig(
                "time window mark target count must be > 0".to_owned(),
            ));
        }
        if self.mark_target_count > MAX_MARK_TARGET_COUNT {
            return Err(DashError::InvalidConfig(format!(
                "time window mark target count must be <= {MAX_MARK_TARGET_COUNT}"
            )));
        }
        if !self.min_step_millis.is_finite() || self.min_step_millis <= 0.0 {
            return Err(DashError::InvalidConfig(
                "time window min step must be finite and > 0".to_owned(),
            ));
        }
        Ok(self)
    }
}

/// Shared slider domain across every collection, in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub min: DateTime<Utc>,
    pub max: DateTime<Utc>,
    pub min_millis: i64,
    pub max_millis: i64,
    pub step: f64,
    pub marks: BTreeMap<i64, String>,
}

impl TimeWindow {
    #[must_use]
    pub fn span_millis(&self) -> i64 {
        self.max_millis - self.min_millis
    }

    #[must_use]
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.min && time <= self.max
    }
}

/// Result of building a window. `NoWindow` means every collection was empty
/// and callers render a placeholder instead of a slider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WindowOutcome {
    Window(TimeWindow),
    NoWindow,
}

impl WindowOutcome {
    #[must_use]
    pub fn window(&self) -> Option<&TimeWindow> {
        match self {
            Self::Window(window) => Some(window),
            Self::NoWindow => None,
        }
    }

    #[must_use]
    pub fn is_no_window(&self) -> bool {
        matches!(self, Self::NoWindow)
    }

    /// The window, or [`DashError::NoData`] when there is nothing to show.
    pub fn require(&self) -> DashResult<&TimeWindow> {
        self.window().ok_or(DashError::NoData)
    }
}

pub fn build_time_window<'a, I>(collections: I) -> WindowOutcome
where
    I: IntoIterator<Item = &'a Collection>,
{
    build_time_window_tuned(collections, TimeWindowTuning::default())
}

/// Builds the union window from the first/last record of each collection.
///
/// Invalid tuning falls back to the defaults so a refresh never fails here.
pub fn build_time_window_tuned<'a, I>(collections: I, tuning: TimeWindowTuning) -> WindowOutcome
where
    I: IntoIterator<Item = &'a Collection>,
{
    let tuning = tuning.validate().unwrap_or_else(|err| {
        warn!(error = %err, "falling back to default time window tuning");
        TimeWindowTuning::default()
    });

    let bounds = collections
        .into_iter()
        .filter_map(Collection::bounds)
        .reduce(|(acc_min, acc_max), (min, max)| (acc_min.min(min), acc_max.max(max)));

    let Some((min, max)) = bounds else {
        debug!("no records in any collection, no time window");
        return WindowOutcome::NoWindow;
    };

    let min_millis = datetime_to_unix_millis(min);
    let max_millis = datetime_to_unix_millis(max);
    let span = max_millis - min_millis;
    let step = if span > 0 {
        span as f64 / tuning.mark_target_count as f64
    } else {
        tuning.min_step_millis
    };
    let marks = generate_marks(min_millis, max_millis, tuning.mark_target_count);

    debug!(
        min = %min,
        max = %max,
        step,
        marks = marks.len(),
        "built time window"
    );

    WindowOutcome::Window(TimeWindow {
        min,
        max,
        min_millis,
        max_millis,
        step,
        marks,
    })
}

fn generate_marks(min_millis: i64, max_millis: i64, target_count: usize) -> BTreeMap<i64, String> {
    let span = max_millis - min_millis;
    let with_time = span < 2 * DAY_MILLIS;
    let mut marks = BTreeMap::new();

    if span <= 0 || target_count == 1 {
        marks.insert(min_millis, mark_label(min_millis, with_time));
        return marks;
    }

    let intervals = (target_count - 1) as f64;
    for i in 0..target_count {
        let offset = (span as f64 * i as f64 / intervals).round() as i64;
        let at = (min_millis + offset).min(max_millis);
        marks
            .entry(at)
            .or_insert_with(|| mark_label(at, with_time));
    }
    marks
}

fn mark_label(millis: i64, with_time: bool) -> String {
    match unix_millis_to_datetime(millis) {
        Ok(time) if with_time => time.format("%m-%d %H:%M").to_string(),
        Ok(time) => time.format("%Y-%m-%d").to_string(),
        Err(_) => millis.to_string(),
    }
}
