use crate::core::Record;

/// Returns records whose `start_at` falls inside an inclusive millisecond window.
#[must_use]
pub fn records_in_time_window(records: &[Record], start_millis: i64, end_millis: i64) -> Vec<Record> {
    let (min_t, max_t) = if start_millis <= end_millis {
        (start_millis, end_millis)
    } else {
        (end_millis, start_millis)
    };

    records
        .iter()
        .filter(|record| {
            let at = record.start_at_millis();
            at >= min_t && at <= max_t
        })
        .cloned()
        .collect()
}
