use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use indexmap::IndexMap;
use telemetry_dash::core::{Collection, CollectionKind, FieldValue, Record};
use telemetry_dash::error::{DashError, DashResult};
use telemetry_dash::filter::{
    CrossFilterEngine, Dataset, FilterPredicate, NullViewRenderer, SelectionEvent,
    SelectionOutcome, SpatialSelection, ViewBinding, ViewId, ViewRenderer,
};

type RenderLog = Rc<RefCell<Vec<(String, usize)>>>;

struct LoggingRenderer {
    log: RenderLog,
}

impl ViewRenderer for LoggingRenderer {
    fn render(&mut self, view: &ViewBinding, dataset: &Dataset) -> DashResult<()> {
        self.log
            .borrow_mut()
            .push((view.id.to_string(), dataset.len()));
        Ok(())
    }
}

struct FailingRenderer;

impl ViewRenderer for FailingRenderer {
    fn render(&mut self, _view: &ViewBinding, _dataset: &Dataset) -> DashResult<()> {
        Err(DashError::InvalidData("figure backend down".to_owned()))
    }
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0)
        .single()
        .expect("valid date")
}

fn collections() -> IndexMap<CollectionKind, Collection> {
    let trips = (1..=5)
        .map(|i| {
            let n = f64::from(i);
            Record::new(base() + Duration::days(i64::from(i)))
                .with_field("lat", 48.0 + n * 0.1)
                .with_field("long", 2.0 + n * 0.1)
                .with_field("speed_average", 20.0 * n)
                .with_field("consumption_km", 0.1 + n * 0.01)
                .with_field("distance", 10.0 * n)
        })
        .collect();
    let chargings = (1..=3)
        .map(|i| {
            Record::new(base() + Duration::days(2 * i64::from(i)) + Duration::hours(12))
                .with_field("price", 4.0 + f64::from(i))
                .with_field("start_level", 20.0)
        })
        .collect();

    let mut collections = IndexMap::new();
    collections.insert(
        CollectionKind::Trips,
        Collection::new(CollectionKind::Trips, trips),
    );
    collections.insert(
        CollectionKind::Chargings,
        Collection::new(CollectionKind::Chargings, chargings),
    );
    collections
}

fn engine_with_log() -> (CrossFilterEngine, RenderLog) {
    let log = RenderLog::default();
    let mut engine = CrossFilterEngine::new();
    let bindings = [
        ViewBinding::map("trips_map", CollectionKind::Trips, "lat", "long", &["start_at"]),
        ViewBinding::table("trips_table", CollectionKind::Trips),
        ViewBinding::table("chargings_table", CollectionKind::Chargings),
        ViewBinding::graph(
            "consumption_fig",
            CollectionKind::Trips,
            "start_at",
            &["consumption_km"],
        ),
        ViewBinding::graph(
            "speed_fig",
            CollectionKind::Trips,
            "speed_average",
            &["consumption_km"],
        ),
    ];
    for binding in bindings {
        engine
            .register(binding, Box::new(LoggingRenderer { log: Rc::clone(&log) }))
            .expect("register view");
    }
    engine.load_sources(&collections());
    log.borrow_mut().clear();
    (engine, log)
}

fn ids(engine: &CrossFilterEngine, view: &str) -> Vec<u64> {
    engine.dataset(&ViewId::from(view)).expect("dataset").ids()
}

#[test]
fn load_sources_renders_every_view_with_full_data() {
    let log = RenderLog::default();
    let mut engine = CrossFilterEngine::new();
    engine
        .register(
            ViewBinding::table("trips_table", CollectionKind::Trips),
            Box::new(LoggingRenderer { log: Rc::clone(&log) }),
        )
        .expect("register");
    assert!(engine.needs_rebuild());

    engine.load_sources(&collections());
    assert!(!engine.needs_rebuild());
    assert_eq!(log.borrow().as_slice(), &[("trips_table".to_owned(), 5)]);
}

#[test]
fn map_selection_of_ids_two_and_three_filters_trip_table_to_those_rows() {
    let (mut engine, _log) = engine_with_log();

    let outcome = engine.apply_selection(SelectionEvent::spatial(
        "trips_map",
        SpatialSelection::Points {
            record_ids: vec![3, 2],
        },
    ));

    assert!(matches!(outcome, SelectionOutcome::Applied { .. }));
    assert_eq!(ids(&engine, "trips_table"), vec![2, 3]);
    assert_eq!(ids(&engine, "consumption_fig"), vec![2, 3]);
    assert_eq!(ids(&engine, "trips_map"), vec![1, 2, 3, 4, 5]);
    assert_eq!(ids(&engine, "chargings_table"), vec![1, 2, 3]);
    assert!(!outcome.affected().contains(&ViewId::from("chargings_table")));
}

#[test]
fn map_bounding_box_resolves_through_record_ids() {
    let (mut engine, _log) = engine_with_log();

    engine.apply_selection(SelectionEvent::spatial(
        "trips_map",
        SpatialSelection::BoundingBox {
            lat_min: 48.35,
            lat_max: 48.15,
            long_min: 2.0,
            long_max: 3.0,
        },
    ));

    assert_eq!(ids(&engine, "trips_table"), vec![2, 3]);
}

#[test]
fn selection_on_field_other_views_lack_joins_through_start_at() {
    let (mut engine, _log) = engine_with_log();

    let outcome = engine.apply_selection(SelectionEvent::predicate(
        "speed_fig",
        FilterPredicate::range("speed_average", 40.0, 60.0),
    ));

    assert!(matches!(outcome, SelectionOutcome::Applied { .. }));
    assert_eq!(ids(&engine, "trips_table"), vec![2, 3]);
    assert_eq!(ids(&engine, "consumption_fig"), vec![2, 3]);
    assert_eq!(ids(&engine, "trips_map"), vec![2, 3]);
    assert_eq!(ids(&engine, "speed_fig"), vec![1, 2, 3, 4, 5]);
    assert_eq!(ids(&engine, "chargings_table"), vec![1, 2, 3]);
}

#[test]
fn start_at_selection_crosses_collections() {
    let (mut engine, _log) = engine_with_log();
    let from = base() + Duration::days(1);
    let to = base() + Duration::days(3);

    engine.apply_selection(SelectionEvent::predicate(
        "consumption_fig",
        FilterPredicate::range("start_at", from, to),
    ));

    assert_eq!(ids(&engine, "trips_table"), vec![1, 2, 3]);
    assert_eq!(ids(&engine, "chargings_table"), vec![1]);
}

#[test]
fn applying_the_same_selection_twice_is_idempotent() {
    let (mut engine, _log) = engine_with_log();
    let event = SelectionEvent::predicate(
        "speed_fig",
        FilterPredicate::range("speed_average", 30.0, 90.0),
    );

    engine.apply_selection(event.clone());
    let once = engine
        .dataset(&ViewId::from("trips_table"))
        .cloned()
        .expect("dataset");
    engine.apply_selection(event);
    let twice = engine
        .dataset(&ViewId::from("trips_table"))
        .cloned()
        .expect("dataset");

    assert_eq!(once, twice);
}

#[test]
fn clearing_restores_the_exact_unfiltered_dataset() {
    let (mut engine, _log) = engine_with_log();
    let original = engine
        .dataset(&ViewId::from("trips_table"))
        .cloned()
        .expect("dataset");

    engine.apply_selection(SelectionEvent::predicate(
        "speed_fig",
        FilterPredicate::range("speed_average", 40.0, 40.0),
    ));
    assert_eq!(ids(&engine, "trips_table"), vec![2]);

    let outcome = engine.apply_selection(SelectionEvent::clear("speed_fig"));
    assert!(matches!(outcome, SelectionOutcome::Cleared { .. }));
    assert_eq!(
        engine.dataset(&ViewId::from("trips_table")),
        Some(&original)
    );
}

#[test]
fn empty_map_selection_acts_as_clear() {
    let (mut engine, _log) = engine_with_log();
    engine.apply_selection(SelectionEvent::spatial(
        "trips_map",
        SpatialSelection::Points {
            record_ids: vec![4],
        },
    ));
    assert_eq!(ids(&engine, "trips_table"), vec![4]);

    let outcome = engine.apply_selection(SelectionEvent::spatial(
        "trips_map",
        SpatialSelection::Points { record_ids: vec![] },
    ));
    assert!(matches!(outcome, SelectionOutcome::Cleared { .. }));
    assert_eq!(ids(&engine, "trips_table"), vec![1, 2, 3, 4, 5]);
}

#[test]
fn predicate_on_undeclared_field_is_rejected_without_changes() {
    let (mut engine, log) = engine_with_log();

    let outcome = engine.apply_selection(SelectionEvent::predicate(
        "consumption_fig",
        FilterPredicate::range("distance", 0.0, 20.0),
    ));

    assert!(matches!(outcome, SelectionOutcome::Rejected { .. }));
    assert!(outcome.affected().is_empty());
    assert_eq!(ids(&engine, "trips_table"), vec![1, 2, 3, 4, 5]);
    assert!(log.borrow().is_empty());
}

#[test]
fn malformed_selections_degrade_to_no_filter() {
    let (mut engine, _log) = engine_with_log();

    let unknown_view = engine.apply_selection(SelectionEvent::clear("nope"));
    let spatial_on_table = engine.apply_selection(SelectionEvent::spatial(
        "trips_table",
        SpatialSelection::Points {
            record_ids: vec![1],
        },
    ));
    let out_of_range_ids = engine.apply_selection(SelectionEvent::spatial(
        "trips_map",
        SpatialSelection::Points {
            record_ids: vec![42, 99],
        },
    ));
    let incomparable = engine.apply_selection(SelectionEvent::predicate(
        "speed_fig",
        FilterPredicate::range("speed_average", FieldValue::Bool(true), 3.0),
    ));

    for outcome in [unknown_view, spatial_on_table, out_of_range_ids, incomparable] {
        assert!(matches!(outcome, SelectionOutcome::Rejected { .. }));
    }
    assert_eq!(ids(&engine, "trips_table"), vec![1, 2, 3, 4, 5]);
}

#[test]
fn global_range_and_view_selection_compose() {
    let (mut engine, _log) = engine_with_log();
    let from = base() + Duration::days(2);
    let to = base() + Duration::days(5);

    engine.apply_global(FilterPredicate::range("start_at", from, to));
    assert_eq!(ids(&engine, "trips_table"), vec![2, 3, 4, 5]);
    assert_eq!(ids(&engine, "trips_map"), vec![2, 3, 4, 5]);
    assert_eq!(ids(&engine, "chargings_table"), vec![1, 2]);

    engine.apply_selection(SelectionEvent::spatial(
        "trips_map",
        SpatialSelection::Points {
            record_ids: vec![1, 2, 3],
        },
    ));
    assert_eq!(ids(&engine, "trips_table"), vec![2, 3]);

    engine.apply_selection(SelectionEvent::clear("trips_map"));
    assert_eq!(ids(&engine, "trips_table"), vec![2, 3, 4, 5]);

    engine.clear_global();
    assert_eq!(ids(&engine, "trips_table"), vec![1, 2, 3, 4, 5]);
    assert_eq!(ids(&engine, "chargings_table"), vec![1, 2, 3]);
}

#[test]
fn replacing_a_selection_restores_views_it_no_longer_targets() {
    let (mut engine, _log) = engine_with_log();
    let from = base() + Duration::days(1);
    let to = base() + Duration::days(2);

    engine.apply_selection(SelectionEvent::predicate(
        "trips_table",
        FilterPredicate::range("start_at", from, to),
    ));
    assert_eq!(ids(&engine, "chargings_table"), Vec::<u64>::new());

    let outcome = engine.apply_selection(SelectionEvent::predicate(
        "trips_table",
        FilterPredicate::range("start_at", to, to + Duration::days(10)),
    ));
    assert!(outcome.affected().contains(&ViewId::from("chargings_table")));
    assert_eq!(ids(&engine, "chargings_table"), vec![1, 2, 3]);
}

#[test]
fn render_callbacks_receive_filtered_datasets() {
    let (mut engine, log) = engine_with_log();

    engine.apply_selection(SelectionEvent::spatial(
        "trips_map",
        SpatialSelection::Points {
            record_ids: vec![2, 3],
        },
    ));

    let log = log.borrow();
    assert!(log.contains(&("trips_table".to_owned(), 2)));
    assert!(log.contains(&("consumption_fig".to_owned(), 2)));
    assert!(!log.iter().any(|(view, _)| view == "trips_map"));
}

#[test]
fn failing_renderer_does_not_block_other_views() {
    let mut engine = CrossFilterEngine::new();
    engine
        .register(
            ViewBinding::graph("speed_fig", CollectionKind::Trips, "speed_average", &[]),
            Box::new(NullViewRenderer::default()),
        )
        .expect("register");
    engine
        .register(
            ViewBinding::table("broken", CollectionKind::Trips),
            Box::new(FailingRenderer),
        )
        .expect("register");
    engine
        .register(
            ViewBinding::table("trips_table", CollectionKind::Trips),
            Box::new(NullViewRenderer::default()),
        )
        .expect("register");
    engine.load_sources(&collections());

    let outcome = engine.apply_selection(SelectionEvent::predicate(
        "speed_fig",
        FilterPredicate::equals("speed_average", 100.0),
    ));

    assert_eq!(outcome.affected().len(), 2);
    assert_eq!(ids(&engine, "broken"), vec![5]);
    assert_eq!(ids(&engine, "trips_table"), vec![5]);
}

#[test]
fn selections_wait_for_a_rebuild_after_invalidation() {
    let (mut engine, _log) = engine_with_log();
    engine.invalidate();

    let outcome = engine.apply_selection(SelectionEvent::predicate(
        "speed_fig",
        FilterPredicate::range("speed_average", 40.0, 60.0),
    ));
    assert!(matches!(outcome, SelectionOutcome::Rejected { .. }));

    engine.load_sources(&collections());
    let outcome = engine.apply_selection(SelectionEvent::predicate(
        "speed_fig",
        FilterPredicate::range("speed_average", 40.0, 60.0),
    ));
    assert!(matches!(outcome, SelectionOutcome::Applied { .. }));
}

#[test]
fn reload_keeps_active_filters_and_resolves_them_against_new_rows() {
    let (mut engine, _log) = engine_with_log();
    engine.apply_global(FilterPredicate::time_range(
        (base() + Duration::days(2)).timestamp_millis(),
        (base() + Duration::days(9)).timestamp_millis(),
    ));
    engine.apply_selection(SelectionEvent::predicate(
        "speed_fig",
        FilterPredicate::range("speed_average", 40.0, 60.0),
    ));
    assert_eq!(ids(&engine, "consumption_fig"), vec![2, 3]);

    let mut reloaded = collections();
    let trips = reloaded
        .shift_remove(&CollectionKind::Trips)
        .expect("trips")
        .into_records()
        .into_iter()
        .map(|mut record| {
            if record.id == 4 {
                record
                    .set("speed_average", FieldValue::Number(50.0))
                    .expect("writable field");
            }
            record
        })
        .collect();
    reloaded.insert(
        CollectionKind::Trips,
        Collection::new(CollectionKind::Trips, trips),
    );
    engine.invalidate();
    engine.load_sources(&reloaded);

    assert_eq!(engine.active_origins().len(), 2);
    assert_eq!(ids(&engine, "trips_table"), vec![2, 3, 4]);
    assert_eq!(ids(&engine, "consumption_fig"), vec![2, 3, 4]);
    assert_eq!(ids(&engine, "chargings_table"), vec![1, 2, 3]);
    assert_eq!(ids(&engine, "speed_fig"), vec![2, 3, 4, 5]);

    engine.clear_global();
    engine.apply_selection(SelectionEvent::clear("speed_fig"));
    assert_eq!(ids(&engine, "trips_table"), vec![1, 2, 3, 4, 5]);
}

#[test]
fn clear_all_restores_every_view_from_its_full_dataset() {
    let (mut engine, _log) = engine_with_log();
    engine.apply_global(FilterPredicate::time_range(
        (base() + Duration::days(4)).timestamp_millis(),
        (base() + Duration::days(9)).timestamp_millis(),
    ));
    engine.apply_selection(SelectionEvent::predicate(
        "speed_fig",
        FilterPredicate::range("speed_average", 0.0, 80.0),
    ));
    assert_eq!(ids(&engine, "trips_table"), vec![4]);
    assert_eq!(engine.active_origins().len(), 2);

    let outcome = engine.clear_all();

    assert!(matches!(outcome, SelectionOutcome::Cleared { .. }));
    assert!(engine.active_origins().is_empty());
    for view in ["trips_table", "chargings_table", "trips_map", "consumption_fig"] {
        let id = ViewId::from(view);
        assert_eq!(engine.dataset(&id), engine.full_dataset(&id));
    }
}

#[test]
fn declared_filterable_fields_extend_a_view() {
    let mut engine = CrossFilterEngine::new();
    engine
        .register(
            ViewBinding::table("trips_table", CollectionKind::Trips)
                .with_filterable(&["start_at", "distance"]),
            Box::new(NullViewRenderer::default()),
        )
        .expect("register");
    engine
        .register(
            ViewBinding::graph("consumption_fig", CollectionKind::Trips, "start_at", &["consumption_km"]),
            Box::new(NullViewRenderer::default()),
        )
        .expect("register");
    engine.load_sources(&collections());

    engine.apply_selection(SelectionEvent::predicate(
        "trips_table",
        FilterPredicate::range("distance", 25.0, 45.0),
    ));

    let consumption = engine
        .dataset(&ViewId::from("consumption_fig"))
        .expect("dataset");
    assert_eq!(consumption.ids(), vec![3, 4]);
    let (low, high) = consumption.extent("consumption_km").expect("extent");
    approx::assert_relative_eq!(low, 0.13, epsilon = 1e-12);
    approx::assert_relative_eq!(high, 0.14, epsilon = 1e-12);
}

#[test]
fn box_over_empty_map_area_empties_linked_views() {
    let (mut engine, _log) = engine_with_log();

    let outcome = engine.apply_selection(SelectionEvent::spatial(
        "trips_map",
        SpatialSelection::BoundingBox {
            lat_min: 10.0,
            lat_max: 11.0,
            long_min: 2.0,
            long_max: 3.0,
        },
    ));

    assert!(matches!(outcome, SelectionOutcome::Applied { .. }));
    assert!(ids(&engine, "trips_table").is_empty());
    assert!(ids(&engine, "consumption_fig").is_empty());
    assert_eq!(ids(&engine, "chargings_table"), vec![1, 2, 3]);
}
