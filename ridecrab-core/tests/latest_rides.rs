use std::collections::HashMap;
use std::time::Duration;

use ridecrab_core::config::WindowConfig;
use ridecrab_core::ride::{LatestRidesAggregator, RidePoint, latest_rides};
use ridecrab_core::time::BoundedOutOfOrderness;
use ridecrab_core::types::StreamElement;
use ridecrab_core::window::{Pane, PaneTiming, TimeWindow};

fn engine(gap_ms: u64) -> LatestRidesAggregator {
    let config = WindowConfig::default()
        .with_gap(Duration::from_millis(gap_ms))
        .with_early_firing_delay(Some(Duration::from_millis(2)));
    latest_rides(&config).unwrap()
}

fn point(ride: &str, ts: i64, status: &str) -> StreamElement<RidePoint> {
    StreamElement::timestamped_record(RidePoint::new(ride, ts).with_status(status, 1), ts)
}

fn final_panes(out: &[StreamElement<Pane<RidePoint>>]) -> Vec<Pane<RidePoint>> {
    out.iter()
        .filter_map(|e| e.as_record())
        .map(|r| r.value.clone())
        .filter(|p| p.is_final())
        .collect()
}

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

#[test]
fn test_out_of_order_updates_single_window_latest_wins() {
    let mut engine = engine(60);
    let mut out = Vec::new();
    out.extend(engine.process(point("R1", 0, "pickup")).unwrap());
    out.extend(engine.process(point("R1", 10, "dropoff")).unwrap());
    out.extend(engine.process(point("R1", 5, "enroute")).unwrap());
    out.extend(engine.process(StreamElement::End).unwrap());

    let fired = final_panes(&out);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].value.timestamp, 10);
    assert_eq!(fired[0].value.ride_status, "dropoff");
    assert_eq!(fired[0].value.ride_id.as_deref(), Some("R1"));
}

#[test]
fn test_gap_exceeded_produces_two_windows() {
    let mut engine = engine(60);
    let mut out = Vec::new();
    out.extend(engine.process(point("R1", 0, "pickup")).unwrap());
    out.extend(engine.process(point("R1", 120, "dropoff")).unwrap());
    out.extend(engine.process(StreamElement::End).unwrap());

    let mut fired = final_panes(&out);
    fired.sort_by_key(|p| p.window.start);
    assert_eq!(fired.len(), 2);
    assert_eq!(fired[0].window, TimeWindow::new(0, 60));
    assert_eq!(fired[0].value.ride_status, "pickup");
    assert_eq!(fired[1].window, TimeWindow::new(120, 180));
    assert_eq!(fired[1].value.ride_status, "dropoff");
}

#[test]
fn test_unidentified_update_has_no_effect() {
    let mut engine = engine(60);
    let mut out = Vec::new();
    out.extend(engine.process(point("R1", 0, "pickup")).unwrap());
    out.extend(
        engine
            .process(StreamElement::timestamped_record(
                RidePoint::unidentified(30).with_status("ghost", 4),
                30,
            ))
            .unwrap(),
    );
    out.extend(engine.process(point("", 40, "blank")).unwrap());
    out.extend(engine.process(StreamElement::End).unwrap());

    let fired = final_panes(&out);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].value.ride_status, "pickup");
    assert_eq!(fired[0].window, TimeWindow::new(0, 60));
    assert_eq!(engine.stats().unkeyed_dropped, 2);
}

#[test]
fn test_equal_timestamps_keep_first_update() {
    let mut engine = engine(60);
    let mut out = Vec::new();
    out.extend(engine.process(point("R1", 7, "first")).unwrap());
    out.extend(engine.process(point("R1", 7, "second")).unwrap());
    out.extend(engine.process(StreamElement::End).unwrap());

    let fired = final_panes(&out);
    assert_eq!(fired[0].value.ride_status, "first");
}

#[test]
fn test_every_window_fires_exactly_one_final_pane() {
    let mut engine = engine(60);
    let mut out = Vec::new();
    for (ride, ts) in [("A", 0), ("B", 3), ("A", 200), ("C", 90), ("B", 50)] {
        out.extend(engine.process(point(ride, ts, "enroute")).unwrap());
    }
    out.extend(engine.process(StreamElement::End).unwrap());

    let fired = final_panes(&out);
    let mut per_window: HashMap<(String, TimeWindow), usize> = HashMap::new();
    for pane in &fired {
        let ride = pane.value.ride_id.clone().unwrap();
        *per_window.entry((ride, pane.window)).or_default() += 1;
    }
    // A: [0, 60) and [200, 260); B: [3, 110); C: [90, 150).
    assert_eq!(per_window.len(), 4);
    assert!(per_window.values().all(|count| *count == 1));
    assert_eq!(engine.open_window_count(), 0);
}

#[test]
fn test_shuffled_stream_with_watermarks_matches_expected_latest() {
    // Many rides, each reporting every 10ms for 200ms, delivered with up to
    // 40ms of disorder. Watermarks lag 50ms, so nothing is late.
    let rides = 6;
    let mut updates = Vec::new();
    for step in 0..20i64 {
        for ride in 0..rides {
            updates.push(
                RidePoint::new(format!("ride-{ride}"), step * 10).with_meter(step as f64, 0.1),
            );
        }
    }
    let mut state = 17u64;
    let mut arrival: Vec<(i64, RidePoint)> = updates
        .into_iter()
        .map(|p| {
            let jitter = (lcg_next(&mut state) >> 33) as i64 % 40;
            (p.timestamp + jitter, p)
        })
        .collect();
    arrival.sort_by_key(|(at, _)| *at);

    let mut watermarks = BoundedOutOfOrderness::new(Duration::from_millis(50));

    let mut engine = engine(60);
    let mut out = Vec::new();
    for (at, p) in arrival {
        out.extend(engine.on_processing_time(at).unwrap());
        let advanced = watermarks.observe(p.timestamp);
        out.extend(engine.process(StreamElement::record(p)).unwrap());
        if let Some(wm) = advanced {
            out.extend(engine.process(StreamElement::Watermark(wm)).unwrap());
        }
    }
    out.extend(engine.process(StreamElement::End).unwrap());

    assert_eq!(engine.stats().late_dropped, 0);
    let fired = final_panes(&out);
    assert_eq!(fired.len(), rides);
    for pane in fired {
        assert_eq!(pane.value.timestamp, 190);
        assert_eq!(pane.value.meter_reading, 19.0);
        assert_eq!(pane.window, TimeWindow::new(0, 250));
    }

    // Early panes depend on processing time; there is at most one per ride.
    let early = out
        .iter()
        .filter_map(|e| e.as_record())
        .filter(|r| r.value.timing == PaneTiming::Early)
        .count();
    assert!(early <= rides);
}
