use super::*;

// ── BoundedOutOfOrderness ────────────────────────────────────────────────

#[test]
fn test_watermark_trails_max_seen() {
    let mut bound = BoundedOutOfOrderness::new(Duration::from_secs(5));
    assert_eq!(bound.observe(10_000), Some(Watermark::new(5_000)));
    assert_eq!(bound.observe(20_000), Some(Watermark::new(15_000)));
}

#[test]
fn test_late_record_does_not_regress_or_repeat_watermark() {
    let mut bound = BoundedOutOfOrderness::new(Duration::from_secs(5));
    bound.observe(20_000);
    assert_eq!(bound.observe(5_000), None);
    assert_eq!(bound.observe(20_000), None);
    assert_eq!(bound.observe(20_001), Some(Watermark::new(15_001)));
}

#[test]
fn test_zero_delay_watermark() {
    let mut bound = BoundedOutOfOrderness::new(Duration::ZERO);
    assert_eq!(bound.observe(1_000), Some(Watermark::new(1_000)));
}

#[test]
fn test_watermark_saturates_near_min() {
    let mut bound = BoundedOutOfOrderness::new(Duration::from_secs(5));
    assert_eq!(bound.observe(EVENT_TIME_MIN + 10), None);
    assert_eq!(bound.observe(0), Some(Watermark::new(-5_000)));
}

#[test]
fn test_watermark_display() {
    let wm = Watermark::new(42_000);
    assert_eq!(wm.to_string(), "Watermark(42000ms)");
}

// ── watermarked ──────────────────────────────────────────────────────────

#[test]
fn test_watermarked_interleaves_records_watermarks_and_end() {
    let values = vec![("r1", 10), ("r2", 30), ("r1", 20), ("r2", 35)];
    let elements: Vec<StreamElement<(&str, i64)>> =
        watermarked(values, Duration::from_millis(10), |v: &(&str, i64)| v.1).collect();

    assert_eq!(
        elements,
        vec![
            StreamElement::timestamped_record(("r1", 10), 10),
            StreamElement::watermark(0),
            StreamElement::timestamped_record(("r2", 30), 30),
            StreamElement::watermark(20),
            StreamElement::timestamped_record(("r1", 20), 20),
            StreamElement::timestamped_record(("r2", 35), 35),
            StreamElement::watermark(25),
            StreamElement::End,
        ]
    );
}

#[test]
fn test_watermarked_empty_input_is_just_end() {
    let elements: Vec<StreamElement<i64>> =
        watermarked(Vec::<i64>::new(), Duration::ZERO, |v: &i64| *v).collect();
    assert_eq!(elements, vec![StreamElement::End]);
}

// ── WindowTimers ─────────────────────────────────────────────────────────

#[test]
fn test_timers_pop_earliest_first_per_domain() {
    let mut timers = WindowTimers::new();
    let w = TimeWindow::new(0, 60);
    timers.schedule(TimeDomain::EventTime, b"b", w, 30);
    timers.schedule(TimeDomain::EventTime, b"a", w, 10);
    timers.schedule(TimeDomain::ProcessingTime, b"a", w, 5);

    let first = timers.pop_due(TimeDomain::EventTime, 30).unwrap();
    assert_eq!((first.key_bytes.as_slice(), first.fire_at), (&b"a"[..], 10));
    let second = timers.pop_due(TimeDomain::EventTime, 30).unwrap();
    assert_eq!((second.key_bytes.as_slice(), second.fire_at), (&b"b"[..], 30));
    assert_eq!(timers.pop_due(TimeDomain::EventTime, 30), None);

    assert_eq!(timers.pending(TimeDomain::ProcessingTime), 1);
}

#[test]
fn test_timers_not_due_stay_queued() {
    let mut timers = WindowTimers::new();
    timers.schedule(TimeDomain::EventTime, b"k", TimeWindow::new(0, 60), 59);
    assert_eq!(timers.pop_due(TimeDomain::EventTime, 58), None);
    assert_eq!(timers.pending(TimeDomain::EventTime), 1);
    assert!(timers.pop_due(TimeDomain::EventTime, EVENT_TIME_MAX).is_some());
}

#[test]
fn test_timers_schedule_is_idempotent_and_cancel_is_exact() {
    let mut timers = WindowTimers::new();
    let w = TimeWindow::new(0, 60);
    timers.schedule(TimeDomain::EventTime, b"k", w, 59);
    timers.schedule(TimeDomain::EventTime, b"k", w, 59);
    assert_eq!(timers.pending(TimeDomain::EventTime), 1);

    // Wrong window, wrong time, wrong domain: nothing cancelled.
    assert!(!timers.cancel(TimeDomain::EventTime, b"k", TimeWindow::new(0, 61), 59));
    assert!(!timers.cancel(TimeDomain::EventTime, b"k", w, 60));
    assert!(!timers.cancel(TimeDomain::ProcessingTime, b"k", w, 59));

    assert!(timers.cancel(TimeDomain::EventTime, b"k", w, 59));
    assert_eq!(timers.pending(TimeDomain::EventTime), 0);
}

#[test]
fn test_timers_clear_one_domain() {
    let mut timers = WindowTimers::new();
    let w = TimeWindow::new(0, 60);
    timers.schedule(TimeDomain::EventTime, b"k", w, 59);
    timers.schedule(TimeDomain::ProcessingTime, b"k", w, 2);
    timers.clear(TimeDomain::ProcessingTime);
    assert_eq!(timers.pending(TimeDomain::ProcessingTime), 0);
    assert_eq!(timers.pending(TimeDomain::EventTime), 1);
}
