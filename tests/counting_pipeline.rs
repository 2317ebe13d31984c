//! End-to-end tests for the counting pipeline.
//!
//! These tests verify that:
//! 1. Recorded detections replay through filter, denoiser and state machine
//! 2. `person` events are published for every frame
//! 3. `person/duration` events are published once per closed episode
//! 4. Counting works the same with and without a publisher

use std::io::Write;

use people_counter::{
    open_source, CountPayload, CountingSettings, DetectionSource, DurationPayload, EventPublisher,
    JsonLinesPublisher, PeopleCounter, PublishedEvent, RecordingPublisher, ReplaySource,
    ScriptedSource, Transition,
};

fn run(counter: &mut PeopleCounter, source: &mut dyn DetectionSource) -> Vec<Transition> {
    let mut transitions = Vec::new();
    while let Some(frame) = source.next_frame().expect("read frame") {
        transitions.push(counter.process_frame(&frame).expect("process frame").transition);
    }
    transitions
}

fn person_line(frame: u64, confidences: &[f32]) -> String {
    let detections: Vec<String> = confidences
        .iter()
        .map(|c| {
            format!(
                r#"{{"label": "person", "confidence": {}, "bbox": [0.1, 0.1, 0.3, 0.9]}}"#,
                c
            )
        })
        .collect();
    format!(
        r#"{{"frame": {}, "detections": [{}]}}"#,
        frame,
        detections.join(", ")
    )
}

#[test]
fn replayed_visit_produces_total_and_duration() {
    // Ten empty frames, one person for 20 frames (with two dropouts and a
    // low-confidence false positive), then empty again.
    let mut lines = Vec::new();
    let mut frame = 0u64;
    for _ in 0..10 {
        lines.push(person_line(frame, &[0.2]));
        frame += 1;
    }
    for i in 0..20 {
        let confidences: &[f32] = if i == 7 || i == 13 { &[] } else { &[0.85] };
        lines.push(person_line(frame, confidences));
        frame += 1;
    }
    for _ in 0..15 {
        lines.push(person_line(frame, &[]));
        frame += 1;
    }

    let mut file = tempfile::NamedTempFile::new().expect("temp log");
    writeln!(file, "{}", lines.join("\n")).expect("write log");

    let recorder = RecordingPublisher::new();
    let settings = CountingSettings::new(0.5, 10.0, 5)
        .unwrap()
        .with_strict_sequence(true);
    let mut counter = PeopleCounter::new(settings)
        .unwrap()
        .with_publisher(Box::new(recorder.clone()));
    let mut source = ReplaySource::open(file.path()).expect("open log");

    let transitions = run(&mut counter, &mut source);
    assert_eq!(transitions.len(), 45);

    let increases = transitions
        .iter()
        .filter(|t| matches!(t, Transition::Increase { .. }))
        .count();
    let decreases = transitions
        .iter()
        .filter(|t| matches!(t, Transition::Decrease { .. }))
        .count();
    assert_eq!(increases, 1, "dropouts must not split the visit");
    assert_eq!(decreases, 1);

    let summary = counter.finish().unwrap();
    assert_eq!(summary.frames_processed, 45);
    assert_eq!(summary.total, 1);
    assert_eq!(summary.current_count, 0);
    assert_eq!(summary.episodes_closed, 1);

    let events = recorder.events();
    let counts = events
        .iter()
        .filter(|e| matches!(e, PublishedEvent::Count(_)))
        .count();
    assert_eq!(counts, 45);

    // Window 5 flips to 1 on the third positive frame (index 12) and back to 0
    // on the third empty frame (index 32): 19 steady frames in between.
    let durations = recorder.durations();
    assert_eq!(durations.len(), 1);
    assert!((durations[0] - 1.9).abs() < 1e-9, "{:?}", durations);

    assert_eq!(
        events.last(),
        Some(&PublishedEvent::Count(CountPayload { count: 0, total: 1 }))
    );
}

#[test]
fn scripted_source_counts_group_arrivals() {
    let mut source = open_source("stub://0,0,2,2,2,3,3,3,1,1,1,0,0,0").expect("stub source");
    let settings = CountingSettings::new(0.5, 10.0, 1).unwrap();
    let mut counter = PeopleCounter::new(settings).unwrap();

    let transitions = run(&mut counter, source.as_mut());
    assert_eq!(transitions[2], Transition::Increase { entered: 2 });
    assert_eq!(transitions[5], Transition::Increase { entered: 1 });
    assert_eq!(transitions[8], Transition::Decrease { left: 2 });
    assert_eq!(transitions[11], Transition::Decrease { left: 1 });

    let summary = counter.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.episodes_closed, 2);
}

#[test]
fn counting_is_identical_without_publisher() {
    let script = "stub://0,1,1,0,1,2,2,2,1,0,0,3,3,0";
    let settings = CountingSettings::new(0.5, 10.0, 3).unwrap();

    let recorder = RecordingPublisher::new();
    let mut published = PeopleCounter::new(settings.clone())
        .unwrap()
        .with_publisher(Box::new(recorder.clone()));
    let mut silent = PeopleCounter::new(settings).unwrap();

    let mut a = ScriptedSource::parse(script).unwrap();
    let mut b = ScriptedSource::parse(script).unwrap();
    while let (Some(fa), Some(fb)) = (a.next_frame().unwrap(), b.next_frame().unwrap()) {
        assert_eq!(
            published.process_frame(&fa).unwrap(),
            silent.process_frame(&fb).unwrap()
        );
    }
    assert_eq!(published.summary(), silent.summary());
    assert!(!recorder.events().is_empty());
}

#[test]
fn json_lines_publisher_emits_both_channels() {
    let settings = CountingSettings::new(0.5, 10.0, 1).unwrap();
    let mut counter = PeopleCounter::new(settings).unwrap();
    let mut publisher = JsonLinesPublisher::new(Vec::new(), None);

    let mut source = ScriptedSource::parse("stub://1,1,0").unwrap();
    while let Some(frame) = source.next_frame().unwrap() {
        let report = counter.process_frame(&frame).unwrap();
        publisher
            .publish_count(CountPayload {
                count: report.stable_count,
                total: report.total,
            })
            .unwrap();
        if let Some(duration) = report.duration {
            publisher
                .publish_duration(DurationPayload { duration })
                .unwrap();
        }
    }

    let output = String::from_utf8(publisher.into_inner()).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[3],
        r#"{"topic":"person/duration","payload":{"duration":0.1}}"#
    );
}
