//! Readers and controllers hammering a live producer thread.

use std::thread;
use std::time::Duration;

use peak_monitor::config::Config;
use peak_monitor::error::MonitorResult;
use peak_monitor::processing::source::SampleSource;
use peak_monitor::{ControlState, Pipeline};

/// Every value encodes its own frame index, so a torn sample is detectable.
struct FrameEcho;

impl SampleSource for FrameEcho {
    fn next_value(&mut self, frame_index: u64) -> MonitorResult<f64> {
        Ok(frame_index as f64 * 2.0)
    }

    fn name(&self) -> String {
        "frame-echo".to_string()
    }
}

fn live_pipeline() -> Pipeline {
    let mut config = Config::default();
    config.processor.tick_rate_hz = 120;
    Pipeline::new(config).unwrap()
}

#[test]
fn concurrent_queries_see_consistent_snapshots() {
    let pipeline = live_pipeline();
    pipeline.start().unwrap();
    let scheduler = pipeline.spawn_scheduler(Box::new(FrameEcho)).unwrap();

    let readers: Vec<_> = (0..100)
        .map(|i| {
            let pipeline = pipeline.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    let snapshot = pipeline.query(100).unwrap();
                    assert!(snapshot.samples.len() <= 100);
                    for pair in snapshot.samples.windows(2) {
                        assert_eq!(pair[1].frame_index, pair[0].frame_index + 1);
                        assert!(pair[1].timestamp >= pair[0].timestamp);
                    }
                    for sample in &snapshot.samples {
                        assert_eq!(sample.value, sample.frame_index as f64 * 2.0);
                    }
                    if let Some(last) = snapshot.samples.last() {
                        assert_eq!(last.frame_index, snapshot.total_frame_count);
                    }
                    thread::sleep(Duration::from_millis(1 + (i % 7) as u64));
                }
            })
        })
        .collect();

    for reader in readers {
        reader.join().expect("reader panicked");
    }
    scheduler.shutdown();
    assert!(pipeline.status().total_frame_count > 0);
}

#[test]
fn concurrent_control_never_loses_ordering() {
    let pipeline = live_pipeline();
    pipeline.start().unwrap();
    let scheduler = pipeline.spawn_scheduler(Box::new(FrameEcho)).unwrap();

    let controllers: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = pipeline.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    // Races between controllers are expected to fail some transitions
                    let _ = pipeline.pause();
                    thread::sleep(Duration::from_millis(2));
                    let _ = pipeline.resume();
                    thread::sleep(Duration::from_millis(2));
                }
            })
        })
        .collect();
    for controller in controllers {
        controller.join().expect("controller panicked");
    }

    let state = pipeline.state();
    assert!(state == ControlState::Running || state == ControlState::Paused);
    scheduler.shutdown();

    let snapshot = pipeline.query(100).unwrap();
    for pair in snapshot.samples.windows(2) {
        assert_eq!(pair[1].frame_index, pair[0].frame_index + 1);
    }
}

#[test]
fn stop_halts_production_promptly() {
    let pipeline = live_pipeline();
    pipeline.start().unwrap();
    let scheduler = pipeline.spawn_scheduler(Box::new(FrameEcho)).unwrap();
    thread::sleep(Duration::from_millis(100));

    pipeline.stop().unwrap();
    let frozen = pipeline.status().total_frame_count;
    thread::sleep(Duration::from_millis(100));
    assert_eq!(pipeline.status().total_frame_count, frozen);
    assert_eq!(pipeline.state(), ControlState::Stopped);
    scheduler.shutdown();
}
