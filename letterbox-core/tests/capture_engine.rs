use std::thread;
use std::time::{Duration, Instant};

use letterbox_core::buffering::{create_device_ring, Producer};
use letterbox_core::{CaptureConfig, CaptureEngine, CaptureEvent, EngineConfig, LetterboxError};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

fn ramp(start: usize, len: usize) -> Vec<f32> {
    (start..start + len).map(|i| i as f32).collect()
}

fn engine(duration_ms: u32, pre_recording_duration_ms: u32) -> CaptureEngine {
    CaptureEngine::new(EngineConfig {
        capture: CaptureConfig {
            sample_rate: 16_000,
            duration_ms,
            pre_recording_duration_ms,
        },
        block_size: 1_024,
    })
}

fn recv_event_with_timeout(
    rx: &mut broadcast::Receiver<CaptureEvent>,
    timeout: Duration,
) -> CaptureEvent {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    panic!("timed out waiting for capture event");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("capture channel closed unexpectedly"),
        }
    }
}

#[test]
fn recording_from_a_source_stops_when_the_buffer_fills() {
    let engine = engine(100, 0);
    let session = engine.session();
    let mut events = {
        let mut session = session.lock();
        session.start_recording();
        session.subscribe()
    };

    let (mut producer, consumer) = create_device_ring();
    let source = ramp(0, 4_000);
    assert_eq!(producer.push_slice(&source), source.len());
    engine.start_with_source(consumer).expect("start");

    loop {
        if recv_event_with_timeout(&mut events, Duration::from_secs(5))
            == CaptureEvent::RecordingStopped
        {
            break;
        }
    }
    engine.stop().expect("stop");

    let session = session.lock();
    assert_eq!(session.samples().data(), ramp(0, 1_600).as_slice());
    assert!(session.samples().is_full());

    let diagnostics = engine.diagnostics_snapshot();
    assert_eq!(diagnostics.samples_in, source.len());
    assert!(diagnostics.blocks_in >= 2);
}

#[test]
fn pre_recording_keeps_only_the_latest_window() {
    let engine = engine(1_000, 100);
    let session = engine.session();
    session.lock().start_pre_recording();

    let (mut producer, consumer) = create_device_ring();
    producer.push_slice(&ramp(0, 5_000));
    engine.start_with_source(consumer).expect("start");

    let start = Instant::now();
    while engine.diagnostics_snapshot().samples_in < 5_000 && start.elapsed() < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(5));
    }
    engine.stop().expect("stop");

    assert_eq!(session.lock().samples().data(), ramp(3_400, 1_600).as_slice());
}

#[test]
fn engine_rejects_double_start_and_idle_stop() {
    let engine = engine(100, 0);
    assert!(matches!(engine.stop(), Err(LetterboxError::NotRunning)));

    let (_first_producer, first) = create_device_ring();
    engine.start_with_source(first).expect("start");
    assert!(engine.is_running());

    let (_second_producer, second) = create_device_ring();
    assert!(matches!(
        engine.start_with_source(second),
        Err(LetterboxError::AlreadyRunning)
    ));

    engine.stop().expect("stop");
    assert!(!engine.is_running());
}
