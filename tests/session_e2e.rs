//! End-to-end tests for camera sessions.
//!
//! Drive CameraSessionManager with scripted sources (and, on unix, real
//! child processes) and check lifecycle ordering, the frame cache and the
//! live-view termination contract.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use booth_cam::camera::{
    CameraKind, CaptureCommand, CaptureError, ProcessSettings, Resolution, SourceError,
    StillCommand,
};
use booth_cam::session::{
    CameraSessionManager, SessionError, SessionSettings, SessionState, StreamEvent, SystemSources,
};
use booth_cam::stream::StreamPublisher;
use common::{jpeg, wait_until, FakeFactory, Plan};
use futures_util::StreamExt;

fn manager_with(factory: &Arc<FakeFactory>) -> CameraSessionManager {
    CameraSessionManager::new(
        Arc::clone(factory) as Arc<dyn booth_cam::session::SourceFactory>,
        SessionSettings::default(),
    )
}

async fn collect_parts(publisher: StreamPublisher) -> Vec<String> {
    publisher
        .into_stream()
        .map(|part| String::from_utf8_lossy(&part.unwrap()).into_owned())
        .collect()
        .await
}

#[test]
fn test_stop_session_twice_is_harmless() {
    let factory = Arc::new(FakeFactory::new());
    let manager = manager_with(&factory);

    manager.stop_session();
    let _feed = manager.start_session(CameraKind::Process).unwrap();
    assert_eq!(manager.status().state, SessionState::Streaming);

    manager.stop_session();
    manager.stop_session();

    assert_eq!(manager.status().state, SessionState::Idle);
    let stops = factory
        .calls()
        .iter()
        .filter(|c| c.starts_with("stop"))
        .count();
    assert_eq!(stops, 1);
}

#[test]
fn test_switching_kind_stops_previous_source_first() {
    let factory = Arc::new(FakeFactory::new());
    let manager = manager_with(&factory);

    let mut first = manager.start_session(CameraKind::Process).unwrap();
    let second = manager.start_session(CameraKind::Device).unwrap();

    assert!(factory.position("stop process#1") < factory.position("start device#2"));
    assert_eq!(manager.status().kind, Some(CameraKind::Device));
    assert_eq!(manager.status().session_id, second.session_id());

    // The displaced viewer gets its terminal message and then nothing.
    assert_eq!(
        first.blocking_recv(),
        Some(StreamEvent::Ended("camera stopped".to_string()))
    );
    assert_eq!(first.blocking_recv(), None);
}

#[test]
fn test_start_clears_previous_cache() {
    let factory = Arc::new(FakeFactory::new().with_plan(
        CameraKind::Process,
        Plan {
            frames: vec![jpeg("old")],
            ..Plan::default()
        },
    ));
    let manager = manager_with(&factory);

    let mut feed = manager.start_session(CameraKind::Process).unwrap();
    assert!(matches!(feed.blocking_recv(), Some(StreamEvent::Frame(_))));
    assert!(manager.cache().get().is_some());

    let _feed = manager.start_session(CameraKind::Device).unwrap();
    assert!(manager.cache().get().is_none());
}

#[test]
fn test_capture_while_streaming_returns_latest_frame() {
    let factory = Arc::new(FakeFactory::new().with_plan(
        CameraKind::Device,
        Plan {
            frames: vec![jpeg("a"), jpeg("b")],
            ..Plan::default()
        },
    ));
    let manager = manager_with(&factory);

    let mut feed = manager.start_session(CameraKind::Device).unwrap();
    assert_eq!(feed.blocking_recv(), Some(StreamEvent::Frame(jpeg("a"))));
    assert_eq!(feed.blocking_recv(), Some(StreamEvent::Frame(jpeg("b"))));

    let still = manager.capture_still().unwrap();
    assert_eq!(still, jpeg("b"));
}

#[test]
fn test_capture_without_frames_is_no_frame_available() {
    let factory = Arc::new(FakeFactory::new());
    let manager = manager_with(&factory);

    match manager.capture_still() {
        Err(CaptureError::NoFrameAvailable) => (),
        other => panic!("Expected NoFrameAvailable, got {:?}", other),
    }
}

#[test]
fn test_start_failure_leaves_manager_idle() {
    let factory = Arc::new(FakeFactory::new().with_plan(
        CameraKind::Device,
        Plan {
            fail_start: true,
            ..Plan::default()
        },
    ));
    let manager = manager_with(&factory);

    match manager.start_session(CameraKind::Device) {
        Err(SessionError::Start(SourceError::DeviceUnavailable(msg))) => {
            assert!(msg.contains("device#1"))
        }
        other => panic!("Expected start failure, got {:?}", other.map(|_| ())),
    }

    let status = manager.status();
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(status.kind, None);
    // The half-acquired source is released.
    assert!(factory.calls().contains(&"stop device#1".to_string()));

    // A later session of another kind still starts.
    assert!(manager.start_session(CameraKind::Process).is_ok());
}

#[test]
fn test_viewer_disconnect_stops_source() {
    let factory = Arc::new(FakeFactory::new().with_plan(
        CameraKind::Process,
        Plan {
            repeat: Some(jpeg("live")),
            ..Plan::default()
        },
    ));
    let manager = manager_with(&factory);

    let mut feed = manager.start_session(CameraKind::Process).unwrap();
    assert!(matches!(feed.blocking_recv(), Some(StreamEvent::Frame(_))));
    drop(feed);

    assert!(wait_until(Duration::from_secs(2), || {
        factory.calls().contains(&"stop process#1".to_string())
    }));
    assert!(wait_until(Duration::from_secs(2), || {
        manager.status().state == SessionState::Idle
    }));
}

#[tokio::test]
async fn test_end_of_stream_yields_one_diagnostic() {
    let factory = Arc::new(FakeFactory::new().with_plan(
        CameraKind::Process,
        Plan {
            frames: vec![jpeg("1"), jpeg("2")],
            end_when_drained: true,
            ..Plan::default()
        },
    ));
    let manager = manager_with(&factory);

    let feed = manager.start_session(CameraKind::Process).unwrap();
    let parts = collect_parts(StreamPublisher::new(feed)).await;

    assert_eq!(parts.len(), 3);
    assert!(parts[0].contains("Content-Type: image/jpeg"));
    assert!(parts[1].contains("Content-Type: image/jpeg"));
    assert!(parts[2].contains("Content-Type: text/plain"));
    assert!(parts[2].contains("Camera error: camera stream ended"));

    assert!(wait_until(Duration::from_secs(2), || {
        manager.status().state == SessionState::Idle
    }));
}

#[test]
fn test_concurrent_start_stop_leaks_no_source() {
    let factory = Arc::new(FakeFactory::new().with_plan(
        CameraKind::Process,
        Plan {
            repeat: Some(jpeg("x")),
            ..Plan::default()
        },
    ));
    let manager = Arc::new(manager_with(&factory));

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for round in 0..10 {
                    if (i + round) % 3 == 0 {
                        manager.stop_session();
                    } else {
                        let kind = if round % 2 == 0 {
                            CameraKind::Process
                        } else {
                            CameraKind::Device
                        };
                        let _ = manager.start_session(kind);
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    manager.stop_session();

    let calls = factory.calls();
    let starts = calls.iter().filter(|c| c.starts_with("start")).count();
    let stops = calls.iter().filter(|c| c.starts_with("stop")).count();
    assert!(starts > 0);
    assert_eq!(starts, stops, "every started source is stopped: {:?}", calls);
    assert_eq!(manager.status().state, SessionState::Idle);
}

#[cfg(unix)]
fn shell_settings(script: &str) -> SystemSources {
    SystemSources {
        process: ProcessSettings {
            command: CaptureCommand {
                program: "/bin/sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
            },
            chunk_size: 7,
            stop_timeout: Duration::from_millis(500),
            max_buffer: 0,
        },
        device_index: 0,
        device_backoff: Duration::from_millis(5),
        device_resolution: Resolution::LIVE,
        device_framerate: 15,
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_capture_process_exiting_mid_stream() {
    let sources = shell_settings(
        "printf '\\377\\330one\\377\\331\\377\\330two\\377\\331\\377\\330trunc'; exit 0",
    );
    let manager = CameraSessionManager::new(Arc::new(sources), SessionSettings::default());

    let feed = manager.start_session(CameraKind::Process).unwrap();
    let parts = collect_parts(StreamPublisher::new(feed)).await;

    assert_eq!(parts.len(), 3, "parts: {:?}", parts);
    assert!(parts[0].contains("Content-Length: 7"));
    assert!(parts[1].contains("two"));
    assert!(parts[2].ends_with("Camera error: camera stream ended\r\n"));

    let cached = manager.cache().get().unwrap();
    assert_eq!(cached.as_bytes(), b"\xff\xd8two\xff\xd9");
}

#[cfg(unix)]
#[test]
fn test_stop_terminates_running_capture_process() {
    let sources = shell_settings("printf '\\377\\330one\\377\\331'; exec sleep 30");
    let manager = CameraSessionManager::new(Arc::new(sources), SessionSettings::default());

    let mut feed = manager.start_session(CameraKind::Process).unwrap();
    assert!(matches!(feed.blocking_recv(), Some(StreamEvent::Frame(_))));

    let started = std::time::Instant::now();
    manager.stop_session();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        feed.blocking_recv(),
        Some(StreamEvent::Ended("camera stopped".to_string()))
    );
    assert_eq!(manager.status().state, SessionState::Idle);
}

#[cfg(unix)]
#[test]
fn test_missing_capture_program_fails_to_start() {
    let mut sources = shell_settings("");
    sources.process.command.program = "/nonexistent/rpicam-vid".to_string();
    let manager = CameraSessionManager::new(Arc::new(sources), SessionSettings::default());

    match manager.start_session(CameraKind::Process) {
        Err(SessionError::Start(SourceError::ProgramNotFound(program))) => {
            assert_eq!(program, "/nonexistent/rpicam-vid")
        }
        other => panic!("Expected ProgramNotFound, got {:?}", other.map(|_| ())),
    }
    assert_eq!(manager.status().state, SessionState::Idle);
}

#[cfg(unix)]
#[test]
fn test_still_command_preferred_then_cache_fallback() {
    let factory = Arc::new(FakeFactory::new().with_plan(
        CameraKind::Process,
        Plan {
            frames: vec![jpeg("live")],
            ..Plan::default()
        },
    ));
    let ok_still = StillCommand {
        program: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), "printf '\\377\\330hi\\377\\331'".to_string()],
        timeout: Duration::from_secs(5),
    };
    let manager = CameraSessionManager::new(
        Arc::clone(&factory) as Arc<dyn booth_cam::session::SourceFactory>,
        SessionSettings {
            still: Some(ok_still),
            ..SessionSettings::default()
        },
    );
    assert_eq!(manager.capture_still().unwrap().as_bytes(), b"\xff\xd8hi\xff\xd9");

    let failing_still = StillCommand {
        program: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), "echo busy >&2; exit 1".to_string()],
        timeout: Duration::from_secs(5),
    };
    let manager = CameraSessionManager::new(
        Arc::clone(&factory) as Arc<dyn booth_cam::session::SourceFactory>,
        SessionSettings {
            still: Some(failing_still),
            ..SessionSettings::default()
        },
    );
    let mut feed = manager.start_session(CameraKind::Process).unwrap();
    assert!(matches!(feed.blocking_recv(), Some(StreamEvent::Frame(_))));
    assert_eq!(manager.capture_still().unwrap(), jpeg("live"));
}
