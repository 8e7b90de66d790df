//! Scripted camera sources shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use booth_cam::camera::{CameraKind, CameraSource, Frame, NextFrame, SourceError};
use booth_cam::session::SourceFactory;

/// Shared record of source calls, in order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// What a fake source does once started.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub frames: Vec<Frame>,
    /// Report end of stream once `frames` is drained, instead of blocking
    pub end_when_drained: bool,
    /// Keep producing this frame every few milliseconds
    pub repeat: Option<Frame>,
    pub fail_start: bool,
}

struct FakeState {
    stopped: bool,
    frames: VecDeque<Frame>,
}

/// A [`CameraSource`] that plays back a [`Plan`].
pub struct FakeSource {
    name: String,
    kind: CameraKind,
    plan: Plan,
    log: CallLog,
    state: Mutex<FakeState>,
    wake: Condvar,
}

impl FakeSource {
    pub fn new(name: String, kind: CameraKind, plan: Plan, log: CallLog) -> Self {
        let frames = plan.frames.iter().cloned().collect();
        Self {
            name,
            kind,
            plan,
            log,
            state: Mutex::new(FakeState {
                stopped: false,
                frames,
            }),
            wake: Condvar::new(),
        }
    }

    fn record(&self, call: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} {}", call, self.name));
    }
}

impl CameraSource for FakeSource {
    fn kind(&self) -> CameraKind {
        self.kind
    }

    fn start(&self) -> Result<(), SourceError> {
        self.record("start");
        if self.plan.fail_start {
            return Err(SourceError::DeviceUnavailable(format!(
                "{} is busy",
                self.name
            )));
        }
        Ok(())
    }

    fn next_frame(&self) -> Result<NextFrame, SourceError> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.stopped {
                return Ok(NextFrame::EndOfStream);
            }
            if let Some(frame) = state.frames.pop_front() {
                return Ok(NextFrame::Frame(frame));
            }
            if self.plan.end_when_drained {
                return Ok(NextFrame::EndOfStream);
            }
            let (next, timeout) = self
                .wake
                .wait_timeout(state, Duration::from_millis(5))
                .unwrap();
            state = next;
            if timeout.timed_out() && !state.stopped {
                if let Some(frame) = &self.plan.repeat {
                    return Ok(NextFrame::Frame(frame.clone()));
                }
            }
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.stopped {
            state.stopped = true;
            self.record("stop");
        }
        self.wake.notify_all();
    }
}

/// Builds [`FakeSource`]s named `<kind>#<n>`, one plan per kind.
pub struct FakeFactory {
    pub log: CallLog,
    plans: Mutex<HashMap<CameraKind, Plan>>,
    created: AtomicUsize,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            plans: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
        }
    }

    pub fn with_plan(self, kind: CameraKind, plan: Plan) -> Self {
        self.plans.lock().unwrap().insert(kind, plan);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn position(&self, call: &str) -> usize {
        let calls = self.calls();
        calls
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("'{}' not in {:?}", call, calls))
    }
}

impl SourceFactory for FakeFactory {
    fn create(&self, kind: CameraKind) -> Arc<dyn CameraSource> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let plan = self
            .plans
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        Arc::new(FakeSource::new(
            format!("{}#{}", kind, n),
            kind,
            plan,
            Arc::clone(&self.log),
        ))
    }
}

pub fn jpeg(tag: &str) -> Frame {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(tag.as_bytes());
    data.extend_from_slice(&[0xFF, 0xD9]);
    Frame::new(data)
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
