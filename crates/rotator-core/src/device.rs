//! Simulated rotator device.
//!
//! One `Rotator` owns the state of a single mechanical rotator and the
//! stepping engine that converges its position toward a commanded
//! target. Callers (HTTP worker threads) and the stepping thread share
//! the state through a single mutex; every read and every mutation
//! holds it for the duration of the access, and it is never held
//! across a sleep or a thread spawn.
//!
//! Cancellation uses a generation token: `halt` bumps `epoch` under
//! the guard, and a tick that wakes up afterwards compares its
//! captured epoch before touching state, so a stale tick exits without
//! effect. This is what makes `halt` race-free against an in-flight
//! tick.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use log::{debug, trace};
use serde::Serialize;

use crate::angles::{shortest_delta, wrap_degrees};

/// Rotators simulated here can always reverse.
pub const CAN_REVERSE: bool = true;

/// Point-in-time copy of one rotator's state, read under the guard in
/// a single lock acquisition.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Snapshot {
    pub position: f64,
    pub target_position: f64,
    pub step_size: f64,
    pub steps_per_sec: u32,
    pub reverse: bool,
    pub is_moving: bool,
    pub connected: bool,
}

#[derive(Debug)]
struct DriveState {
    position: f64,
    target_position: f64,
    reverse: bool,
    connected: bool,
    /// True iff a stepping cycle is currently scheduled.
    moving: bool,
    /// Generation token; bumped by `halt` to invalidate in-flight ticks.
    epoch: u64,
}

/// A single simulated rotator.
///
/// `step_size` and the tick interval are fixed at construction; the
/// mutable state lives behind one mutex per device, so unrelated
/// rotators step and answer queries fully independently.
#[derive(Debug)]
pub struct Rotator {
    state: Arc<Mutex<DriveState>>,
    step_size: f64,
    step_interval: Duration,
    steps_per_sec: u32,
}

impl Rotator {
    pub fn new(step_size: f64, steps_per_sec: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(DriveState {
                position: 0.0,
                target_position: 0.0,
                reverse: false,
                connected: false,
                moving: false,
                epoch: 0,
            })),
            step_size,
            step_interval: Duration::from_secs_f64(1.0 / f64::from(steps_per_sec)),
            steps_per_sec,
        }
    }

    /// A poisoned mutex means a stepping thread panicked mid-tick; that
    /// is a programming error, not a runtime fault.
    fn guard(&self) -> MutexGuard<'_, DriveState> {
        self.state.lock().expect("rotator state mutex poisoned")
    }

    // ------------------
    // Guarded accessors
    // ------------------

    pub fn is_connected(&self) -> bool {
        self.guard().connected
    }

    /// Connecting or disconnecting has no effect on an in-progress
    /// stepping cycle.
    pub fn set_connected(&self, connected: bool) {
        self.guard().connected = connected;
    }

    pub fn can_reverse(&self) -> bool {
        CAN_REVERSE
    }

    pub fn reverse(&self) -> bool {
        self.guard().reverse
    }

    /// Pure state; never wired into the stepping direction. The caller
    /// layer is responsible for rejecting this while `is_moving()`.
    pub fn set_reverse(&self, reverse: bool) {
        self.guard().reverse = reverse;
    }

    pub fn position(&self) -> f64 {
        self.guard().position
    }

    pub fn target_position(&self) -> f64 {
        self.guard().target_position
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn steps_per_sec(&self) -> u32 {
        self.steps_per_sec
    }

    pub fn is_moving(&self) -> bool {
        self.guard().moving
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.guard();
        Snapshot {
            position: state.position,
            target_position: state.target_position,
            step_size: self.step_size,
            steps_per_sec: self.steps_per_sec,
            reverse: state.reverse,
            is_moving: state.moving,
            connected: state.connected,
        }
    }

    // ----------------
    // Motion commands
    // ----------------

    /// Retarget `delta_deg` degrees relative to the current position
    /// and start a stepping cycle if one is not already active.
    ///
    /// Pre-checks (`is_connected() && !is_moving() && |delta| < 360`)
    /// belong to the caller layer. If they are bypassed while a cycle
    /// is active, the new target simply wins and the active cycle
    /// converges toward it.
    pub fn move_relative(&self, delta_deg: f64) {
        let mut state = self.guard();
        state.target_position = wrap_degrees(state.position + delta_deg);
        debug!(
            "move_relative {:+.3} deg -> target {:.3}",
            delta_deg, state.target_position
        );
        self.start_cycle(state);
    }

    /// Retarget an absolute mechanical angle and start a stepping
    /// cycle if one is not already active.
    ///
    /// Pre-checks (`is_connected() && !is_moving() && 0 <= target < 360`)
    /// belong to the caller layer.
    pub fn move_absolute(&self, target_deg: f64) {
        let mut state = self.guard();
        state.target_position = target_deg;
        debug!("move_absolute -> target {:.3}", state.target_position);
        self.start_cycle(state);
    }

    /// Stop motion. Position and target are left where they are; the
    /// epoch bump invalidates any tick already scheduled.
    pub fn halt(&self) {
        let mut state = self.guard();
        state.epoch += 1;
        state.moving = false;
        debug!("halt at position {:.3}", state.position);
    }

    /// Mark the engine moving and spawn the stepping thread unless a
    /// cycle is already active. Consumes the guard: it must be dropped
    /// before the spawn so the new thread can take the lock.
    fn start_cycle(&self, mut state: MutexGuard<'_, DriveState>) {
        if state.moving {
            return;
        }
        state.moving = true;
        let epoch = state.epoch;
        drop(state);

        let state = Arc::clone(&self.state);
        let step_size = self.step_size;
        let interval = self.step_interval;
        thread::spawn(move || run_cycle(&state, epoch, step_size, interval));
    }
}

/// One stepping cycle: tick at `interval` until the position settles
/// within half a step of the target, or until the epoch no longer
/// matches (halted).
fn run_cycle(state: &Mutex<DriveState>, epoch: u64, step_size: f64, interval: Duration) {
    loop {
        thread::sleep(interval);
        let mut state = state.lock().expect("rotator state mutex poisoned");
        if state.epoch != epoch {
            trace!("tick for stale epoch {epoch}, exiting");
            return;
        }
        let delta = shortest_delta(state.target_position, state.position);
        if delta.abs() > step_size / 2.0 {
            state.position = wrap_degrees(state.position + step_size.copysign(delta));
            trace!("step to {:.3} (delta {:+.3})", state.position, delta);
        } else {
            // Settled within stepper quantization; no snap to target.
            state.moving = false;
            debug!("settled at {:.3}", state.position);
            return;
        }
    }
}
