use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Physics state advanced by the engine thread.
///
/// `last_tick` doubles as the activity marker the way the integration code
/// expects it: unset whenever the fling is stopped.
#[derive(Debug, Clone, Copy, Default)]
pub struct InertiaState {
    /// Signed velocity in virtual-trackpad pixels per second.
    pub velocity: f64,
    /// Accumulated displacement; diagnostic only.
    pub position: f64,
    /// True iff physics should be integrated each tick.
    pub active: bool,
    /// Monotonic reference for the next `dt`.
    pub last_tick: Option<Instant>,
    /// Set while admissions are attenuated after a boundary jump.
    pub boundary_reset: Option<Instant>,
}

impl InertiaState {
    /// Cancel any ongoing fling. Idempotent. Ending an open touch gesture is
    /// the caller's job, outside the state lock.
    pub fn stop(&mut self) {
        self.velocity = 0.0;
        self.position = 0.0;
        self.active = false;
        self.last_tick = None;
    }

    /// Start the post-boundary-jump cool-down.
    pub fn begin_boundary_reset(&mut self, now: Instant) {
        self.boundary_reset = Some(now);
    }
}

/// Everything behind the single state lock: the inertia record plus the
/// signal flags the capture thread writes.
#[derive(Debug, Default)]
pub struct EngineState {
    pub inertia: InertiaState,
    pub stop_requested: bool,
    /// Largest pointer-motion magnitude seen since the engine last drained
    /// it; zero when nothing is pending.
    pub pending_friction: i32,
}

/// State record shared between the capture and engine threads.
pub struct SharedState {
    state: Mutex<EngineState>,
    changed: Condvar,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            changed: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock()
    }

    /// Ask the engine to stop the fling by its next tick.
    pub fn signal_stop(&self) {
        let mut st = self.state.lock();
        st.stop_requested = true;
        self.changed.notify_one();
    }

    /// Record pointer motion for drag friction. Magnitudes accumulate as a
    /// running maximum so a burst of small moves is not lost.
    pub fn signal_friction(&self, magnitude: i32) {
        if magnitude <= 0 {
            return;
        }
        let mut st = self.state.lock();
        if magnitude > st.pending_friction {
            st.pending_friction = magnitude;
        }
        self.changed.notify_one();
    }

    pub fn signals_pending(&self) -> bool {
        let st = self.state.lock();
        st.stop_requested || st.pending_friction > 0
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().inertia.active
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_idempotent() {
        let mut st = InertiaState {
            velocity: 123.0,
            position: 4.5,
            active: true,
            last_tick: Some(Instant::now()),
            boundary_reset: None,
        };
        st.stop();
        let after_first = st;
        st.stop();
        assert_eq!(st.velocity, after_first.velocity);
        assert_eq!(st.active, after_first.active);
        assert_eq!(st.last_tick, after_first.last_tick);
        assert_eq!(st.velocity, 0.0);
        assert!(!st.active);
        assert!(st.last_tick.is_none());
    }

    #[test]
    fn inactive_means_zero_velocity_and_no_tick_reference() {
        let st = InertiaState::default();
        assert!(!st.active);
        assert_eq!(st.velocity, 0.0);
        assert!(st.last_tick.is_none());
    }

    #[test]
    fn friction_signal_keeps_running_maximum() {
        let shared = SharedState::new();
        shared.signal_friction(10);
        shared.signal_friction(3);
        shared.signal_friction(25);
        shared.signal_friction(0);
        assert_eq!(shared.lock().pending_friction, 25);
        assert!(shared.signals_pending());
    }

    #[test]
    fn stop_signal_is_visible() {
        let shared = SharedState::new();
        assert!(!shared.signals_pending());
        shared.signal_stop();
        assert!(shared.signals_pending());
        shared.lock().stop_requested = false;
        assert!(!shared.signals_pending());
    }
}
