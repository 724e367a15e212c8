use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::{Config, ScrollAxis, ScrollDirection};
use crate::daemon;
use crate::queue::ScrollQueue;
use crate::state::{InertiaState, SharedState};
use crate::trackpad::{PanOutcome, TrackpadEmitter};
use crate::wheel::WheelEmitter;

/// Velocity magnitude above which an opposite-sign notch is treated as a
/// deliberate reversal rather than overshoot.
const DIRECTION_CHANGE_THRESHOLD: f64 = 10.0;
/// Base velocity gained per wheel notch, before sensitivity scaling.
const BASE_VELOCITY_FACTOR: f64 = 60.0;
/// Weight of the new target when blending into the running velocity.
const BLEND_FACTOR: f64 = 0.7;
/// Position advance per notch, before sensitivity scaling.
const POSITION_FACTOR: f64 = 40.0;
/// Window in which a same-sign notch counts as a continuation.
const CONTINUATION_WINDOW: Duration = Duration::from_millis(300);
/// Deltas arriving this soon after a boundary jump are dropped.
const BOUNDARY_IGNORE: Duration = Duration::from_millis(100);
/// Deltas between the ignore window and this bound are scaled back in.
const BOUNDARY_RAMP: Duration = Duration::from_millis(300);
/// Ceiling on one integration step in case the thread stalled.
const MAX_TICK_DT: Duration = Duration::from_millis(100);

/// Outcome of one integration tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still coasting, nothing worth emitting this period.
    Coast,
    /// Emit this many virtual pixels (multitouch) or wheel notches.
    Emit(i32),
    /// Velocity fell below the stop threshold; inertia was stopped.
    Stopped,
}

/// Physics parameters, fixed at startup from the configuration and the
/// virtual screen size.
pub struct Physics {
    direction: ScrollDirection,
    multitouch: bool,
    mouse_drag: bool,
    sensitivity: f64,
    multiplier: f64,
    friction: f64,
    sensitivity_divisor: f64,
    stop_threshold: f64,
    max_velocity: f64,
}

impl Physics {
    pub fn new(cfg: &Config, virtual_width: i32, virtual_height: i32) -> Self {
        let span = match cfg.scroll_axis {
            ScrollAxis::Vertical => virtual_height,
            ScrollAxis::Horizontal => virtual_width,
        } as f64;
        Self {
            direction: cfg.scroll_direction,
            multitouch: cfg.use_multitouch,
            mouse_drag: cfg.mouse_move_drag,
            sensitivity: cfg.sensitivity,
            multiplier: cfg.multiplier,
            friction: cfg.friction,
            sensitivity_divisor: cfg.sensitivity_divisor,
            stop_threshold: cfg.inertia_stop_threshold,
            max_velocity: span * cfg.max_velocity_factor,
        }
    }

    /// Fold one captured wheel notch into the velocity.
    pub fn admit(&self, st: &mut InertiaState, delta: i32, now: Instant) {
        let mut delta = delta;
        if self.direction == ScrollDirection::Natural {
            delta = -delta;
        }

        if let Some(reset) = st.boundary_reset {
            let since = now.duration_since(reset);
            if since < BOUNDARY_IGNORE {
                debug!("dropping delta {delta} during boundary cool-down");
                st.last_tick = Some(now);
                return;
            }
            if since < BOUNDARY_RAMP {
                let scale = (since - BOUNDARY_IGNORE).as_secs_f64()
                    / (BOUNDARY_RAMP - BOUNDARY_IGNORE).as_secs_f64();
                delta = (delta as f64 * scale) as i32;
                debug!("scaling post-boundary delta by {scale:.2}");
                if delta == 0 {
                    st.last_tick = Some(now);
                    return;
                }
            } else {
                st.boundary_reset = None;
            }
        }

        let dt = st
            .last_tick
            .map(|t| now.duration_since(t))
            .unwrap_or_default();
        st.last_tick = Some(now);

        if delta == 0 {
            return;
        }

        // A reversal keeps a share of the old momentum through the blend
        // below, which is what lets it brake instead of flipping at speed.
        let old_velocity = st.velocity;

        if st.active
            && st.velocity.abs() > DIRECTION_CHANGE_THRESHOLD
            && (st.velocity > 0.0) != (delta > 0)
        {
            debug!(
                "direction change at velocity {:.2}, restarting gesture",
                st.velocity
            );
            st.stop();
        }

        let gain = self.sensitivity / self.sensitivity_divisor;
        let same_sign = (st.velocity > 0.0 && delta > 0) || (st.velocity < 0.0 && delta < 0);
        let continuing = st.active && same_sign && dt < CONTINUATION_WINDOW;
        let velocity_factor = if continuing {
            (BASE_VELOCITY_FACTOR + st.velocity.abs() / 3.0) * gain * self.multiplier
        } else {
            BASE_VELOCITY_FACTOR * gain
        };

        let target = st.velocity + f64::from(delta) * velocity_factor;
        st.velocity = BLEND_FACTOR * target + (1.0 - BLEND_FACTOR) * old_velocity;
        st.velocity = st.velocity.clamp(-self.max_velocity, self.max_velocity);

        let post_same_sign = (st.velocity > 0.0 && delta > 0) || (st.velocity < 0.0 && delta < 0);
        let mut position_factor = POSITION_FACTOR * gain;
        if st.active && post_same_sign {
            position_factor *= self.multiplier;
        }
        st.position += f64::from(delta) * position_factor;

        st.active = true;
        debug!("velocity {:.2}, position {:.2}", st.velocity, st.position);
    }

    /// One integration step: apply time friction, stop if spent, otherwise
    /// work out how far to pan this period.
    pub fn tick(&self, st: &mut InertiaState, now: Instant) -> Tick {
        if !st.active {
            return Tick::Coast;
        }
        let mut dt = st
            .last_tick
            .map(|t| now.duration_since(t))
            .unwrap_or_default();
        if dt > MAX_TICK_DT {
            warn!("tick stalled for {}ms, capping dt", dt.as_millis());
            dt = MAX_TICK_DT;
        }
        st.last_tick = Some(now);
        let dt = dt.as_secs_f64();

        let decay = if self.multitouch {
            0.6 * self.friction / self.sensitivity.sqrt()
        } else {
            2.0 * self.friction
        };
        st.velocity *= (-decay * dt).exp();

        if st.velocity.abs() < self.stop_threshold {
            debug!(
                "velocity {:.2} below threshold {:.2}, stopping",
                st.velocity, self.stop_threshold
            );
            st.stop();
            return Tick::Stopped;
        }

        let value = if self.multitouch {
            let step = st.velocity * dt;
            st.position += step;
            step.round() as i32
        } else {
            st.velocity.round() as i32
        };
        if value == 0 {
            Tick::Coast
        } else {
            Tick::Emit(value)
        }
    }

    /// Bleed velocity off in response to pointer motion of `magnitude`.
    /// Returns true when this stopped the fling entirely.
    pub fn apply_mouse_friction(&self, st: &mut InertiaState, magnitude: i32, now: Instant) -> bool {
        if !st.active || !self.mouse_drag {
            return false;
        }
        let scale = self.friction / self.sensitivity.sqrt();
        let factor = ((0.01 + f64::from(magnitude) * 0.0001) * scale).min(0.05 * scale);
        st.velocity *= 1.0 - factor;
        if st.velocity.abs() < self.stop_threshold {
            debug!("mouse drag stopped inertia at {:.2}", st.velocity);
            st.stop();
            return true;
        }
        // Refresh the tick reference so the next period does not double up
        // on friction.
        st.last_tick = Some(now);
        false
    }
}

/// The physics thread: drains the scroll queue and the signal flags, runs
/// one integration tick per period, and drives the emitters.
pub struct Engine {
    cfg: Arc<Config>,
    physics: Physics,
    queue: Arc<ScrollQueue>,
    shared: Arc<SharedState>,
    wheel: Arc<Mutex<WheelEmitter>>,
    trackpad: Option<TrackpadEmitter>,
}

impl Engine {
    pub fn new(
        cfg: Arc<Config>,
        virtual_width: i32,
        virtual_height: i32,
        queue: Arc<ScrollQueue>,
        shared: Arc<SharedState>,
        wheel: Arc<Mutex<WheelEmitter>>,
        trackpad: Option<TrackpadEmitter>,
    ) -> Self {
        let physics = Physics::new(&cfg, virtual_width, virtual_height);
        Self {
            cfg,
            physics,
            queue,
            shared,
            wheel,
            trackpad,
        }
    }

    pub fn run(mut self) {
        info!("inertia thread started");
        let period = Duration::from_secs(1) / self.cfg.refresh_rate_hz;
        let idle_wait = period * 2;

        while daemon::running() {
            let wait = if self.shared.is_active() {
                period
            } else {
                idle_wait
            };
            self.queue
                .wait(wait, || !daemon::running() || self.shared.signals_pending());

            let mut close_gesture = false;

            {
                let mut st = self.shared.lock();
                if st.stop_requested {
                    st.stop_requested = false;
                    if st.inertia.active {
                        st.inertia.stop();
                        close_gesture = true;
                    }
                }
                if st.pending_friction > 0 {
                    let magnitude = std::mem::take(&mut st.pending_friction);
                    if self
                        .physics
                        .apply_mouse_friction(&mut st.inertia, magnitude, Instant::now())
                    {
                        close_gesture = true;
                    }
                }
            }

            // Deltas are folded in strictly before this cycle's tick emits
            // anything for them.
            while let Some(delta) = self.queue.try_pop() {
                let mut st = self.shared.lock();
                self.physics.admit(&mut st.inertia, delta, Instant::now());
            }

            let outcome = {
                let mut st = self.shared.lock();
                self.physics.tick(&mut st.inertia, Instant::now())
            };

            match outcome {
                Tick::Emit(value) => self.emit(value, &mut close_gesture),
                Tick::Stopped => close_gesture = true,
                Tick::Coast => {}
            }

            if close_gesture {
                if let Some(trackpad) = self.trackpad.as_mut() {
                    trackpad.end_gesture();
                }
            }
        }

        // Leave no contact behind on shutdown.
        if let Some(trackpad) = self.trackpad.as_mut() {
            trackpad.end_gesture();
        }
        info!("inertia thread exiting");
    }

    /// Render one tick's worth of movement. Emitter failures stop the fling
    /// and close the gesture; they never take the daemon down.
    fn emit(&mut self, value: i32, close_gesture: &mut bool) {
        if let Some(trackpad) = self.trackpad.as_mut() {
            match trackpad.emit_pan(value) {
                Ok(PanOutcome::Moved) => {}
                Ok(PanOutcome::BoundaryJump) => {
                    self.shared
                        .lock()
                        .inertia
                        .begin_boundary_reset(Instant::now());
                }
                Err(err) => {
                    warn!("pan emission failed: {err}");
                    self.shared.lock().inertia.stop();
                    *close_gesture = true;
                }
            }
        } else if let Err(err) = self.wheel.lock().emit(value) {
            warn!("wheel emission failed: {err}");
            self.shared.lock().inertia.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIRTUAL_W: i32 = 19200;
    const VIRTUAL_H: i32 = 10800;
    const MS: Duration = Duration::from_millis(1);

    fn physics(tweak: impl FnOnce(&mut Config)) -> Physics {
        let mut cfg = Config::default();
        tweak(&mut cfg);
        Physics::new(&cfg, VIRTUAL_W, VIRTUAL_H)
    }

    fn default_physics() -> Physics {
        physics(|_| {})
    }

    #[test]
    fn first_notch_sets_velocity_with_matching_sign() {
        let p = default_physics();
        let mut st = InertiaState::default();
        p.admit(&mut st, 1, Instant::now());
        assert!(st.active);
        assert!(st.velocity > 0.0);
        // One notch at default gain: 0.7 * 60 / 0.3.
        assert!((st.velocity - 140.0).abs() < 1e-9);

        let mut st = InertiaState::default();
        p.admit(&mut st, -1, Instant::now());
        assert!(st.velocity < 0.0);
    }

    #[test]
    fn natural_direction_inverts_the_notch() {
        let p = physics(|cfg| cfg.scroll_direction = ScrollDirection::Natural);
        let mut st = InertiaState::default();
        p.admit(&mut st, 1, Instant::now());
        assert!(st.velocity < 0.0);
    }

    #[test]
    fn zero_delta_only_refreshes_the_tick_reference() {
        let p = default_physics();
        let mut st = InertiaState::default();
        let now = Instant::now();
        p.admit(&mut st, 0, now);
        assert!(!st.active);
        assert_eq!(st.velocity, 0.0);
        assert_eq!(st.position, 0.0);
        assert_eq!(st.last_tick, Some(now));
    }

    #[test]
    fn quick_same_sign_notches_build_more_than_linearly() {
        let p = default_physics();
        let mut st = InertiaState::default();
        let base = Instant::now();
        p.admit(&mut st, 1, base);
        let single = st.velocity;
        p.admit(&mut st, 1, base + 50 * MS);
        p.admit(&mut st, 1, base + 100 * MS);
        assert!(
            st.velocity > 3.0 * single,
            "expected build-up beyond 3x a single notch, got {} vs {}",
            st.velocity,
            single
        );
    }

    #[test]
    fn slow_notches_do_not_get_the_continuation_gain() {
        let p = physics(|cfg| cfg.multiplier = 4.0);
        let base = Instant::now();

        let mut quick = InertiaState::default();
        p.admit(&mut quick, 1, base);
        p.admit(&mut quick, 1, base + 50 * MS);

        let mut slow = InertiaState::default();
        p.admit(&mut slow, 1, base);
        p.admit(&mut slow, 1, base + 400 * MS);

        assert!(quick.velocity > slow.velocity);
    }

    #[test]
    fn reversal_brakes_instead_of_accumulating() {
        let p = default_physics();
        let mut st = InertiaState::default();
        let base = Instant::now();
        p.admit(&mut st, 1, base);
        p.admit(&mut st, 1, base + 50 * MS);
        let built = st.velocity;
        assert!(built > 300.0);

        p.admit(&mut st, -1, base + 100 * MS);
        // A fresh start blended with a residue of the old momentum, nowhere
        // near the built-up speed and no longer pointing up.
        assert!(st.velocity < 0.0, "velocity {} should reverse", st.velocity);
        assert!(st.velocity.abs() < built / 4.0);
    }

    #[test]
    fn tiny_opposite_jitter_is_not_a_reversal() {
        let p = default_physics();
        let mut st = InertiaState::default();
        st.active = true;
        st.velocity = 5.0; // below the direction-change threshold
        st.last_tick = Some(Instant::now());
        p.admit(&mut st, -1, Instant::now());
        // Folded in as a normal notch: the blend flips the sign without a
        // full restart.
        assert!(st.active);
        assert!(st.velocity < 0.0);
    }

    #[test]
    fn velocity_is_capped_by_the_screen_factor() {
        let p = default_physics();
        let mut st = InertiaState::default();
        p.admit(&mut st, 1000, Instant::now());
        let cap = f64::from(VIRTUAL_H) * 0.8;
        assert!(st.velocity <= cap + 1e-9);

        let mut st = InertiaState::default();
        p.admit(&mut st, -1000, Instant::now());
        assert!(st.velocity >= -cap - 1e-9);
    }

    #[test]
    fn friction_decays_velocity_monotonically() {
        let p = physics(|cfg| cfg.inertia_stop_threshold = 0.0001);
        let mut st = InertiaState::default();
        let base = Instant::now();
        st.active = true;
        st.velocity = 2000.0;
        st.last_tick = Some(base);

        let mut previous = st.velocity;
        for i in 1u32..=100 {
            match p.tick(&mut st, base + i * 5 * MS) {
                Tick::Stopped => break,
                _ => {
                    assert!(st.velocity.abs() <= previous.abs());
                    previous = st.velocity;
                }
            }
        }
        assert!(st.velocity.abs() < 2000.0);
    }

    #[test]
    fn tick_emits_the_integrated_step() {
        let p = default_physics();
        let mut st = InertiaState::default();
        let base = Instant::now();
        st.active = true;
        st.velocity = 2000.0;
        st.last_tick = Some(base);

        // 5 ms at ~2000 px/s, minus one step of decay (k = 1.2).
        match p.tick(&mut st, base + 5 * MS) {
            Tick::Emit(value) => {
                let expected = (2000.0 * (-1.2f64 * 0.005).exp() * 0.005).round() as i32;
                assert_eq!(value, expected);
                assert_eq!(value, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wheel_path_emits_rounded_velocity() {
        let p = physics(|cfg| cfg.use_multitouch = false);
        let mut st = InertiaState::default();
        let base = Instant::now();
        st.active = true;
        st.velocity = 30.0;
        st.last_tick = Some(base);

        match p.tick(&mut st, base + 5 * MS) {
            Tick::Emit(value) => {
                assert_eq!(value, st.velocity.round() as i32);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decayed_fling_stops_and_clears_state() {
        let p = default_physics();
        let mut st = InertiaState::default();
        let base = Instant::now();
        st.active = true;
        st.velocity = 1.05;
        st.last_tick = Some(base);

        let mut stopped_at = None;
        for i in 1u32..=100 {
            if p.tick(&mut st, base + i * 5 * MS) == Tick::Stopped {
                stopped_at = Some(i);
                break;
            }
        }
        assert!(stopped_at.is_some(), "fling never stopped");
        assert!(!st.active);
        assert_eq!(st.velocity, 0.0);
        assert!(st.last_tick.is_none());

        // Later ticks on a stopped state are inert.
        assert_eq!(p.tick(&mut st, base + 2000 * MS), Tick::Coast);
    }

    #[test]
    fn stalled_tick_is_capped_at_100ms() {
        let p = physics(|cfg| cfg.friction = 0.1);
        let base = Instant::now();

        let mut stalled = InertiaState::default();
        stalled.active = true;
        stalled.velocity = 1000.0;
        stalled.last_tick = Some(base);
        p.tick(&mut stalled, base + 5000 * MS);

        let mut capped = InertiaState::default();
        capped.active = true;
        capped.velocity = 1000.0;
        capped.last_tick = Some(base);
        p.tick(&mut capped, base + 100 * MS);

        assert!((stalled.velocity - capped.velocity).abs() < 1e-6);
    }

    #[test]
    fn boundary_cooldown_ignores_then_attenuates_admissions() {
        let p = default_physics();
        let mut st = InertiaState::default();
        let base = Instant::now();
        st.active = true;
        st.velocity = 500.0;
        st.last_tick = Some(base);
        st.begin_boundary_reset(base);

        // Inside the ignore window: dropped outright.
        p.admit(&mut st, 4, base + 50 * MS);
        assert_eq!(st.velocity, 500.0);
        assert_eq!(st.last_tick, Some(base + 50 * MS));

        // Ramp window: the notch is scaled down before admission.
        let before = st.velocity;
        p.admit(&mut st, 4, base + 150 * MS);
        assert!(st.velocity > before);
        let ramped_gain = st.velocity - before;

        let mut free = InertiaState::default();
        free.active = true;
        free.velocity = before;
        free.last_tick = Some(base + 50 * MS);
        p.admit(&mut free, 4, base + 150 * MS);
        let free_gain = free.velocity - before;
        assert!(
            ramped_gain < free_gain,
            "cool-down admission ({ramped_gain}) should gain less than a free one ({free_gain})"
        );

        // Past the ramp the cool-down clears.
        p.admit(&mut st, 1, base + 400 * MS);
        assert!(st.boundary_reset.is_none());
    }

    #[test]
    fn boundary_jump_preserves_velocity() {
        let mut st = InertiaState::default();
        st.active = true;
        st.velocity = 750.0;
        st.begin_boundary_reset(Instant::now());
        assert_eq!(st.velocity, 750.0);
        assert!(st.active);
    }

    #[test]
    fn mouse_drag_bleeds_velocity_until_stop() {
        let p = default_physics();
        let mut st = InertiaState::default();
        let base = Instant::now();
        st.active = true;
        st.velocity = 100.0;
        st.last_tick = Some(base);

        let mut previous = st.velocity;
        for i in 1u32..=10 {
            let stopped = p.apply_mouse_friction(&mut st, 20, base + i * 10 * MS);
            assert!(!stopped);
            assert!(st.velocity < previous);
            previous = st.velocity;
        }

        st.velocity = 1.01;
        assert!(p.apply_mouse_friction(&mut st, 20, base + 200 * MS));
        assert!(!st.active);
        assert_eq!(st.velocity, 0.0);
    }

    #[test]
    fn mouse_drag_respects_the_toggle() {
        let p = physics(|cfg| cfg.mouse_move_drag = false);
        let mut st = InertiaState::default();
        st.active = true;
        st.velocity = 100.0;
        st.last_tick = Some(Instant::now());
        assert!(!p.apply_mouse_friction(&mut st, 50, Instant::now()));
        assert_eq!(st.velocity, 100.0);
    }

    #[test]
    fn drag_factor_is_clamped_for_large_motions() {
        let p = default_physics();
        let mut st = InertiaState::default();
        st.active = true;
        st.velocity = 100.0;
        st.last_tick = Some(Instant::now());
        p.apply_mouse_friction(&mut st, 1_000_000, Instant::now());
        // Cap is 0.05 * friction / sqrt(sensitivity) = 0.1 of the velocity.
        assert!((st.velocity - 90.0).abs() < 1e-9);
    }

    #[test]
    fn single_notch_decays_below_threshold_within_seconds() {
        let p = default_physics();
        let mut st = InertiaState::default();
        let base = Instant::now();
        p.admit(&mut st, 1, base);
        let initial = st.velocity;
        assert!(initial > 0.0);

        let mut emitted = 0i64;
        let mut stopped = false;
        // 200 Hz for five seconds.
        for i in 1u32..=1000 {
            match p.tick(&mut st, base + i * 5 * MS) {
                Tick::Emit(v) => emitted += i64::from(v),
                Tick::Stopped => {
                    stopped = true;
                    break;
                }
                Tick::Coast => {}
            }
        }
        assert!(stopped, "velocity never fell below the stop threshold");
        // Ideal distance is v0 / k; per-tick rounding drops the slow tail
        // (steps under half a pixel), so the real total sits well below it.
        let ceiling = initial / 1.2;
        assert!(
            emitted > 0 && (emitted as f64) < ceiling,
            "emitted {emitted}, ceiling {ceiling}"
        );
    }
}
