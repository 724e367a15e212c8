use std::thread;
use std::time::{Duration, Instant};

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, EventType, InputEvent, InputId, Key,
    Synchronization, UinputAbsSetup,
};
use log::{debug, warn};

use crate::config::{Config, ScrollAxis};
use crate::error::{Error, Result};
use crate::wheel::{VIRTUAL_PRODUCT, VIRTUAL_VENDOR};

/// Gap the fingers keep from a screen edge after a boundary jump.
const EDGE_OFFSET: i32 = 50;
/// Horizontal separation between the two synthetic fingers.
const FINGER_SEPARATION: i32 = 100;
/// Minimum rest between two gestures; anything shorter reads as a
/// two-finger tap, which desktops turn into a right click.
const MIN_GESTURE_INTERVAL: Duration = Duration::from_millis(50);
/// Settle time after the opening report, before the first movement.
const OPEN_SETTLE: Duration = Duration::from_millis(5);

const TRACKING_ID_FINGER0: i32 = 100;
const TRACKING_ID_FINGER1: i32 = 200;

/// Positions of the two synthetic fingers on the virtual screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingers {
    pub f0: (i32, i32),
    pub f1: (i32, i32),
}

/// Result of advancing the fingers by one pan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved(Fingers),
    /// The step ran off the screen; these are the re-seated positions at the
    /// opposite edge.
    Jumped(Fingers),
}

/// Virtual screen geometry plus the pan axis. Pure coordinate arithmetic,
/// kept apart from the device so the boundary rules stay testable.
#[derive(Debug, Clone, Copy)]
pub struct PanArea {
    width: i32,
    height: i32,
    axis: ScrollAxis,
}

impl PanArea {
    pub fn new(width: i32, height: i32, axis: ScrollAxis) -> Self {
        Self {
            width,
            height,
            axis,
        }
    }

    pub fn axis(&self) -> ScrollAxis {
        self.axis
    }

    /// Resting position: centered, straddling the midpoint.
    pub fn rest(&self) -> Fingers {
        Fingers {
            f0: (self.width / 2 - FINGER_SEPARATION / 2, self.height / 2),
            f1: (self.width / 2 + FINGER_SEPARATION / 2, self.height / 2),
        }
    }

    /// Advance along the pan axis by `delta`, clamping to the screen. A step
    /// that would carry either finger off the screen instead re-seats both
    /// at the opposite edge, `EDGE_OFFSET` in from it.
    pub fn advance(&self, fingers: Fingers, delta: i32) -> Advance {
        match self.axis {
            ScrollAxis::Vertical => {
                let y = fingers.f0.1 + delta;
                if delta > 0 && y >= self.height {
                    let rest = self.rest();
                    return Advance::Jumped(Fingers {
                        f0: (rest.f0.0, EDGE_OFFSET),
                        f1: (rest.f1.0, EDGE_OFFSET),
                    });
                }
                if delta < 0 && y <= 0 {
                    let rest = self.rest();
                    return Advance::Jumped(Fingers {
                        f0: (rest.f0.0, self.height - EDGE_OFFSET),
                        f1: (rest.f1.0, self.height - EDGE_OFFSET),
                    });
                }
                let y = y.clamp(0, self.height);
                Advance::Moved(Fingers {
                    f0: (fingers.f0.0, y),
                    f1: (fingers.f1.0, y),
                })
            }
            ScrollAxis::Horizontal => {
                let x0 = fingers.f0.0 + delta;
                let x1 = fingers.f1.0 + delta;
                if delta > 0 && x1 >= self.width {
                    return Advance::Jumped(Fingers {
                        f0: (EDGE_OFFSET, self.height / 2),
                        f1: (EDGE_OFFSET + FINGER_SEPARATION, self.height / 2),
                    });
                }
                if delta < 0 && x0 <= 0 {
                    return Advance::Jumped(Fingers {
                        f0: (self.width - EDGE_OFFSET - FINGER_SEPARATION, self.height / 2),
                        f1: (self.width - EDGE_OFFSET, self.height / 2),
                    });
                }
                Advance::Moved(Fingers {
                    f0: (x0.clamp(0, self.width), fingers.f0.1),
                    f1: (x1.clamp(0, self.width), fingers.f1.1),
                })
            }
        }
    }
}

/// What a pan emission did, reported back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanOutcome {
    Moved,
    /// The gesture was closed and the fingers re-seated at the opposite
    /// edge; the engine should start its post-jump cool-down. Velocity is
    /// untouched.
    BoundaryJump,
}

/// Virtual two-finger trackpad.
///
/// Owned and driven by the engine thread only; the gesture protocol below
/// (slot, tracking id, contact and release ordering) is what desktops key
/// two-finger panning off, so the event sequences must not be reordered.
pub struct TrackpadEmitter {
    device: VirtualDevice,
    area: PanArea,
    fingers: Fingers,
    touch_active: bool,
    ending: bool,
    last_gesture_end: Option<Instant>,
}

impl TrackpadEmitter {
    pub fn new(cfg: &Config, width: i32, height: i32) -> Result<Self> {
        let setup = |source| Error::Setup {
            kind: "trackpad",
            source,
        };
        let keys = [Key::BTN_TOUCH, Key::BTN_TOOL_FINGER, Key::BTN_TOOL_DOUBLETAP]
            .into_iter()
            .collect::<AttributeSet<_>>();
        let slot = UinputAbsSetup::new(AbsoluteAxisType::ABS_MT_SLOT, AbsInfo::new(0, 0, 1, 0, 0, 0));
        let tracking_id = UinputAbsSetup::new(
            AbsoluteAxisType::ABS_MT_TRACKING_ID,
            AbsInfo::new(0, 0, i32::from(u16::MAX), 0, 0, 0),
        );
        let position_x = UinputAbsSetup::new(
            AbsoluteAxisType::ABS_MT_POSITION_X,
            AbsInfo::new(0, 0, width, 0, 0, 0),
        );
        let position_y = UinputAbsSetup::new(
            AbsoluteAxisType::ABS_MT_POSITION_Y,
            AbsInfo::new(0, 0, height, 0, 0, 0),
        );
        let device = VirtualDeviceBuilder::new()
            .map_err(setup)?
            .name("Momentum Scroll Trackpad")
            .input_id(InputId::new(
                BusType::BUS_USB,
                VIRTUAL_VENDOR,
                VIRTUAL_PRODUCT,
                1,
            ))
            .with_keys(&keys)
            .map_err(setup)?
            .with_absolute_axis(&slot)
            .map_err(setup)?
            .with_absolute_axis(&tracking_id)
            .map_err(setup)?
            .with_absolute_axis(&position_x)
            .map_err(setup)?
            .with_absolute_axis(&position_y)
            .map_err(setup)?
            .build()
            .map_err(setup)?;
        let area = PanArea::new(width, height, cfg.scroll_axis);
        Ok(Self {
            device,
            fingers: area.rest(),
            area,
            touch_active: false,
            ending: false,
            last_gesture_end: None,
        })
    }

    /// Advance the gesture by `delta` virtual pixels, opening it first when
    /// no contact is down. A step off the screen closes the gesture and
    /// re-seats the fingers instead of emitting.
    pub fn emit_pan(&mut self, delta: i32) -> Result<PanOutcome> {
        match self.area.advance(self.fingers, delta) {
            Advance::Jumped(fingers) => {
                debug!(
                    "virtual screen edge reached, re-seating fingers at ({}, {})",
                    fingers.f0.0, fingers.f0.1
                );
                self.end_gesture();
                self.fingers = fingers;
                Ok(PanOutcome::BoundaryJump)
            }
            Advance::Moved(fingers) => {
                self.fingers = fingers;
                if !self.touch_active {
                    self.open_gesture()?;
                }
                self.emit_update()?;
                Ok(PanOutcome::Moved)
            }
        }
    }

    fn open_gesture(&mut self) -> Result<()> {
        if let Some(ended) = self.last_gesture_end {
            let elapsed = ended.elapsed();
            if elapsed < MIN_GESTURE_INTERVAL {
                thread::sleep(MIN_GESTURE_INTERVAL - elapsed);
            }
        }
        let events = [
            abs(AbsoluteAxisType::ABS_MT_SLOT, 0),
            abs(AbsoluteAxisType::ABS_MT_TRACKING_ID, TRACKING_ID_FINGER0),
            abs(AbsoluteAxisType::ABS_MT_POSITION_X, self.fingers.f0.0),
            abs(AbsoluteAxisType::ABS_MT_POSITION_Y, self.fingers.f0.1),
            abs(AbsoluteAxisType::ABS_MT_SLOT, 1),
            abs(AbsoluteAxisType::ABS_MT_TRACKING_ID, TRACKING_ID_FINGER1),
            abs(AbsoluteAxisType::ABS_MT_POSITION_X, self.fingers.f1.0),
            abs(AbsoluteAxisType::ABS_MT_POSITION_Y, self.fingers.f1.1),
            key(Key::BTN_TOUCH, 1),
            key(Key::BTN_TOOL_DOUBLETAP, 1),
            sync_report(),
        ];
        self.device.emit(&events).map_err(Error::Emit)?;
        self.touch_active = true;
        debug!("gesture opened at ({}, {})", self.fingers.f0.0, self.fingers.f0.1);
        thread::sleep(OPEN_SETTLE);
        Ok(())
    }

    fn emit_update(&mut self) -> Result<()> {
        let (code, value0, value1) = match self.area.axis() {
            ScrollAxis::Vertical => (
                AbsoluteAxisType::ABS_MT_POSITION_Y,
                self.fingers.f0.1,
                self.fingers.f1.1,
            ),
            ScrollAxis::Horizontal => (
                AbsoluteAxisType::ABS_MT_POSITION_X,
                self.fingers.f0.0,
                self.fingers.f1.0,
            ),
        };
        let events = [
            abs(AbsoluteAxisType::ABS_MT_SLOT, 0),
            abs(code, value0),
            abs(AbsoluteAxisType::ABS_MT_SLOT, 1),
            abs(code, value1),
            sync_report(),
        ];
        self.device.emit(&events).map_err(Error::Emit)
    }

    /// Lift both fingers and release the contact keys. Safe to call with no
    /// gesture open; emits nothing in that case.
    pub fn end_gesture(&mut self) {
        if self.ending || !self.touch_active {
            return;
        }
        self.ending = true;
        self.last_gesture_end = Some(Instant::now());
        let events = [
            abs(AbsoluteAxisType::ABS_MT_SLOT, 0),
            abs(AbsoluteAxisType::ABS_MT_TRACKING_ID, -1),
            abs(AbsoluteAxisType::ABS_MT_SLOT, 1),
            abs(AbsoluteAxisType::ABS_MT_TRACKING_ID, -1),
            key(Key::BTN_TOUCH, 0),
            key(Key::BTN_TOOL_DOUBLETAP, 0),
            sync_report(),
        ];
        if let Err(err) = self.device.emit(&events) {
            warn!("failed to release touch contact: {err}");
        }
        self.touch_active = false;
        self.fingers = self.area.rest();
        self.ending = false;
        debug!("gesture ended");
    }
}

fn abs(axis: AbsoluteAxisType, value: i32) -> InputEvent {
    InputEvent::new(EventType::ABSOLUTE, axis.0, value)
}

fn key(key: Key, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, key.code(), value)
}

fn sync_report() -> InputEvent {
    InputEvent::new(EventType::SYNCHRONIZATION, Synchronization::SYN_REPORT.0, 0)
}
