use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::Arc;

use evdev::{Device, InputEvent, InputEventKind, Key, RelativeAxisType};
use log::{debug, error, info};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use parking_lot::Mutex;

use crate::config::{Config, ScrollAxis};
use crate::daemon;
use crate::error::{Error, Result};
use crate::queue::ScrollQueue;
use crate::state::SharedState;
use crate::wheel::WheelEmitter;

/// Relative motion this large reads as deliberate pointer use and stops the
/// fling outright, on top of the friction it contributes.
const MOTION_STOP_THRESHOLD: i32 = 50;
/// Poll timeout; also the ceiling on this thread's shutdown latency.
const POLL_TIMEOUT_MS: u16 = 100;

/// Open the capture device, grabbing it exclusively when configured.
pub fn open_device(cfg: &Config, path: &str) -> Result<Device> {
    let mut device = Device::open(path).map_err(|source| Error::DeviceOpen {
        path: path.to_string(),
        source,
    })?;
    if cfg.grab_device {
        device.grab().map_err(|source| Error::DeviceOpen {
            path: path.to_string(),
            source,
        })?;
        info!("grabbed {path} exclusively");
    }
    Ok(device)
}

/// The capture thread: reads the physical mouse, queues scroll deltas for
/// the engine, raises stop/friction signals, and forwards everything else to
/// the virtual wheel device.
pub struct CaptureLoop {
    cfg: Arc<Config>,
    device: Device,
    queue: Arc<ScrollQueue>,
    shared: Arc<SharedState>,
    wheel: Arc<Mutex<WheelEmitter>>,
}

impl CaptureLoop {
    pub fn new(
        cfg: Arc<Config>,
        device: Device,
        queue: Arc<ScrollQueue>,
        shared: Arc<SharedState>,
        wheel: Arc<Mutex<WheelEmitter>>,
    ) -> Self {
        Self {
            cfg,
            device,
            queue,
            shared,
            wheel,
        }
    }

    pub fn run(mut self) {
        info!("capture thread started");
        while daemon::running() {
            // The descriptor is only borrowed for the duration of the poll
            // call; the device stays owned by this struct.
            let fd = unsafe { BorrowedFd::borrow_raw(self.device.as_raw_fd()) };
            let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(err) => {
                    error!("poll on input device failed: {err}");
                    daemon::request_stop();
                    break;
                }
            }

            let events: Vec<InputEvent> = match self.device.fetch_events() {
                Ok(events) => events.collect(),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    error!("reading input events failed: {err}");
                    daemon::request_stop();
                    break;
                }
            };
            for event in events {
                self.handle(event);
            }
        }

        if self.cfg.grab_device {
            if let Err(err) = self.device.ungrab() {
                debug!("ungrab failed: {err}");
            }
        }
        info!("capture thread exiting");
    }

    fn handle(&self, event: InputEvent) {
        let wheel_axis = match self.cfg.scroll_axis {
            ScrollAxis::Vertical => RelativeAxisType::REL_WHEEL,
            ScrollAxis::Horizontal => RelativeAxisType::REL_HWHEEL,
        };
        match event.kind() {
            InputEventKind::RelAxis(axis) if axis == wheel_axis => {
                debug!("captured scroll delta {}", event.value());
                if let Err(err) = self.queue.push(event.value()) {
                    debug!("{err}");
                }
                if !self.cfg.grab_device {
                    // The real device already delivered this notch; forward
                    // a zeroed copy so report framing stays intact without
                    // scrolling twice.
                    let dummy = InputEvent::new(event.event_type(), event.code(), 0);
                    self.passthrough(&dummy);
                }
            }
            InputEventKind::Key(key) if key == Key::KEY_ESC && event.value() == 1 => {
                debug!("escape pressed, stopping inertia");
                self.shared.signal_stop();
                self.passthrough(&event);
            }
            InputEventKind::RelAxis(axis)
                if axis == RelativeAxisType::REL_X || axis == RelativeAxisType::REL_Y =>
            {
                let magnitude = event.value().abs();
                if magnitude > 0 && self.cfg.mouse_move_drag {
                    self.shared.signal_friction(magnitude);
                }
                if magnitude > MOTION_STOP_THRESHOLD {
                    self.shared.signal_stop();
                }
                self.passthrough(&event);
            }
            InputEventKind::Key(key)
                if (key == Key::BTN_LEFT || key == Key::BTN_RIGHT || key == Key::BTN_MIDDLE)
                    && event.value() == 1 =>
            {
                debug!("mouse button pressed, stopping inertia");
                self.shared.signal_stop();
                self.passthrough(&event);
            }
            InputEventKind::RelAxis(_)
            | InputEventKind::Key(_)
            | InputEventKind::Synchronization(_) => {
                self.passthrough(&event);
            }
            _ => {}
        }
    }

    /// Passthrough failures must never take capture down; the emitter
    /// already rate-limits the logging.
    fn passthrough(&self, event: &InputEvent) {
        let _ = self.wheel.lock().passthrough(event);
    }
}
