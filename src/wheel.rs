use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AttributeSet, BusType, EventType, InputEvent, InputId, RelativeAxisType, Synchronization,
};
use log::debug;

use crate::config::{Config, ScrollAxis};
use crate::error::{Error, Result};

pub const VIRTUAL_VENDOR: u16 = 0x1234;
pub const VIRTUAL_PRODUCT: u16 = 0x5678;

/// Virtual pointing device that renders the fling as relative wheel ticks
/// and receives passthrough of everything else captured from the real mouse.
///
/// Both threads write to it (synthesized ticks from the engine, passthrough
/// from capture), so it lives behind a mutex.
pub struct WheelEmitter {
    device: VirtualDevice,
    axis: ScrollAxis,
    grab_device: bool,
}

impl WheelEmitter {
    pub fn new(cfg: &Config) -> Result<Self> {
        let setup = |source| Error::Setup {
            kind: "wheel",
            source,
        };
        let device = VirtualDeviceBuilder::new()
            .map_err(setup)?
            .name("Momentum Scroll Wheel")
            .input_id(InputId::new(
                BusType::BUS_USB,
                VIRTUAL_VENDOR,
                VIRTUAL_PRODUCT,
                1,
            ))
            .with_relative_axes(
                &[RelativeAxisType::REL_WHEEL, RelativeAxisType::REL_HWHEEL]
                    .into_iter()
                    .collect::<AttributeSet<_>>(),
            )
            .map_err(setup)?
            .build()
            .map_err(setup)?;
        Ok(Self {
            device,
            axis: cfg.scroll_axis,
            grab_device: cfg.grab_device,
        })
    }

    /// Emit one wheel event on the configured axis followed by a sync
    /// report. Positive values scroll up/right.
    pub fn emit(&mut self, value: i32) -> Result<()> {
        let axis = match self.axis {
            ScrollAxis::Vertical => RelativeAxisType::REL_WHEEL,
            ScrollAxis::Horizontal => RelativeAxisType::REL_HWHEEL,
        };
        let events = [
            InputEvent::new(EventType::RELATIVE, axis.0, value),
            InputEvent::new(EventType::SYNCHRONIZATION, Synchronization::SYN_REPORT.0, 0),
        ];
        self.device.emit(&events).map_err(Error::Emit)
    }

    /// Forward a captured event to the virtual device.
    ///
    /// Wheel events are swallowed while the physical device is grabbed so
    /// applications never see the notch twice. Failed writes of sync events
    /// and cursor motion are not logged; they arrive far too often.
    pub fn passthrough(&mut self, event: &InputEvent) -> Result<()> {
        if self.grab_device
            && event.event_type() == EventType::RELATIVE
            && (event.code() == RelativeAxisType::REL_WHEEL.0
                || event.code() == RelativeAxisType::REL_HWHEEL.0)
            && event.value() != 0
        {
            debug!("swallowing grabbed wheel event, value {}", event.value());
            return Ok(());
        }
        let copy = InputEvent::new(event.event_type(), event.code(), event.value());
        self.device.emit(&[copy]).map_err(|err| {
            let suppress = event.event_type() == EventType::SYNCHRONIZATION
                || (event.event_type() == EventType::RELATIVE
                    && (event.code() == RelativeAxisType::REL_X.0
                        || event.code() == RelativeAxisType::REL_Y.0));
            if !suppress {
                debug!("passthrough write failed: {err}");
            }
            Error::Emit(err)
        })
    }
}
