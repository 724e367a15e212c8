use std::fs;
use std::io;
use std::path::Path;

use log::{debug, warn};

/// Mapping of wheel sign to content scroll direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    /// Wheel up moves content up.
    Traditional,
    /// Wheel up moves content down, like a touchpad.
    Natural,
}

/// Axis the synthesized gesture pans along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

/// Runtime configuration, read-only once the daemon is up.
///
/// Values come from defaults, then the config file, then the command line,
/// in that order.
#[derive(Debug, Clone)]
pub struct Config {
    /// How much velocity each wheel notch contributes.
    pub sensitivity: f64,
    /// Extra gain for consecutive notches in the same direction.
    pub multiplier: f64,
    /// Exponential decay rate of the fling; higher stops sooner.
    pub friction: f64,
    /// Velocity ceiling as a factor of the virtual screen dimension.
    pub max_velocity_factor: f64,
    /// Divisor applied to sensitivity on the trackpad path.
    pub sensitivity_divisor: f64,
    /// Virtual trackpad resolution as a multiple of the display size.
    pub resolution_multiplier: f64,
    /// Physics tick rate in Hz.
    pub refresh_rate_hz: u32,
    /// Velocity magnitude below which the fling stops.
    pub inertia_stop_threshold: f64,
    pub scroll_direction: ScrollDirection,
    pub scroll_axis: ScrollAxis,
    /// Grab the physical device exclusively.
    pub grab_device: bool,
    /// Emit two-finger trackpad gestures instead of wheel ticks.
    pub use_multitouch: bool,
    /// Slow the fling down while the pointer is moving.
    pub mouse_move_drag: bool,
    /// Consult desktop settings for the scroll direction at startup.
    pub auto_detect_direction: bool,
    /// Explicit capture device, bypassing the scanner.
    pub device_path: Option<String>,
    /// Device name to resolve through the scanner.
    pub device_name: Option<String>,
    pub debug_mode: bool,
    pub daemon_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            multiplier: 1.0,
            friction: 2.0,
            max_velocity_factor: 0.8,
            sensitivity_divisor: 0.3,
            resolution_multiplier: 10.0,
            refresh_rate_hz: 200,
            inertia_stop_threshold: 1.0,
            scroll_direction: ScrollDirection::Traditional,
            scroll_axis: ScrollAxis::Vertical,
            grab_device: false,
            use_multitouch: true,
            mouse_move_drag: true,
            auto_detect_direction: true,
            device_path: None,
            device_name: None,
            debug_mode: false,
            daemon_mode: false,
        }
    }
}

impl Config {
    /// System-wide config consulted when no `--config` is given.
    pub const DEFAULT_PATH: &'static str = "/etc/momentum-scroll.conf";

    /// Section all recognized keys must live under.
    const SECTION: &'static str = "[smooth_scroll]";

    /// Merge `[smooth_scroll]` keys from an INI-style file into this config.
    ///
    /// Unknown keys and keys in other sections are ignored; a key with an
    /// unparseable or out-of-range value keeps its previous setting.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> io::Result<()> {
        let text = fs::read_to_string(path.as_ref())?;
        debug!("reading configuration from {}", path.as_ref().display());

        let mut in_section = false;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') {
                in_section = line == Self::SECTION;
                continue;
            }
            if !in_section {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.apply_key(key.trim(), value.trim());
            }
        }
        Ok(())
    }

    fn apply_key(&mut self, key: &str, value: &str) {
        match key {
            "sensitivity" => set_positive(&mut self.sensitivity, key, value),
            "multiplier" => set_positive(&mut self.multiplier, key, value),
            "friction" => set_positive(&mut self.friction, key, value),
            "max_velocity" => set_positive(&mut self.max_velocity_factor, key, value),
            "sensitivity_divisor" => set_positive(&mut self.sensitivity_divisor, key, value),
            "resolution_multiplier" => set_positive(&mut self.resolution_multiplier, key, value),
            "inertia_stop_threshold" => match value.parse::<f64>() {
                Ok(v) if v >= 0.0 => self.inertia_stop_threshold = v,
                _ => warn!("config: invalid value for {key}: {value}"),
            },
            "refresh_rate" => match value.parse::<u32>() {
                Ok(v) if v > 0 => self.refresh_rate_hz = v,
                _ => warn!("config: invalid value for {key}: {value}"),
            },
            "grab" => set_bool(&mut self.grab_device, key, value),
            "natural" => {
                if let Some(natural) = parse_bool(value) {
                    self.scroll_direction = if natural {
                        ScrollDirection::Natural
                    } else {
                        ScrollDirection::Traditional
                    };
                    // An explicit setting beats auto-detection.
                    self.auto_detect_direction = false;
                } else {
                    warn!("config: invalid value for {key}: {value}");
                }
            }
            "multitouch" => set_bool(&mut self.use_multitouch, key, value),
            "horizontal" => {
                if let Some(horizontal) = parse_bool(value) {
                    self.scroll_axis = if horizontal {
                        ScrollAxis::Horizontal
                    } else {
                        ScrollAxis::Vertical
                    };
                } else {
                    warn!("config: invalid value for {key}: {value}");
                }
            }
            "debug" => set_bool(&mut self.debug_mode, key, value),
            "mouse_move_drag" => set_bool(&mut self.mouse_move_drag, key, value),
            "device_name" => {
                if !value.is_empty() {
                    self.device_name = Some(value.to_string());
                }
            }
            _ => debug!("config: ignoring unknown key {key}"),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn set_bool(slot: &mut bool, key: &str, value: &str) {
    match parse_bool(value) {
        Some(v) => *slot = v,
        None => warn!("config: invalid value for {key}: {value}"),
    }
}

fn set_positive(slot: &mut f64, key: &str, value: &str) {
    match value.parse::<f64>() {
        Ok(v) if v > 0.0 => *slot = v,
        _ => warn!("config: invalid value for {key}: {value}"),
    }
}
