use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use parking_lot::Mutex;

use momentum_scroll::capture::{self, CaptureLoop};
use momentum_scroll::config::{Config, ScrollAxis, ScrollDirection};
use momentum_scroll::daemon;
use momentum_scroll::detect;
use momentum_scroll::devices;
use momentum_scroll::inertia::Engine;
use momentum_scroll::queue::ScrollQueue;
use momentum_scroll::state::SharedState;
use momentum_scroll::trackpad::TrackpadEmitter;
use momentum_scroll::wheel::WheelEmitter;

/// Smooth, inertial scrolling for mice.
///
/// Captures wheel notches from a physical mouse and replays them as
/// two-finger touchpad gestures with momentum: velocity builds across
/// consecutive notches and decays with friction once you let go.
#[derive(Parser, Debug)]
#[command(name = "momentum-scroll")]
struct Args {
    /// Scroll sensitivity.
    #[arg(long)]
    sensitivity: Option<f64>,

    /// Gain applied to repeated scrolls in the same direction.
    #[arg(long)]
    multiplier: Option<f64>,

    /// Friction; lower values make the fling last longer.
    #[arg(long)]
    friction: Option<f64>,

    /// Maximum velocity as a factor of the screen dimension.
    #[arg(long = "max-velocity")]
    max_velocity: Option<f64>,

    /// Divisor applied to sensitivity on the trackpad path.
    #[arg(long = "sensitivity-divisor")]
    sensitivity_divisor: Option<f64>,

    /// Virtual trackpad resolution as a multiple of the display size.
    #[arg(long = "resolution-multiplier")]
    resolution_multiplier: Option<f64>,

    /// Physics refresh rate in Hz.
    #[arg(long = "refresh-rate")]
    refresh_rate: Option<u32>,

    /// Velocity below which the fling stops.
    #[arg(long = "inertia-stop-threshold")]
    inertia_stop_threshold: Option<f64>,

    /// Grab the input device exclusively.
    #[arg(long)]
    grab: bool,

    /// Emit wheel events instead of multitouch gestures.
    #[arg(long = "no-multitouch")]
    no_multitouch: bool,

    /// Force natural scrolling direction.
    #[arg(long, conflicts_with = "traditional")]
    natural: bool,

    /// Force traditional scrolling direction.
    #[arg(long)]
    traditional: bool,

    /// Scroll horizontally instead of vertically.
    #[arg(long)]
    horizontal: bool,

    /// Don't consult desktop settings for the scroll direction.
    #[arg(long = "no-auto-detect")]
    no_auto_detect: bool,

    /// Slow the fling down while the mouse is moving (default).
    #[arg(long = "mouse-move-drag", overrides_with = "no_mouse_move_drag")]
    mouse_move_drag: bool,

    /// Never slow the fling down on mouse movement.
    #[arg(long = "no-mouse-move-drag", overrides_with = "mouse_move_drag")]
    no_mouse_move_drag: bool,

    /// Run as a background daemon.
    #[arg(long)]
    daemon: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Read configuration from this file instead of the system one.
    #[arg(long)]
    config: Option<String>,

    /// Input device to capture instead of auto-detecting.
    device_path: Option<String>,
}

impl Args {
    fn apply(&self, cfg: &mut Config) {
        positive("sensitivity", self.sensitivity, &mut cfg.sensitivity);
        positive("multiplier", self.multiplier, &mut cfg.multiplier);
        positive("friction", self.friction, &mut cfg.friction);
        positive(
            "max-velocity",
            self.max_velocity,
            &mut cfg.max_velocity_factor,
        );
        positive(
            "sensitivity-divisor",
            self.sensitivity_divisor,
            &mut cfg.sensitivity_divisor,
        );
        positive(
            "resolution-multiplier",
            self.resolution_multiplier,
            &mut cfg.resolution_multiplier,
        );
        if let Some(rate) = self.refresh_rate {
            if rate > 0 {
                cfg.refresh_rate_hz = rate;
            } else {
                warn!("ignoring zero refresh-rate");
            }
        }
        if let Some(threshold) = self.inertia_stop_threshold {
            if threshold >= 0.0 {
                cfg.inertia_stop_threshold = threshold;
            } else {
                warn!("ignoring negative inertia-stop-threshold {threshold}");
            }
        }
        if self.grab {
            cfg.grab_device = true;
        }
        if self.no_multitouch {
            cfg.use_multitouch = false;
        }
        if self.natural {
            cfg.scroll_direction = ScrollDirection::Natural;
            cfg.auto_detect_direction = false;
        }
        if self.traditional {
            cfg.scroll_direction = ScrollDirection::Traditional;
            cfg.auto_detect_direction = false;
        }
        if self.horizontal {
            cfg.scroll_axis = ScrollAxis::Horizontal;
        }
        if self.no_auto_detect {
            cfg.auto_detect_direction = false;
        }
        if self.mouse_move_drag {
            cfg.mouse_move_drag = true;
        }
        if self.no_mouse_move_drag {
            cfg.mouse_move_drag = false;
        }
        if self.daemon {
            cfg.daemon_mode = true;
        }
        if self.debug {
            cfg.debug_mode = true;
        }
        if let Some(path) = &self.device_path {
            cfg.device_path = Some(path.clone());
        }
    }
}

fn positive(name: &str, value: Option<f64>, slot: &mut f64) {
    if let Some(v) = value {
        if v > 0.0 {
            *slot = v;
        } else {
            warn!("ignoring non-positive {name}: {v}");
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = Config::default();
    if let Some(path) = &args.config {
        cfg.load_file(path)
            .with_context(|| format!("cannot read config file {path}"))?;
    } else if let Err(err) = cfg.load_file(Config::DEFAULT_PATH) {
        if err.kind() != std::io::ErrorKind::NotFound {
            eprintln!("warning: {}: {err}", Config::DEFAULT_PATH);
        }
    }
    let level = if cfg.debug_mode || args.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("momentum_scroll", level)
        .parse_default_env()
        .init();

    args.apply(&mut cfg);

    if cfg.auto_detect_direction {
        match detect::detect_scroll_direction() {
            Some(direction) => cfg.scroll_direction = direction,
            None => debug!(
                "could not auto-detect scroll direction, using {:?}",
                cfg.scroll_direction
            ),
        }
    }

    info!(
        "multitouch={}, grab={}, direction={:?}, axis={:?}",
        cfg.use_multitouch, cfg.grab_device, cfg.scroll_direction, cfg.scroll_axis
    );
    debug!("{cfg:?}");

    if cfg.daemon_mode {
        daemon::daemonize().context("failed to daemonize")?;
    }

    let (display_width, display_height) = detect::display_size();
    let virtual_width = (f64::from(display_width) * cfg.resolution_multiplier) as i32;
    let virtual_height = (f64::from(display_height) * cfg.resolution_multiplier) as i32;

    let device_path = resolve_device_path(&cfg)?;

    let cfg = Arc::new(cfg);
    let wheel = Arc::new(Mutex::new(WheelEmitter::new(&cfg)?));
    let trackpad = if cfg.use_multitouch {
        Some(TrackpadEmitter::new(&cfg, virtual_width, virtual_height)?)
    } else {
        None
    };
    info!("virtual devices created ({virtual_width}x{virtual_height} virtual screen)");

    let device = capture::open_device(&cfg, &device_path)?;
    info!("capturing from {device_path}");

    daemon::install_signal_handlers().context("failed to install signal handlers")?;

    let queue = Arc::new(ScrollQueue::new());
    let shared = Arc::new(SharedState::new());

    let capture_loop = CaptureLoop::new(
        cfg.clone(),
        device,
        queue.clone(),
        shared.clone(),
        wheel.clone(),
    );
    let engine = Engine::new(
        cfg.clone(),
        virtual_width,
        virtual_height,
        queue,
        shared,
        wheel,
        trackpad,
    );

    let capture_thread = thread::Builder::new()
        .name("capture".into())
        .spawn(move || capture_loop.run())
        .context("failed to spawn capture thread")?;
    let engine_thread = thread::Builder::new()
        .name("inertia".into())
        .spawn(move || engine.run())
        .context("failed to spawn inertia thread")?;

    if engine_thread.join().is_err() {
        warn!("inertia thread panicked");
    }
    if capture_thread.join().is_err() {
        warn!("capture thread panicked");
    }

    info!("momentum-scroll stopped");
    Ok(())
}

fn resolve_device_path(cfg: &Config) -> Result<String> {
    if let Some(path) = &cfg.device_path {
        return Ok(path.clone());
    }
    if let Some(name) = &cfg.device_name {
        if let Some(path) = devices::find_by_name(name) {
            return Ok(path.display().to_string());
        }
        warn!("no input device matches name '{name}', falling back to scan");
    }
    match devices::default_mouse() {
        Some(found) => {
            info!("auto-selected {} ({})", found.path.display(), found.name);
            Ok(found.path.display().to_string())
        }
        None => bail!("no mouse-like input device found"),
    }
}
