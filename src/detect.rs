use std::process::Command;

use log::{debug, info};

use crate::config::ScrollDirection;

/// Fallback when no display server answers.
const DEFAULT_DISPLAY: (i32, i32) = (1920, 1080);

/// Ask the desktop environment which scroll direction it uses. Best effort:
/// GNOME mouse setting, then GNOME touchpad, then KDE.
pub fn detect_scroll_direction() -> Option<ScrollDirection> {
    let probes: [(&str, &[&str]); 3] = [
        (
            "gsettings",
            &["get", "org.gnome.desktop.peripherals.mouse", "natural-scroll"],
        ),
        (
            "gsettings",
            &[
                "get",
                "org.gnome.desktop.peripherals.touchpad",
                "natural-scroll",
            ],
        ),
        ("kreadconfig5", &["--group", "Mouse", "--key", "NaturalScroll"]),
    ];
    for (cmd, args) in probes {
        if let Some(direction) = probe(cmd, args) {
            info!("detected system scroll direction via {cmd}: {direction:?}");
            return Some(direction);
        }
        debug!("{cmd} gave no usable answer");
    }
    None
}

fn probe(cmd: &str, args: &[&str]) -> Option<ScrollDirection> {
    let output = Command::new(cmd).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_direction(&String::from_utf8_lossy(&output.stdout))
}

fn parse_direction(text: &str) -> Option<ScrollDirection> {
    match text.trim() {
        "true" | "1" => Some(ScrollDirection::Natural),
        "false" | "0" => Some(ScrollDirection::Traditional),
        _ => None,
    }
}

/// Physical display size, used to scale the virtual trackpad. Falls back to
/// full HD when nothing answers, which only makes boundary jumps a little
/// more frequent on larger screens.
pub fn display_size() -> (i32, i32) {
    match xrandr_size() {
        Some((w, h)) => {
            debug!("display size {w}x{h}");
            (w, h)
        }
        None => {
            debug!(
                "could not query display size, assuming {}x{}",
                DEFAULT_DISPLAY.0, DEFAULT_DISPLAY.1
            );
            DEFAULT_DISPLAY
        }
    }
}

fn xrandr_size() -> Option<(i32, i32)> {
    let output = Command::new("xrandr").arg("--current").output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_xrandr(&String::from_utf8_lossy(&output.stdout))
}

/// Pull "current 1920 x 1080" out of the screen summary line.
fn parse_xrandr(text: &str) -> Option<(i32, i32)> {
    let line = text.lines().find(|l| l.contains("current"))?;
    let rest = line.split("current").nth(1)?;
    let mut dims = rest.split(',').next()?.split('x');
    let width = dims.next()?.trim().parse().ok()?;
    let height = dims.next()?.trim().parse().ok()?;
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xrandr_screen_line() {
        let out = "Screen 0: minimum 320 x 200, current 2560 x 1440, maximum 16384 x 16384\n\
                   DP-1 connected primary 2560x1440+0+0\n";
        assert_eq!(parse_xrandr(out), Some((2560, 1440)));
    }

    #[test]
    fn rejects_output_without_a_current_size() {
        assert_eq!(parse_xrandr("no displays here"), None);
        assert_eq!(parse_xrandr(""), None);
    }

    #[test]
    fn parses_direction_answers() {
        assert_eq!(parse_direction("true\n"), Some(ScrollDirection::Natural));
        assert_eq!(parse_direction("false"), Some(ScrollDirection::Traditional));
        assert_eq!(parse_direction("1\n"), Some(ScrollDirection::Natural));
        assert_eq!(parse_direction("0"), Some(ScrollDirection::Traditional));
        assert_eq!(parse_direction("unset"), None);
    }
}
