use std::path::{Path, PathBuf};

use evdev::{Device, Key, RelativeAxisType};
use log::debug;

/// Name prefix of this daemon's own virtual devices; the scanner must never
/// hand one of them back as a capture source.
const OWN_DEVICE_PREFIX: &str = "Momentum Scroll";

/// One entry from the input device scan.
#[derive(Debug, Clone)]
pub struct InputDeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub is_mouse: bool,
}

/// Enumerate every event device we can open.
pub fn list_devices() -> Vec<InputDeviceInfo> {
    evdev::enumerate()
        .map(|(path, device)| InputDeviceInfo {
            name: device.name().unwrap_or("Unknown Device").to_string(),
            is_mouse: is_mouse(&device),
            path,
        })
        .collect()
}

fn is_mouse(device: &Device) -> bool {
    let has_motion = device
        .supported_relative_axes()
        .map(|axes| axes.contains(RelativeAxisType::REL_X))
        .unwrap_or(false);
    let has_button = device
        .supported_keys()
        .map(|keys| keys.contains(Key::BTN_LEFT))
        .unwrap_or(false);
    has_motion && has_button
}

fn event_number(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .strip_prefix("event")?
        .parse()
        .ok()
}

/// Default capture source: the lowest-numbered event node that looks like a
/// mouse.
pub fn default_mouse() -> Option<InputDeviceInfo> {
    list_devices()
        .into_iter()
        .filter(|d| d.is_mouse && !d.name.starts_with(OWN_DEVICE_PREFIX))
        .min_by_key(|d| event_number(&d.path).unwrap_or(u32::MAX))
}

/// Resolve a configured device name to a path: exact match first, then
/// substring, then the longest shared prefix covering at least half the
/// requested name.
pub fn find_by_name(name: &str) -> Option<PathBuf> {
    let devices: Vec<_> = list_devices()
        .into_iter()
        .filter(|d| !d.name.starts_with(OWN_DEVICE_PREFIX))
        .collect();

    if let Some(d) = devices.iter().find(|d| d.name == name) {
        debug!("device '{}' matched exactly at {}", name, d.path.display());
        return Some(d.path.clone());
    }
    if let Some(d) = devices.iter().find(|d| d.name.contains(name)) {
        debug!("device '{}' matched as substring of '{}'", name, d.name);
        return Some(d.path.clone());
    }

    let (len, best) = devices
        .iter()
        .map(|d| (common_prefix_len(&d.name, name), d))
        .max_by_key(|(len, _)| *len)?;
    if len > 0 && len >= name.len() / 2 {
        debug!(
            "device '{}' matched {} leading chars of '{}'",
            name, len, best.name
        );
        return Some(best.path.clone());
    }
    debug!("no device matches '{name}'");
    None
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_prefix() {
        assert_eq!(common_prefix_len("Logitech G502", "Logitech G Pro"), 11);
        assert_eq!(common_prefix_len("abc", "abc"), 3);
        assert_eq!(common_prefix_len("abc", "xyz"), 0);
        assert_eq!(common_prefix_len("", "anything"), 0);
    }

    #[test]
    fn event_numbers() {
        assert_eq!(event_number(Path::new("/dev/input/event7")), Some(7));
        assert_eq!(event_number(Path::new("/dev/input/event23")), Some(23));
        assert_eq!(event_number(Path::new("/dev/input/mice")), None);
    }
}
