//! Input device classification from raw keys

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Device class that produced the most recent key input
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputDevice {
    #[default]
    Unknown,
    KeyboardMouse,
    Gamepad,
}

impl Display for InputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputDevice::Unknown => write!(f, "Unknown"),
            InputDevice::KeyboardMouse => write!(f, "KeyboardMouse"),
            InputDevice::Gamepad => write!(f, "Gamepad"),
        }
    }
}

/// Physical key as reported by the engine
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InputKey {
    Keyboard(String),
    MouseButton(String),
    MouseAxis(String),
    Gamepad(String),
    Touch(u8),
}

const MOUSE_BUTTONS: [&str; 5] = [
    "LeftMouseButton",
    "RightMouseButton",
    "MiddleMouseButton",
    "ThumbMouseButton",
    "ThumbMouseButton2",
];

const MOUSE_AXES: [&str; 4] = ["MouseX", "MouseY", "Mouse2D", "MouseWheelAxis"];

impl InputKey {
    /// Classifies an engine key name (`Gamepad_FaceButton_Bottom`, `SpaceBar`, `Touch1`)
    pub fn from_name(name: &str) -> Self {
        if name.starts_with("Gamepad_") {
            InputKey::Gamepad(name.to_string())
        } else if MOUSE_BUTTONS.contains(&name) {
            InputKey::MouseButton(name.to_string())
        } else if MOUSE_AXES.contains(&name) || name.starts_with("MouseScroll") {
            InputKey::MouseAxis(name.to_string())
        } else if let Some(index) = name.strip_prefix("Touch").and_then(|n| n.parse().ok()) {
            InputKey::Touch(index)
        } else {
            InputKey::Keyboard(name.to_string())
        }
    }
}

/// Maps a key to the device class it belongs to
pub fn device_from_key(key: &InputKey) -> InputDevice {
    match key {
        InputKey::Gamepad(_) => InputDevice::Gamepad,
        InputKey::Keyboard(_) | InputKey::MouseButton(_) | InputKey::MouseAxis(_) => {
            InputDevice::KeyboardMouse
        }
        InputKey::Touch(_) => InputDevice::Unknown,
    }
}
