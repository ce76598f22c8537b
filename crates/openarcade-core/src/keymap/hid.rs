//! USB HID Usage IDs (page 0x07, Keyboard/Keypad page).
//!
//! Every key a controller button can emit in keyboard mode is one of these
//! usages.  Each key is known under three spellings:
//!
//! | Spelling        | Example      | Used by                              |
//! |-----------------|--------------|--------------------------------------|
//! | HID usage ID    | `0x04`       | the firmware's HID report            |
//! | wire name       | `HID_KEY_A`  | mapping entries sent over the link   |
//! | UI input name   | `key_a`      | the configurator's input picker      |
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07).
//!
//! # Why three spellings?
//!
//! The device stores mappings using the wire names from its firmware headers
//! (`HID_KEY_ENTER`), while the UI works with its own symbolic names
//! (`key_enter`).  Keeping all three in one table guarantees they can never
//! drift apart: adding a key means adding exactly one row below.
//!
//! # The `Unknown` sentinel
//!
//! [`HidKeyCode::Unknown`] (usage 0x0000, "no event") stands for any usage
//! this table does not list.  Its wire name is `HID_KEY_NONE`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Generates [`HidKeyCode`] and its lookup functions from one table so the
/// usage ID, wire name, and UI input name of a key are declared together.
macro_rules! hid_key_table {
    ($( $variant:ident = $usage:literal, $wire:literal, $input:expr; )*) => {
        /// USB HID Usage ID for keyboard keys (page 0x07).
        ///
        /// The numeric value of each variant is its HID Usage ID.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum HidKeyCode {
            $( $variant = $usage, )*
            /// Sentinel for usages with no entry in this table.
            Unknown = 0x0000,
        }

        impl HidKeyCode {
            /// Every known key, in table order.  Excludes [`HidKeyCode::Unknown`].
            pub const ALL: &'static [HidKeyCode] = &[ $( HidKeyCode::$variant, )* ];

            /// Converts a raw HID Usage ID to a [`HidKeyCode`].
            ///
            /// Returns [`HidKeyCode::Unknown`] for usages not in the table.
            pub fn from_u16(value: u16) -> Self {
                match value {
                    $( $usage => HidKeyCode::$variant, )*
                    _ => HidKeyCode::Unknown,
                }
            }

            /// Returns the wire name, e.g. `"HID_KEY_A"`.
            pub fn name(self) -> &'static str {
                match self {
                    $( HidKeyCode::$variant => $wire, )*
                    HidKeyCode::Unknown => "HID_KEY_NONE",
                }
            }

            /// Returns the UI input name, e.g. `"key_a"`, if the configurator
            /// offers this key.
            pub fn input_name(self) -> Option<&'static str> {
                match self {
                    $( HidKeyCode::$variant => $input, )*
                    HidKeyCode::Unknown => None,
                }
            }
        }
    };
}

hid_key_table! {
    KeyA = 0x04, "HID_KEY_A", Some("key_a");
    KeyB = 0x05, "HID_KEY_B", Some("key_b");
    KeyC = 0x06, "HID_KEY_C", Some("key_c");
    KeyD = 0x07, "HID_KEY_D", Some("key_d");
    KeyE = 0x08, "HID_KEY_E", Some("key_e");
    KeyF = 0x09, "HID_KEY_F", Some("key_f");
    KeyG = 0x0A, "HID_KEY_G", Some("key_g");
    KeyH = 0x0B, "HID_KEY_H", Some("key_h");
    KeyI = 0x0C, "HID_KEY_I", Some("key_i");
    KeyJ = 0x0D, "HID_KEY_J", Some("key_j");
    KeyK = 0x0E, "HID_KEY_K", Some("key_k");
    KeyL = 0x0F, "HID_KEY_L", Some("key_l");
    KeyM = 0x10, "HID_KEY_M", Some("key_m");
    KeyN = 0x11, "HID_KEY_N", Some("key_n");
    KeyO = 0x12, "HID_KEY_O", Some("key_o");
    KeyP = 0x13, "HID_KEY_P", Some("key_p");
    KeyQ = 0x14, "HID_KEY_Q", Some("key_q");
    KeyR = 0x15, "HID_KEY_R", Some("key_r");
    KeyS = 0x16, "HID_KEY_S", Some("key_s");
    KeyT = 0x17, "HID_KEY_T", Some("key_t");
    KeyU = 0x18, "HID_KEY_U", Some("key_u");
    KeyV = 0x19, "HID_KEY_V", Some("key_v");
    KeyW = 0x1A, "HID_KEY_W", Some("key_w");
    KeyX = 0x1B, "HID_KEY_X", Some("key_x");
    KeyY = 0x1C, "HID_KEY_Y", Some("key_y");
    KeyZ = 0x1D, "HID_KEY_Z", Some("key_z");

    Digit1 = 0x1E, "HID_KEY_1", Some("key_1");
    Digit2 = 0x1F, "HID_KEY_2", Some("key_2");
    Digit3 = 0x20, "HID_KEY_3", Some("key_3");
    Digit4 = 0x21, "HID_KEY_4", Some("key_4");
    Digit5 = 0x22, "HID_KEY_5", Some("key_5");
    Digit6 = 0x23, "HID_KEY_6", Some("key_6");
    Digit7 = 0x24, "HID_KEY_7", Some("key_7");
    Digit8 = 0x25, "HID_KEY_8", Some("key_8");
    Digit9 = 0x26, "HID_KEY_9", Some("key_9");
    Digit0 = 0x27, "HID_KEY_0", Some("key_0");

    Enter = 0x28, "HID_KEY_ENTER", Some("key_enter");
    Escape = 0x29, "HID_KEY_ESCAPE", Some("key_escape");
    Backspace = 0x2A, "HID_KEY_BACKSPACE", Some("key_backspace");
    Tab = 0x2B, "HID_KEY_TAB", Some("key_tab");
    Space = 0x2C, "HID_KEY_SPACE", Some("key_space");
    Minus = 0x2D, "HID_KEY_MINUS", None;
    Equal = 0x2E, "HID_KEY_EQUAL", None;
    BracketLeft = 0x2F, "HID_KEY_BRACKET_LEFT", None;
    BracketRight = 0x30, "HID_KEY_BRACKET_RIGHT", None;
    Backslash = 0x31, "HID_KEY_BACKSLASH", None;
    Semicolon = 0x33, "HID_KEY_SEMICOLON", None;
    Apostrophe = 0x34, "HID_KEY_APOSTROPHE", None;
    Grave = 0x35, "HID_KEY_GRAVE", None;
    Comma = 0x36, "HID_KEY_COMMA", None;
    Period = 0x37, "HID_KEY_PERIOD", None;
    Slash = 0x38, "HID_KEY_SLASH", None;
    CapsLock = 0x39, "HID_KEY_CAPS_LOCK", None;

    F1 = 0x3A, "HID_KEY_F1", Some("key_f1");
    F2 = 0x3B, "HID_KEY_F2", Some("key_f2");
    F3 = 0x3C, "HID_KEY_F3", Some("key_f3");
    F4 = 0x3D, "HID_KEY_F4", Some("key_f4");
    F5 = 0x3E, "HID_KEY_F5", Some("key_f5");
    F6 = 0x3F, "HID_KEY_F6", Some("key_f6");
    F7 = 0x40, "HID_KEY_F7", Some("key_f7");
    F8 = 0x41, "HID_KEY_F8", Some("key_f8");
    F9 = 0x42, "HID_KEY_F9", Some("key_f9");
    F10 = 0x43, "HID_KEY_F10", Some("key_f10");
    F11 = 0x44, "HID_KEY_F11", Some("key_f11");
    F12 = 0x45, "HID_KEY_F12", Some("key_f12");

    PrintScreen = 0x46, "HID_KEY_PRINT_SCREEN", None;
    ScrollLock = 0x47, "HID_KEY_SCROLL_LOCK", None;
    Pause = 0x48, "HID_KEY_PAUSE", None;
    Insert = 0x49, "HID_KEY_INSERT", None;
    Home = 0x4A, "HID_KEY_HOME", None;
    PageUp = 0x4B, "HID_KEY_PAGE_UP", None;
    Delete = 0x4C, "HID_KEY_DELETE", Some("key_delete");
    End = 0x4D, "HID_KEY_END", None;
    PageDown = 0x4E, "HID_KEY_PAGE_DOWN", None;
    ArrowRight = 0x4F, "HID_KEY_RIGHT", Some("key_right");
    ArrowLeft = 0x50, "HID_KEY_LEFT", Some("key_left");
    ArrowDown = 0x51, "HID_KEY_DOWN", Some("key_down");
    ArrowUp = 0x52, "HID_KEY_UP", Some("key_up");

    ControlLeft = 0xE0, "HID_KEY_LEFT_CONTROL", Some("key_control");
    ShiftLeft = 0xE1, "HID_KEY_LEFT_SHIFT", Some("key_shift");
    AltLeft = 0xE2, "HID_KEY_LEFT_ALT", Some("key_alt");
    GuiLeft = 0xE3, "HID_KEY_LEFT_GUI", None;
    ControlRight = 0xE4, "HID_KEY_RIGHT_CONTROL", None;
    ShiftRight = 0xE5, "HID_KEY_RIGHT_SHIFT", None;
    AltRight = 0xE6, "HID_KEY_RIGHT_ALT", None;
    GuiRight = 0xE7, "HID_KEY_RIGHT_GUI", None;
}

impl HidKeyCode {
    /// Looks up a key by its wire name (`"HID_KEY_A"`).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Looks up a key by its UI input name (`"key_a"`).
    pub fn from_input_name(input: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.input_name() == Some(input))
    }

    /// Returns the raw USB HID Usage ID value for this key code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns `true` for the eight modifier usages (0xE0–0xE7).
    pub fn is_modifier(self) -> bool {
        (0xE0..=0xE7).contains(&self.as_u16())
    }
}

impl fmt::Display for HidKeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Keys travel as their wire name so a persisted mapping reads `"HID_KEY_A"`
// rather than a bare number.
impl Serialize for HidKeyCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for HidKeyCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(HidKeyCode::from_name(&name).unwrap_or(HidKeyCode::Unknown))
    }
}
