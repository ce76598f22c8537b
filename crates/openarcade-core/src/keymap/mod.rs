//! Translation between UI-facing inputs and device-facing keycodes.
//!
//! The canonical representation is the USB HID Usage ID ([`HidKeyCode`]).
//! Mapping entries carry keycodes as wire names (`"HID_KEY_A"`), but records
//! written by older tools may hold hex (`"0x04"`), decimal (`"4"`) or bare
//! numbers, so resolution accepts all of those.
//!
//! Every function here is lossy-safe: an input or keycode that cannot be
//! translated yields `None` ("no mapping") rather than an error.

pub mod catalog;
pub mod hid;

pub use catalog::{build_binding, InputCatalog, TableCatalog};
pub use hid::HidKeyCode;

use crate::domain::device::{InputKind, MappingEntry};

/// Resolves a mapping entry to the HID usage the device should emit.
///
/// Uses the entry's keycode when it has one.  A keyboard binding without a
/// keycode falls back to its UI input name.  Returns `None` for gamepad and
/// analog bindings and for anything unresolvable.
pub fn resolve_keycode(entry: &MappingEntry) -> Option<u16> {
    match entry {
        MappingEntry::Usage(0) => None,
        MappingEntry::Usage(usage) => Some(*usage),
        MappingEntry::Keycode(code) => resolve_keycode_str(code),
        MappingEntry::Binding(binding) => match binding.keycode.as_deref() {
            Some(code) => resolve_keycode_str(code),
            None if binding.kind == Some(InputKind::Keyboard) => binding
                .input
                .as_deref()
                .and_then(keycode_for_input)
                .map(HidKeyCode::as_u16),
            None => None,
        },
    }
}

/// Resolves a keycode string: a `HID_KEY_*` name, `0x`-prefixed hex, or a
/// decimal number.
pub fn resolve_keycode_str(code: &str) -> Option<u16> {
    let code = code.trim();
    let usage = if let Some(key) = HidKeyCode::from_name(code) {
        key.as_u16()
    } else if let Some(hex) = code.strip_prefix("0x").or_else(|| code.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()?
    } else {
        code.parse::<u16>().ok()?
    };
    (usage != 0).then_some(usage)
}

/// Keycode for a UI keyboard input name such as `"key_a"`.
pub fn keycode_for_input(input: &str) -> Option<HidKeyCode> {
    HidKeyCode::from_input_name(input)
}

/// UI keyboard input name for a keycode wire name such as `"HID_KEY_A"`.
pub fn input_for_keycode(code: &str) -> Option<&'static str> {
    HidKeyCode::from_name(code).and_then(HidKeyCode::input_name)
}
