//! The key vocabulary shared by capture and text reconstruction.
//!
//! A key payload is either a single printable character, kept with its case, or one of the
//! lowercase symbolic names in [SYMBOLIC_KEYS]. Reconstruction only gives meaning to `space`,
//! `enter` and `backspace`; every other symbolic name produces no text.

pub const SPACE: &str = "space";
pub const ENTER: &str = "enter";
pub const BACKSPACE: &str = "backspace";

pub const MODIFIER_KEYS: &[&str] = &[
    "shift", "shift_r", "ctrl", "ctrl_r", "alt", "alt_r", "alt_gr", "cmd", "cmd_r", "caps_lock",
];

pub const NAVIGATION_KEYS: &[&str] = &[
    "up", "down", "left", "right", "home", "end", "page_up", "page_down", "delete", "insert",
];

/// Every symbolic name capture emits, besides `f1`..`f24`.
pub const SYMBOLIC_KEYS: &[&str] = &[
    SPACE,
    ENTER,
    BACKSPACE,
    "tab",
    "escape",
    "print_screen",
    "scroll_lock",
    "pause",
    "num_lock",
    "menu",
];

/// What replaying a key does to the text typed so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Type(char),
    Erase,
    Ignore,
}

pub fn key_action(payload: &str) -> KeyAction {
    let mut chars = payload.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return match c {
            '\n' => KeyAction::Type('\n'),
            c if c.is_control() => KeyAction::Ignore,
            c => KeyAction::Type(c),
        };
    }

    match payload.to_ascii_lowercase().as_str() {
        SPACE => KeyAction::Type(' '),
        ENTER | "return" => KeyAction::Type('\n'),
        BACKSPACE => KeyAction::Erase,
        _ => KeyAction::Ignore,
    }
}

/// Normalizes a key name reported by an input hook into the capture vocabulary. Hooks differ in
/// spelling (`Key.shift`, `Return`, `Control`), so aliases are folded into one name. Unknown
/// names are kept lowercased, reconstruction ignores them. Returns [None] for an empty name.
pub fn canonical_key_name(raw: &str) -> Option<String> {
    // Padding around a name is dropped, a lone whitespace character is a key itself.
    let raw = if raw.chars().nth(1).is_some() {
        raw.trim()
    } else {
        raw
    };
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (None, _) => return None,
        (Some(' '), None) => return Some(SPACE.into()),
        (Some('\n' | '\r'), None) => return Some(ENTER.into()),
        (Some('\u{8}'), None) => return Some(BACKSPACE.into()),
        (Some('\t'), None) => return Some("tab".into()),
        (Some(c), None) => return Some(c.to_string()),
        _ => {}
    }

    let name = raw.trim();
    let name = name.strip_prefix("Key.").unwrap_or(name).to_ascii_lowercase();
    let canonical = match name.as_str() {
        "" => return None,
        "return" | "enter" => ENTER,
        "esc" | "escape" => "escape",
        "del" => "delete",
        "pgup" | "prior" => "page_up",
        "pgdn" | "pgdown" | "next" => "page_down",
        "control" | "ctrl_l" => "ctrl",
        "control_r" => "ctrl_r",
        "shift_l" => "shift",
        "alt_l" | "option" => "alt",
        "command" | "super" | "meta" | "win" | "cmd_l" => "cmd",
        "bksp" | "back_space" => BACKSPACE,
        _ => return Some(name),
    };
    Some(canonical.into())
}
