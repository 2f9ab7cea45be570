use crate::keys::{key_action, KeyAction};

/// Replays key payloads, in order, into the text they produce. Characters are appended,
/// `backspace` removes the last character if there is one, every other key is skipped.
pub fn replay<'a>(keys: impl IntoIterator<Item = &'a str>) -> String {
    let mut output = String::new();
    for key in keys {
        match key_action(key) {
            KeyAction::Type(c) => output.push(c),
            KeyAction::Erase => {
                output.pop();
            }
            KeyAction::Ignore => (),
        }
    }
    output
}
