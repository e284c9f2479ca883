//! Named key → raw PTY byte sequences.
//!
//! The control surface addresses keys by name ("up", "enter", "ctrl+c", a
//! single visible character, or a digit string). Unknown names encode to
//! `None` and are silently ignored by callers.

/// Encode a named key to the bytes to write to the PTY. Returns `None` for
/// names outside the vocabulary.
pub fn encode_key(name: &str) -> Option<Vec<u8>> {
    let lower = name.to_lowercase();
    let bytes = match lower.as_str() {
        "up" => vec![0x1b, b'[', b'A'],
        "down" => vec![0x1b, b'[', b'B'],
        "right" => vec![0x1b, b'[', b'C'],
        "left" => vec![0x1b, b'[', b'D'],
        "enter" | "return" => vec![b'\r'],
        "escape" | "esc" => vec![0x1b],
        "tab" => vec![b'\t'],
        "backspace" => vec![0x7f],
        "delete" => vec![0x1b, b'[', b'3', b'~'],
        "home" => vec![0x1b, b'[', b'H'],
        "end" => vec![0x1b, b'[', b'F'],
        "pageup" | "page_up" => vec![0x1b, b'[', b'5', b'~'],
        "pagedown" | "page_down" => vec![0x1b, b'[', b'6', b'~'],
        "space" => vec![b' '],
        _ => {
            if let Some(letter) = lower.strip_prefix("ctrl+") {
                let mut chars = letter.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_lowercase() => {
                        vec![(c as u8).wrapping_sub(b'a').wrapping_add(1)]
                    }
                    _ => return None,
                }
            } else if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) {
                // Digit strings pass through verbatim (menu selections).
                name.as_bytes().to_vec()
            } else {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !c.is_control() => {
                        let mut buf = [0u8; 4];
                        c.encode_utf8(&mut buf).as_bytes().to_vec()
                    }
                    _ => return None,
                }
            }
        }
    };
    Some(bytes)
}
