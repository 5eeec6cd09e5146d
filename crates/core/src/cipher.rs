//! Card text obfuscation
//!
//! A fixed alphabetic rotation that keeps card text unreadable at a glance
//! while cards are being written. It is not encryption.

/// Rotation applied to ASCII letters
pub const SHIFT: u8 = 3;

/// Rotate letters forward by [`SHIFT`]; everything else passes through
pub fn obfuscate(text: &str) -> String {
    text.chars().map(|c| rotate(c, SHIFT)).collect()
}

/// Inverse of [`obfuscate`]
pub fn deobfuscate(text: &str) -> String {
    text.chars().map(|c| rotate(c, 26 - SHIFT)).collect()
}

fn rotate(c: char, shift: u8) -> char {
    let base = match c {
        'a'..='z' => b'a',
        'A'..='Z' => b'A',
        _ => return c,
    };
    let offset = (c as u8 - base + shift) % 26;
    (base + offset) as char
}
