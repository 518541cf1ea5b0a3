//! ANSI/VT100 escape sequence removal.
//!
//! Interactive CLI tools colorize prompts and redraw progress indicators with
//! `\r`. Passing either through to a plain scrollback corrupts the transcript,
//! so every chunk goes through [`strip`] before it is shown.
//!
//! Recognised grammar:
//! - CSI: `ESC [` parameter bytes (0x30-0x3F), intermediate bytes (0x20-0x2F),
//!   one final byte (0x40-0x7E)
//! - OSC: `ESC ]` ... terminated by `BEL` or `ESC \`
//! - everything else: `ESC`, intermediate bytes (0x20-0x2F), one final char
//!
//! An escape sequence cut off by the end of input is dropped whole.

const ESC: char = '\x1b';
const BEL: char = '\x07';

/// Removes escape sequences and carriage returns from `raw`.
///
/// Total and idempotent: the output never contains `ESC` or `\r`, and text
/// containing neither is returned unchanged.
pub fn strip(raw: &str) -> String {
    // Fast path: nothing to do for plain text.
    if !raw.contains([ESC, '\r']) {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {}
            ESC => match chars.next() {
                Some('[') => {
                    // Parameters and intermediates, then the final byte. A
                    // malformed sequence ends before the offending char, which
                    // is then handled as ordinary input.
                    while let Some(&ch) = chars.peek() {
                        if is_csi_body(ch) {
                            chars.next();
                            continue;
                        }
                        if is_csi_final(ch) {
                            chars.next();
                        }
                        break;
                    }
                }
                Some(']') => {
                    while let Some(ch) = chars.next() {
                        if ch == BEL {
                            break;
                        }
                        if ch == ESC {
                            // ST is `ESC \`; any other char after ESC ends the
                            // string as well.
                            chars.next();
                            break;
                        }
                    }
                }
                Some(ch) if is_intermediate(ch) => {
                    while chars.peek().is_some_and(|&next| is_intermediate(next)) {
                        chars.next();
                    }
                    // Final char of e.g. `ESC ( B`.
                    chars.next();
                }
                // Two-char sequence such as `ESC 7` or `ESC M`, or a dangling ESC.
                Some(_) | None => {}
            },
            other => out.push(other),
        }
    }

    out
}

/// Returns the byte offset where an unterminated escape sequence at the end
/// of `bytes` begins, if there is one.
///
/// Used to hold back a sequence that was split across reads instead of
/// flushing half of it.
pub fn incomplete_escape_start(bytes: &[u8]) -> Option<usize> {
    let start = bytes.iter().rposition(|&b| b == 0x1b)?;
    let tail = &bytes[start + 1..];

    let complete = match tail.first() {
        None => false,
        Some(b'[') => tail[1..]
            .iter()
            .any(|&b| is_csi_final(char::from(b)) || !is_csi_body(char::from(b))),
        Some(b']') => tail[1..].contains(&0x07),
        Some(&b) if is_intermediate(char::from(b)) => tail
            .iter()
            .any(|&b| !is_intermediate(char::from(b))),
        Some(_) => true,
    };

    if complete { None } else { Some(start) }
}

fn is_csi_body(c: char) -> bool {
    ('\x20'..='\x3f').contains(&c)
}

fn is_csi_final(c: char) -> bool {
    ('\x40'..='\x7e').contains(&c)
}

fn is_intermediate(c: char) -> bool {
    ('\x20'..='\x2f').contains(&c)
}
