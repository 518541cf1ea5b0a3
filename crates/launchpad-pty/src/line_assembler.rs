//! Line buffering with idle-based partial-line flushing.
//!
//! Complete lines are extracted as soon as their `\n` arrives. A trailing
//! partial line (typically an interactive prompt such as `Enter value: `) is
//! only emitted once the reader has seen `idle_threshold` consecutive empty
//! polls, so a line that is merely split across two reads is not shown in
//! pieces.

use crate::ansi;

/// Accumulates raw PTY bytes and turns them into display lines.
///
/// After every operation the buffer holds no `\n`: complete lines are always
/// taken out eagerly.
#[derive(Debug)]
pub struct LineAssembler {
    buf: Vec<u8>,
    idle_ticks: u32,
    idle_threshold: u32,
    max_line_bytes: usize,
}

impl LineAssembler {
    /// Creates an assembler that flushes a partial line after
    /// `idle_threshold` idle ticks, or as soon as it exceeds `max_line_bytes`.
    pub fn new(idle_threshold: u32, max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            idle_ticks: 0,
            idle_threshold: idle_threshold.max(1),
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// Appends freshly read bytes and returns every line they completed.
    ///
    /// Data arriving means the stream is not idle, so the tick counter resets.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.idle_ticks = 0;
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(render(&line[..pos]));
        }

        if self.buf.len() > self.max_line_bytes {
            let cut = flushable_len(&self.buf);
            if cut > 0 {
                let line: Vec<u8> = self.buf.drain(..cut).collect();
                lines.push(render(&line));
            }
        }

        lines
    }

    /// Records one poll interval without data.
    ///
    /// Returns the partial line once the idle threshold is reached. Ticks only
    /// count while something is buffered.
    pub fn tick(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            self.idle_ticks = 0;
            return None;
        }

        self.idle_ticks += 1;
        if self.idle_ticks < self.idle_threshold {
            return None;
        }
        self.idle_ticks = 0;

        let cut = flushable_len(&self.buf);
        if cut == 0 {
            return None;
        }
        let partial: Vec<u8> = self.buf.drain(..cut).collect();
        non_empty(render(&partial))
    }

    /// Flushes whatever is left, complete or not. Used once the PTY closed.
    pub fn finish(&mut self) -> Option<String> {
        self.idle_ticks = 0;
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        non_empty(render(&rest))
    }

    /// True if a partial line is waiting for a newline or an idle flush.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Consecutive idle ticks seen since the last data or flush.
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }
}

/// Decodes and cleans one line. Invalid UTF-8 is replaced, not rejected.
fn render(bytes: &[u8]) -> String {
    ansi::strip(&String::from_utf8_lossy(bytes))
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

/// Length of the prefix of `buf` that can be flushed without splitting a
/// UTF-8 character or an escape sequence.
fn flushable_len(buf: &[u8]) -> usize {
    let mut len = match std::str::from_utf8(buf) {
        Ok(_) => buf.len(),
        // `error_len() == None` means the input ends mid-character.
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => buf.len(),
    };
    if let Some(start) = ansi::incomplete_escape_start(&buf[..len]) {
        len = start;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> LineAssembler {
        LineAssembler::new(2, 64 * 1024)
    }

    #[test]
    fn test_complete_lines_emitted_immediately() {
        let mut asm = assembler();
        assert_eq!(asm.push(b"hello\r\nworld\r\n"), vec!["hello", "world"]);
        assert!(!asm.has_partial());
        assert_eq!(asm.tick(), None);
        assert_eq!(asm.finish(), None);
    }

    #[test]
    fn test_line_split_across_reads() {
        let mut asm = assembler();
        assert!(asm.push(b"hel").is_empty());
        assert!(asm.push(b"lo wo").is_empty());
        assert_eq!(asm.push(b"rld\nnext"), vec!["hello world"]);
        assert!(asm.has_partial());
    }

    #[test]
    fn test_n_newlines_give_n_lines_then_one_partial() {
        let mut asm = assembler();
        let input: &[&[u8]] = &[b"a\nb", b"\n\nc", b"\nprompt> "];
        let mut lines = Vec::new();
        for chunk in input {
            lines.extend(asm.push(chunk));
        }
        let newlines = input.iter().flat_map(|c| c.iter()).filter(|&&b| b == b'\n').count();
        assert_eq!(lines.len(), newlines);
        assert_eq!(lines, vec!["a", "b", "", "c"]);

        // Below threshold: nothing yet.
        assert_eq!(asm.tick(), None);
        // Threshold reached: the partial comes out exactly once.
        assert_eq!(asm.tick(), Some("prompt> ".to_string()));
        assert_eq!(asm.tick(), None);
        assert_eq!(asm.tick(), None);
        assert_eq!(asm.finish(), None);
    }

    #[test]
    fn test_data_resets_idle_counter() {
        let mut asm = assembler();
        asm.push(b"Enter ");
        assert_eq!(asm.tick(), None);
        assert_eq!(asm.idle_ticks(), 1);
        asm.push(b"name: ");
        assert_eq!(asm.idle_ticks(), 0);
        assert_eq!(asm.tick(), None);
        assert_eq!(asm.tick(), Some("Enter name: ".to_string()));
    }

    #[test]
    fn test_ticks_do_not_accumulate_while_empty() {
        let mut asm = assembler();
        assert_eq!(asm.tick(), None);
        assert_eq!(asm.tick(), None);
        assert_eq!(asm.idle_ticks(), 0);
        asm.push(b"x");
        assert_eq!(asm.tick(), None);
    }

    #[test]
    fn test_lines_are_ansi_stripped() {
        let mut asm = assembler();
        assert_eq!(
            asm.push(b"\x1b[32mok\x1b[0m\r\n\x1b[1mName\x1b[0m: "),
            vec!["ok"]
        );
        asm.tick();
        assert_eq!(asm.tick(), Some("Name: ".to_string()));
    }

    #[test]
    fn test_escape_only_partial_is_discarded() {
        let mut asm = assembler();
        asm.push(b"\x1b[?25l");
        asm.tick();
        assert_eq!(asm.tick(), None);
        assert!(!asm.has_partial());
    }

    #[test]
    fn test_idle_flush_holds_back_split_escape() {
        let mut asm = assembler();
        asm.push(b"Name: \x1b[3");
        asm.tick();
        assert_eq!(asm.tick(), Some("Name: ".to_string()));
        assert!(asm.has_partial());
        assert_eq!(asm.push(b"1mred\x1b[0m\n"), vec!["red"]);
    }

    #[test]
    fn test_idle_flush_holds_back_split_utf8() {
        let crab = "🦀".as_bytes();
        let mut asm = assembler();
        let mut first = b"crab ".to_vec();
        first.extend_from_slice(&crab[..2]);
        asm.push(&first);
        asm.tick();
        assert_eq!(asm.tick(), Some("crab ".to_string()));
        assert_eq!(asm.push(&[&crab[2..], &b"\n"[..]].concat()), vec!["🦀"]);
    }

    #[test]
    fn test_finish_flushes_everything() {
        let mut asm = assembler();
        asm.push(b"no newline at end\x1b[0");
        assert_eq!(asm.finish(), Some("no newline at end".to_string()));
        assert!(!asm.has_partial());
    }

    #[test]
    fn test_long_partial_is_flushed_without_newline() {
        let mut asm = LineAssembler::new(2, 8);
        assert!(asm.push(b"12345").is_empty());
        assert_eq!(asm.push(b"6789ab"), vec!["123456789ab"]);
        assert!(!asm.has_partial());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut asm = assembler();
        assert_eq!(asm.push(b"bad \xff byte\n"), vec!["bad \u{fffd} byte"]);
    }
}
