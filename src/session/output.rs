// Copyright (C) 2025 The Mordor Core Contributors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Output pipeline (§4.2): wrap -> color-render -> MXP-encode/strip ->
//! optionally compress -> append to the kernel-bound buffer.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

use crate::error::DispatchError;

/// Above this many buffered-but-unwritten bytes, further handler writes are
/// rejected with a soft "slow down" rather than dropped (§4.2, §4.9).
pub const HIGH_WATER_MARK: usize = 64 * 1024;

/// Caret-based in-band color encoding (`^R`, `^x`, …) -> ANSI SGR (§6).
fn caret_to_ansi(code: u8) -> Option<&'static str> {
    match code.to_ascii_uppercase() {
        b'X' => Some("\x1b[0m"),  // ^x : reset
        b'R' => Some("\x1b[31m"), // red
        b'G' => Some("\x1b[32m"), // green
        b'Y' => Some("\x1b[33m"), // yellow
        b'B' => Some("\x1b[34m"), // blue
        b'M' => Some("\x1b[35m"), // magenta
        b'C' => Some("\x1b[36m"), // cyan
        b'W' => Some("\x1b[37m"), // white
        _ => None,
    }
}

/// Render (or strip) caret color codes. `color_on` mirrors a client
/// capability toggle stored on the session.
fn render_color(input: &str, color_on: bool) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '^' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_alphabetic() {
                    chars.next();
                    if color_on {
                        if let Some(ansi) = caret_to_ansi(next as u8) {
                            out.push_str(ansi);
                        }
                    }
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// A single fixed vocabulary of MXP element tags the core is willing to
/// emit (§4.2). Anything not in this set that looks like a tag is just
/// stripped, never passed through.
const MXP_TAG_OPEN: char = '\u{1}'; // internal marker the staging text uses to bracket an MXP tag
const MXP_TAG_CLOSE: char = '\u{2}';

fn encode_or_strip_mxp(input: &str, mxp_on: bool) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            c if c == MXP_TAG_OPEN => {
                in_tag = true;
                if mxp_on {
                    out.push('<');
                }
            }
            c if c == MXP_TAG_CLOSE => {
                in_tag = false;
                if mxp_on {
                    out.push('>');
                }
            }
            _ if in_tag => {
                if mxp_on {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Word-wrap to `width` columns; `width < 0` disables wrapping entirely.
fn wrap(input: &str, width: i32) -> String {
    if width <= 0 {
        return input.to_string();
    }
    let width = width as usize;
    let mut out = String::with_capacity(input.len() + input.len() / width.max(1));
    for line in input.split('\n') {
        let mut col = 0;
        for (i, word) in line.split(' ').enumerate() {
            let sep = if i == 0 { 0 } else { 1 };
            if col + sep + word.len() > width && col > 0 {
                out.push('\n');
                col = 0;
            } else if i > 0 {
                out.push(' ');
                col += 1;
            }
            out.push_str(word);
            col += word.len();
        }
        out.push('\n');
    }
    if out.ends_with('\n') {
        out.pop();
    }
    out
}

/// Render settings pulled from session state; kept as plain data so this
/// module has no dependency on the `Session` type itself.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub wrap_width: i32,
    pub color_on: bool,
    pub mxp_on: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            wrap_width: 80,
            color_on: true,
            mxp_on: false,
        }
    }
}

/// Everything the output pipeline needs to turn staged text into bytes fit
/// to hand to the socket, plus the backpressure bookkeeping from §4.2/§4.9.
#[derive(Default)]
pub struct OutputPipeline {
    /// Text queued by handlers, not yet rendered.
    staging: String,
    /// Bytes rendered and ready to write to the socket.
    out_buf: Vec<u8>,
    compressor: Option<ZlibEncoder<Vec<u8>>>,
    pub backpressured: bool,
}

impl OutputPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue logical text from a handler. Rejected with `Overloaded` if the
    /// kernel-bound buffer is already past the high-water mark (§4.2).
    pub fn push(&mut self, text: &str) -> Result<(), DispatchError> {
        if self.out_buf.len() > HIGH_WATER_MARK {
            self.backpressured = true;
            return Err(DispatchError::Overloaded);
        }
        self.staging.push_str(text);
        Ok(())
    }

    /// Enable MCCP from this point forward: output from here on is zlib
    /// compressed. Input is never compressed (§4.2).
    pub fn enable_compression(&mut self) {
        self.compressor = Some(ZlibEncoder::new(Vec::new(), Compression::default()));
    }

    /// Disable compression, tearing the stream down on a byte boundary
    /// (§4.2): finishes the current zlib stream and flushes its tail.
    pub fn disable_compression(&mut self) {
        if let Some(enc) = self.compressor.take() {
            if let Ok(tail) = enc.finish() {
                self.out_buf.extend_from_slice(&tail);
            }
        }
    }

    /// Run the staged text through wrap -> color -> MXP -> compress and
    /// append the result to the kernel-bound buffer. Idempotent: calling
    /// with nothing staged is a no-op.
    pub fn flush(&mut self, opts: RenderOptions) {
        if self.staging.is_empty() {
            return;
        }
        let staged = std::mem::take(&mut self.staging);
        let wrapped = wrap(&staged, opts.wrap_width);
        let colored = render_color(&wrapped, opts.color_on);
        let mxp = encode_or_strip_mxp(&colored, opts.mxp_on);

        match &mut self.compressor {
            Some(enc) => {
                let _ = enc.write_all(mxp.as_bytes());
                let _ = enc.flush();
                // ZlibEncoder<Vec<u8>> buffers into its inner Vec; drain it
                // into the socket-bound buffer so repeated flushes don't
                // re-walk already-written bytes.
                self.out_buf.append(enc.get_mut());
            }
            None => self.out_buf.extend_from_slice(mxp.as_bytes()),
        }

        if self.out_buf.len() <= HIGH_WATER_MARK {
            self.backpressured = false;
        }
    }

    pub fn pending_bytes(&self) -> &[u8] {
        &self.out_buf
    }

    pub fn has_pending(&self) -> bool {
        !self.out_buf.is_empty()
    }

    /// Consume `n` bytes from the front after a successful non-blocking
    /// write (§4.1 step 4: "for each writable session ... call
    /// Session.on_writable()").
    pub fn consume(&mut self, n: usize) {
        self.out_buf.drain(0..n.min(self.out_buf.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_stripped_when_off() {
        let rendered = render_color("^Rhello^x", false);
        assert_eq!(rendered, "hello");
    }

    #[test]
    fn color_rendered_to_ansi_when_on() {
        let rendered = render_color("^Rhello^x", true);
        assert_eq!(rendered, "\x1b[31mhello\x1b[0m");
    }

    #[test]
    fn mxp_stripped_when_disabled() {
        let input = format!("{MXP_TAG_OPEN}send{MXP_TAG_CLOSE}hi{MXP_TAG_OPEN}/send{MXP_TAG_CLOSE}");
        assert_eq!(encode_or_strip_mxp(&input, false), "hi");
    }

    #[test]
    fn mxp_emitted_when_enabled() {
        let input = format!("{MXP_TAG_OPEN}send{MXP_TAG_CLOSE}hi");
        assert_eq!(encode_or_strip_mxp(&input, true), "<send>hi");
    }

    #[test]
    fn wrap_disabled_with_negative_width() {
        let long = "a ".repeat(100);
        assert_eq!(wrap(&long, -1), long);
    }

    #[test]
    fn wrap_breaks_long_lines() {
        let wrapped = wrap("a b c d e f g h i j", 5);
        assert!(wrapped.lines().all(|l| l.len() <= 5));
    }

    #[test]
    fn push_rejected_once_above_high_water_mark() {
        let mut pipe = OutputPipeline::new();
        pipe.out_buf = vec![0u8; HIGH_WATER_MARK + 1];
        let err = pipe.push("more").unwrap_err();
        assert_eq!(err, DispatchError::Overloaded);
        assert!(pipe.backpressured);
    }

    #[test]
    fn flush_without_compression_appends_plain_bytes() {
        let mut pipe = OutputPipeline::new();
        pipe.push("hello").unwrap();
        pipe.flush(RenderOptions {
            wrap_width: -1,
            color_on: false,
            mxp_on: false,
        });
        assert_eq!(pipe.pending_bytes(), b"hello");
    }

    #[test]
    fn compressed_output_round_trips() {
        let mut pipe = OutputPipeline::new();
        pipe.enable_compression();
        pipe.push("hello compressed world").unwrap();
        pipe.flush(RenderOptions {
            wrap_width: -1,
            color_on: false,
            mxp_on: false,
        });
        pipe.disable_compression();

        let mut decoder = flate2::read::ZlibDecoder::new(pipe.pending_bytes());
        let mut decompressed = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut decompressed).unwrap();
        assert_eq!(decompressed, "hello compressed world");
    }

    #[test]
    fn consume_drains_from_the_front() {
        let mut pipe = OutputPipeline::new();
        pipe.push("hello").unwrap();
        pipe.flush(RenderOptions {
            wrap_width: -1,
            color_on: false,
            mxp_on: false,
        });
        pipe.consume(2);
        assert_eq!(pipe.pending_bytes(), b"llo");
    }
}
