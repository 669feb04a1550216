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

//! Telnet (RFC 854) option negotiation FSM and input line framing (§4.2,
//! §6). No telnet crate exists anywhere in this pack, so this is a
//! from-scratch byte-scanner, structured the way the teacher's
//! `connection_codec.rs` structures its decoder: an explicit mode/state
//! enum plus a scan loop that is re-entrant across partial reads.

use std::collections::HashSet;

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;
pub const GA: u8 = 249;

/// Telnet options actively negotiated (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    Echo,
    Sga,
    Ttype,
    Naws,
    Charset,
    Eor,
    Compress2,
    Msdp,
    Mxp,
    Unknown(u8),
}

impl TelnetOption {
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => TelnetOption::Echo,
            3 => TelnetOption::Sga,
            24 => TelnetOption::Ttype,
            31 => TelnetOption::Naws,
            42 => TelnetOption::Charset,
            25 => TelnetOption::Eor,
            86 => TelnetOption::Compress2,
            69 => TelnetOption::Msdp,
            91 => TelnetOption::Mxp,
            other => TelnetOption::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            TelnetOption::Echo => 1,
            TelnetOption::Sga => 3,
            TelnetOption::Ttype => 24,
            TelnetOption::Naws => 31,
            TelnetOption::Charset => 42,
            TelnetOption::Eor => 25,
            TelnetOption::Compress2 => 86,
            TelnetOption::Msdp => 69,
            TelnetOption::Mxp => 91,
            TelnetOption::Unknown(b) => b,
        }
    }
}

/// Negotiation FSM states: `STREAM -> IAC -> {WILL,WONT,DO,DONT,SB}` (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsmState {
    Stream,
    SawIac,
    SawWill,
    SawWont,
    SawDo,
    SawDont,
    /// Sub-negotiation accumulates in a side buffer until `IAC SE`.
    SubNegotiation,
    /// Inside a sub-negotiation body, just saw an `IAC`: next byte is
    /// either `SE` (end) or an escaped literal `0xFF`.
    SubNegotiationIac,
}

/// A fact the FSM wants the session to act on: an option request from the
/// peer, a sub-negotiation payload, or a decoded input byte to append to
/// the plain-text accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    PeerWill(TelnetOption),
    PeerWont(TelnetOption),
    PeerDo(TelnetOption),
    PeerDont(TelnetOption),
    SubNegotiation(TelnetOption, Vec<u8>),
    /// `IAC GA`/`IAC EOR` — end-of-record marker, used by some clients as a
    /// prompt boundary.
    GoAhead,
}

/// Per-side negotiated option state (§3 "telnet-option state (bit set of
/// negotiated options per side)").
#[derive(Debug, Default, Clone)]
pub struct OptionState {
    pub we_will: HashSet<u8>,
    pub they_will: HashSet<u8>,
}

impl OptionState {
    pub fn they_enabled(&self, opt: TelnetOption) -> bool {
        self.they_will.contains(&opt.to_byte())
    }

    pub fn we_enabled(&self, opt: TelnetOption) -> bool {
        self.we_will.contains(&opt.to_byte())
    }
}

/// Scans raw bytes for telnet sequences, yielding `TelnetEvent`s for
/// anything telnet-specific and passing everything else through to
/// `plain`. Re-entrant: a sequence that straddles two calls resumes where
/// it left off because `state` and `sub_buf` live on the scanner, not the
/// call stack.
#[derive(Debug, Default)]
pub struct TelnetScanner {
    state: FsmStateBox,
    sub_option: Option<u8>,
    sub_buf: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct FsmStateBox(FsmState);

impl Default for FsmStateBox {
    fn default() -> Self {
        FsmStateBox(FsmState::Stream)
    }
}

impl TelnetScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to `STREAM` (§4.9: "malformed telnet sequence -> reset
    /// negotiation FSM to STREAM, continue").
    pub fn reset(&mut self) {
        self.state = FsmStateBox(FsmState::Stream);
        self.sub_option = None;
        self.sub_buf.clear();
    }

    /// Consume `input`, appending non-telnet bytes to `plain` and returning
    /// the telnet events observed, in order.
    pub fn scan(&mut self, input: &[u8], plain: &mut Vec<u8>) -> Vec<TelnetEvent> {
        let mut events = Vec::new();
        for &b in input {
            match self.state.0 {
                FsmState::Stream => {
                    if b == IAC {
                        self.state.0 = FsmState::SawIac;
                    } else {
                        plain.push(b);
                    }
                }
                FsmState::SawIac => match b {
                    WILL => self.state.0 = FsmState::SawWill,
                    WONT => self.state.0 = FsmState::SawWont,
                    DO => self.state.0 = FsmState::SawDo,
                    DONT => self.state.0 = FsmState::SawDont,
                    SB => self.state.0 = FsmState::SubNegotiation,
                    GA => {
                        events.push(TelnetEvent::GoAhead);
                        self.state.0 = FsmState::Stream;
                    }
                    IAC => {
                        // Escaped literal 0xFF in the data stream.
                        plain.push(IAC);
                        self.state.0 = FsmState::Stream;
                    }
                    _ => {
                        // Unrecognized command after IAC: reset (§4.9).
                        self.reset();
                    }
                },
                FsmState::SawWill => {
                    events.push(TelnetEvent::PeerWill(TelnetOption::from_byte(b)));
                    self.state.0 = FsmState::Stream;
                }
                FsmState::SawWont => {
                    events.push(TelnetEvent::PeerWont(TelnetOption::from_byte(b)));
                    self.state.0 = FsmState::Stream;
                }
                FsmState::SawDo => {
                    events.push(TelnetEvent::PeerDo(TelnetOption::from_byte(b)));
                    self.state.0 = FsmState::Stream;
                }
                FsmState::SawDont => {
                    events.push(TelnetEvent::PeerDont(TelnetOption::from_byte(b)));
                    self.state.0 = FsmState::Stream;
                }
                FsmState::SubNegotiation => {
                    if self.sub_option.is_none() {
                        self.sub_option = Some(b);
                    } else if b == IAC {
                        self.state.0 = FsmState::SubNegotiationIac;
                    } else {
                        self.sub_buf.push(b);
                    }
                }
                FsmState::SubNegotiationIac => {
                    if b == SE {
                        let opt = TelnetOption::from_byte(self.sub_option.take().unwrap_or(0));
                        events.push(TelnetEvent::SubNegotiation(opt, std::mem::take(&mut self.sub_buf)));
                        self.state.0 = FsmState::Stream;
                    } else if b == IAC {
                        self.sub_buf.push(IAC);
                        self.state.0 = FsmState::SubNegotiation;
                    } else {
                        // Malformed: anything other than SE or escaped IAC
                        // here is a protocol violation (§4.9).
                        self.reset();
                    }
                }
            }
        }
        events
    }
}

/// Splits `buf` on CR, LF, or CRLF into complete logical lines (without the
/// terminator), leaving any trailing partial line in `buf` (§4.2). Input is
/// expected to already have had telnet sequences stripped by
/// `TelnetScanner::scan`.
pub fn split_lines(buf: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            b'\r' => {
                lines.push(buf[start..i].to_vec());
                if buf.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                start = i + 1;
            }
            b'\n' => {
                lines.push(buf[start..i].to_vec());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    buf.drain(0..start);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_bytes_pass_through_untouched() {
        let mut scanner = TelnetScanner::new();
        let mut plain = Vec::new();
        let events = scanner.scan(b"hello world", &mut plain);
        assert!(events.is_empty());
        assert_eq!(plain, b"hello world");
    }

    #[test]
    fn do_compress2_is_reported() {
        let mut scanner = TelnetScanner::new();
        let mut plain = Vec::new();
        let events = scanner.scan(&[IAC, DO, TelnetOption::Compress2.to_byte()], &mut plain);
        assert_eq!(events, vec![TelnetEvent::PeerDo(TelnetOption::Compress2)]);
        assert!(plain.is_empty());
    }

    #[test]
    fn iac_sequence_split_across_two_calls_still_resolves() {
        let mut scanner = TelnetScanner::new();
        let mut plain = Vec::new();
        let e1 = scanner.scan(&[IAC], &mut plain);
        assert!(e1.is_empty());
        let e2 = scanner.scan(&[DO, TelnetOption::Mxp.to_byte()], &mut plain);
        assert_eq!(e2, vec![TelnetEvent::PeerDo(TelnetOption::Mxp)]);
    }

    #[test]
    fn escaped_iac_byte_is_passed_through_as_data() {
        let mut scanner = TelnetScanner::new();
        let mut plain = Vec::new();
        scanner.scan(&[b'a', IAC, IAC, b'b'], &mut plain);
        assert_eq!(plain, vec![b'a', IAC, b'b']);
    }

    #[test]
    fn subnegotiation_accumulates_until_iac_se() {
        let mut scanner = TelnetScanner::new();
        let mut plain = Vec::new();
        let msdp = TelnetOption::Msdp.to_byte();
        let events = scanner.scan(&[IAC, SB, msdp, 1, 2, 3, IAC, SE], &mut plain);
        assert_eq!(
            events,
            vec![TelnetEvent::SubNegotiation(TelnetOption::Msdp, vec![1, 2, 3])]
        );
    }

    #[test]
    fn malformed_subnegotiation_resets_to_stream() {
        let mut scanner = TelnetScanner::new();
        let mut plain = Vec::new();
        scanner.scan(&[IAC, SB, 1, IAC, 5 /* garbage, not SE or IAC */], &mut plain);
        // After reset, plain input resumes normally.
        let events = scanner.scan(b"ok", &mut plain);
        assert!(events.is_empty());
        assert_eq!(plain, b"ok");
    }

    #[test]
    fn split_lines_handles_cr_lf_and_crlf() {
        let mut buf = b"one\r\ntwo\nthree\rfour".to_vec();
        let lines = split_lines(&mut buf);
        assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert_eq!(buf, b"four");
    }

    #[test]
    fn split_lines_leaves_partial_trailing_line_in_buffer() {
        let mut buf = b"partial".to_vec();
        let lines = split_lines(&mut buf);
        assert!(lines.is_empty());
        assert_eq!(buf, b"partial");
    }
}
