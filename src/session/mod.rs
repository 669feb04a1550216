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

//! Session (C2): the per-connection object bundling socket, buffers,
//! negotiation state, and login state (§3).

pub mod login;
pub mod output;
pub mod telnet;

use std::collections::HashMap;
use std::time::Instant;

use uuid::Uuid;

use crate::error::ProtocolError;
use crate::session::login::LoginState;
use crate::session::output::{OutputPipeline, RenderOptions};
use crate::session::telnet::{OptionState, TelnetEvent, TelnetOption, TelnetScanner};
use crate::world::EntityId;

/// Longest line this core will dispatch (§4.2, §8 "Boundary").
pub const MAX_LINE: usize = 4096;

/// Hard cap on the unterminated input buffer. Kept strictly larger than
/// `MAX_LINE` so a single over-long line is still framed off the buffer and
/// rejected as `LineTooLong`, rather than tripping this cap first and
/// masking which input actually misbehaved.
const MAX_BUFFER: usize = MAX_LINE * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-connection state machine. §3: "created on accept; destroyed when
/// the socket closes *and* the loop is not mid-iteration over the session
/// set (pending-delete flag)."
pub struct Session {
    pub id: SessionId,
    pub peer_addr: std::net::SocketAddr,

    input_buf: Vec<u8>,
    pending_lines: std::collections::VecDeque<Vec<u8>>,
    /// Guarantees "one input line per session per dispatcher pass" (§4.2
    /// "Line delivery"): cleared at the top of each pass, set once a line
    /// from `pending_lines` has been handed to the dispatcher this pass.
    dispatched_this_pass: bool,

    scanner: TelnetScanner,
    pub options: OptionState,
    pub render: RenderOptions,
    pub output: OutputPipeline,

    pub login_state: LoginState,
    pub player: Option<EntityId>,

    pub ttype: Option<String>,
    pub naws: Option<(u16, u16)>,
    pub charset: Option<String>,

    pub last_activity: Instant,
    pub pending_delete: bool,
    /// The reason recorded for logging when a session is torn down due to a
    /// protocol violation (§4.2, §8 "Boundary").
    pub close_reason: Option<String>,

    /// MSDP variables pushed on change; only a subset is ever sent (§4.2).
    msdp_vars: HashMap<String, String>,
}

impl Session {
    pub fn new(peer_addr: std::net::SocketAddr) -> Self {
        Session {
            id: SessionId::new(),
            peer_addr,
            input_buf: Vec::new(),
            pending_lines: std::collections::VecDeque::new(),
            dispatched_this_pass: false,
            scanner: TelnetScanner::new(),
            options: OptionState::default(),
            render: RenderOptions::default(),
            output: OutputPipeline::new(),
            login_state: LoginState::Connected,
            player: None,
            ttype: None,
            naws: None,
            charset: None,
            last_activity: Instant::now(),
            pending_delete: false,
            close_reason: None,
            msdp_vars: HashMap::new(),
        }
    }

    pub fn is_in_world(&self) -> bool {
        self.login_state == LoginState::InWorld
    }

    pub fn mark_pending_delete(&mut self, reason: impl Into<String>) {
        self.pending_delete = true;
        self.close_reason = Some(reason.into());
    }

    /// §4.1 top-of-pass bookkeeping: release the one-line-per-pass gate.
    pub fn begin_pass(&mut self) {
        self.dispatched_this_pass = false;
    }

    /// Bytes arrived on the socket. Appends to the input buffer, scans for
    /// telnet sequences, and frames complete lines (§4.2). Closes the
    /// session with a protocol violation if the buffer's hard cap is
    /// exceeded before a terminator arrives (§8 "Boundary").
    pub fn on_readable_bytes(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.last_activity = Instant::now();
        let mut plain = Vec::new();
        let events = self.scanner.scan(bytes, &mut plain);
        for event in events {
            self.handle_telnet_event(event);
        }

        self.input_buf.extend_from_slice(&plain);
        if self.input_buf.len() > MAX_BUFFER {
            return Err(ProtocolError::BufferOverflow);
        }

        for line in telnet::split_lines(&mut self.input_buf) {
            if line.len() > MAX_LINE {
                return Err(ProtocolError::LineTooLong(line.len()));
            }
            self.pending_lines.push_back(line);
        }
        Ok(())
    }

    fn handle_telnet_event(&mut self, event: TelnetEvent) {
        match event {
            TelnetEvent::PeerDo(opt) => {
                self.options.we_will.insert(opt.to_byte());
                if opt == TelnetOption::Compress2 {
                    self.output.enable_compression();
                }
            }
            TelnetEvent::PeerDont(opt) => {
                self.options.we_will.remove(&opt.to_byte());
                if opt == TelnetOption::Compress2 {
                    self.output.disable_compression();
                }
            }
            TelnetEvent::PeerWill(opt) => {
                self.options.they_will.insert(opt.to_byte());
            }
            TelnetEvent::PeerWont(opt) => {
                self.options.they_will.remove(&opt.to_byte());
            }
            TelnetEvent::SubNegotiation(TelnetOption::Naws, data) if data.len() >= 4 => {
                let width = u16::from_be_bytes([data[0], data[1]]);
                let height = u16::from_be_bytes([data[2], data[3]]);
                self.naws = Some((width, height));
                self.render.wrap_width = width as i32;
            }
            TelnetEvent::SubNegotiation(TelnetOption::Ttype, data) => {
                self.ttype = Some(String::from_utf8_lossy(&data).trim_start_matches('\0').to_string());
            }
            TelnetEvent::SubNegotiation(TelnetOption::Charset, data) => {
                self.charset = Some(String::from_utf8_lossy(&data).to_string());
            }
            TelnetEvent::SubNegotiation(TelnetOption::Msdp, data) => {
                // A real MSDP payload is VAR/VAL-tagged; accepting the raw
                // bytes as an opaque update is enough at the core layer —
                // gameplay owns variable semantics.
                self.msdp_vars
                    .insert("raw".to_string(), String::from_utf8_lossy(&data).to_string());
            }
            _ => {}
        }
    }

    /// Pop the next pending line for dispatch, enforcing "at most one input
    /// line per session per dispatcher pass" (§4.2, §5 ordering guarantee
    /// #2, §8 "Fairness").
    pub fn take_line_for_dispatch(&mut self) -> Option<Vec<u8>> {
        if self.dispatched_this_pass || self.pending_delete {
            return None;
        }
        let line = self.pending_lines.pop_front();
        if line.is_some() {
            self.dispatched_this_pass = true;
        }
        line
    }

    pub fn has_pending_line(&self) -> bool {
        !self.pending_lines.is_empty() && !self.dispatched_this_pass
    }

    pub fn queue_output(&mut self, text: &str) -> Result<(), crate::error::DispatchError> {
        if self.pending_delete {
            // §5 "Cancellation": output addressed to a dead session is
            // dropped, not queued.
            return Ok(());
        }
        self.output.push(text)
    }

    pub fn flush_output(&mut self) {
        self.output.flush(self.render);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> std::net::SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn one_line_per_pass_is_enforced() {
        let mut s = Session::new(addr());
        s.on_readable_bytes(b"look\r\nnorth\r\n").unwrap();

        assert_eq!(s.take_line_for_dispatch(), Some(b"look".to_vec()));
        assert_eq!(s.take_line_for_dispatch(), None);

        s.begin_pass();
        assert_eq!(s.take_line_for_dispatch(), Some(b"north".to_vec()));
    }

    #[test]
    fn oversized_line_reports_protocol_violation() {
        let mut s = Session::new(addr());
        let long_line = vec![b'a'; MAX_LINE + 1];
        let mut input = long_line.clone();
        input.push(b'\n');
        let err = s.on_readable_bytes(&input).unwrap_err();
        assert_eq!(err, ProtocolError::LineTooLong(MAX_LINE + 1));
    }

    #[test]
    fn line_exactly_at_max_line_succeeds() {
        let mut s = Session::new(addr());
        let mut input = vec![b'a'; MAX_LINE];
        input.push(b'\n');
        assert!(s.on_readable_bytes(&input).is_ok());
        assert_eq!(s.take_line_for_dispatch().unwrap().len(), MAX_LINE);
    }

    #[test]
    fn pending_delete_session_yields_no_more_lines() {
        let mut s = Session::new(addr());
        s.on_readable_bytes(b"hi\r\n").unwrap();
        s.mark_pending_delete("io error");
        assert_eq!(s.take_line_for_dispatch(), None);
    }

    #[test]
    fn do_compress2_enables_compression_on_the_output_pipeline() {
        let mut s = Session::new(addr());
        s.on_readable_bytes(&[telnet::IAC, telnet::DO, TelnetOption::Compress2.to_byte()])
            .unwrap();
        assert!(s.options.we_enabled(TelnetOption::Compress2));
        s.queue_output("hi").unwrap();
        s.flush_output();
        // Compressed output is never the plain bytes we pushed.
        assert_ne!(s.output.pending_bytes(), b"hi");
    }

    #[test]
    fn naws_updates_wrap_width() {
        let mut s = Session::new(addr());
        let mut input = vec![telnet::IAC, telnet::SB, TelnetOption::Naws.to_byte()];
        input.extend_from_slice(&100u16.to_be_bytes());
        input.extend_from_slice(&40u16.to_be_bytes());
        input.push(telnet::IAC);
        input.push(telnet::SE);
        s.on_readable_bytes(&input).unwrap();
        assert_eq!(s.naws, Some((100, 40)));
        assert_eq!(s.render.wrap_width, 100);
    }
}
