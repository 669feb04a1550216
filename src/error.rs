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

//! The error kinds of §7, one `thiserror` enum per component boundary.
//! Everything here is recovered inside the loop; only `Fatal` conditions
//! (handled directly in `main` via `eyre::Result`) ever exit the process.

use thiserror::Error;

use crate::catref::CatRef;

/// Telnet/line-framing failures. Recovered by resetting the negotiation FSM
/// or, for a framing overflow, by closing the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed telnet sub-negotiation")]
    MalformedSubnegotiation,
    #[error("input line exceeded MAX_LINE ({0} bytes)")]
    LineTooLong(usize),
    #[error("input buffer exceeded its hard cap")]
    BufferOverflow,
}

/// Socket-level I/O failures. Always terminal for the session that raised
/// them; never surfaced to the user (there is no user to surface it to).
#[derive(Debug, Error)]
pub enum SessionIoError {
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("peer closed the connection")]
    Closed,
}

/// Command-dispatch failures (§4.3, §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("I don't understand that.")]
    Parse,
    #[error("{0}")]
    Precondition(String),
    #[error("You don't see that here.")]
    NotFound,
    #[error("that verb is ambiguous")]
    AmbiguousVerb,
    #[error("output buffer full, try again")]
    Overloaded,
}

/// Entity-cache / on-disk content failures (C4, C13).
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("no file on disk for {0}")]
    NotFound(CatRef),
    #[error("malformed entity document for {0}: {1}")]
    Malformed(CatRef, String),
    #[error("I/O error loading {0}: {1}")]
    Io(CatRef, #[source] std::io::Error),
}

/// Failures that abort boot entirely (§7 "Fatal"). These are surfaced
/// through `eyre::Result` in `main`, never recovered in the loop.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("failed to bind listening socket on {0}: {1}")]
    ListenerBind(String, #[source] std::io::Error),
    #[error("failed to create required directory {0}: {1}")]
    DirectoryCreate(std::path::PathBuf, #[source] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Config(String),
}
