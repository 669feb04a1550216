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

//! Logging setup (C11): a compact `tracing-subscriber` formatter, mirroring
//! the teacher's `telnet-host`/`daemon` `main.rs` (file/line/thread-name
//! annotated, level gated by a verbosity count rather than a single debug
//! flag, `RUST_LOG` honored via `EnvFilter` for ad-hoc overrides).

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `verbosity` is the `-v` repeat count from
/// the CLI (§4.7/C10): 0 = INFO, 1 = DEBUG, 2+ = TRACE. `RUST_LOG`, if set,
/// takes precedence over the verbosity-derived default.
pub fn install(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .compact()
        .with_ansi(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true)
        .with_env_filter(filter)
        .init();
}
