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

//! Boot & shutdown (C12, §6): parse flags, layer config, bootstrap
//! directories, write the PID file, install signal flags, open the
//! listening socket, and run the C3 loop until told to stop. This binary
//! wires the core up with a no-op `GameHooks`: the command table and
//! entity loader are the embedder's concern (spec.md "Out of scope"), so
//! standing this binary up alone gets you a server that accepts
//! connections and runs the login FSM, but never admits anyone past it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{eyre, Report};

use mordor_core::clock::Clock;
use mordor_core::config::{self, Args, Config};
use mordor_core::logging;
use mordor_core::net::{Acceptor, GameHooks};
use mordor_core::scheduler::Scheduler;
use mordor_core::session::SessionId;
use mordor_core::world::{EntityId, World};

/// Stands in for the real command table / entity loader (spec.md "Out of
/// scope"). Refuses every login; a real deployment supplies its own
/// `GameHooks` embedding both.
struct NullHooks;

impl GameHooks for NullHooks {
    fn check_password(&self, _name: &str, _password: &str) -> bool {
        false
    }

    fn attach_player(&mut self, _session: SessionId, _name: &str) -> Option<EntityId> {
        None
    }

    fn on_command_line(&mut self, session: SessionId, _actor: EntityId, line: &str) {
        tracing::debug!(?session, %line, "no gameplay hooks installed, dropping command");
    }

    fn on_disconnect(&mut self, session: SessionId, _actor: Option<EntityId>) {
        tracing::debug!(?session, "session disconnected");
    }
}

fn bootstrap_directories(config: &Config) -> Result<(), Report> {
    for dir in [config.area_dir(), config.player_dir(), config.log_dir()] {
        std::fs::create_dir_all(&dir)
            .map_err(|e| mordor_core::error::FatalError::DirectoryCreate(dir.clone(), e))?;
    }
    Ok(())
}

fn write_pid_file(config: &Config) -> Result<(), Report> {
    let path = config.pid_file();
    std::fs::write(&path, format!("{}\n", std::process::id()))
        .map_err(|e| eyre!("failed to write PID file {:?}: {}", path, e))
}

/// `-r`: replace this process image in place with the same binary and
/// arguments (§6), keeping the listening socket's fd table semantics out
/// of the picture entirely since we're exiting cleanly first.
fn reexec() -> Result<(), Report> {
    let exe = std::env::current_exe()?;
    let args: Vec<std::ffi::CString> = std::env::args()
        .map(|a| std::ffi::CString::new(a).unwrap())
        .collect();
    let exe = std::ffi::CString::new(exe.to_string_lossy().as_bytes())?;
    nix::unistd::execv(&exe, &args).map_err(|e| eyre!("execv failed: {}", e))?;
    unreachable!("execv only returns on failure")
}

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::parse();
    logging::install(args.verbose);

    let config = config::load(&args)?;
    bootstrap_directories(&config)?;
    write_pid_file(&config)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone())?;

    let addr = format!("0.0.0.0:{}", config.port)
        .parse()
        .map_err(|e| eyre!("invalid listen address: {}", e))?;
    let mut acceptor = Acceptor::bind(addr)?;
    tracing::info!(port = config.port, data_dir = ?config.data_dir, "mordor listening");

    let mut world = World::new();
    let mut clock = Clock::new();
    let mut scheduler = Scheduler::new(config.save_all_interval);
    let mut hooks = NullHooks;

    while !shutdown.load(Ordering::Relaxed) {
        if let Err(e) = acceptor.poll_once(Duration::from_millis(100), &mut hooks) {
            tracing::warn!(error = %e, "poll_once failed");
        }
        scheduler.run_pass(&mut world, &mut clock);
    }

    tracing::info!("shutdown signal received, stopping");

    if config.reexec_on_shutdown {
        reexec()?;
    }

    Ok(())
}
