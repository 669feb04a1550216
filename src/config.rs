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

//! Layered configuration (C10): a `clap` CLI layer over a `figment` file/env
//! layer, matching the teacher's `moor-daemon` pattern (`args.rs`
//! `#[derive(Parser)]` struct merged over `moor_kernel::config::Config`).

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::ValueHint;
use clap_derive::Parser;
use figment::providers::{Env, Format, Json, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::FatalError;

#[derive(Parser, Debug)]
#[command(name = "mordor", about = "A multi-user dungeon server core")]
pub struct Args {
    /// Port to listen on, overriding the configured value.
    pub port: Option<u16>,

    #[arg(
        short,
        long,
        value_name = "config",
        help = "Path to a YAML or JSON configuration file",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[arg(
        short = 'r',
        long,
        help = "Re-exec this binary in place after a clean shutdown, instead of exiting"
    )]
    pub reexec: bool,

    #[arg(short = 'g', long, help = "Run with gameplay logging (audited commands) enabled")]
    pub audit: bool,

    #[arg(short = 'v', long, action = clap::ArgAction::Count, help = "Increase log verbosity (repeatable)")]
    pub verbose: u8,

    #[arg(long, value_name = "data-dir", help = "Root directory for areas/player files/logs", value_hint = ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,
}

/// The merged, effective configuration (§4.7, §6 filesystem layout).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub room_cache_capacity: usize,
    pub monster_cache_capacity: usize,
    pub object_cache_capacity: usize,
    #[serde(with = "duration_secs")]
    pub save_all_interval: Duration,
    pub audit_logging: bool,
    pub reexec_on_shutdown: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 4000,
            data_dir: PathBuf::from("."),
            room_cache_capacity: 600,
            monster_cache_capacity: 200,
            object_cache_capacity: 200,
            save_all_interval: Duration::from_secs(900),
            audit_logging: false,
            reexec_on_shutdown: false,
        }
    }
}

impl Config {
    pub fn area_dir(&self) -> PathBuf {
        self.data_dir.join("areas")
    }

    pub fn player_dir(&self) -> PathBuf {
        self.data_dir.join("player")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("log")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.data_dir.join(format!("mordor{}.pid", self.port))
    }
}

/// Layer defaults -> optional file -> environment (`MORDOR_*`) -> CLI
/// (§4.7/C10). CLI wins because it is applied last and only for fields the
/// user actually passed.
pub fn load(args: &Args) -> Result<Config, FatalError> {
    let mut figment = Figment::from(figment::providers::Serialized::defaults(Config::default()));

    if let Some(path) = &args.config_file {
        figment = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => figment.merge(Json::file(path)),
            _ => figment.merge(Yaml::file(path)),
        };
    }

    figment = figment.merge(Env::prefixed("MORDOR_"));

    let mut config: Config = figment
        .extract()
        .map_err(|e| FatalError::Config(e.to_string()))?;

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if args.audit {
        config.audit_logging = true;
    }
    if args.reexec {
        config.reexec_on_shutdown = true;
    }

    Ok(config)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
