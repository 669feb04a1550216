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

use std::collections::HashMap;

use crate::catref::CatRef;
use crate::clock::Timer;
use crate::entity::{Inventory, SessionRef};
use crate::world::EntityId;

/// A live character. §3: "Back-reference to its Session is weak (may be
/// null when link-dead)." Persisted to disk on logout, periodic save, and
/// clean shutdown (the tick scheduler's save-all job, §4.5).
#[derive(Debug, Clone)]
pub struct Player {
    pub name: String,
    pub session: SessionRef,
    pub carried: Inventory,
    pub equipped: Inventory,
    pub followers: Vec<EntityId>,
    pub pets: Vec<EntityId>,
    /// Names this player has refused further interaction from for the
    /// current session; cleared on reconnect (§3: "per-session refusals").
    pub refusals: Vec<String>,
    /// Per-command cooldowns applied by the dispatcher's post-invoke step
    /// (§4.3 step 6).
    pub cooldowns: HashMap<String, Timer>,
    /// Where the player respawns / is bound, independent of current
    /// location.
    pub bound_room: Option<CatRef>,
    pub level: u16,
    pub is_staff: bool,
    pub is_builder: bool,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Player {
            name: name.into(),
            session: None,
            carried: Vec::new(),
            equipped: Vec::new(),
            followers: Vec::new(),
            pets: Vec::new(),
            refusals: Vec::new(),
            cooldowns: HashMap::new(),
            bound_room: None,
            level: 1,
            is_staff: false,
            is_builder: false,
        }
    }

    /// §3: "A session may outlive its Player (reconnect races)." This is
    /// the inverse check: a Player may outlive its Session (link-dead).
    pub fn is_link_dead(&self) -> bool {
        self.session.is_none()
    }

    pub fn refuses(&self, other_name: &str) -> bool {
        self.refusals.iter().any(|r| r.eq_ignore_ascii_case(other_name))
    }
}
