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

//! Core entity types (§3). Gameplay attributes (stats, inventories' item
//! semantics, combat math) are the external collaborator's concern; these
//! structs carry only what the server core needs to hold containment,
//! addressing, and cache/persistence together.

mod monster;
mod object;
mod player;
mod room;

pub use monster::Monster;
pub use object::Object;
pub use player::Player;
pub use room::{Exit, Room, RoomAddress, WanderDescriptor};

use crate::world::EntityId;

/// Back-reference from `Player` to its `Session`. Weak in the sense of §9's
/// design note: the session, on its own destruction, is responsible for
/// invalidating any `Player` that still points at it (see `Session::drop`
/// semantics in `session::mod`). This is never a liveness claim about the
/// session — a `None` here just means link-dead, not "player is gone".
pub type SessionRef = Option<crate::session::SessionId>;

/// A handle to an object carried or equipped by a `Player`/`Monster`, or
/// contained within another `Object`. Re-exported here because both
/// `Player` and `Monster` need it and it is not tied to any one of them.
pub type Inventory = Vec<EntityId>;
