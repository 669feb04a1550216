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

use crate::catref::CatRef;
use crate::world::ContentSet;

/// Where a room is addressed from: a specific on-disk file (`Unique`), or a
/// procedurally placed marker on an area map (`Area`). §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomAddress {
    Unique(CatRef),
    Area { area: String, marker: u32 },
}

#[derive(Debug, Clone)]
pub struct Exit {
    pub name: String,
    pub keywords: Vec<String>,
    pub destination: RoomAddress,
    /// Exits can be closed/locked; gameplay behavior beyond that bit is an
    /// external collaborator's concern.
    pub closed: bool,
}

/// Controls autonomous wandering for monsters native to this room; the
/// behavior itself (where wandering monsters go, how often) is gameplay and
/// lives with the Command/Entity-loader seam, not here.
#[derive(Debug, Clone, Default)]
pub struct WanderDescriptor {
    pub allowed: bool,
    pub traffic: u8,
}

/// A world location. §3 invariant #1 (parent/child agreement) is enforced
/// by `World::move_entity`/`detach`, not by this struct directly — `Room`
/// only stores the `ContentSet`; it never hands out a way to mutate it
/// except through the `World` that owns it.
#[derive(Debug, Clone)]
pub struct Room {
    pub address: RoomAddress,
    pub name: String,
    pub description: String,
    pub exits: Vec<Exit>,
    pub wander: WanderDescriptor,
    pub(crate) contents: ContentSet,
}

impl Room {
    pub fn new_unique(key: CatRef) -> Self {
        Room {
            address: RoomAddress::Unique(key),
            name: String::new(),
            description: String::new(),
            exits: Vec::new(),
            wander: WanderDescriptor::default(),
            contents: ContentSet::default(),
        }
    }

    pub fn new_area(area: impl Into<String>, marker: u32) -> Self {
        Room {
            address: RoomAddress::Area {
                area: area.into(),
                marker,
            },
            name: String::new(),
            description: String::new(),
            exits: Vec::new(),
            wander: WanderDescriptor::default(),
            contents: ContentSet::default(),
        }
    }

    pub fn catref(&self) -> Option<&CatRef> {
        match &self.address {
            RoomAddress::Unique(k) => Some(k),
            RoomAddress::Area { .. } => None,
        }
    }

    pub fn has_occupants(&self) -> bool {
        !self.contents.is_empty()
    }

    pub fn contents(&self) -> &ContentSet {
        &self.contents
    }
}
