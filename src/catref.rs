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

//! `CatRef` — category reference, the `(area, id)` pair addressing a unique
//! disk-backed entity. Canonical form is `"area:id"`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique-room/monster/object key. `id < 0` denotes "directory-only", used
/// by loaders that scan an area directory without a specific numbered file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatRef {
    area: String,
    pub id: i32,
}

impl CatRef {
    pub fn new(area: impl Into<String>, id: i32) -> Self {
        CatRef {
            area: area.into().to_lowercase(),
            id,
        }
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    /// `true` if this ref names a directory rather than a specific file.
    pub fn is_directory_only(&self) -> bool {
        self.id < 0
    }

    /// Parse the canonical `"area:id"` form.
    pub fn parse(s: &str) -> Option<Self> {
        let (area, id) = s.split_once(':')?;
        let id: i32 = id.parse().ok()?;
        if area.is_empty() {
            return None;
        }
        Some(CatRef::new(area, id))
    }

    /// The on-disk filename for this ref given an entity-kind prefix, e.g.
    /// `filename("room")` -> `"room0001.xml"` (§6: zero-padded to 4 digits).
    pub fn filename(&self, kind: &str) -> String {
        format!("{kind}{:04}.xml", self.id.max(0))
    }
}

impl fmt::Display for CatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.area, self.id)
    }
}
