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

//! Command resolution table (§4.3 step 3): longest-unambiguous-prefix
//! lookup over a table sorted with a fixed tie-break (longer known commands
//! first, then alphabetical), grounded in the original's linear command
//! table scan.

use std::time::Duration;

use crate::clock::{MonoTime, Timer};
use crate::entity::Player;
use crate::error::DispatchError;

/// Auth predicate evaluated in the gate step (§4.3 step 4). Returns `Ok(())`
/// or the reason the command was refused.
pub type AuthPredicate = fn(&Player) -> Result<(), String>;

/// A registered verb. `aliases` resolve to the same `Command` (§4.3 step 3).
#[derive(Clone)]
pub struct Command {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub gate: AuthPredicate,
    pub cooldown: Option<Duration>,
}

/// No restriction: always passes the gate.
pub fn no_gate(_player: &Player) -> Result<(), String> {
    Ok(())
}

pub fn staff_only(player: &Player) -> Result<(), String> {
    if player.is_staff {
        Ok(())
    } else {
        Err("You do not have permission to do that.".to_string())
    }
}

/// The verb table: sorted once at construction with the fixed tie-break
/// order, then scanned linearly for prefix matches (the table is small
/// enough — low hundreds of entries at most — that a trie is not
/// warranted).
pub struct CommandTable {
    commands: Vec<Command>,
}

impl CommandTable {
    pub fn new(mut commands: Vec<Command>) -> Self {
        commands.sort_by(|a, b| b.name.len().cmp(&a.name.len()).then_with(|| a.name.cmp(b.name)));
        CommandTable { commands }
    }

    /// All name/alias strings a verb token could match, in the table's
    /// fixed order.
    fn candidates(&self) -> impl Iterator<Item = (&str, &Command)> {
        self.commands.iter().flat_map(|c| {
            std::iter::once(c.name).chain(c.aliases.iter().copied()).map(move |n| (n, c))
        })
    }

    /// Resolve `verb` by exact match first, then by unambiguous prefix.
    /// Ambiguous prefixes fail deterministically (§4.3 step 3).
    pub fn resolve(&self, verb: &str) -> Result<&Command, DispatchError> {
        if let Some((_, cmd)) = self.candidates().find(|(n, _)| *n == verb) {
            return Ok(cmd);
        }

        let mut matches = self.candidates().filter(|(n, _)| n.starts_with(verb));
        let Some(first) = matches.next() else {
            return Err(DispatchError::Parse);
        };
        // More than one *distinct command* matching (aliases of the same
        // command don't count as an ambiguity).
        if matches.any(|(_, cmd)| !std::ptr::eq(cmd, first.1)) {
            return Err(DispatchError::AmbiguousVerb);
        }
        Ok(first.1)
    }
}

/// Apply a handler's returned cooldown to the player's per-command timer
/// (§4.3 step 6).
pub fn apply_cooldown(player: &mut Player, command_name: &str, now: MonoTime, delay: Duration) {
    player
        .cooldowns
        .entry(command_name.to_string())
        .and_modify(|t| t.update(now, delay))
        .or_insert_with(|| Timer::new(now, delay));
}
