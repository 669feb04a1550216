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

//! Command dispatcher (C6, §4.3): normalize -> tokenize -> resolve -> gate
//! -> invoke -> post.

pub mod command;
pub mod target;
pub mod tokenize;

use crate::clock::MonoTime;
use crate::entity::Player;
use crate::error::DispatchError;
use crate::world::EntityId;
pub use command::{Command, CommandTable};
pub use target::find_target;
pub use tokenize::{tokenize, Token};

/// The parsed form a handler receives (§4.3 step 5's `cmd` struct): the
/// resolved command plus the remaining argument tokens.
pub struct ParsedCommand<'a> {
    pub command: &'a Command,
    pub args: Vec<Token>,
}

/// A handler's result: any output queued plus the cooldown (if any) to
/// apply in the post step.
#[derive(Default)]
pub struct HandlerOutcome {
    pub cooldown: Option<std::time::Duration>,
}

pub type Handler = fn(EntityId, &ParsedCommand) -> Result<HandlerOutcome, DispatchError>;

/// Run steps 1-4 of the pipeline — normalize, tokenize, resolve, gate — and
/// hand back a `ParsedCommand` ready for step 5 (invoke). Invocation itself
/// is left to the caller because it needs mutable access to the `World`
/// that this module does not borrow.
pub fn parse<'a>(table: &'a CommandTable, player: &Player, line: &str) -> Result<ParsedCommand<'a>, DispatchError> {
    let normalized = tokenize::normalize(line);
    if normalized.is_empty() {
        return Err(DispatchError::Parse);
    }
    let tokens = tokenize::tokenize(&normalized);
    let verb = &tokens[0].word;

    let command = table.resolve(verb)?;
    (command.gate)(player).map_err(DispatchError::Precondition)?;

    Ok(ParsedCommand {
        command,
        args: tokens[1..].to_vec(),
    })
}

/// Step 6 (post): apply the handler's cooldown and return whether logging
/// should fire for this actor (auditing is an external collaborator's
/// policy; this just reports the fact needed to decide).
pub fn post(player: &mut Player, parsed: &ParsedCommand, outcome: &HandlerOutcome, now: MonoTime) {
    if let Some(delay) = outcome.cooldown {
        command::apply_cooldown(player, parsed.command.name, now, delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command::no_gate;

    fn table() -> CommandTable {
        CommandTable::new(vec![Command {
            name: "look",
            aliases: &["l"],
            gate: no_gate,
            cooldown: None,
        }])
    }

    #[test]
    fn parse_empty_line_fails() {
        let t = table();
        let player = Player::new("bob");
        assert_eq!(parse(&t, &player, "   ").unwrap_err(), DispatchError::Parse);
    }

    #[test]
    fn parse_resolves_command_and_splits_args() {
        let t = table();
        let player = Player::new("bob");
        let parsed = parse(&t, &player, "look sword.2").unwrap();
        assert_eq!(parsed.command.name, "look");
        assert_eq!(parsed.args.len(), 1);
        assert_eq!(parsed.args[0].word, "sword");
        assert_eq!(parsed.args[0].count, 2);
    }

    #[test]
    fn parse_fails_the_gate_with_the_predicate_reason() {
        let t = CommandTable::new(vec![Command {
            name: "smite",
            aliases: &[],
            gate: command::staff_only,
            cooldown: None,
        }]);
        let player = Player::new("bob");
        let err = parse(&t, &player, "smite").unwrap_err();
        assert!(matches!(err, DispatchError::Precondition(_)));
    }
}
