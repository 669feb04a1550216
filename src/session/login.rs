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

//! Login FSM (§4.2): `CONNECTED -> ASK_NAME -> ASK_PASSWORD -> {MOTD ->
//! IN_WORLD, REJECTED}`. A ban with a password attached forces the FSM
//! through a password-challenge branch before `ASK_NAME` is ever reached
//! (§4.7: "Staff accounts bypass bans at the login FSM gate, not here").

use std::time::Duration;

/// Bounded retry count for an incorrect password before disconnect (§4.2).
pub const MAX_PASSWORD_RETRIES: u8 = 3;

/// Each login-FSM state carries its own short timeout (§5 "Timeouts").
pub const STATE_TIMEOUT: Duration = Duration::from_secs(60);
pub const BAN_PASSWORD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    /// Forced by a password-protected ban rule before any other state.
    BanPasswordChallenge,
    Connected,
    AskName { name: Option<String> },
    AskPassword { name: String, retries_used: u8 },
    Motd { name: String },
    InWorld,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Stay in the FSM; text is the next prompt to render, if any.
    Continue(LoginState, Option<String>),
    /// Login completed; the named player should be attached to the session.
    Accepted(String),
    Rejected(String),
}

/// A single login-FSM transition driven by one complete input line.
/// `check_password` and `check_ban_password` are injected so this module
/// has no dependency on the ban gate (C9) or player store (C5) directly —
/// it only knows the shape of the FSM.
pub fn advance(
    state: LoginState,
    line: &str,
    check_password: impl FnOnce(&str, &str) -> bool,
    check_ban_password: impl FnOnce(&str) -> bool,
) -> LoginOutcome {
    match state {
        LoginState::BanPasswordChallenge => {
            if check_ban_password(line) {
                LoginOutcome::Continue(LoginState::Connected, Some("Welcome.".to_string()))
            } else {
                LoginOutcome::Rejected("Incorrect password.".to_string())
            }
        }
        LoginState::Connected => LoginOutcome::Continue(
            LoginState::AskName { name: None },
            Some("By what name are you known?".to_string()),
        ),
        LoginState::AskName { .. } => {
            let name = line.trim().to_string();
            if name.is_empty() {
                LoginOutcome::Continue(
                    LoginState::AskName { name: None },
                    Some("By what name are you known?".to_string()),
                )
            } else {
                LoginOutcome::Continue(
                    LoginState::AskPassword {
                        name: name.clone(),
                        retries_used: 0,
                    },
                    Some("Password:".to_string()),
                )
            }
        }
        LoginState::AskPassword { name, retries_used } => {
            if check_password(&name, line) {
                LoginOutcome::Continue(LoginState::Motd { name }, None)
            } else if retries_used + 1 >= MAX_PASSWORD_RETRIES {
                LoginOutcome::Rejected("Too many incorrect attempts.".to_string())
            } else {
                LoginOutcome::Continue(
                    LoginState::AskPassword {
                        name,
                        retries_used: retries_used + 1,
                    },
                    Some("Incorrect password. Password:".to_string()),
                )
            }
        }
        LoginState::Motd { name } => LoginOutcome::Accepted(name),
        LoginState::InWorld => {
            unreachable!("advance() is only called while still negotiating login")
        }
        LoginState::Rejected => LoginOutcome::Rejected("Connection already rejected.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_accepted() {
        let s = LoginState::Connected;
        let LoginOutcome::Continue(s, _) = advance(s, "", |_, _| false, |_| false) else {
            panic!()
        };
        let LoginOutcome::Continue(s, _) = advance(s, "bob", |_, _| false, |_| false) else {
            panic!()
        };
        let LoginOutcome::Continue(s, _) = advance(s, "hunter2", |n, p| n == "bob" && p == "hunter2", |_| false) else {
            panic!()
        };
        let outcome = advance(s, "", |_, _| false, |_| false);
        assert_eq!(outcome, LoginOutcome::Accepted("bob".to_string()));
    }

    #[test]
    fn bad_password_retried_then_rejected() {
        let mut state = LoginState::AskPassword {
            name: "bob".to_string(),
            retries_used: 0,
        };
        for _ in 0..MAX_PASSWORD_RETRIES - 1 {
            match advance(state.clone(), "wrong", |_, _| false, |_| false) {
                LoginOutcome::Continue(s, _) => state = s,
                other => panic!("expected retry, got {other:?}"),
            }
        }
        let outcome = advance(state, "wrong", |_, _| false, |_| false);
        assert_eq!(
            outcome,
            LoginOutcome::Rejected("Too many incorrect attempts.".to_string())
        );
    }

    #[test]
    fn empty_name_is_reprompted_not_accepted() {
        let outcome = advance(LoginState::AskName { name: None }, "   ", |_, _| false, |_| false);
        assert!(matches!(outcome, LoginOutcome::Continue(LoginState::AskName { .. }, _)));
    }

    #[test]
    fn ban_password_challenge_gates_before_ask_name() {
        let outcome = advance(
            LoginState::BanPasswordChallenge,
            "letmein",
            |_, _| false,
            |p| p == "letmein",
        );
        assert!(matches!(outcome, LoginOutcome::Continue(LoginState::Connected, _)));

        let outcome = advance(LoginState::BanPasswordChallenge, "nope", |_, _| false, |p| p == "letmein");
        assert!(matches!(outcome, LoginOutcome::Rejected(_)));
    }
}
