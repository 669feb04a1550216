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

//! Ban/access gate (C9, §4.7). Evaluated at accept time against both the
//! peer hostname and its numeric address; the *first* matching unexpired
//! rule decides the connection's fate. Staff bypass happens at the login
//! FSM gate (§4.2), not here — the hostname alone never proves staff
//! identity.

use chrono::{DateTime, Utc};

/// `{pattern, is_prefix, is_suffix, expiry, optional_password, reason}`
/// (§4.7).
#[derive(Debug, Clone)]
pub struct BanRule {
    pub pattern: String,
    pub is_prefix: bool,
    pub is_suffix: bool,
    pub expiry: Option<DateTime<Utc>>,
    pub password: Option<String>,
    pub reason: String,
}

impl BanRule {
    /// `*`, full match, prefix/suffix per flags, or contains when both flags
    /// are set (§4.7).
    fn matches(&self, candidate: &str) -> bool {
        if self.pattern == "*" {
            return true;
        }
        match (self.is_prefix, self.is_suffix) {
            (false, false) => candidate == self.pattern,
            (true, false) => candidate.starts_with(&self.pattern),
            (false, true) => candidate.ends_with(&self.pattern),
            (true, true) => candidate.contains(&self.pattern),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|e| now >= e)
    }
}

/// What the gate decided for one accepted connection (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No rule matched; proceed straight into the login FSM.
    Allow,
    /// A password-protected rule matched; challenge before proceeding.
    Challenge { reason: String },
    /// An unconditional rule matched; close immediately.
    Reject { reason: String },
}

/// The ban list. Rules are consulted in list order; an expired rule
/// encountered during the scan is deleted in place and the scan retries
/// from the top (§4.7 "expired -> delete rule, re-test").
#[derive(Default)]
pub struct BanGate {
    rules: Vec<BanRule>,
}

impl BanGate {
    pub fn new(rules: Vec<BanRule>) -> Self {
        BanGate { rules }
    }

    pub fn add_rule(&mut self, rule: BanRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[BanRule] {
        &self.rules
    }

    /// Evaluate both the hostname and the numeric address (§4.7 "the
    /// hostname and the numeric address are each tested").
    pub fn evaluate(&mut self, hostname: &str, numeric_addr: &str, now: DateTime<Utc>) -> Verdict {
        self.evaluate_one(hostname, now)
            .or_else(|| self.evaluate_one(numeric_addr, now))
            .unwrap_or(Verdict::Allow)
    }

    /// Scan, deleting and retrying on expiry, until a live match is found or
    /// the list is exhausted.
    fn evaluate_one(&mut self, candidate: &str, now: DateTime<Utc>) -> Option<Verdict> {
        loop {
            let hit = self.rules.iter().position(|r| r.matches(candidate));
            let idx = hit?;

            if self.rules[idx].is_expired(now) {
                self.rules.remove(idx);
                continue;
            }

            let rule = &self.rules[idx];
            return Some(match &rule.password {
                Some(_) => Verdict::Challenge { reason: rule.reason.clone() },
                None => Verdict::Reject { reason: rule.reason.clone() },
            });
        }
    }

    /// Check a password entered in response to a `Challenge` verdict.
    pub fn check_password(&self, hostname: &str, numeric_addr: &str, attempt: &str) -> bool {
        self.rules
            .iter()
            .find(|r| r.matches(hostname) || r.matches(numeric_addr))
            .and_then(|r| r.password.as_deref())
            .is_some_and(|p| p == attempt)
    }
}
