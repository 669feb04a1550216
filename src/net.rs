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

//! Acceptor & poll loop (C3, §4.1). Built on `mio`'s readiness
//! multiplexing, the idiomatic choice for a single thread that owns both the
//! listening socket and every session's stream (grounded in
//! `other_examples`' `colelawrence-heph` TCP server and `ryanseipp-rask-old`
//! worker, which wire `mio` the same way). `socket2` sets `SO_REUSEADDR` and
//! the listen backlog before `mio` takes the fd, mirroring the teacher's
//! workspace dependency on `socket2` "all" feature.
//!
//! The core has no idea what a command verb is (spec.md "Out of scope:
//! gameplay content"); it only knows how to get bytes in and out of a
//! session and when a complete line is ready. `GameHooks` is the one seam
//! an embedder implements to wire actual dispatch, player storage, and
//! world mutation in.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};

use crate::ban::{BanGate, Verdict};
use crate::error::FatalError;
use crate::session::login::{self, LoginOutcome, LoginState};
use crate::session::{Session, SessionId};
use crate::world::EntityId;
use crate::worker::WorkerRegistry;

const LISTENER_TOKEN: Token = Token(0);
/// Readiness-wait cap so shutdown stays responsive even with no scheduled
/// tick due for a while (§4.1 step 2).
pub const MAX_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 8192;

/// The one seam through which the core talks to gameplay (spec.md "Out of
/// scope"): a *Command* (name -> handler) and an *Entity loader* (key ->
/// entity) live entirely on the embedder's side of this trait.
pub trait GameHooks {
    /// Check a password for a not-yet-attached player name (§4.2 login FSM).
    fn check_password(&self, name: &str, password: &str) -> bool;

    /// The login FSM accepted `name`; attach it to a live player and return
    /// the `EntityId` to associate with the session going forward, or
    /// `None` to refuse entry anyway (e.g. already logged in elsewhere).
    fn attach_player(&mut self, session: SessionId, name: &str) -> Option<EntityId>;

    /// One dispatchable line from an authenticated session (§4.3 step 1's
    /// input). The embedder owns normalize/tokenize/resolve/gate/invoke/post
    /// from here.
    fn on_command_line(&mut self, session: SessionId, actor: EntityId, line: &str);

    /// A session has gone away, cleanly or via protocol violation; `actor`
    /// is `Some` if it had completed login.
    fn on_disconnect(&mut self, session: SessionId, actor: Option<EntityId>);
}

struct Connection {
    stream: TcpStream,
    session: Session,
}

/// One listening socket plus every live connection it has accepted, each
/// keyed by its own `mio::Token` (§4.1: "the token is an index into a slab
/// of sessions, not a pointer, so a mid-iteration session removal cannot
/// invalidate a readiness event still in flight for this pass").
pub struct Acceptor {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    pub ban_gate: BanGate,
    pub workers: WorkerRegistry,
}

impl Acceptor {
    pub fn bind(addr: SocketAddr) -> Result<Self, FatalError> {
        let bind_err = |e: io::Error| FatalError::ListenerBind(addr.to_string(), e);

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.listen(1024).map_err(bind_err)?;

        let mut listener = TcpListener::from_std(socket.into());
        let poll = Poll::new().map_err(bind_err)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(bind_err)?;

        Ok(Acceptor {
            poll,
            listener,
            connections: HashMap::new(),
            next_token: 1,
            ban_gate: BanGate::default(),
            workers: WorkerRegistry::new(),
        })
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Drain all pending accepts in one pass (§4.1 step 3), running each
    /// through the ban gate before a `Session` is ever constructed.
    fn accept_all(&mut self) {
        loop {
            let (mut stream, peer) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(error = %e, "accept() failed");
                    break;
                }
            };

            let candidate = peer.ip().to_string();
            let verdict = self.ban_gate.evaluate(&candidate, &candidate, chrono::Utc::now());
            if let Verdict::Reject { reason } = verdict {
                tracing::info!(%peer, %reason, "rejected connection at the ban gate");
                drop(stream);
                continue;
            }

            let token = self.alloc_token();
            if let Err(e) = self.poll.registry().register(&mut stream, token, Interest::READABLE | Interest::WRITABLE) {
                tracing::warn!(%peer, error = %e, "failed to register accepted connection");
                continue;
            }

            let mut session = Session::new(peer);
            if let Verdict::Challenge { reason } = verdict {
                session.login_state = LoginState::BanPasswordChallenge;
                let _ = session.queue_output(&format!("{reason}\r\nPassword: "));
                session.flush_output();
            }

            self.connections.insert(token, Connection { stream, session });
        }
    }

    /// One readiness-wait-and-handle cycle (§4.1 steps 1, 2, 3, 4). The
    /// caller (typically the boot loop, C12) is responsible for step 5
    /// (firing the tick scheduler once its deadline has passed) and for
    /// capping `timeout` at `MAX_POLL_TIMEOUT`.
    pub fn poll_once(&mut self, timeout: Duration, hooks: &mut impl GameHooks) -> io::Result<()> {
        for conn in self.connections.values_mut() {
            conn.session.begin_pass();
        }

        let mut events = Events::with_capacity(256);
        self.poll.poll(&mut events, Some(timeout.min(MAX_POLL_TIMEOUT)))?;

        let mut readable = Vec::new();
        let mut writable = Vec::new();
        for event in events.iter() {
            if event.token() == LISTENER_TOKEN {
                self.accept_all();
                continue;
            }
            if event.is_readable() {
                readable.push(event.token());
            }
            if event.is_writable() {
                writable.push(event.token());
            }
        }

        for token in readable {
            self.handle_readable(token, hooks);
        }
        for token in writable {
            self.handle_writable(token);
        }

        self.reap_finished_workers();
        self.reap_dead_connections(hooks);
        Ok(())
    }

    fn handle_readable(&mut self, token: Token, hooks: &mut impl GameHooks) {
        let Some(conn) = self.connections.get_mut(&token) else { return };

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match conn.stream.read(&mut chunk) {
                Ok(0) => {
                    conn.session.mark_pending_delete("connection closed by peer");
                    break;
                }
                Ok(n) => {
                    if let Err(e) = conn.session.on_readable_bytes(&chunk[..n]) {
                        conn.session.mark_pending_delete(e.to_string());
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    conn.session.mark_pending_delete(e.to_string());
                    break;
                }
            }
        }

        while let Some(line) = conn.session.take_line_for_dispatch() {
            let line = String::from_utf8_lossy(&line).to_string();
            self.process_line(token, &line, hooks);
        }

        if let Some(conn) = self.connections.get_mut(&token) {
            conn.session.flush_output();
        }
    }

    /// Route one complete input line either through the login FSM or to the
    /// embedder's dispatcher, depending on whether the session has finished
    /// logging in (§4.2 "Line delivery").
    fn process_line(&mut self, token: Token, line: &str, hooks: &mut impl GameHooks) {
        let Some(conn) = self.connections.get_mut(&token) else { return };

        if conn.session.is_in_world() {
            let Some(actor) = conn.session.player else { return };
            let session_id = conn.session.id;
            hooks.on_command_line(session_id, actor, line);
            return;
        }

        let session_id = conn.session.id;
        let peer = conn.session.peer_addr.ip().to_string();
        let state = conn.session.login_state.clone();

        let outcome = login::advance(
            state,
            line,
            |name, password| hooks.check_password(name, password),
            |password| self.ban_gate.check_password(&peer, &peer, password),
        );

        match outcome {
            LoginOutcome::Continue(next, prompt) => {
                if let Some(conn) = self.connections.get_mut(&token) {
                    conn.session.login_state = next;
                    if let Some(prompt) = prompt {
                        let _ = conn.session.queue_output(&format!("{prompt}\r\n"));
                    }
                }
            }
            LoginOutcome::Accepted(name) => match hooks.attach_player(session_id, &name) {
                Some(actor) => {
                    if let Some(conn) = self.connections.get_mut(&token) {
                        conn.session.login_state = LoginState::InWorld;
                        conn.session.player = Some(actor);
                        let _ = conn.session.queue_output("Welcome to Mordor.\r\n");
                    }
                }
                None => {
                    if let Some(conn) = self.connections.get_mut(&token) {
                        let _ = conn.session.queue_output("That character is already in the game.\r\n");
                        conn.session.mark_pending_delete("duplicate login");
                    }
                }
            },
            LoginOutcome::Rejected(reason) => {
                if let Some(conn) = self.connections.get_mut(&token) {
                    let _ = conn.session.queue_output(&format!("{reason}\r\n"));
                    conn.session.mark_pending_delete(reason);
                }
            }
        }
    }

    fn handle_writable(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else { return };
        loop {
            let pending = conn.session.output.pending_bytes();
            if pending.is_empty() {
                break;
            }
            match conn.stream.write(pending) {
                Ok(0) => break,
                Ok(n) => conn.session.output.consume(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    conn.session.mark_pending_delete(e.to_string());
                    break;
                }
            }
        }
    }

    /// Drain finished children from C8's watch list and route their output
    /// to whichever session requested them, if it is still alive (§4.6: "EOF
    /// ... output is routed to the requester").
    fn reap_finished_workers(&mut self) {
        for finished in self.workers.poll() {
            let Some(requester) = finished.requester_session else { continue };
            if finished.kind != crate::worker::ChildKind::Print {
                continue;
            }
            if let Some(conn) = self.connections.values_mut().find(|c| c.session.id == requester) {
                let text = String::from_utf8_lossy(&finished.output);
                let _ = conn.session.queue_output(&text);
                conn.session.flush_output();
            }
        }
    }

    /// Reap every session marked pending-delete (§4.1 step 6), deregistering
    /// its stream and telling the embedder it is gone.
    fn reap_dead_connections(&mut self, hooks: &mut impl GameHooks) {
        let dead: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, c)| c.session.pending_delete)
            .map(|(t, _)| *t)
            .collect();

        for token in dead {
            if let Some(mut conn) = self.connections.remove(&token) {
                let _ = self.poll.registry().deregister(&mut conn.stream);
                hooks.on_disconnect(conn.session.id, conn.session.player);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream as StdTcpStream;
    use std::sync::{Arc, Mutex};

    struct RecordingHooks {
        lines: Arc<Mutex<Vec<(EntityId, String)>>>,
        passwords_ok: bool,
        actor_id: EntityId,
    }

    impl Default for RecordingHooks {
        fn default() -> Self {
            RecordingHooks {
                lines: Arc::new(Mutex::new(Vec::new())),
                passwords_ok: false,
                actor_id: crate::world::World::new().alloc_id(),
            }
        }
    }

    impl GameHooks for RecordingHooks {
        fn check_password(&self, _name: &str, _password: &str) -> bool {
            self.passwords_ok
        }

        fn attach_player(&mut self, _session: SessionId, _name: &str) -> Option<EntityId> {
            Some(self.actor_id)
        }

        fn on_command_line(&mut self, _session: SessionId, actor: EntityId, line: &str) {
            self.lines.lock().unwrap().push((actor, line.to_string()));
        }

        fn on_disconnect(&mut self, _session: SessionId, _actor: Option<EntityId>) {}
    }

    fn local_addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn accept_runs_a_client_through_login_into_world_and_dispatches_a_line() {
        let mut acceptor = Acceptor::bind(local_addr()).unwrap();
        let port = acceptor.listener.local_addr().unwrap().port();

        let mut client = StdTcpStream::connect(("127.0.0.1", port)).unwrap();
        client.set_nonblocking(true).unwrap();

        let mut hooks = RecordingHooks { passwords_ok: true, ..Default::default() };
        let lines = hooks.lines.clone();

        // One poll_once to accept; login FSM fires Connected -> AskName on
        // an empty line internally, so feed it explicitly.
        acceptor.poll_once(Duration::from_millis(50), &mut hooks).unwrap();
        assert_eq!(acceptor.connection_count(), 1);

        write_line(&mut client, ""); // kick CONNECTED -> ASK_NAME
        wait_for(&mut acceptor, &mut hooks);
        write_line(&mut client, "bob");
        wait_for(&mut acceptor, &mut hooks);
        write_line(&mut client, "hunter2");
        wait_for(&mut acceptor, &mut hooks);
        write_line(&mut client, "look");
        wait_for(&mut acceptor, &mut hooks);

        let recorded = lines.lock().unwrap();
        assert_eq!(recorded.last().map(|(_, l)| l.as_str()), Some("look"));
    }

    #[test]
    fn ban_gate_rejects_before_a_session_is_ever_created() {
        let mut acceptor = Acceptor::bind(local_addr()).unwrap();
        acceptor.ban_gate.add_rule(crate::ban::BanRule {
            pattern: "*".to_string(),
            is_prefix: false,
            is_suffix: false,
            expiry: None,
            password: None,
            reason: "site closed".to_string(),
        });
        let port = acceptor.listener.local_addr().unwrap().port();

        let _client = StdTcpStream::connect(("127.0.0.1", port)).unwrap();
        let mut hooks = RecordingHooks::default();
        acceptor.poll_once(Duration::from_millis(50), &mut hooks).unwrap();

        assert_eq!(acceptor.connection_count(), 0);
    }

    fn write_line(client: &mut StdTcpStream, line: &str) {
        client.write_all(format!("{line}\r\n").as_bytes()).unwrap();
    }

    fn wait_for(acceptor: &mut Acceptor, hooks: &mut RecordingHooks) {
        for _ in 0..10 {
            acceptor.poll_once(Duration::from_millis(20), hooks).unwrap();
        }
    }
}
