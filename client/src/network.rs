//! The client session: connection state machine, per-tick command capture/send, and dispatch of
//! incoming server messages into [`crate::game::ClientGameState`].
//!
//! Per the session state machine, a client moves through three states: `Disconnected`,
//! `Joining` (one non-blocking socket per resolved candidate address, racing for the first
//! `JoinAccept`), and `Connected` (one socket, everything else torn down). There is no tokio here
//! — macroquad drives its own lightweight executor, so timing is the same `Instant`-delta style
//! the rest of this session uses outside of the server crate.

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use macroquad::prelude::*;

use shared::cmd::Command;
use shared::error::NetcodeError;
use shared::protocol::{
    self, CommandsPayload, JoinAcceptPayload, JoinRequestPayload, Message, MessageBody,
};
use shared::wrap::u16_sub_wrap;

use crate::game::ClientGameState;
use crate::input::{InputManager, MacroquadInput};
use crate::rendering::{MacroquadRenderer, RenderView, Renderer};

/// Connected --timeout--> Disconnected once this many net ticks pass without a single byte
/// received from the server.
const CONNECTION_TIMEOUT_NET_TICKS: u32 = 100;

enum SessionState {
    Disconnected,
    /// Racing candidate sockets, one per resolved address family, waiting on the first
    /// `JoinAccept`.
    Joining { sockets: Vec<UdpSocket> },
    Connected { socket: UdpSocket },
}

pub struct Client {
    state: SessionState,
    game: Option<ClientGameState>,
    frame: u16,
    sim_tick_rate: u8,
    net_tick_rate: u8,
    last_sent_frame: u16,
    pending_msgs: Vec<Message>,
    timeout_counter: u32,
    username: String,
    input: InputManager,
    renderer: Box<dyn Renderer>,
    last_sim_tick: Instant,
    last_net_tick: Instant,
}

impl Client {
    pub fn new() -> Result<Client, NetcodeError> {
        Ok(Client {
            state: SessionState::Disconnected,
            game: None,
            frame: 0,
            sim_tick_rate: 60,
            net_tick_rate: 20,
            last_sent_frame: 0,
            pending_msgs: Vec::new(),
            timeout_counter: 0,
            username: String::new(),
            input: InputManager::new(Box::new(MacroquadInput::new())),
            renderer: Box::new(MacroquadRenderer::new()?),
            last_sim_tick: Instant::now(),
            last_net_tick: Instant::now(),
        })
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }

    /// Resolve `addr_str` to one candidate per address family it has (IPv4 and/or IPv6), trying a
    /// direct `SocketAddr` parse first and falling back to DNS resolution for hostnames.
    fn resolve_candidates(addr_str: &str) -> Result<Vec<std::net::SocketAddr>, NetcodeError> {
        if let Ok(addr) = addr_str.parse::<std::net::SocketAddr>() {
            return Ok(vec![addr]);
        }
        use std::net::ToSocketAddrs;
        let resolved: Vec<std::net::SocketAddr> = addr_str
            .to_socket_addrs()
            .map_err(NetcodeError::from)?
            .collect();
        let mut candidates = Vec::new();
        if let Some(v4) = resolved.iter().find(|a| a.is_ipv4()) {
            candidates.push(*v4);
        }
        if let Some(v6) = resolved.iter().find(|a| a.is_ipv6()) {
            candidates.push(*v6);
        }
        if candidates.is_empty() {
            return Err(NetcodeError::InvalidMessage(format!("could not resolve {addr_str}")));
        }
        Ok(candidates)
    }

    /// `Disconnected --connect()--> Joining`: opens one non-blocking socket per candidate address
    /// and queues a `JoinRequest` on each.
    pub fn connect(&mut self, server: &str, username: String) -> Result<(), NetcodeError> {
        let candidates = Self::resolve_candidates(server)?;
        let mut sockets = Vec::with_capacity(candidates.len());
        for addr in &candidates {
            let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
            let socket = UdpSocket::bind(bind_addr)?;
            socket.set_nonblocking(true)?;
            socket.connect(addr)?;
            sockets.push(socket);
        }

        let request = Message::new(
            MessageBody::JoinRequest(JoinRequestPayload {
                protocol_version: protocol::PROTOCOL_VERSION,
                username: username.clone(),
                frame: self.frame,
            }),
            10,
        );
        for socket in &sockets {
            let (bytes, _) = protocol::pack_datagram(std::iter::once((0usize, &request)));
            let _ = socket.send(&bytes);
        }

        self.username = username;
        self.pending_msgs.clear();
        self.timeout_counter = 0;
        self.state = SessionState::Joining { sockets };
        info!("joining {server} with {} candidate socket(s)", candidates.len());
        Ok(())
    }

    fn poll_joining(sockets: &[UdpSocket]) -> Option<(usize, JoinAcceptPayload)> {
        let mut buf = [0u8; protocol::MAX_UDP_PACKET_SIZE];
        for (i, socket) in sockets.iter().enumerate() {
            match socket.recv(&mut buf) {
                Ok(len) => {
                    let Ok(records) = protocol::unpack_datagram(&buf[..len]) else { continue };
                    for (type_byte, payload) in records {
                        if let Ok(MessageBody::JoinAccept(accept)) = protocol::decode_payload(type_byte, &payload) {
                            return Some((i, accept));
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(_) => continue,
            }
        }
        None
    }

    /// `Joining --recv(JoinAccept)--> Connected`, or back to `Disconnected` if the accept's
    /// implied round trip is implausible (corrupt or malicious reply).
    fn drive_joining(&mut self) {
        let SessionState::Joining { sockets } = &mut self.state else { return };
        let Some((winner, accept)) = Self::poll_joining(sockets) else { return };

        let rtt = u16_sub_wrap(self.frame, accept.client_frame);
        if rtt < 0 || rtt > (accept.net_tick_rate as i16).saturating_mul(5) {
            warn!("rejecting join accept with implausible rtt {rtt}");
            self.state = SessionState::Disconnected;
            return;
        }

        let winning_socket = sockets.remove(winner);
        self.sim_tick_rate = accept.sim_tick_rate;
        self.net_tick_rate = accept.net_tick_rate;
        self.frame = accept.server_frame.wrapping_add((rtt / 2) as u16);
        self.last_sent_frame = self.frame;
        self.game = Some(ClientGameState::new(accept.snake_id, accept.spawn, self.frame));
        self.timeout_counter = 0;
        self.last_sim_tick = Instant::now();
        self.last_net_tick = Instant::now();
        info!("connected as snake {} (rtt {} frames, sim={}Hz net={}Hz)", accept.snake_id, rtt, self.sim_tick_rate, self.net_tick_rate);
        self.state = SessionState::Connected { socket: winning_socket };
    }

    fn drain_socket(socket: &UdpSocket, game: &mut Option<ClientGameState>, pending_msgs: &mut Vec<Message>, sim_tick_rate: u8, frame: &mut u16, timeout_counter: &mut u32) {
        let mut buf = [0u8; protocol::MAX_UDP_PACKET_SIZE];
        loop {
            match socket.recv(&mut buf) {
                Ok(len) => {
                    *timeout_counter = 0;
                    let Ok(records) = protocol::unpack_datagram(&buf[..len]) else { continue };
                    for (type_byte, payload) in records {
                        let Ok(body) = protocol::decode_payload(type_byte, &payload) else { continue };
                        Self::handle_message(body, game, pending_msgs, sim_tick_rate, frame);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }

    fn handle_message(body: MessageBody, game: &mut Option<ClientGameState>, pending_msgs: &mut Vec<Message>, sim_tick_rate: u8, frame: &mut u16) {
        match body {
            MessageBody::SnakeHead(p) => {
                if let Some(game) = game.as_mut() {
                    game.apply_snake_head(p.snake_id, p.frame, p.head, sim_tick_rate);
                }
            }
            MessageBody::Feedback(f) => {
                // CBF control loop: warp the local frame number forward/backward by the
                // server's requested amount rather than gradually drifting toward it.
                *frame = frame.wrapping_add(f.diff as i16 as u16);
                debug!("CBF feedback: warping {} frame(s)", f.diff);
            }
            MessageBody::JoinDenyBadProtocol(deny)
            | MessageBody::JoinDenyBadUsername(deny)
            | MessageBody::JoinDenyServerFull(deny) => {
                warn!("join denied: {}", deny.error);
            }
            MessageBody::JoinAccept(_) => {
                // Duplicate accept (resend race from the server); already connected, ignore.
            }
            other => {
                let _ = pending_msgs; // reserved for future ack-bearing replies
                debug!("ignoring message type {:?} while connected", other.message_type());
            }
        }
    }

    /// Per net-tick bookkeeping while connected: timeout check, inbound dispatch, outbound
    /// `Commands` packing, and the resend/flush cycle. Returns `false` if the server has timed
    /// out and the caller should fall back to `Disconnected`.
    fn net_tick_connected(&mut self) -> bool {
        self.timeout_counter += 1;
        if self.timeout_counter > CONNECTION_TIMEOUT_NET_TICKS {
            warn!("server connection timed out");
            return false;
        }

        let SessionState::Connected { socket } = &self.state else { return true };
        Self::drain_socket(socket, &mut self.game, &mut self.pending_msgs, self.sim_tick_rate, &mut self.frame, &mut self.timeout_counter);

        if let Some(game) = self.game.as_ref() {
            let pending = game.commands_since(self.last_sent_frame);
            if !pending.is_empty() {
                let last_frame = pending.last().unwrap().0;
                let cmds: Vec<Command> = pending.iter().rev().map(|(_, c)| *c).collect();
                self.last_sent_frame = last_frame;
                self.pending_msgs.push(Message::new(MessageBody::Commands(CommandsPayload { last_frame, cmds }), 1));
            }
        }

        let due: Vec<bool> = self.pending_msgs.iter_mut().map(|m| m.tick_resend()).collect();
        let indexed: Vec<(usize, &Message)> =
            self.pending_msgs.iter().enumerate().filter(|(i, _)| due[*i]).collect();
        let (bytes, packed) = protocol::pack_datagram(indexed.into_iter());
        if !bytes.is_empty() {
            if let SessionState::Connected { socket } = &self.state {
                let _ = socket.send(&bytes);
            }
        }
        let packed: std::collections::HashSet<usize> = packed.into_iter().collect();
        let mut i = 0usize;
        self.pending_msgs.retain(|m| {
            let was_packed = packed.contains(&i);
            i += 1;
            !(was_packed && !m.is_reliable())
        });
        true
    }

    /// Advance prediction by one sim tick and, once a net tick period has elapsed, run the net
    /// tick. Called once per rendered frame; both periods are derived from the server-adopted
    /// tick rates so they track whatever the server configured.
    fn step_connected(&mut self) {
        let sim_period = Duration::from_secs_f64(1.0 / self.sim_tick_rate.max(1) as f64);
        if self.last_sim_tick.elapsed() >= sim_period {
            self.last_sim_tick = Instant::now();
            self.frame = self.frame.wrapping_add(1);
            let cmd = self.input.sample();
            if let Some(game) = self.game.as_mut() {
                game.predict_local_command(self.frame, cmd, self.sim_tick_rate);
            }
        }

        let net_period = Duration::from_secs_f64(1.0 / self.net_tick_rate.max(1) as f64);
        if self.last_net_tick.elapsed() >= net_period {
            self.last_net_tick = Instant::now();
            if !self.net_tick_connected() {
                self.state = SessionState::Disconnected;
                self.game = None;
            }
        }
    }

    fn render_frame(&mut self) {
        let own_points = self.game.as_ref().map(|g| g.own_snake.sampled_points(6)).unwrap_or_default();
        let other_points: Vec<Vec<shared::fixed::QwPos>> = self
            .game
            .as_ref()
            .map(|g| g.remote_snakes().filter_map(|(_, r)| r.latest()).map(|h| vec![h.pos]).collect())
            .unwrap_or_default();
        let view = RenderView { own_points: &own_points, other_points: &other_points };
        self.renderer.render(&view);
    }

    /// Send a best-effort `Leave` and drop the socket; used on clean shutdown.
    fn disconnect(&mut self) {
        if let SessionState::Connected { socket } = &self.state {
            let leave = Message::new(MessageBody::Leave, 10);
            let (bytes, _) = protocol::pack_datagram(std::iter::once((0usize, &leave)));
            let _ = socket.send(&bytes);
        }
        self.state = SessionState::Disconnected;
        self.game = None;
    }

    /// The main client loop: drives the session state machine, prediction, networking, and
    /// rendering at macroquad's frame cadence.
    pub async fn run(&mut self, server: &str, username: String) -> Result<(), NetcodeError> {
        self.connect(server, username)?;

        loop {
            match self.state {
                SessionState::Disconnected => {}
                SessionState::Joining { .. } => self.drive_joining(),
                SessionState::Connected { .. } => self.step_connected(),
            }

            if is_key_pressed(KeyCode::R) && !matches!(self.state, SessionState::Joining { .. }) {
                info!("manual reconnect requested");
                let username = self.username.clone();
                let server_owned = server.to_string();
                if let Err(err) = self.connect(&server_owned, username) {
                    warn!("reconnect failed: {err}");
                }
            }

            self.render_frame();
            next_frame().await;

            if is_quit_requested() {
                break;
            }
        }

        self.disconnect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_candidates_accepts_direct_ipv4_socket_addr() {
        let candidates = Client::resolve_candidates("127.0.0.1:8080").unwrap();
        assert_eq!(candidates, vec!["127.0.0.1:8080".parse().unwrap()]);
    }

    #[test]
    fn resolve_candidates_accepts_direct_ipv6_socket_addr() {
        let candidates = Client::resolve_candidates("[::1]:8080").unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].is_ipv6());
    }

    #[test]
    fn resolve_candidates_rejects_garbage() {
        assert!(Client::resolve_candidates("not a valid address").is_err());
    }

    #[test]
    fn new_client_starts_disconnected() {
        let client = Client::new().unwrap();
        assert!(!client.is_connected());
    }
}
