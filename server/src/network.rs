//! The authoritative server session: per-net-tick client bookkeeping, message dispatch, and the
//! CBF control loop, nested around a per-sim-tick world step.
//!
//! Per the concurrency model, a server instance is single-threaded cooperative: one task owns the
//! socket, the client table, and the world outright, so there is no cross-task locking anywhere in
//! this module.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::UdpSocket;

use shared::error::NetcodeError;
use shared::fixed::{Qw, QwPos};
use shared::net_addr::NetAddr;
use shared::protocol::{
    self, CommandsPayload, FeedbackPayload, FoodCreatePayload, FoodDestroyPayload, JoinAcceptPayload,
    JoinDenyPayload, JoinRequestPayload, Message, MessageBody, SnakeBezierPayload, SnakeHeadPayload,
    SnakeMetadataPayload,
};
use shared::snake::SnakeParam;
use shared::wrap::u16_sub_wrap;
use shared::world::World;

use crate::client_manager::{accepts_newer_command_batch, ClientTable, ServerClient};
use crate::config::ServerConfig;
use crate::tick::{tick_cfg, TickDriver};

pub struct Server {
    socket: UdpSocket,
    config: ServerConfig,
    world: World,
    clients: ClientTable,
    frame: u16,
    /// Replies to addresses that don't (yet, or anymore) have a client record — deny responses
    /// sent before a record exists. Sent once, best-effort, never resend-tracked.
    immediate_out: Vec<(NetAddr, Message)>,
    /// Username of every live snake, keyed by snake id, so `SnakeMetadata` can be broadcast for
    /// snakes other than a client's own without threading the owning client's address through.
    snake_usernames: HashMap<u16, String>,
    /// Food points consumed since the last net-tick's `FoodDestroy` broadcast.
    pending_food_destroyed: Vec<(u32, u32)>,
    exit_requested: Arc<AtomicBool>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Server, NetcodeError> {
        let socket = UdpSocket::bind((config.bind_ip, config.port)).await?;
        info!("server listening on {}", socket.local_addr()?);
        let mut world = World::new();
        world.seed_food(
            config.food_cluster_count,
            config.food_points_per_cluster,
            Qw::from_int(config.food_span_x),
            Qw::from_int(config.food_jitter_y),
            config.food_seed,
        );
        Ok(Server {
            socket,
            clients: ClientTable::new(config.banned_ips.clone()),
            world,
            frame: 0,
            immediate_out: Vec::new(),
            snake_usernames: HashMap::new(),
            pending_food_destroyed: Vec::new(),
            config,
            exit_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn exit_flag(&self) -> Arc<AtomicBool> {
        self.exit_requested.clone()
    }

    /// The address the server's socket is actually bound to, useful when `bind_ip`/`port` was
    /// `0.0.0.0:0` and the OS picked an ephemeral port.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawn the ctrl-c listener that flips the shared exit flag; every loop iteration of
    /// [`Server::run`] checks it once.
    pub fn spawn_signal_handler(&self) {
        let flag = self.exit_requested.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, shutting down server");
                flag.store(true, Ordering::Relaxed);
            }
        });
    }

    /// Sim ticks per net tick, at least 1 (the reference calls this the granularity, `gran`).
    fn gran(&self) -> i32 {
        (self.config.sim_tick_rate / self.config.net_tick_rate.max(1)).max(1) as i32
    }

    pub async fn run(&mut self) -> Result<(), NetcodeError> {
        let mut sim_driver = TickDriver::new(tick_cfg(self.config.sim_tick_rate));
        let net_every = self.gran() as u32;
        let mut sim_ticks_since_net = 0u32;

        while !self.exit_requested.load(Ordering::Relaxed) {
            let elapsed = sim_driver.wait().await;
            if elapsed > 1 {
                warn!("server fell behind schedule by {} sim tick(s)", elapsed - 1);
            }
            for _ in 0..elapsed {
                self.frame = self.frame.wrapping_add(1);
                self.step_sim_tick();
                sim_ticks_since_net += 1;
                if sim_ticks_since_net >= net_every {
                    sim_ticks_since_net = 0;
                    self.net_tick().await;
                }
            }
        }
        Ok(())
    }

    fn step_sim_tick(&mut self) {
        let frame = self.frame;
        let sim_tick_rate = self.config.sim_tick_rate;
        let snake_ids: Vec<u16> = self.world.snake_ids().collect();
        for id in snake_ids {
            let Some(snake) = self.world.snake_mut(id) else { continue };
            if snake.is_held(frame) {
                continue;
            }
            let cmd = snake.cmdq.take_or_predict(frame);
            snake.param = SnakeParam::from_upgrades(snake.upgrades, snake.food_eaten + 1);
            let stale = snake.step(cmd, sim_tick_rate, frame);
            snake.remove_stale_segments(stale);
        }
        self.advance_food_and_world();
    }

    /// Consume any food point a snake's head is now touching, crediting the snake and queuing a
    /// `FoodDestroy` broadcast for the next net-tick.
    fn advance_food_and_world(&mut self) {
        let radius_sq = {
            let r = Qw::from_int(self.config.food_pickup_radius_units);
            r.mul(r)
        };
        let snake_ids: Vec<u16> = self.world.snake_ids().collect();
        for id in snake_ids {
            let Some(head_pos) = self.world.snake(id).map(|s| s.head.pos) else { continue };
            let mut touched = Vec::new();
            for (cluster_index, cluster) in self.world.food.iter().enumerate() {
                for (point_index, point) in cluster.points.iter().enumerate() {
                    let Some(pos) = point else { continue };
                    if pos.distance_squared(head_pos) <= radius_sq {
                        touched.push((cluster_index as u32, point_index as u32));
                    }
                }
            }
            for (cluster_index, point_index) in touched {
                if self.world.consume_food(cluster_index, point_index).is_some() {
                    if let Some(snake) = self.world.snake_mut(id) {
                        snake.food_eaten += 1;
                    }
                    self.pending_food_destroyed.push((cluster_index, point_index));
                }
            }
        }
    }

    async fn net_tick(&mut self) {
        self.expire_timeouts();
        self.clients.tick_malicious();
        self.drain_socket();
        self.broadcast_snake_heads();
        self.broadcast_food_events();
        self.flush_pending().await;
    }

    fn expire_timeouts(&mut self) {
        let max_ticks = self.config.client_timeout_net_ticks;
        let expired = self.clients.tick_timeouts(max_ticks);
        for addr in expired {
            if let Some(client) = self.clients.remove(&addr) {
                self.world.remove_snake(client.snake_id);
                self.snake_usernames.remove(&client.snake_id);
                info!("client {} ({}) timed out", client.username, addr.0);
            }
        }
    }

    fn drain_socket(&mut self) {
        let mut buf = [0u8; protocol::MAX_UDP_PACKET_SIZE];
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, from)) => self.handle_datagram(NetAddr::new(from), &buf[..len]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("socket recv error: {e}");
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, from: NetAddr, bytes: &[u8]) {
        if self.clients.is_banned(&from) {
            return;
        }
        if self.clients.is_malicious(&from) {
            self.clients.mark_malicious(from, self.config.malicious_timeout_net_ticks);
            return;
        }
        if let Some(client) = self.clients.get_mut(&from) {
            client.timeout_counter = 0;
        }
        let records = match protocol::unpack_datagram(bytes) {
            Ok(records) => records,
            Err(err) => {
                warn!("malformed datagram from {}: {err}", from.0);
                self.clients.mark_malicious(from, self.config.malicious_timeout_net_ticks);
                return;
            }
        };
        for (type_byte, payload) in records {
            match protocol::decode_payload(type_byte, &payload) {
                Ok(body) => self.handle_message(from, body),
                Err(err) => {
                    warn!("undecodable message from {}: {err}", from.0);
                    self.clients.mark_malicious(from, self.config.malicious_timeout_net_ticks);
                    break;
                }
            }
        }
    }

    fn handle_message(&mut self, from: NetAddr, body: MessageBody) {
        match body {
            MessageBody::JoinRequest(req) => self.handle_join_request(from, req),
            MessageBody::Commands(payload) => self.handle_commands(from, payload),
            MessageBody::Leave => self.handle_leave(from),
            MessageBody::SnakeBezierAck(ack) => self.ack_reliable(from, move |b| {
                matches!(b, MessageBody::SnakeBezier(p) if p.snake_id == ack.snake_id && p.handle_index == ack.handle_index)
            }),
            MessageBody::SnakeMetadataAck(ack) => self
                .ack_reliable(from, move |b| matches!(b, MessageBody::SnakeMetadata(p) if p.snake_id == ack.snake_id)),
            MessageBody::FoodCreateAck(ack) => self.ack_reliable(from, move |b| {
                matches!(b, MessageBody::FoodCreate(p) if p.cluster_index == ack.cluster_index && p.point_index == ack.point_index)
            }),
            MessageBody::FoodDestroyAck(ack) => self.ack_reliable(from, move |b| {
                matches!(b, MessageBody::FoodDestroy(p) if p.cluster_index == ack.cluster_index && p.point_index == ack.point_index)
            }),
            other => debug!("ignoring unexpected message from {}: {:?}", from.0, other.message_type()),
        }
    }

    fn ack_reliable(&mut self, from: NetAddr, matches: impl Fn(&MessageBody) -> bool) {
        if let Some(client) = self.clients.get_mut(&from) {
            client.pending_msgs.retain(|m| !matches(&m.body));
        }
    }

    fn handle_join_request(&mut self, from: NetAddr, req: JoinRequestPayload) {
        if req.protocol_version != protocol::PROTOCOL_VERSION {
            self.immediate_out.push((
                from,
                Message::new(
                    MessageBody::JoinDenyBadProtocol(JoinDenyPayload {
                        error: format!("unsupported protocol version {}", req.protocol_version),
                    }),
                    10,
                ),
            ));
            return;
        }
        if req.username.len() > self.config.max_username_len {
            self.immediate_out.push((
                from,
                Message::new(
                    MessageBody::JoinDenyBadUsername(JoinDenyPayload { error: "username too long".into() }),
                    10,
                ),
            ));
            return;
        }
        if self.clients.get(&from).is_none() && self.clients.len() >= self.config.max_players {
            self.immediate_out.push((
                from,
                Message::new(
                    MessageBody::JoinDenyServerFull(JoinDenyPayload { error: "server full".into() }),
                    10,
                ),
            ));
            return;
        }

        let snake_id = match self.clients.get(&from) {
            Some(client) => client.snake_id,
            None => {
                let snake_id = self.world.spawn_snake(QwPos::ZERO, self.frame);
                if let Some(snake) = self.world.snake_mut(snake_id) {
                    snake.hold_until_frame = Some(self.frame.wrapping_add(self.config.initial_buffer_frames));
                }
                let gran = self.gran();
                let mut client = ServerClient::new(snake_id, req.username.clone(), gran);
                for (cluster_index, cluster) in self.world.food.iter().enumerate() {
                    for (point_index, point) in cluster.points.iter().enumerate() {
                        let Some(pos) = point else { continue };
                        client.queue(Message::new(
                            MessageBody::FoodCreate(FoodCreatePayload {
                                cluster_index: cluster_index as u32,
                                point_index: point_index as u32,
                                pos: *pos,
                            }),
                            3,
                        ));
                    }
                }
                self.snake_usernames.insert(snake_id, req.username.clone());
                self.clients.insert(from, client);
                info!("client {} joined from {} as snake {}", req.username, from.0, snake_id);
                snake_id
            }
        };

        let spawn = self.world.snake(snake_id).map(|s| s.head.pos).unwrap_or(QwPos::ZERO);
        let accept = MessageBody::JoinAccept(JoinAcceptPayload {
            sim_tick_rate: self.config.sim_tick_rate,
            net_tick_rate: self.config.net_tick_rate,
            client_frame: req.frame,
            server_frame: self.frame,
            snake_id,
            spawn,
        });
        if let Some(client) = self.clients.get_mut(&from) {
            client.queue(Message::new(accept, 10));
        }
    }

    fn handle_commands(&mut self, from: NetAddr, payload: CommandsPayload) {
        let Some(client) = self.clients.get(&from) else { return };
        if !accepts_newer_command_batch(client.last_command_msg_frame, payload.last_frame) {
            return;
        }
        let snake_id = client.snake_id;

        let mut ordered = payload.frames();
        ordered.reverse(); // wire order is newest-first; the command queue wants oldest-first.
        if let Some(snake) = self.world.snake_mut(snake_id) {
            for (frame, cmd) in ordered {
                snake.cmdq.put(cmd, frame);
            }
        }

        let gran = self.gran();
        let queued = u16_sub_wrap(payload.last_frame, self.frame) as i32;
        if let Some(client) = self.clients.get_mut(&from) {
            client.last_command_msg_frame = Some(payload.last_frame);
            client.push_cbf_sample(queued);
        }

        let frame = self.frame;
        if queued < 0 {
            let diff = queued.max(-10) as i8;
            if let Some(client) = self.clients.get_mut(&from) {
                client.queue(Message::new(MessageBody::Feedback(FeedbackPayload { diff, frame }), 5));
            }
        } else if let Some(client) = self.clients.get(&from) {
            let over = client.cbf_min() - 2 * gran;
            if over > 0 {
                let diff = over.min(10) as i8;
                if let Some(client) = self.clients.get_mut(&from) {
                    client.queue(Message::new(MessageBody::Feedback(FeedbackPayload { diff, frame }), 5));
                }
            }
        }
    }

    fn handle_leave(&mut self, from: NetAddr) {
        if let Some(client) = self.clients.remove(&from) {
            self.world.remove_snake(client.snake_id);
            self.snake_usernames.remove(&client.snake_id);
            info!("client {} left", client.username);
        }
    }

    /// Queue `SnakeHead` for every client's own snake plus any other snake within the configured
    /// proximity radius of it, along with any bézier handles and metadata the client hasn't seen
    /// yet for those same snakes.
    fn broadcast_snake_heads(&mut self) {
        let radius = Qw::from_int(self.config.proximity_radius_units);
        let frame = self.frame;
        let addrs: Vec<NetAddr> = self.clients.iter().map(|(addr, _)| *addr).collect();
        for addr in addrs {
            let Some(own_id) = self.clients.get(&addr).map(|c| c.snake_id) else { continue };
            let Some(origin) = self.world.snake(own_id).map(|s| s.head.pos) else { continue };
            let mut nearby = vec![own_id];
            nearby.extend(self.world.snakes_near(origin, radius, own_id));

            let mut updates = Vec::new();
            for id in nearby {
                if let Some(s) = self.world.snake(id) {
                    updates.push((id, s.head, s.handles_committed, s.latest_handle(), s.upgrades));
                }
            }

            let Some(client) = self.clients.get_mut(&addr) else { continue };
            for (snake_id, head, handles_committed, latest_handle, upgrades) in updates {
                client.queue(Message::new(MessageBody::SnakeHead(SnakeHeadPayload { frame, snake_id, head }), 1));

                let sent = client.bezier_sent.get(&snake_id).copied().unwrap_or(0);
                if handles_committed > sent {
                    let handle_index = handles_committed - 1;
                    client.queue(Message::new(
                        MessageBody::SnakeBezier(SnakeBezierPayload { snake_id, handle_index, handle: latest_handle }),
                        2,
                    ));
                    client.bezier_sent.insert(snake_id, handles_committed);
                }

                if let Some(username) = self.snake_usernames.get(&snake_id) {
                    let needs_send =
                        client.metadata_sent.get(&snake_id).map_or(true, |&sent_upgrades| sent_upgrades != upgrades);
                    if needs_send {
                        client.queue(Message::new(
                            MessageBody::SnakeMetadata(SnakeMetadataPayload {
                                snake_id,
                                username: username.clone(),
                                upgrades,
                            }),
                            2,
                        ));
                        client.metadata_sent.insert(snake_id, upgrades);
                    }
                }
            }
        }
    }

    /// Queue `FoodDestroy` for every client for food points consumed since the last net-tick.
    fn broadcast_food_events(&mut self) {
        if self.pending_food_destroyed.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.pending_food_destroyed);
        for (_, client) in self.clients.iter_mut() {
            for (cluster_index, point_index) in &events {
                client.queue(Message::new(
                    MessageBody::FoodDestroy(FoodDestroyPayload {
                        cluster_index: *cluster_index,
                        point_index: *point_index,
                    }),
                    3,
                ));
            }
        }
    }

    async fn flush_pending(&mut self) {
        let addrs: Vec<NetAddr> = self.clients.iter().map(|(addr, _)| *addr).collect();
        for addr in addrs {
            let Some(client) = self.clients.get_mut(&addr) else { continue };
            let due: Vec<bool> = client.pending_msgs.iter_mut().map(|m| m.tick_resend()).collect();
            let indexed: Vec<(usize, &Message)> = client
                .pending_msgs
                .iter()
                .enumerate()
                .filter(|(i, _)| due[*i])
                .collect();
            let (bytes, packed) = protocol::pack_datagram(indexed.into_iter());
            if !bytes.is_empty() {
                if let Err(err) = self.socket.send_to(&bytes, addr.0).await {
                    warn!("send to {} failed: {err}", addr.0);
                }
            }
            let packed: HashSet<usize> = packed.into_iter().collect();
            let mut i = 0usize;
            client.pending_msgs.retain(|m| {
                let was_packed = packed.contains(&i);
                i += 1;
                !(was_packed && !m.is_reliable())
            });
        }

        for (addr, msg) in std::mem::take(&mut self.immediate_out) {
            let (bytes, _) = protocol::pack_datagram(std::iter::once((0usize, &msg)));
            if !bytes.is_empty() {
                let _ = self.socket.send_to(&bytes, addr.0).await;
            }
        }
    }
}
