//! Per-client bookkeeping: the connected-client table, the command-buffer-fullness (CBF) window,
//! and the malicious/banned address tables.

use std::collections::HashMap;
use std::net::IpAddr;

use shared::net_addr::NetAddr;
use shared::protocol::Message;
use shared::wrap::u16_sub_wrap;

/// Size of the CBF sliding window, per the data model (`cbf_window[20]`).
pub const CBF_WINDOW_LEN: usize = 20;

/// One connected client's server-side state, keyed by its `NetAddr` in [`ClientTable`].
#[derive(Debug)]
pub struct ServerClient {
    pub pending_msgs: Vec<Message>,
    pub timeout_counter: u32,
    cbf_window: [i32; CBF_WINDOW_LEN],
    cbf_index: usize,
    pub snake_id: u16,
    pub last_command_msg_frame: Option<u16>,
    pub username: String,
    /// Highest `handles_committed` value already broadcast to this client, per snake id, so
    /// `SnakeBezier` only carries handles the client hasn't seen rather than the whole body.
    pub bezier_sent: HashMap<u16, u32>,
    /// Upgrade count last broadcast in a `SnakeMetadata` message, per snake id.
    pub metadata_sent: HashMap<u16, u16>,
}

impl ServerClient {
    pub fn new(snake_id: u16, username: String, initial_fill: i32) -> ServerClient {
        ServerClient {
            pending_msgs: Vec::new(),
            timeout_counter: 0,
            cbf_window: [initial_fill; CBF_WINDOW_LEN],
            cbf_index: 0,
            snake_id,
            last_command_msg_frame: None,
            username,
            bezier_sent: HashMap::new(),
            metadata_sent: HashMap::new(),
        }
    }

    pub fn push_cbf_sample(&mut self, sample: i32) {
        self.cbf_window[self.cbf_index] = sample;
        self.cbf_index = (self.cbf_index + 1) % CBF_WINDOW_LEN;
    }

    pub fn cbf_min(&self) -> i32 {
        self.cbf_window.iter().copied().min().unwrap_or(0)
    }

    pub fn queue(&mut self, msg: Message) {
        self.pending_msgs.push(msg);
    }
}

/// All currently-connected clients, plus the two address-based defense lists.
#[derive(Debug, Default)]
pub struct ClientTable {
    clients: HashMap<NetAddr, ServerClient>,
    /// Time-bounded block list populated by protocol violations; refreshed on each new offense.
    malicious: HashMap<NetAddr, u32>,
    /// Permanent block list loaded from server configuration.
    banned_ips: Vec<IpAddr>,
}

impl ClientTable {
    pub fn new(banned_ips: Vec<IpAddr>) -> ClientTable {
        ClientTable { clients: HashMap::new(), malicious: HashMap::new(), banned_ips }
    }

    pub fn is_banned(&self, addr: &NetAddr) -> bool {
        self.banned_ips.contains(&addr.0.ip())
    }

    pub fn is_malicious(&self, addr: &NetAddr) -> bool {
        self.malicious.contains_key(addr)
    }

    /// Put `addr` in the malicious table for `ticks`, extending (not resetting below) any
    /// existing remaining timeout.
    pub fn mark_malicious(&mut self, addr: NetAddr, ticks: u32) {
        let entry = self.malicious.entry(addr).or_insert(0);
        *entry = (*entry).max(ticks);
    }

    /// Decrement every malicious-table entry by one tick, dropping those that expire.
    pub fn tick_malicious(&mut self) {
        self.malicious.retain(|_, remaining| {
            *remaining = remaining.saturating_sub(1);
            *remaining > 0
        });
    }

    pub fn get(&self, addr: &NetAddr) -> Option<&ServerClient> {
        self.clients.get(addr)
    }

    pub fn get_mut(&mut self, addr: &NetAddr) -> Option<&mut ServerClient> {
        self.clients.get_mut(addr)
    }

    pub fn insert(&mut self, addr: NetAddr, client: ServerClient) {
        self.clients.insert(addr, client);
    }

    pub fn remove(&mut self, addr: &NetAddr) -> Option<ServerClient> {
        self.clients.remove(addr)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&NetAddr, &mut ServerClient)> {
        self.clients.iter_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NetAddr, &ServerClient)> {
        self.clients.iter()
    }

    /// Increment every client's `timeout_counter` and return the addresses that have exceeded
    /// `max_ticks`, for the caller to remove (and tear down their snake).
    pub fn tick_timeouts(&mut self, max_ticks: u32) -> Vec<NetAddr> {
        let mut expired = Vec::new();
        for (addr, client) in self.clients.iter_mut() {
            client.timeout_counter += 1;
            if client.timeout_counter > max_ticks {
                expired.push(*addr);
            }
        }
        expired
    }
}

/// Reorder protection: `true` if `new_last_frame` should be accepted over the recorded
/// `last_command_msg_frame` (wrapping comparison — strictly newer only).
pub fn accepts_newer_command_batch(recorded: Option<u16>, new_last_frame: u16) -> bool {
    match recorded {
        None => true,
        Some(recorded) => u16_sub_wrap(new_last_frame, recorded) > 0,
    }
}
