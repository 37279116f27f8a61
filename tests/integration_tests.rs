//! End-to-end tests that exercise real UDP sockets between the server and plain client sockets,
//! plus protocol round-trip checks that span the wire codec as a whole rather than one message
//! type at a time.
//!
//! Per-message CBF/reorder/hold-until-catch-up behavior is covered by the server's own unit tests
//! in `server::network`; what belongs here is what only shows up once real sockets and a real
//! tokio-driven server loop are involved.

use std::net::UdpSocket as StdUdpSocket;
use std::time::Duration;

use server::config::ServerConfig;
use server::network::Server;
use shared::protocol::{self, JoinRequestPayload, Message, MessageBody};

async fn spawn_test_server() -> std::net::SocketAddr {
    let mut config = ServerConfig::default();
    config.port = 0;
    config.bind_ip = "127.0.0.1".parse().unwrap();
    let mut server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

fn send_join_request(socket: &StdUdpSocket, server_addr: std::net::SocketAddr, frame: u16) {
    let request = Message::new(
        MessageBody::JoinRequest(JoinRequestPayload {
            protocol_version: protocol::PROTOCOL_VERSION,
            username: "test".into(),
            frame,
        }),
        10,
    );
    let (bytes, _) = protocol::pack_datagram(std::iter::once((0usize, &request)));
    socket.send_to(&bytes, server_addr).unwrap();
}

fn recv_join_accept(socket: &StdUdpSocket) -> Option<shared::protocol::JoinAcceptPayload> {
    let mut buf = [0u8; protocol::MAX_UDP_PACKET_SIZE];
    let len = socket.recv(&mut buf).ok()?;
    let records = protocol::unpack_datagram(&buf[..len]).ok()?;
    for (type_byte, payload) in records {
        if let Ok(MessageBody::JoinAccept(accept)) = protocol::decode_payload(type_byte, &payload) {
            return Some(accept);
        }
    }
    None
}

/// S1 — a join request against a live server produces a matching accept over a real socket.
#[tokio::test]
async fn join_request_over_real_socket_yields_accept() {
    let server_addr = spawn_test_server().await;
    let client_socket = StdUdpSocket::bind("127.0.0.1:0").unwrap();
    client_socket.set_read_timeout(Some(Duration::from_millis(500))).unwrap();

    send_join_request(&client_socket, server_addr, 0);

    let accept = recv_join_accept(&client_socket).expect("expected a JoinAccept datagram");
    assert_eq!(accept.snake_id, 1);
    assert_eq!(accept.spawn, shared::fixed::QwPos::ZERO);
    assert_eq!(accept.sim_tick_rate, 60);
    assert_eq!(accept.net_tick_rate, 20);
}

/// S2 — resending JoinRequest (simulating a lost accept) still yields a valid accept each time,
/// and the server keeps a single client record for the address.
#[tokio::test]
async fn resent_join_request_keeps_getting_accepted() {
    let server_addr = spawn_test_server().await;
    let client_socket = StdUdpSocket::bind("127.0.0.1:0").unwrap();
    client_socket.set_read_timeout(Some(Duration::from_millis(500))).unwrap();

    send_join_request(&client_socket, server_addr, 0);
    let first = recv_join_accept(&client_socket).expect("first accept");

    send_join_request(&client_socket, server_addr, 0);
    let second = recv_join_accept(&client_socket).expect("second accept");

    assert_eq!(first.snake_id, second.snake_id);
}

/// Two distinct clients joining the same server get distinct snake ids.
#[tokio::test]
async fn two_clients_get_distinct_snake_ids() {
    let server_addr = spawn_test_server().await;

    let socket_a = StdUdpSocket::bind("127.0.0.1:0").unwrap();
    socket_a.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let socket_b = StdUdpSocket::bind("127.0.0.1:0").unwrap();
    socket_b.set_read_timeout(Some(Duration::from_millis(500))).unwrap();

    send_join_request(&socket_a, server_addr, 0);
    let accept_a = recv_join_accept(&socket_a).expect("client a accept");

    send_join_request(&socket_b, server_addr, 0);
    let accept_b = recv_join_accept(&socket_b).expect("client b accept");

    assert_ne!(accept_a.snake_id, accept_b.snake_id);
}

/// Protocol round-trip across a full mixed batch: every message type survives
/// pack_datagram -> unpack_datagram -> decode_payload with its fields intact.
#[test]
fn mixed_message_batch_round_trips_through_a_datagram() {
    use shared::cmd::{Action, Command};
    use shared::fixed::QwPos;
    use shared::protocol::{CommandsPayload, FeedbackPayload, SnakeHeadPayload};
    use shared::snake::BezierHandle;

    let commands = Message::new(
        MessageBody::Commands(CommandsPayload {
            last_frame: 10,
            cmds: vec![Command { angle: 3, speed: 200, action: Action::Boost }],
        }),
        1,
    );
    let feedback = Message::new(MessageBody::Feedback(FeedbackPayload { diff: -2, frame: 10 }), 1);
    let snake_head = Message::new(
        MessageBody::SnakeHead(SnakeHeadPayload {
            frame: 10,
            snake_id: 7,
            head: BezierHandle::new(QwPos::ZERO, Default::default(), 1),
        }),
        0,
    );

    let messages = [commands, feedback, snake_head];
    let (bytes, packed) = protocol::pack_datagram(messages.iter().enumerate());
    assert_eq!(packed.len(), messages.len());

    let records = protocol::unpack_datagram(&bytes).unwrap();
    assert_eq!(records.len(), messages.len());

    for ((type_byte, payload), original) in records.iter().zip(messages.iter()) {
        let decoded = protocol::decode_payload(*type_byte, payload).unwrap();
        assert_eq!(decoded, original.body);
    }
}

/// Exercises `client::network::Client::connect`'s address resolution over both IP families and
/// its rejection of unparseable, unresolvable addresses.
mod address_resolution {
    use client::network::Client;

    #[test]
    fn connect_accepts_ipv4_literal() {
        let mut client = Client::new().unwrap();
        assert!(client.connect("127.0.0.1:5555", "test".into()).is_ok());
    }

    #[test]
    fn connect_accepts_ipv6_literal() {
        let mut client = Client::new().unwrap();
        assert!(client.connect("[::1]:5555", "test".into()).is_ok());
    }

    #[test]
    fn connect_accepts_localhost_hostname() {
        let mut client = Client::new().unwrap();
        assert!(client.connect("localhost:5555", "test".into()).is_ok());
    }

    #[test]
    fn connect_rejects_garbage_address() {
        let mut client = Client::new().unwrap();
        assert!(client.connect("not-an-address", "test".into()).is_err());
    }
}
