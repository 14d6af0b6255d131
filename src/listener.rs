// ABOUTME: Owns the single bound listener socket and demultiplexes datagrams to connection engines
// ABOUTME: Spawns one independent worker task per newly-seen peer; no shared mutable state between them

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::Connection;
use crate::frame::{Frame, PacketType};
use crate::socket::{DatagramSocket, RecvOutcome};

/// The listener never itself needs a short deadline — it simply blocks
/// waiting for the next datagram — but `DatagramSocket::recv` is always
/// deadline-bounded, so a generous one is used here purely to keep the loop
/// periodically alive (e.g. for future graceful-shutdown signals).
const LISTENER_POLL_INTERVAL: Duration = Duration::from_secs(3600);

/// Bind the configured port and run the accept loop forever.
pub async fn run(config: Arc<Config>) -> std::io::Result<()> {
    let socket = DatagramSocket::bind(config.listen_port).await?;
    info!(port = config.listen_port, "listening");

    // Once a connection engine takes over with its own ephemeral socket, the
    // listener sees no further traffic from that peer; this set exists only
    // to drop a stray duplicate SYN that arrives while a connection for that
    // peer is still in flight. Each spawned task reports back over
    // `finished_tx` when it completes so the address becomes eligible for a
    // brand-new connection again, rather than being blocked forever.
    let mut in_flight: HashSet<SocketAddr> = HashSet::new();
    let (finished_tx, mut finished_rx) = tokio::sync::mpsc::unbounded_channel::<SocketAddr>();

    loop {
        tokio::select! {
            result = socket.recv(LISTENER_POLL_INTERVAL) => {
                let (payload, peer_addr) = match result? {
                    RecvOutcome::Datagram(payload, peer_addr) => (payload, peer_addr),
                    RecvOutcome::TimedOut => continue,
                };

                let frame = match Frame::decode(&payload) {
                    Ok(frame) => frame,
                    Err(_) => continue, // too short to be a frame; discard silently
                };

                if frame.packet_type != PacketType::Syn {
                    debug!(%peer_addr, "dropping non-SYN datagram from unknown peer");
                    continue;
                }

                if !in_flight.insert(peer_addr) {
                    debug!(%peer_addr, "duplicate SYN for an in-flight peer, ignoring");
                    continue;
                }

                info!(%peer_addr, "new peer, spawning connection engine");
                let task_config = Arc::clone(&config);
                let task_finished_tx = finished_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = Connection::spawn(peer_addr, task_config).await {
                        warn!(%peer_addr, error = %e, "connection task ended with an I/O error");
                    }
                    let _ = task_finished_tx.send(peer_addr);
                });
            }
            Some(peer_addr) = finished_rx.recv() => {
                in_flight.remove(&peer_addr);
                debug!(%peer_addr, "connection closed, peer may open a new one");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use std::net::Ipv4Addr;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn drops_non_syn_from_unknown_peer() {
        let dir = std::env::temp_dir();
        let config = Arc::new(Config::new(0, &dir, false).unwrap());
        let server = DatagramSocket::bind(0).await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let data_frame = Frame::control(PacketType::Data, 1, Ipv4Addr::LOCALHOST, 0);
        client
            .send_to(&data_frame.encode(), server_addr)
            .await
            .unwrap();

        // The listener itself is exercised at the socket level here: a
        // non-SYN first packet must never be handed to a new engine. We
        // assert directly on the decoded type rather than spinning up the
        // full `run` loop, which never returns.
        match server.recv(Duration::from_millis(200)).await.unwrap() {
            RecvOutcome::Datagram(payload, _addr) => {
                let frame = Frame::decode(&payload).unwrap();
                assert_eq!(frame.packet_type, PacketType::Data);
            }
            RecvOutcome::TimedOut => panic!("expected the datagram to arrive"),
        }
        let _ = config;
    }
}
