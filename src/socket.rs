// ABOUTME: Thin async wrapper around a bound UDP socket used by both the listener and connection engines
// ABOUTME: Turns a read-deadline timeout into a distinct, recoverable outcome rather than an error

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::frame::MAX_FRAME_SIZE;

/// The outcome of a deadline-bounded receive.
pub enum RecvOutcome {
    /// A datagram arrived before the deadline elapsed.
    Datagram(Vec<u8>, SocketAddr),
    /// No datagram arrived before the deadline elapsed. This is a normal,
    /// recoverable condition the engine's state machine reacts to — not a
    /// fatal failure.
    TimedOut,
}

/// A bound UDP socket with a deadline-bounded receive.
///
/// The listener binds the well-known configured port; each connection
/// engine, once past the handshake, binds its own ephemeral port and talks
/// only to its one peer from then on.
pub struct DatagramSocket {
    socket: UdpSocket,
}

impl DatagramSocket {
    /// Bind a new socket on `port`. `port = 0` asks the OS for an ephemeral port.
    pub async fn bind(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        Ok(DatagramSocket { socket })
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive one datagram, bounded by `deadline`. A timeout is reported as
    /// `RecvOutcome::TimedOut`, not an `Err`.
    pub async fn recv(&self, deadline: Duration) -> io::Result<RecvOutcome> {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        match timeout(deadline, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, addr))) => {
                buf.truncate(len);
                Ok(RecvOutcome::Datagram(buf, addr))
            }
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(RecvOutcome::TimedOut),
        }
    }

    /// Send one datagram to `dest`.
    pub async fn send_to(&self, payload: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.socket.send_to(payload, dest).await?;
        Ok(())
    }
}
