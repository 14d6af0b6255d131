// ABOUTME: Per-peer protocol engine: handshake, request reassembly, response chunking, teardown
// ABOUTME: Runs as an independent task; owns its own ephemeral socket once past the handshake

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Config;
use crate::frame::{Frame, PacketType, MAX_PAYLOAD_SIZE};
use crate::handler;
use crate::http::{self, Response};
use crate::socket::{DatagramSocket, RecvOutcome};

const SYN_ACK_SEQ: u32 = 2;
const FIN_ACK_SEQ: u32 = 70;
const FIRST_DATA_SEQ: u32 = 60;

const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(5);
const RECEIVING_DEADLINE: Duration = Duration::from_secs(8);
const SENDING_FIRST_DEADLINE: Duration = Duration::from_secs(5);
const SENDING_DEADLINE: Duration = Duration::from_secs(6);
const FIN_WAIT_DEADLINE: Duration = Duration::from_secs(4);

const HANDSHAKE_RETRIES: u32 = 5;
const SENDING_RETRIES: u32 = 10;
const FIN_WAIT_RETRIES: u32 = 5;
/// Extra quiet rounds, once every response chunk is acked, given to the peer
/// to send its own `FIN` before the engine proactively tears down.
const ALL_ACKED_GRACE_ROUNDS: u32 = 1;

/// What the reassembled request bytes resolved to once reassembly completed.
///
/// A complete byte stream does not imply a request this server can serve —
/// the peer may have sent an unsupported method or version, or a malformed
/// request line. `Unparseable` carries enough to build the error response
/// without ever invoking the file handler.
enum Reassembled {
    Request(http::Request),
    Unparseable { version: String, status: u16 },
}

/// The reassembled bytes are structurally complete but may still fail the
/// stricter method/version validation `http::parse` applies; that failure is
/// itself a terminal outcome (a `400`/`405`/`505` response), not a reason to
/// keep waiting for more frames.
fn classify_reassembled(text: &str) -> Reassembled {
    match http::parse(text) {
        Ok(request) => Reassembled::Request(request),
        Err(error) => Reassembled::Unparseable {
            // The request line or version token may itself be the part that
            // failed to parse, so there is no reliable version to echo back;
            // HTTP/1.1 is the safe default for an error response.
            version: "1.1".to_string(),
            status: error.status_code(),
        },
    }
}

/// The per-peer connection state machine.
pub struct Connection {
    socket: DatagramSocket,
    /// True UDP source address of the peer — routing and replies always use
    /// this, never the `peer_address`/`peer_port` fields embedded in frames.
    peer_addr: SocketAddr,
    config: Arc<Config>,
}

impl Connection {
    /// Handle one peer from its initial `SYN` datagram to teardown.
    ///
    /// Allocates its own ephemeral socket (the shared listener socket is
    /// only ever used to observe the first `SYN`).
    #[tracing::instrument(skip(config), fields(peer = %peer_addr))]
    pub async fn spawn(peer_addr: SocketAddr, config: Arc<Config>) -> std::io::Result<()> {
        let socket = DatagramSocket::bind(0).await?;
        let mut conn = Connection {
            socket,
            peer_addr,
            config,
        };
        conn.run().await
    }

    fn peer_ipv4(&self) -> Ipv4Addr {
        match self.peer_addr.ip() {
            std::net::IpAddr::V4(v4) => v4,
            std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        }
    }

    async fn send_control(&self, packet_type: PacketType, seq: u32) -> std::io::Result<()> {
        let frame = Frame::control(packet_type, seq, self.peer_ipv4(), self.peer_addr.port());
        self.socket.send_to(&frame.encode(), self.peer_addr).await
    }

    async fn run(&mut self) -> std::io::Result<()> {
        debug!("SYN received, entering SYN_RCVD");
        self.send_control(PacketType::SynAck, SYN_ACK_SEQ).await?;

        let mut inbound_frames: BTreeMap<u32, Vec<u8>> = BTreeMap::new();

        if self.await_established(&mut inbound_frames).await?.is_none() {
            return Ok(());
        }

        debug!("ESTABLISHED, entering RECEIVING");
        let response = match self.receive_request(&mut inbound_frames).await? {
            Some(Reassembled::Request(request)) => self.build_response(&request),
            Some(Reassembled::Unparseable { version, status }) => {
                Response::new(status, &version, String::new())
            }
            None => return Ok(()),
        };

        debug!(status = response.status_code, "entering SENDING");
        self.send_response(&response).await?;

        debug!("CLOSED");
        Ok(())
    }

    /// SYN_RCVD → ESTABLISHED.
    async fn await_established(
        &mut self,
        inbound_frames: &mut BTreeMap<u32, Vec<u8>>,
    ) -> std::io::Result<Option<()>> {
        let mut retries = HANDSHAKE_RETRIES;
        loop {
            match self.socket.recv(HANDSHAKE_DEADLINE).await? {
                RecvOutcome::Datagram(payload, _addr) => {
                    let Ok(frame) = Frame::decode(&payload) else {
                        continue;
                    };
                    match frame.packet_type {
                        PacketType::Ack => return Ok(Some(())),
                        PacketType::Data => {
                            // Our SYN_ACK's ack was lost but the peer has
                            // moved on; accept this DATA as the first
                            // frame of the request without complaint.
                            inbound_frames
                                .entry(frame.sequence_number)
                                .or_insert_with(|| frame.payload.clone());
                            self.send_control(PacketType::Ack, frame.sequence_number)
                                .await?;
                            return Ok(Some(()));
                        }
                        _ => continue,
                    }
                }
                RecvOutcome::TimedOut => {
                    retries -= 1;
                    if retries == 0 {
                        warn!("handshake retry budget exhausted, aborting");
                        return Ok(None);
                    }
                    self.send_control(PacketType::SynAck, SYN_ACK_SEQ).await?;
                }
            }
        }
    }

    /// ESTABLISHED → RECEIVING → (reassembled request ready for handling).
    async fn receive_request(
        &mut self,
        inbound_frames: &mut BTreeMap<u32, Vec<u8>>,
    ) -> std::io::Result<Option<Reassembled>> {
        let mut any_frame_received = !inbound_frames.is_empty();
        let mut deadline = RECEIVING_DEADLINE;

        loop {
            match self.socket.recv(deadline).await? {
                RecvOutcome::Datagram(payload, _addr) => {
                    deadline = RECEIVING_DEADLINE;
                    let Ok(frame) = Frame::decode(&payload) else {
                        continue;
                    };
                    if frame.packet_type == PacketType::Data {
                        inbound_frames
                            .entry(frame.sequence_number)
                            .or_insert_with(|| frame.payload.clone());
                        any_frame_received = true;
                        self.send_control(PacketType::Ack, frame.sequence_number)
                            .await?;
                    }
                    // Non-DATA frames are ignored but still reset the deadline.
                }
                RecvOutcome::TimedOut => {
                    if !any_frame_received {
                        deadline = RECEIVING_DEADLINE;
                        continue;
                    }

                    if let Some(text) = self.try_reassemble(inbound_frames) {
                        return Ok(Some(classify_reassembled(&text)));
                    }
                    // Contiguous-but-not-yet-complete, or gapped: keep waiting.
                    deadline = RECEIVING_DEADLINE;
                }
            }
        }
    }

    /// Check whether the frames received so far make up the whole request,
    /// without judging whether that request is one this server can serve.
    /// Returns the reassembled text once it is complete; `None` means either
    /// a gap remains or the peer is still sending more of the body.
    fn try_reassemble(&self, inbound_frames: &BTreeMap<u32, Vec<u8>>) -> Option<String> {
        if inbound_frames.is_empty() {
            return None;
        }
        let min = *inbound_frames.keys().next().unwrap();
        let max = *inbound_frames.keys().next_back().unwrap();
        let count = inbound_frames.len() as u32;
        if max - min + 1 != count {
            return None; // gap remains
        }

        let mut reassembled = Vec::new();
        for payload in inbound_frames.values() {
            reassembled.extend_from_slice(payload);
        }
        let text = String::from_utf8_lossy(&reassembled).into_owned();

        reassembly_is_complete(&text).then_some(text)
    }

    fn build_response(&self, request: &http::Request) -> Response {
        match self.dispatch(request) {
            Ok(result) => Response::new(200, &request.version, result.to_json_body()),
            Err(status) => Response::new(status, &request.version, String::new()),
        }
    }

    fn dispatch(&self, request: &http::Request) -> Result<handler::HandlerResult, u16> {
        let root = &self.config.root_directory;
        match request.method.as_str() {
            "GET" => handler::handle_get(root, &request.url).map_err(|e| e.status_code()),
            "POST" => handler::handle_post(root, &request.url, &request.body)
                .map_err(|e| e.status_code()),
            other => {
                warn!(
                    method = other,
                    "unreachable: parser already rejects unsupported methods"
                );
                Err(405)
            }
        }
    }

    /// SENDING: chunk, send, retransmit-until-acked-or-exhausted.
    async fn send_response(&mut self, response: &Response) -> std::io::Result<()> {
        let body = response.serialize();
        let mut chunks: Vec<&[u8]> = body.as_bytes().chunks(MAX_PAYLOAD_SIZE).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }

        let mut outbound_frames: HashMap<u32, Frame> = HashMap::new();
        let mut acked: HashSet<u32> = HashSet::new();

        for (i, chunk) in chunks.iter().enumerate() {
            let seq = FIRST_DATA_SEQ + i as u32;
            let frame = Frame::new(
                PacketType::Data,
                seq,
                self.peer_ipv4(),
                self.peer_addr.port(),
                chunk.to_vec(),
            )
            .expect("chunk size bounded by MAX_PAYLOAD_SIZE");
            self.socket.send_to(&frame.encode(), self.peer_addr).await?;
            outbound_frames.insert(seq, frame);
        }

        let mut deadline = SENDING_FIRST_DEADLINE;
        let mut retries = SENDING_RETRIES;
        let mut all_acked_rounds = 0u32;

        loop {
            match self.socket.recv(deadline).await? {
                RecvOutcome::Datagram(payload, _addr) => {
                    let Ok(frame) = Frame::decode(&payload) else {
                        continue;
                    };
                    match frame.packet_type {
                        PacketType::Ack
                            if outbound_frames.contains_key(&frame.sequence_number) =>
                        {
                            acked.insert(frame.sequence_number);
                            deadline = SENDING_DEADLINE;
                        }
                        PacketType::Fin => {
                            return self.enter_fin_wait().await;
                        }
                        _ => {}
                    }
                }
                RecvOutcome::TimedOut => {
                    let all_acked = outbound_frames.keys().all(|seq| acked.contains(seq));
                    if !all_acked {
                        for (seq, frame) in outbound_frames.iter() {
                            if !acked.contains(seq) {
                                debug!(seq, "retransmitting unacked DATA frame");
                                self.socket.send_to(&frame.encode(), self.peer_addr).await?;
                            }
                        }
                        all_acked_rounds = 0;
                    } else {
                        all_acked_rounds += 1;
                        if all_acked_rounds > ALL_ACKED_GRACE_ROUNDS {
                            return self.enter_fin_wait().await;
                        }
                    }

                    retries -= 1;
                    if retries == 0 {
                        warn!("response retransmission budget exhausted, giving up");
                        return Ok(());
                    }
                    deadline = SENDING_DEADLINE;
                }
            }
        }
    }

    /// SENDING → FIN_WAIT → CLOSED.
    async fn enter_fin_wait(&mut self) -> std::io::Result<()> {
        debug!("entering FIN_WAIT");
        self.send_control(PacketType::FinAck, FIN_ACK_SEQ).await?;

        let mut retries = FIN_WAIT_RETRIES;
        loop {
            match self.socket.recv(FIN_WAIT_DEADLINE).await? {
                RecvOutcome::Datagram(payload, _addr) => {
                    let Ok(frame) = Frame::decode(&payload) else {
                        continue;
                    };
                    match frame.packet_type {
                        PacketType::Ack if frame.sequence_number == FIN_ACK_SEQ => return Ok(()),
                        // The peer raced ahead into a new request; this
                        // profile is one-request-per-connection, so close.
                        PacketType::Data => return Ok(()),
                        _ => {}
                    }
                }
                RecvOutcome::TimedOut => {
                    retries -= 1;
                    if retries == 0 {
                        return Ok(());
                    }
                    self.send_control(PacketType::FinAck, FIN_ACK_SEQ).await?;
                }
            }
        }
    }
}

/// Whether the bytes reassembled from contiguous DATA frames so far make up
/// the whole request. This only needs to find the header/body boundary and,
/// if present, a declared `Content-Length` — it does not validate the method,
/// version, or even that the request line has the right shape, since a
/// request that is syntactically complete but unsupported still needs to
/// finish reassembling so it can be rejected with a response rather than
/// waited on forever.
fn reassembly_is_complete(text: &str) -> bool {
    let lines: Vec<&str> = text.split("\r\n").collect();
    if lines.len() < 2 {
        return false; // no header/body boundary yet, even a blank one
    }

    let mut declared_length = None;
    let mut terminator = None;
    for (idx, line) in lines.iter().enumerate().skip(1) {
        if line.is_empty() {
            terminator = Some(idx);
            break;
        }
        if let Some(colon) = line.find(':') {
            let key = &line[..colon];
            if key.eq_ignore_ascii_case("Content-Length") {
                declared_length = Some(line[colon + 1..].trim_start().to_string());
            }
        }
    }

    let Some(terminator) = terminator else {
        return false; // headers not yet terminated by a blank line
    };

    match declared_length {
        Some(declared) => {
            let body = lines[terminator + 1..].join("\n");
            content_length_matches(&declared, &body)
        }
        None => true,
    }
}

/// The declared `Content-Length` is compared against the reassembled body
/// length allowing for the one-byte padding slack an implementer might see
/// from trailing NUL/whitespace datagram padding, rather than requiring
/// exact equality.
fn content_length_matches(declared: &str, body: &str) -> bool {
    let Ok(declared_len) = declared.trim().parse::<i64>() else {
        return false;
    };
    let body_len = body.len() as i64;
    (body_len - declared_len).abs() <= 1
}
