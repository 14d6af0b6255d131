//! A small file-serving daemon that speaks HTTP/1.x over a reliable-datagram
//! transport built on top of unordered UDP.
//!
//! The interesting part of this crate is [`connection`]: a per-peer protocol
//! engine that performs a three-way handshake, carries an HTTP request and
//! response across fixed-size frames with stop-and-wait retransmission, and
//! tears down with an explicit FIN exchange. Everything else — the frame
//! codec, the HTTP parser, the file handler — exists to give that engine
//! something real to carry.

pub mod config;
pub mod connection;
pub mod frame;
pub mod handler;
pub mod http;
pub mod listener;
pub mod socket;

pub use config::Config;
pub use frame::{Frame, PacketType};
