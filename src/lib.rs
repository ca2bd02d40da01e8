//! A small real-time chat relay over TCP.
//!
//! One binary, two roles: `server` runs the central relay, `client` chats
//! through it from a terminal. The relay accepts messages on a
//! synchronous request/ack endpoint and fans each accepted message out to
//! every connected feed subscriber, in acceptance order. Each module
//! focuses on a concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`config`] carries the endpoint addresses, optionally overridden by a
//!   JSON config file.
//! - [`message`] defines the JSON line protocol and the one-byte
//!   acknowledgment.
//! - [`relay`] binds both endpoints, serializes all inbound requests
//!   through one loop, and broadcasts over a Tokio `broadcast` channel.
//! - [`sender`] drives the synchronous send channel with a bounded ack
//!   wait and reconnect-on-timeout.
//! - [`subscriber`] keeps the feed subscription alive and forwards every
//!   update to the display queue.
//! - [`client`] wires sender, subscriber, and the stdin/stdout pumps
//!   together under one shutdown signal.
//!
//! Unit and integration tests exercise the crate directly over
//! ephemeral-port TCP; an end-to-end test drives the compiled binary.

pub mod cli;
pub mod client;
pub mod config;
pub mod message;
pub mod relay;
pub mod sender;
pub mod subscriber;
