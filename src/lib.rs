//! relaychat - A concurrent TCP chat relay
//!
//! This crate provides the core functionality for relaychat, including:
//! - Length-prefixed framing for whole-message reads and writes
//! - A shared session registry with safe register/deregister/broadcast
//! - The per-connection relay loop and the TCP acceptor
//! - Best-effort chat history persistence
//! - Configuration management and a small chat client
//!
//! # Architecture
//!
//! relaychat uses a client-server model where:
//! - The server (`relaychat-server`) accepts connections and relays messages
//! - The client (`relaychat`) reads lines from the terminal and prints what
//!   other participants say
//! - Communication happens over TCP, one length-prefixed frame per message

pub mod client;
pub mod config;
pub mod history;
pub mod protocol;
pub mod server;
