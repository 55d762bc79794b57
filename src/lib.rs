//! lottery-intake: a betting-intake server for lottery agencies
//!
//! Agencies connect over TCP, upload wagers with a TLV wire protocol, signal
//! when they are done, and poll for the winners once every expected agency
//! has finished.
//!
//! - `protocol`: TLV codec for bets, requests and responses
//! - `session`: per-connection request state machine
//! - `coordinator`: finisher count and draw quorum
//! - `server`: accept loop with graceful drain
//! - `storage`: bet record stores behind the storage lock
//! - `client`: agency side of the protocol

pub mod client;
pub mod config;
pub mod coordinator;
pub mod lottery;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;
