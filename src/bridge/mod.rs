//! Remote command bridge of the fleet relay server.
//!
//! Nodes keep a reverse SSH tunnel open on one of several relay servers and
//! report which relay and port they use. To run a command on a node, the
//! bridge logs in to that relay, opens a channel to the node's tunnel port,
//! and runs a second SSH session over it with the caller's credentials.
//!
//! # Modules
//!
//! - [`auth`]: key and password strategies, [`auth::ConnectionConfig`]
//! - [`client`]: the relay and target hops
//! - [`supervisor`]: deadline and EOF retry around the two hops
//! - [`handlers`]: poem endpoints and router
//! - [`storage`]: store trait, in-memory store, caches
//! - [`config`], [`error`], [`types`], [`session`]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod session;
pub mod storage;
pub mod supervisor;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
