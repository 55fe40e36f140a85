// Minichain daemon library
// Exposes internal modules for integration testing

#[macro_use]
extern crate log;

pub mod cli;
pub mod config;
pub mod core;
pub mod logger;
pub mod node;
pub mod p2p;
pub mod rpc;
