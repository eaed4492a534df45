//! Daemon and cli that record which application has focus each minute of the day.
//! The daemon keeps today's timeline in memory, saves it to daily files and serves it over a
//! local line-based JSON protocol.
//!

pub mod cli;
pub mod daemon;
pub mod fs;
pub mod rpc;
pub mod timeline;
pub mod utils;
pub mod window_api;
