//! Line based JSON protocol spoken between the tracking server and its clients.
//!
//! Every request is a single line `{"cmd": "...", "data": {...}}` and is answered with exactly
//! one reply line, either `{"type": "ok", "data": {...}}` or
//! `{"type": "error", "error_type": "request_malformed", "what": "..."}`.

pub mod client;
pub mod protocol;
pub mod server;
