//! Gameline Backend Library
//!
//! Exposes the analytics core for the server binary and the tests. The
//! per-session worker and every engine under it are transport-agnostic;
//! only `main` knows about sockets.

pub mod arbitrage;
pub mod books;
pub mod clock;
pub mod feeds;
pub mod ladders;
pub mod markets;
pub mod models;
pub mod session;
pub mod signals;
pub mod stats;

pub use models::Config;
