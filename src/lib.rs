//! Freight offer scanning: score exchange offers against an agent profile,
//! merge several exchanges concurrently and fall back to a cache when all of
//! them are down.

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod telemetry;
pub mod util;
