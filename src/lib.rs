//! Story Director — tick-driven command scheduling for narrative scripts.
//!
//! A script engine produces lines and invokes named external commands. Each
//! story module binds its commands to per-module channel queues, so that
//! presentation work (sound, fades, waits) runs in script order on a fixed
//! tick, with per-channel delays, instead of synchronously inside the
//! script call.

pub mod core;
pub mod modules;
pub mod schema;
