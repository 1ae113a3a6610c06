//! SmsGuard - Distributed Rate Limiting for Message Sending
//!
//! This crate gates message sends on per-sender and global per-second limits
//! shared by any number of stateless instances. All state lives in an
//! external counter store reached through [`store::CounterStore`]; the engine
//! only composes its atomic increment-with-expiry into admission checks,
//! trailing-window usage percentages, historical aggregates and a stale-key
//! sweep.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod service;
pub mod store;
