#![deny(unused_must_use)]
//! Sparrow: a distributed synthetic-probe agent. Runs a configurable set of
//! health, latency, DNS and traceroute checks on independent schedules,
//! exposes their latest results as JSON and as Prometheus metrics, and
//! reconfigures itself live as its `RuntimeConfig` document changes.

pub mod capabilities;
pub mod collectors;
pub mod config;
pub mod error;
pub mod http;
pub mod loader;
pub mod probe;
pub mod reconciler;
pub mod retry;
pub mod state;
pub mod store;
