#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod local;
pub use local::*;

#[cfg(feature = "redis-tokio")]
mod redis;
#[cfg(feature = "redis-tokio")]
pub use crate::redis::*;

#[cfg(feature = "redis-tokio")]
mod hybrid;
#[cfg(feature = "redis-tokio")]
pub use crate::hybrid::*;

#[cfg(feature = "redis-tokio")]
mod runtime;

mod error;
pub use error::*;

mod common;
pub use common::{
    BackendKind, CacheTtlMs, CounterMode, HealthReport, HealthStatus, Quantity, Reservation,
    StoreHealth,
};

pub mod config;

mod read_cache;

mod stock_counter;
pub use stock_counter::*;

mod stock_service;
pub use stock_service::*;

#[cfg(test)]
mod tests;
