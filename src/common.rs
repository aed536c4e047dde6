use std::{fmt, ops::Deref, time::Duration};

use serde::Serialize;

use crate::VacancyError;

/// A validated, strictly positive reservation amount.
///
/// Built from the raw `i64` a caller sends so that zero and negative requests are
/// rejected with [`VacancyError::InvalidQuantity`] before any counter is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(u64);

impl Deref for Quantity {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<i64> for Quantity {
    type Error = VacancyError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 {
            Err(VacancyError::InvalidQuantity(value))
        } else {
            Ok(Self(value.unsigned_abs()))
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How long an availability snapshot may be served before it is re-read.
///
/// A value of `0` disables read caching entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheTtlMs(u64);

impl Default for CacheTtlMs {
    /// Returns a TTL of 1000 ms.
    fn default() -> Self {
        Self(1000)
    }
}

impl Deref for CacheTtlMs {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u64> for CacheTtlMs {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl CacheTtlMs {
    /// The TTL as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

/// Outcome of a reservation attempt.
///
/// Running out of stock is not an error: it is reported as `success == false`
/// together with the quantity that was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reservation {
    /// Whether the requested quantity was taken.
    pub success: bool,
    /// Stock left after the attempt.
    pub remaining: u64,
}

impl Reservation {
    pub(crate) fn reserved(remaining: u64) -> Self {
        Self {
            success: true,
            remaining,
        }
    }

    pub(crate) fn insufficient(remaining: u64) -> Self {
        Self {
            success: false,
            remaining,
        }
    }
}

/// Which kind of backend is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// A shared store coordinates all processes.
    Distributed,
    /// This process owns the count.
    InMemory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distributed => write!(f, "distributed"),
            Self::InMemory => write!(f, "in-memory"),
        }
    }
}

/// Operating mode of a hybrid counter.
///
/// The only transition is `DistributedActive -> FallbackActive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterMode {
    /// The shared store is authoritative.
    DistributedActive,
    /// The in-process counter is authoritative.
    FallbackActive,
}

impl CounterMode {
    /// Backend kind serving requests in this mode.
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::DistributedActive => BackendKind::Distributed,
            Self::FallbackActive => BackendKind::InMemory,
        }
    }
}

/// Coarse health verdict for readiness probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Requests are being served by a working backend.
    Healthy,
    /// The active backend cannot serve requests.
    Unhealthy,
}

/// Health snapshot of the shared store behind a distributed counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    /// Whether the store answered a ping.
    pub reachable: bool,
    /// Stock value read from the store, when the read succeeded.
    pub current_stock: Option<u64>,
    /// Store endpoint with credentials stripped.
    pub endpoint: String,
    /// Failure description, when something went wrong.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health report returned to the surrounding service's readiness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Overall verdict.
    pub status: HealthStatus,
    /// Backend currently serving requests.
    pub backend: BackendKind,
    /// Stock according to the serving backend.
    pub current_stock: u64,
    /// Hybrid mode, if the report came from a hybrid counter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<CounterMode>,
    /// Shared store detail, if a distributed backend exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distributed: Option<StoreHealth>,
}
