//! In-process stock counter.
//!
//! The local counter keeps the stock quantity inside the current process behind a
//! synchronous mutex, with a short-lived read cache for availability queries.
//!
//! # Key Characteristics
//!
//! - **Exact:** reservations are serialized, so the counter never oversells
//! - **Zero external dependencies:** no network or store required
//! - **Low latency:** a reservation is one uncontended lock and a subtraction
//! - **Process-scoped:** state is not shared across processes
//!
//! # When to Use
//!
//! ✅ **Use the local counter when:**
//! - A single process sells the stock
//! - The shared store is unreachable and availability matters more than
//!   cross-process consistency (this is how `HybridCounter` uses it)
//!
//! ❌ **Don't use the local counter when:**
//! - Several service instances sell from the same stock
//! - The remaining count must survive a restart
//!
//! # Examples
//!
//! ```
//! use vacancy::{CacheTtlMs, LocalCounter};
//!
//! let counter = LocalCounter::new(10, CacheTtlMs::default());
//!
//! assert!(counter.reserve(3).unwrap().success);
//! assert_eq!(counter.get_current(true), 7);
//! assert!(counter.reserve(0).is_err());
//! ```

mod local_counter;
pub use local_counter::*;
