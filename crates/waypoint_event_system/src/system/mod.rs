//! Event bus implementation, split by concern:
//!
//! - `core` — the bus structure and its handler table
//! - `handlers` — registration methods
//! - `emitters` — emission and dispatch
//! - `management` — owner-scoped bookkeeping and removal
//! - `stats` — counters for monitoring

mod core;
mod emitters;
mod handlers;
mod management;
mod stats;

pub use self::core::EventBus;
pub use stats::EventBusStats;
