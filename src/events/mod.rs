//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to publish the
//! operator status stream.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: producer, consumer, supervisor and logger tasks, the watchdog
//!   monitor, and the runtime (boot, shutdown, device restart).
//! - **Consumers**: `Runtime::subscriber_listener()` (fans out to `SubscriberSet`);
//!   tests subscribe directly.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
