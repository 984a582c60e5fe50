//! # Event subscribers.
//!
//! Renders the event stream published on the [`Bus`](crate::events::Bus).
//!
//! ```text
//! tasks / watchdog / runtime ── publish(Event) ──► Bus ──► Runtime listener
//!                                                             │
//!                                                     SubscriberSet::emit
//!                                                 ┌───────────┼───────────┐
//!                                                 ▼           ▼           ▼
//!                                             LogWriter    Custom        ...
//! ```
//!
//! - [`Subscribe`]: extension trait for custom sinks.
//! - [`SubscriberSet`]: non-blocking fan-out with per-subscriber queues.
//! - [`LogWriter`] (feature `logging`): stdout status stream.

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
