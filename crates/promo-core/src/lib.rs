//! # promo-core
//!
//! Core abstractions for the Promo discount-campaign engine.
//!
//! This crate provides the foundational types and traits used across all
//! Promo components:
//!
//! - **Identifiers**: Strongly-typed IDs for campaigns, occurrences, and actors
//! - **Clock**: Injectable time source for deterministic scheduling logic
//! - **Lock**: TTL-bounded mutual exclusion over a shared transient store
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `promo-core` is the **only** crate allowed to define shared primitives.
//! Domain logic (campaign lifecycle, scheduling, recurrence) lives in
//! `promo-flow` and consumes these seams via injection.
//!
//! ## Example
//!
//! ```rust
//! use promo_core::prelude::*;
//!
//! let id = CampaignId::new(42);
//! assert_eq!(id.to_string(), "42");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod error;
pub mod id;
pub mod lock;
pub mod observability;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use promo_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::error::{Error, Result};
    pub use crate::id::{ActorId, CampaignId, OccurrenceId};
    pub use crate::lock::{LockLease, MemoryTransientStore, ProcessLock, TransientStore};
    pub use crate::observability::{LogFormat, init_logging};
}

// Re-export key types at crate root for ergonomics
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use id::{ActorId, CampaignId, OccurrenceId};
pub use lock::{LockLease, MemoryTransientStore, ProcessLock, TransientStore};
pub use observability::{LogFormat, init_logging};
