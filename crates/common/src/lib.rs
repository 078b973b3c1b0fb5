//! Common crate
//!
//! Shared error handling, the cancellable execution context and the
//! single-fire completion events used across the Frost query core.
//!
//! # Example
//! ```rust
//! use frost_common::{Error, ExecContext};
//!
//! let ctx = ExecContext::new();
//! assert!(ctx.check().is_ok());
//! ctx.cancel();
//! assert_eq!(ctx.check(), Err(Error::Cancelled));
//! ```

pub mod context;
pub mod error;
pub mod event;

pub use context::ExecContext;
pub use error::{Error, Result};
pub use event::{Callback, FlushEvent, FlushNotifier, Flusher};
