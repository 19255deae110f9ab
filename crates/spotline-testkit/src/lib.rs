//! Spotline Testing Infrastructure
//!
//! Shared fixtures for the Spotline crates: a manually driven clock,
//! configuration and request builders, scripted plugins, in-memory
//! collaborators with failure injection, and proptest strategies.
//!
//! # Usage
//!
//! Add this to your crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! spotline-testkit = { workspace = true }
//! ```
//!
//! Then in your tests:
//! ```rust,no_run
//! use spotline_testkit::*;
//!
//! let clock = ManualClock::at_bucket(NOW);
//! let snapshot = standard_config();
//! assert!(snapshot.resolve_code(MEDIA, PRE_ROLL).is_some());
//! # let _ = clock;
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod fakes;
pub mod fixtures;
pub mod plugins;
pub mod strategies;
pub mod time;

pub use fakes::*;
pub use fixtures::*;
pub use plugins::*;
pub use time::ManualClock;
