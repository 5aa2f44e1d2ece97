//! zharness Library
//!
//! The Z protocol: a line-oriented test-result format, an emitter and test
//! registry that produce it, and the aggregator that turns a stream of it into
//! a verdict. The binary entry point is in main.rs.

pub mod aggregator;
pub mod config;
pub mod discovery;
pub mod emitter;
pub mod errors;
pub mod grammar;
pub mod junit;
pub mod logging;
pub mod registry;
pub mod report;
pub mod reporter;
pub mod runner;
pub mod signals;

pub use aggregator::{aggregate, Aggregator};
pub use emitter::Emitter;
pub use grammar::Status;
pub use registry::{Registry, Settings};
pub use report::{ErrorEntry, ErrorKind, Report};
