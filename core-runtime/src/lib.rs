//! # Core Runtime Module
//!
//! Process-wide infrastructure shared by the format layer and its hosts:
//! - `tracing` subscriber setup with pretty, JSON and compact output
//! - Forwarding of events into a host `LoggerSink`
//!
//! Hosts call [`logging::init_logging`] once before opening readers or
//! writers; the format crates only emit events and never install a
//! subscriber themselves.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
