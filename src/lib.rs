//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-formats`, `bridge-desktop`, `core-runtime`).
//! Host applications can depend on `formats-workspace` and enable the documented
//! features without needing to wire each crate individually.

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;
#[cfg(feature = "desktop-shims")]
pub use core_formats as formats;
#[cfg(feature = "desktop-shims")]
pub use core_runtime as runtime;
