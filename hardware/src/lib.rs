//! Hardware drivers for vacuum gauge controllers.
//!
//! This crate provides drivers for the pressure instrumentation on the
//! vacuum system. Each driver is feature-gated for optional compilation.
//!
//! # Features
//!
//! - `inficon-vgc` - Inficon VGC501/502/503 gauge controllers (Ethernet, cross-platform)
//!
//! Drivers implement the [`device::Device`] lifecycle trait so an
//! acquisition host can initialize them, read values by name and shut
//! them down without knowing the concrete controller.

pub mod device;

#[cfg(feature = "inficon-vgc")]
pub mod inficon;
