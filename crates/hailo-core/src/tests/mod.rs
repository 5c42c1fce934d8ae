//! Test module for hailo-core
//!
//! Covers descriptor round trips and content, configuration loading,
//! and the discovery monitor's pass and timer behaviour.

mod cdi_tests;
mod fixtures;
