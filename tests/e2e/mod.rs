//! End-to-end tests for the bridge driver stack.
//!
//! These run against the scripted USB host without requiring real hardware
//! and cover the complete path from discovery through communication.

pub mod discovery_tests;
pub mod driver_wire_tests;
pub mod monitor_tests;
pub mod workflow_tests;
