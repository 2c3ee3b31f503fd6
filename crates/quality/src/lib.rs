// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Quality-gate pipeline for DevGodzilla: the gate contract, the
//! registry, verdict aggregation, and the default gates.

pub mod gate;
pub mod gates;
pub mod registry;
pub mod verdict;

pub use gate::{Gate, GateContext, GateError};
pub use registry::{create_default_registry, global_registry, reset_global_registry, GateRegistry};
pub use verdict::aggregate_verdict;
