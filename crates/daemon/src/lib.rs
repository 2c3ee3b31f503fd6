// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! DevGodzilla daemon: config, wire protocol, listener, SSE fan-out,
//! log tailing, webhooks, health checks, and lifecycle.

pub mod env;
pub mod health;
pub mod lifecycle;
pub mod listener;
pub mod logs;
pub mod protocol;
pub mod sse;
pub mod webhooks;

pub use env::{Config, ConfigError};
pub use health::{ComponentHealth, HealthChecker, ReadinessReport};
pub use lifecycle::{DaemonState, LifecycleError};
pub use protocol::{ErrorKind, Request, Response};
pub use sse::{EventStreamOptions, stream_events};
pub use webhooks::{apply_ci_webhook, apply_windmill_webhook, WebhookOutcome};
