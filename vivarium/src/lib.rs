//! Sandboxed multi-agent LLM experiments.
//!
//! Populations of model-backed agents interact through a shared message
//! broker (free-form chat) or a structured economic round (the donor game),
//! driven by a stepped environment and a generational orchestrator. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (memory bounds, pairing,
//!   parsing, statistics). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting pieces (configuration, statistics files).
//! - **[`providers`]**: The completion-capability boundary; HTTP clients
//!   behind a trait so tests substitute scripted fakes.
//!
//! [`env`] and [`experiment`] coordinate agents, the broker and the ledger
//! to implement the simulation loop.

pub mod agents;
pub mod cancel;
pub mod core;
pub mod env;
pub mod experiment;
pub mod io;
pub mod logging;
pub mod messaging;
pub mod providers;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
