//! webapi-tests: semi-automated conformance tests for mobile device Web APIs
//!
//! Each case drives a remote browser over Marionette: it injects
//! JavaScript into the page, triggers a device API (Bluetooth,
//! Notifications, ambient light, proximity), waits for the API's callback
//! to flip a flag in the page, then asserts on the result. Steps that need
//! a human ("did the notification appear?") are routed through a local
//! coordination server to an operator page.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  scripts   ┌──────────────┐  Marionette  ┌──────────┐
//! │    Cases     │──────────►│ RemoteGateway │─────────────►│  Device  │
//! │              │◄──────────│  (flag poll)  │◄─────────────│ browser  │
//! └──────┬───────┘            └──────────────┘              └──────────┘
//!        │ prompts
//!        ▼
//! ┌──────────────┐  WebSocket ┌──────────────┐
//! │ Coordination │───────────►│ Operator page│
//! │    server    │◄───────────│              │
//! └──────────────┘            └──────────────┘
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Bluetooth adapter control
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod bluetooth;

/// Conformance cases
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod cases;

/// Suite configuration
#[allow(clippy::missing_errors_doc)]
pub mod config;

/// Case runner and session harness
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod harness;

/// Marionette remote automation client
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod marionette;

/// Notification API
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod notification;

mod result;

/// Human-in-the-loop coordination and the test environment
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]
pub mod semiauto;

/// Ambient light and proximity sensors
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod sensors;

/// Script sessions
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod session;

/// Remote script execution with flag-based completion
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn
)]
pub mod signal;

/// Bounded polling
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::doc_markdown
)]
pub mod wait;

pub use bluetooth::Bluetooth;
pub use cases::{registry, Case, CaseContext, CASE_NAMES};
pub use config::SuiteConfig;
pub use harness::{CaseOutcome, CaseRunner, Harness, RunSummary};
pub use marionette::{MarionetteConfig, MarionetteSession};
pub use notification::{NotificationPermission, Notifications};
pub use result::{WebApiError, WebApiResult};
pub use semiauto::{
    CoordinationServer, EnvironmentConfig, EnvironmentSlot, Prompt, PromptBroker, Prompter,
    ScriptedPrompter, ServerPrompter, TestEnvironment,
};
pub use sensors::{SensorKind, SensorListener, SensorReading};
pub use session::{MockSession, Script, ScriptSession};
pub use signal::{FlagNamespace, RemoteGateway, RemoteOperation};
pub use wait::{wait_until, Clock, ManualClock, SystemClock, Wait, WaitOptions, WaitResult};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::bluetooth::*;
    pub use super::cases::*;
    pub use super::config::*;
    pub use super::harness::*;
    pub use super::marionette::*;
    pub use super::notification::*;
    pub use super::result::*;
    pub use super::semiauto::*;
    pub use super::sensors::*;
    pub use super::session::*;
    pub use super::signal::*;
    pub use super::wait::*;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_exposes_gateway_stack() {
        let gateway = RemoteGateway::new(MockSession::new());
        assert_eq!(gateway.namespace().as_str(), DEFAULT_FLAG_NAMESPACE);
        assert_eq!(gateway.wait().options().timeout_ms, DEFAULT_WAIT_TIMEOUT_MS);
    }

    #[test]
    fn test_case_names_are_unique() {
        let mut names = CASE_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CASE_NAMES.len());
    }
}
