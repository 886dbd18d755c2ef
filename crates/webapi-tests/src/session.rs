//! Script sessions - the transport underneath the remote gateway.
//!
//! A [`ScriptSession`] evaluates JavaScript in the device's page context.
//! Two implementations ship with the crate:
//!
//! - [`MarionetteSession`](crate::MarionetteSession) talks to a real device
//! - [`MockSession`] simulates the page-global flag set for unit tests

use crate::result::{WebApiError, WebApiResult};
use crate::signal::FlagNamespace;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// How a script payload completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Returns its value immediately
    Sync,
    /// Returns only once the page invokes the completion callback
    Async,
}

/// A script payload: source plus ordered positional arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// JavaScript function body
    pub source: String,
    /// Positional arguments, exposed to the body as `arguments[i]`
    pub args: Vec<Value>,
    /// Completion mode
    pub mode: ExecutionMode,
}

impl Script {
    /// A synchronous payload
    #[must_use]
    pub fn sync(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            args: Vec::new(),
            mode: ExecutionMode::Sync,
        }
    }

    /// An asynchronous payload
    #[must_use]
    pub fn asynchronous(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            args: Vec::new(),
            mode: ExecutionMode::Async,
        }
    }

    /// Append a positional argument
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
}

/// Remote page-context script evaluation
pub trait ScriptSession {
    /// Evaluate `source` and return its value
    fn execute_script(&mut self, source: &str, args: &[Value]) -> WebApiResult<Value>;

    /// Evaluate `source`, returning once the page calls the completion
    /// callback passed as the last argument
    fn execute_async_script(&mut self, source: &str, args: &[Value]) -> WebApiResult<Value>;

    /// Run a payload according to its mode
    fn run(&mut self, script: &Script) -> WebApiResult<Value> {
        match script.mode {
            ExecutionMode::Sync => self.execute_script(&script.source, &script.args),
            ExecutionMode::Async => self.execute_async_script(&script.source, &script.args),
        }
    }
}

// =============================================================================
// MOCK SESSION
// =============================================================================

/// A flag write the mock applies on a later read
#[derive(Debug, Clone, PartialEq)]
pub struct FlagUpdate {
    /// Flag name inside the namespace
    pub name: String,
    /// Value to store
    pub value: Value,
    /// The update becomes visible on this many flag reads from now
    pub after_reads: u32,
}

impl FlagUpdate {
    /// Visible as soon as the async script is submitted
    #[must_use]
    pub fn now(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            after_reads: 0,
        }
    }

    /// Delay visibility until the `reads`-th flag read
    #[must_use]
    pub const fn after_reads(mut self, reads: u32) -> Self {
        self.after_reads = reads;
        self
    }
}

/// In-memory stand-in for a remote page.
///
/// Flag reads produced by [`FlagNamespace::read_script`] are answered from
/// a simulated flag set. An async submission applies the flag resets it
/// carries (statements produced by [`FlagNamespace::reset_statement`]),
/// drops updates still pending from the previous submission and schedules
/// the next planned batch of [`FlagUpdate`]s. Other synchronous scripts are
/// answered from a queue of canned results, or `null`.
#[derive(Debug, Default)]
pub struct MockSession {
    namespace: FlagNamespace,
    flags: HashMap<String, Value>,
    pending: Vec<FlagUpdate>,
    async_plans: VecDeque<Vec<FlagUpdate>>,
    sync_results: VecDeque<Value>,
    history: Vec<Script>,
    calls_before_disconnect: Option<usize>,
}

impl MockSession {
    /// Create a mock over the default namespace
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock over a custom namespace
    #[must_use]
    pub fn with_namespace(namespace: FlagNamespace) -> Self {
        Self {
            namespace,
            ..Self::default()
        }
    }

    /// Set a flag directly
    pub fn set_flag(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.flags.insert(name.into(), value.into());
    }

    /// Current value of a flag
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<&Value> {
        self.flags.get(name)
    }

    /// Plan the flag writes triggered by the next async submission
    pub fn plan_async(&mut self, updates: Vec<FlagUpdate>) {
        self.async_plans.push_back(updates);
    }

    /// Queue a result for the next non-flag synchronous script
    pub fn push_sync_result(&mut self, value: impl Into<Value>) {
        self.sync_results.push_back(value.into());
    }

    /// Fail every call after `calls` successful ones
    pub fn disconnect_after(&mut self, calls: usize) {
        self.calls_before_disconnect = Some(calls);
    }

    /// Every payload executed so far
    #[must_use]
    pub fn history(&self) -> &[Script] {
        &self.history
    }

    /// Check if any executed script contains `fragment`
    #[must_use]
    pub fn was_called(&self, fragment: &str) -> bool {
        self.history.iter().any(|s| s.source.contains(fragment))
    }

    /// Number of flag reads answered so far
    #[must_use]
    pub fn flag_reads(&self) -> usize {
        self.history
            .iter()
            .filter(|s| self.namespace.parse_read(&s.source).is_some())
            .count()
    }

    fn record(&mut self, script: Script) -> WebApiResult<()> {
        if let Some(remaining) = self.calls_before_disconnect {
            if remaining == 0 {
                return Err(WebApiError::session("remote session unresponsive"));
            }
            self.calls_before_disconnect = Some(remaining - 1);
        }
        self.history.push(script);
        Ok(())
    }

    fn tick_pending(&mut self) {
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for mut update in self.pending.drain(..) {
            update.after_reads = update.after_reads.saturating_sub(1);
            if update.after_reads == 0 {
                self.flags.insert(update.name, update.value);
            } else {
                still_pending.push(update);
            }
        }
        self.pending = still_pending;
    }
}

impl ScriptSession for MockSession {
    fn execute_script(&mut self, source: &str, args: &[Value]) -> WebApiResult<Value> {
        self.record(Script {
            source: source.to_string(),
            args: args.to_vec(),
            mode: ExecutionMode::Sync,
        })?;

        if let Some(name) = self.namespace.parse_read(source).map(str::to_string) {
            self.tick_pending();
            return Ok(self.flags.get(&name).cloned().unwrap_or(Value::Null));
        }
        Ok(self.sync_results.pop_front().unwrap_or(Value::Null))
    }

    fn execute_async_script(&mut self, source: &str, args: &[Value]) -> WebApiResult<Value> {
        self.record(Script {
            source: source.to_string(),
            args: args.to_vec(),
            mode: ExecutionMode::Async,
        })?;

        let resets: Vec<(String, Value)> = source
            .lines()
            .filter_map(|line| self.namespace.parse_reset(line))
            .map(|(name, literal)| {
                let value = serde_json::from_str(literal).unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect();
        self.flags.extend(resets);
        self.pending.clear();
        for update in self.async_plans.pop_front().unwrap_or_default() {
            if update.after_reads == 0 {
                self.flags.insert(update.name, update.value);
            } else {
                self.pending.push(update);
            }
        }
        Ok(Value::Null)
    }
}
