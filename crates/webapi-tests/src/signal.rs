//! Remote signalling through page-global flags.
//!
//! The remote side can only report completion by writing to page globals,
//! so every asynchronous API call follows the same shape:
//!
//! 1. the gateway resets the operation's outcome flags, then the async
//!    script issues the request and wires callbacks that set exactly one of
//!    the success / error flags
//! 2. the host polls the success flag with [`Wait`]
//! 3. on timeout the host reads the error flag once to tell an explicit
//!    failure from silence
//!
//! [`RemoteGateway::perform`] owns all three steps so API wrappers never
//! reset flags by hand or repeat the success / error / no-response split.

use crate::result::{WebApiError, WebApiResult};
use crate::session::{Script, ScriptSession};
use crate::wait::{Clock, SystemClock, Wait, WaitOptions, WaitResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Default namespace: the unprivileged view of the content window
pub const DEFAULT_FLAG_NAMESPACE: &str = "window.wrappedJSObject";

/// Default success flag
pub const RECEIVED_SUCCESS: &str = "rcvd_success";

/// Default error flag
pub const RECEIVED_ERROR: &str = "rcvd_error";

// =============================================================================
// FLAG NAMESPACE
// =============================================================================

/// JavaScript object holding the remote flag set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagNamespace(String);

impl Default for FlagNamespace {
    fn default() -> Self {
        Self(DEFAULT_FLAG_NAMESPACE.to_string())
    }
}

impl FlagNamespace {
    /// Create a namespace from a JavaScript expression
    #[must_use]
    pub fn new(expr: impl Into<String>) -> Self {
        Self(expr.into())
    }

    /// The namespace expression
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Property path of a flag
    #[must_use]
    pub fn path(&self, flag: &str) -> String {
        format!("{}.{flag}", self.0)
    }

    /// Synchronous script returning a flag's value
    #[must_use]
    pub fn read_script(&self, flag: &str) -> String {
        format!("return {};", self.path(flag))
    }

    /// Statement resetting a flag to a JavaScript literal
    #[must_use]
    pub fn reset_statement(&self, flag: &str, literal: &str) -> String {
        format!("{} = {literal};", self.path(flag))
    }

    /// Inverse of [`reset_statement`](Self::reset_statement)
    #[must_use]
    pub fn parse_reset<'a>(&self, statement: &'a str) -> Option<(&'a str, &'a str)> {
        let (name, literal) = statement
            .trim()
            .strip_prefix(self.0.as_str())?
            .strip_prefix('.')?
            .strip_suffix(';')?
            .split_once(" = ")?;
        let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        valid.then_some((name, literal))
    }

    /// Prefix a script body with `var ns = <namespace>;`
    #[must_use]
    pub fn bind(&self, body: &str) -> String {
        format!("var ns = {};\n{body}", self.0)
    }

    /// Inverse of [`read_script`](Self::read_script)
    #[must_use]
    pub fn parse_read<'a>(&self, script: &'a str) -> Option<&'a str> {
        let name = script
            .trim()
            .strip_prefix("return ")?
            .strip_prefix(self.0.as_str())?
            .strip_prefix('.')?
            .strip_suffix(';')?;
        let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        valid.then_some(name)
    }
}

// =============================================================================
// OUTCOME FLAGS
// =============================================================================

/// The pair of flags an operation's callbacks write to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeFlags {
    /// Set by the success callback
    pub success: String,
    /// Set by the error callback
    pub error: String,
}

impl OutcomeFlags {
    /// Custom flag pair
    #[must_use]
    pub fn new(success: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: success.into(),
            error: error.into(),
        }
    }

    /// The `rcvd_success` / `rcvd_error` pair
    #[must_use]
    pub fn received() -> Self {
        Self::new(RECEIVED_SUCCESS, RECEIVED_ERROR)
    }
}

impl OutcomeFlags {
    /// Statements clearing both flags, run before the request is issued
    #[must_use]
    pub fn reset_script(&self, namespace: &FlagNamespace) -> String {
        format!(
            "{}\n{}",
            namespace.reset_statement(&self.success, "false"),
            namespace.reset_statement(&self.error, "false")
        )
    }
}

/// A named remote operation and its outcome flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOperation {
    /// Human-readable operation name used in failures
    pub name: String,
    /// Flags the operation's callbacks set
    pub flags: OutcomeFlags,
}

impl RemoteOperation {
    /// Operation reporting through `rcvd_success` / `rcvd_error`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: OutcomeFlags::received(),
        }
    }

    /// Operation reporting through a custom flag pair
    #[must_use]
    pub fn with_flags(name: impl Into<String>, flags: OutcomeFlags) -> Self {
        Self {
            name: name.into(),
            flags,
        }
    }
}

/// JavaScript truthiness of a JSON value
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// =============================================================================
// REMOTE GATEWAY
// =============================================================================

/// Script execution gateway with flag-based completion
#[derive(Debug)]
pub struct RemoteGateway<S: ScriptSession, C: Clock = SystemClock> {
    session: S,
    namespace: FlagNamespace,
    wait: Wait<C>,
}

impl<S: ScriptSession> RemoteGateway<S> {
    /// Gateway with the default namespace and wait budget
    pub fn new(session: S) -> Self {
        Self {
            session,
            namespace: FlagNamespace::default(),
            wait: Wait::new(WaitOptions::default()),
        }
    }
}

impl<S: ScriptSession, C: Clock> RemoteGateway<S, C> {
    /// Gateway with explicit namespace and wait
    pub const fn with_wait(session: S, namespace: FlagNamespace, wait: Wait<C>) -> Self {
        Self {
            session,
            namespace,
            wait,
        }
    }

    /// The underlying session
    pub const fn session(&self) -> &S {
        &self.session
    }

    /// The underlying session, mutably
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Release the session
    pub fn into_session(self) -> S {
        self.session
    }

    /// Flag namespace in use
    pub const fn namespace(&self) -> &FlagNamespace {
        &self.namespace
    }

    /// Wait used for remote signals
    pub const fn wait(&self) -> &Wait<C> {
        &self.wait
    }

    /// Run a payload
    pub fn execute(&mut self, script: &Script) -> WebApiResult<Value> {
        self.session.run(script)
    }

    /// Run a synchronous script body with `ns` bound to the namespace
    pub fn execute_bound(&mut self, body: &str, args: &[Value]) -> WebApiResult<Value> {
        let source = self.namespace.bind(body);
        self.session.execute_script(&source, args)
    }

    /// Read a flag's raw value
    pub fn read_flag(&mut self, flag: &str) -> WebApiResult<Value> {
        let script = self.namespace.read_script(flag);
        self.session.execute_script(&script, &[])
    }

    /// Read a flag as a JavaScript boolean
    pub fn read_truthy(&mut self, flag: &str) -> WebApiResult<bool> {
        self.read_flag(flag).map(|v| is_truthy(&v))
    }

    /// Submit an async script body with `ns` bound to the namespace
    pub fn submit_async(&mut self, body: &str, args: &[Value]) -> WebApiResult<Value> {
        let source = self.namespace.bind(body);
        self.session.execute_async_script(&source, args)
    }

    /// Poll the operation's success flag and classify the outcome.
    ///
    /// - success flag set: `Ok`
    /// - timed out and the error flag is set: [`WebApiError::RemoteOperation`]
    /// - timed out with neither flag: [`WebApiError::NoResponse`]
    ///
    /// Session failures while polling are returned unchanged.
    pub fn await_remote_signal(&mut self, op: &RemoteOperation) -> WebApiResult<WaitResult> {
        let read_success = self.namespace.read_script(&op.flags.success);
        let session = &mut self.session;
        let outcome = self.wait.until(&op.flags.success, || {
            session
                .execute_script(&read_success, &[])
                .map(|v| is_truthy(&v))
        });

        match outcome {
            Ok(result) => {
                debug!(operation = %op.name, attempts = result.attempts, "remote signal received");
                Ok(result)
            }
            Err(WebApiError::WaitTimeout { ms, .. }) => {
                if self.read_truthy(&op.flags.error)? {
                    warn!(operation = %op.name, "remote operation reported an error");
                    Err(WebApiError::RemoteOperation {
                        operation: op.name.clone(),
                    })
                } else {
                    warn!(operation = %op.name, ms, "remote operation did not respond");
                    Err(WebApiError::NoResponse {
                        operation: op.name.clone(),
                        ms,
                    })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Reset the operation's flags, submit the async body, then await its
    /// signal
    pub fn perform(
        &mut self,
        op: &RemoteOperation,
        body: &str,
        args: &[Value],
    ) -> WebApiResult<WaitResult> {
        debug!(operation = %op.name, "submitting remote operation");
        let body = format!("{}\n{body}", op.flags.reset_script(&self.namespace));
        self.submit_async(&body, args)?;
        self.await_remote_signal(op)
    }
}
