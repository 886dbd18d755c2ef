//! Running cases and owning the session-wide resources.

use crate::cases::{registry, Case, CaseContext};
use crate::config::SuiteConfig;
use crate::marionette::MarionetteSession;
use crate::result::WebApiResult;
use crate::semiauto::{EnvironmentSlot, Prompter, ServerPrompter, TestEnvironment};
use crate::session::ScriptSession;
use crate::signal::RemoteGateway;
use crate::wait::{Clock, SystemClock, Wait, WaitOptions};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Result of running a single case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseOutcome {
    /// Case name
    pub name: String,
    /// Failure message, if the case failed
    pub error: Option<String>,
    /// Time spent in the case and its teardown
    pub elapsed: Duration,
}

impl CaseOutcome {
    /// Whether the case passed
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Results from a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Outcomes in run order
    pub outcomes: Vec<CaseOutcome>,
    /// Total duration
    pub elapsed: Duration,
}

impl RunSummary {
    /// Check if every case passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(CaseOutcome::passed)
    }

    /// Count passed cases
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    /// Count failed cases
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }

    /// Number of cases run
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Failed outcomes
    #[must_use]
    pub fn failures(&self) -> Vec<&CaseOutcome> {
        self.outcomes.iter().filter(|o| !o.passed()).collect()
    }
}

/// Serial case runner
#[derive(Debug, Clone, Default)]
pub struct CaseRunner {
    /// Only run cases whose name contains this
    pub filter: Option<String>,
    /// Stop after the first failure
    pub fail_fast: bool,
}

impl CaseRunner {
    /// Runner for every case
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to names containing `filter`
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Enable fail-fast mode
    #[must_use]
    pub const fn with_fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    /// Whether `name` passes the filter
    #[must_use]
    pub fn selects(&self, name: &str) -> bool {
        self.filter.as_deref().map_or(true, |f| name.contains(f))
    }

    /// Run the selected cases one after another
    pub fn run<S: ScriptSession, C: Clock, P: Prompter>(
        &self,
        cases: &[Case<S, C, P>],
        ctx: &mut CaseContext<S, C, P>,
    ) -> RunSummary {
        let start = Instant::now();
        let mut outcomes = Vec::new();

        for case in cases.iter().filter(|c| self.selects(c.name)) {
            info!(case = case.name, "running case");
            let case_start = Instant::now();

            let mut result = (case.run)(ctx);
            if let Some(teardown) = case.teardown {
                if let Err(e) = teardown(ctx) {
                    warn!(case = case.name, error = %e, "teardown failed");
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }

            let outcome = CaseOutcome {
                name: case.name.to_string(),
                error: result.err().map(|e| e.to_string()),
                elapsed: case_start.elapsed(),
            };
            match &outcome.error {
                None => info!(case = case.name, "case passed"),
                Some(error) => warn!(case = case.name, %error, "case failed"),
            }

            let failed = !outcome.passed();
            outcomes.push(outcome);
            if failed && self.fail_fast {
                break;
            }
        }

        RunSummary {
            outcomes,
            elapsed: start.elapsed(),
        }
    }
}

/// Session-wide owner of the configuration and the test environment
#[derive(Debug)]
pub struct Harness {
    config: SuiteConfig,
    environment: EnvironmentSlot,
}

impl Harness {
    /// Harness over `config`; nothing starts until needed
    #[must_use]
    pub fn new(config: SuiteConfig) -> Self {
        let environment = EnvironmentSlot::new(config.environment.clone());
        Self {
            config,
            environment,
        }
    }

    /// Suite settings
    #[must_use]
    pub const fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// The running environment, started on first use
    pub fn environment(&mut self) -> Arc<TestEnvironment> {
        self.environment.get()
    }

    /// Prompter talking to the operator page
    pub fn prompter(&mut self) -> ServerPrompter {
        let env = self.environment.get();
        ServerPrompter::new(env.broker(), self.config.prompt_timeout())
    }

    /// Gateway wrapping `session` with the configured namespace and wait
    pub fn gateway<S: ScriptSession>(&self, session: S) -> RemoteGateway<S, SystemClock> {
        RemoteGateway::with_wait(
            session,
            self.config.flag_namespace.clone(),
            Wait::new(self.config.wait),
        )
    }

    /// Connect to Marionette
    pub fn connect(&self) -> WebApiResult<RemoteGateway<MarionetteSession>> {
        let session = MarionetteSession::connect(&self.config.marionette)?;
        Ok(self.gateway(session))
    }

    /// Start the environment, connect and run the selected cases
    pub fn run(&mut self, runner: &CaseRunner) -> WebApiResult<RunSummary> {
        self.config.validate()?;

        let env = self.environment.get();
        env.wait_until_ready(WaitOptions::new().with_timeout(5_000).with_poll_interval(50))?;
        if let Some(addr) = env.bound_addr() {
            info!(%addr, "operator page available");
        }

        let gateway = self.connect()?;
        let mut ctx = CaseContext::new(gateway, self.prompter());
        let summary = runner.run(&registry(), &mut ctx);

        if let Err(e) = ctx.gateway.into_session().close() {
            warn!(error = %e, "failed to close marionette session");
        }
        Ok(summary)
    }

    /// Stop the environment
    pub fn shutdown(&mut self) -> WebApiResult<()> {
        self.environment.stop()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Err(e) = self.environment.stop() {
            warn!(error = %e, "failed to stop test environment");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::result::WebApiError;
    use crate::semiauto::{EnvironmentConfig, ScriptedPrompter};
    use crate::session::MockSession;
    use crate::signal::FlagNamespace;
    use crate::wait::ManualClock;

    type Ctx = CaseContext<MockSession, ManualClock, ScriptedPrompter>;

    fn context(answers: usize) -> Ctx {
        let gateway = RemoteGateway::with_wait(
            MockSession::new(),
            FlagNamespace::default(),
            Wait::with_clock(WaitOptions::new().with_timeout(100), ManualClock::new()),
        );
        CaseContext::new(gateway, ScriptedPrompter::accepting(answers))
    }

    fn pass(_: &mut Ctx) -> WebApiResult<()> {
        Ok(())
    }

    fn fail(_: &mut Ctx) -> WebApiResult<()> {
        Err(WebApiError::assertion("broken"))
    }

    fn ask(ctx: &mut Ctx) -> WebApiResult<()> {
        ctx.prompter.confirm("ok?")
    }

    fn case(name: &'static str, run: fn(&mut Ctx) -> WebApiResult<()>) -> Case<MockSession, ManualClock, ScriptedPrompter> {
        Case {
            name,
            description: "",
            run,
            teardown: None,
        }
    }

    mod summary {
        use super::*;

        #[test]
        fn test_counts() {
            let summary = RunSummary {
                outcomes: vec![
                    CaseOutcome {
                        name: "a".into(),
                        error: None,
                        elapsed: Duration::ZERO,
                    },
                    CaseOutcome {
                        name: "b".into(),
                        error: Some("boom".into()),
                        elapsed: Duration::ZERO,
                    },
                ],
                elapsed: Duration::ZERO,
            };
            assert!(!summary.all_passed());
            assert_eq!(summary.passed_count(), 1);
            assert_eq!(summary.failed_count(), 1);
            assert_eq!(summary.total(), 2);
            assert_eq!(summary.failures()[0].name, "b");
        }

        #[test]
        fn test_empty_summary_passes() {
            assert!(RunSummary::default().all_passed());
        }
    }

    mod runner {
        use super::*;

        #[test]
        fn test_runs_all_and_records_failures() {
            let cases = vec![case("one", pass), case("two", fail), case("three", pass)];
            let summary = CaseRunner::new().run(&cases, &mut context(0));
            assert_eq!(summary.total(), 3);
            assert_eq!(
                summary.failures()[0].error.as_deref(),
                Some("Assertion failed: broken")
            );
        }

        #[test]
        fn test_fail_fast_stops() {
            let cases = vec![case("one", fail), case("two", pass)];
            let summary = CaseRunner::new().with_fail_fast().run(&cases, &mut context(0));
            assert_eq!(summary.total(), 1);
        }

        #[test]
        fn test_filter() {
            let cases = vec![case("bluetooth_a", pass), case("sensor_b", ask)];
            let runner = CaseRunner::new().with_filter("sensor");
            assert!(!runner.selects("bluetooth_a"));
            let mut ctx = context(1);
            let summary = runner.run(&cases, &mut ctx);
            assert_eq!(summary.total(), 1);
            assert_eq!(summary.outcomes[0].name, "sensor_b");
            assert_eq!(ctx.prompter.asked().len(), 1);
        }

        #[test]
        fn test_teardown_runs_after_failure() {
            let mut failing = case("one", fail);
            failing.teardown = Some(ask);
            let mut ctx = context(1);
            let summary = CaseRunner::new().run(&[failing], &mut ctx);
            assert_eq!(ctx.prompter.asked().len(), 1);
            assert_eq!(
                summary.outcomes[0].error.as_deref(),
                Some("Assertion failed: broken")
            );
        }

        #[test]
        fn test_teardown_failure_fails_passing_case() {
            let mut passing = case("one", pass);
            passing.teardown = Some(fail);
            let summary = CaseRunner::new().run(&[passing], &mut context(0));
            assert!(!summary.all_passed());
        }
    }

    mod harness {
        use super::*;

        fn loopback_config() -> SuiteConfig {
            SuiteConfig {
                environment: EnvironmentConfig::default()
                    .with_host("127.0.0.1")
                    .with_port(0),
                ..SuiteConfig::default()
            }
        }

        #[test]
        fn test_environment_is_reused() {
            let mut harness = Harness::new(loopback_config());
            let first = harness.environment();
            let second = harness.environment();
            assert!(Arc::ptr_eq(&first, &second));
            harness.shutdown().unwrap();
            assert!(!first.is_alive());
        }

        #[test]
        fn test_gateway_uses_configured_namespace() {
            let mut config = loopback_config();
            config.flag_namespace = FlagNamespace::new("window.testFlags");
            let harness = Harness::new(config);
            let gateway = harness.gateway(MockSession::new());
            assert_eq!(gateway.namespace().as_str(), "window.testFlags");
        }

        #[test]
        fn test_connect_refused() {
            let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            let port = unused.local_addr().unwrap().port();
            drop(unused);

            let mut config = loopback_config();
            config.marionette.host = "127.0.0.1".into();
            config.marionette.port = port;
            config.marionette.connect_timeout_ms = 500;
            let mut harness = Harness::new(config);
            assert!(harness.run(&CaseRunner::new()).is_err());
            harness.shutdown().unwrap();
        }
    }
}
