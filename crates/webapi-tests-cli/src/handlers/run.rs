//! Run command handler

use crate::commands::RunArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::render_summary;
use tracing::{info, warn};
use webapi_tests::{CaseRunner, Harness, RunSummary, SuiteConfig, WebApiResult, CASE_NAMES};

/// Suite settings: the config file (if any) with CLI overrides on top
pub fn build_suite_config(args: &RunArgs) -> CliResult<SuiteConfig> {
    let mut config = match &args.config {
        Some(path) => {
            SuiteConfig::from_file(path).map_err(|e| CliError::config(e.to_string()))?
        }
        None => SuiteConfig::default(),
    };

    if let Some(host) = &args.marionette_host {
        config.marionette.host.clone_from(host);
    }
    if let Some(port) = args.marionette_port {
        config.marionette.port = port;
    }
    if let Some(port) = args.server_port {
        config.environment.port = port;
    }
    if let Some(ms) = args.timeout_ms {
        config.wait.timeout_ms = ms;
    }
    if let Some(ms) = args.interval_ms {
        config.wait.poll_interval_ms = ms;
    }
    if args.prompt_timeout_ms.is_some() {
        config.prompt_timeout_ms = args.prompt_timeout_ms;
    }

    config
        .validate()
        .map_err(|e| CliError::config(e.to_string()))?;
    Ok(config)
}

/// Case runner from CLI args; a filter matching nothing is rejected
pub fn build_runner(args: &RunArgs) -> CliResult<CaseRunner> {
    let mut runner = CaseRunner::new();
    if let Some(filter) = &args.filter {
        runner = runner.with_filter(filter.clone());
        if !CASE_NAMES.iter().any(|name| runner.selects(name)) {
            return Err(CliError::invalid_argument(format!(
                "no case matches filter {filter:?}"
            )));
        }
    }
    if args.fail_fast {
        runner = runner.with_fail_fast();
    }
    Ok(runner)
}

/// Combine the run and shutdown results; a run failure takes precedence
pub fn settle(
    run: WebApiResult<RunSummary>,
    shutdown: WebApiResult<()>,
) -> CliResult<RunSummary> {
    match (run, shutdown) {
        (Ok(summary), Ok(())) => Ok(summary),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), stopped) => {
            if let Err(stop_err) = stopped {
                warn!(error = %stop_err, "shutdown after a failed run also failed");
            }
            Err(e.into())
        }
    }
}

/// Run the cases and print the results
pub fn execute_run(cli: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let config = build_suite_config(args)?;
    let runner = build_runner(args)?;

    info!(
        marionette = %format!("{}:{}", config.marionette.host, config.marionette.port),
        "starting run"
    );
    let mut harness = Harness::new(config);
    let outcome = harness.run(&runner);
    let summary = settle(outcome, harness.shutdown())?;

    if !cli.verbosity.is_quiet() || !summary.all_passed() {
        print!("{}", render_summary(&summary));
    }

    if summary.all_passed() {
        Ok(())
    } else {
        Err(CliError::test_execution(format!(
            "{} case(s) failed",
            summary.failed_count()
        )))
    }
}
