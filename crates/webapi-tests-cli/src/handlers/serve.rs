//! Serve command handler

use crate::commands::ServeArgs;
use crate::error::CliResult;
use webapi_tests::{EnvironmentConfig, TestEnvironment};

/// Environment settings from CLI args
#[must_use]
pub fn environment_config(args: &ServeArgs) -> EnvironmentConfig {
    EnvironmentConfig::default()
        .with_host(args.host.clone())
        .with_port(args.port)
        .with_cors(args.cors)
}

/// Line printed before blocking
#[must_use]
pub fn listening_banner(config: &EnvironmentConfig) -> String {
    format!("Listening on {}:{}", config.host, config.port)
}

/// Run the coordination server until the process is killed
pub fn execute_serve(args: &ServeArgs) -> CliResult<()> {
    let config = environment_config(args);
    println!("{}", listening_banner(&config));
    let environment = TestEnvironment::new(&config);
    environment.start(true)?;
    Ok(())
}
