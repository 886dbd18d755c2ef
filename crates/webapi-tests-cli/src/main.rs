//! webapi-tests: semi-automated conformance tests for device Web APIs
//!
//! ## Usage
//!
//! ```bash
//! webapi-tests serve --port 6666              # Coordination server only
//! webapi-tests run --filter bluetooth         # Run matching cases
//! webapi-tests run --config suite.yaml -v     # Run with a config file
//! webapi-tests list                           # Show case names
//! ```

use clap::Parser;
use std::process::ExitCode;
use webapi_tests_cli::{
    handlers::{execute_list, execute_run, execute_serve},
    logging, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = build_config(&cli);
    let color = config.color.should_color();
    console::set_colors_enabled(color);
    logging::init(config.verbosity, color);

    match cli.command {
        Commands::Serve(args) => execute_serve(&args),
        Commands::Run(args) => execute_run(&config, &args),
        Commands::List => {
            execute_list();
            Ok(())
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    let color: ColorChoice = cli.color.clone().into();
    CliConfig::new().with_verbosity(verbosity).with_color(color)
}
