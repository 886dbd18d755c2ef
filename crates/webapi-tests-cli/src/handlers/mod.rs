//! Command handlers - extracted from main.rs for testability

pub mod list;
pub mod run;
pub mod serve;

pub use list::{execute_list, render_case_list};
pub use run::{build_runner, build_suite_config, execute_run, settle};
pub use serve::{environment_config, execute_serve, listening_banner};
