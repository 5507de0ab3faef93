//! CLI command implementations

mod config;
mod hint;
mod run;

pub use config::{cmd_config_init, cmd_config_show};
pub use hint::cmd_parse_hint;
pub use run::cmd_run;
