//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `check`  | `Check`          |
//! | `config` | `Config`         |
//! | `runs`   | `Runs`           |

pub mod check;
pub mod config;
pub mod run;
pub mod runs;

pub use check::cmd_check;
pub use config::cmd_config;
pub use run::{RunOverrides, cmd_run};
pub use runs::cmd_runs;
