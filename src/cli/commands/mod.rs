//! CLI command handlers.
//!
//! Each submodule handles one `reqragctl` subcommand.

mod doctor;
mod index;
mod init;
mod query;
#[cfg(feature = "serve")]
mod serve;
mod similar;
mod stats;

pub(crate) use doctor::cmd_doctor;
pub(crate) use index::cmd_index;
pub(crate) use init::cmd_init;
pub(crate) use query::cmd_query;
#[cfg(feature = "serve")]
pub(crate) use serve::cmd_serve;
pub(crate) use similar::cmd_similar;
pub(crate) use stats::cmd_stats;
