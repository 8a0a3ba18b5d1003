//! Logger bootstrap over the `log` facade.
//!
//! Library code only emits through `log::*` macros; binaries and tests call
//! [`init_logging`] to install `env_logger`.

mod init;

pub use init::{init_logging, LoggingConfig, DEFAULT_FILTER};
