use std::sync::Once;

/// Filter used when neither the config nor `RUST_LOG` names one.
///
/// wgpu is chatty at `info`; its internals are held to warnings.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Logger configuration.
///
/// `env_filter` uses `env_logger` filter syntax, e.g.
/// `"strata_engine=debug,wgpu=warn"`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
    /// Route output through the test harness capture.
    pub is_test: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
            is_test: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Configuration for `#[test]` bodies: captured output, no color.
    pub fn for_tests() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Never,
            is_test: true,
        }
    }

    fn resolved_filter(&self) -> String {
        self.env_filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_owned())
    }
}

static INIT: Once = Once::new();

/// Installs the global logger once; later calls are no-ops.
///
/// Another logger installed by the host wins silently.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = config.resolved_filter();
        let installed = env_logger::Builder::new()
            .parse_filters(&filter)
            .write_style(config.write_style)
            .is_test(config.is_test)
            .try_init()
            .is_ok();

        if installed {
            log::debug!("logging initialized with filter `{filter}`");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        let config = LoggingConfig::default().with_filter("warn");
        assert_eq!(config.resolved_filter(), "warn");
    }

    #[test]
    fn init_is_idempotent() {
        init_logging(LoggingConfig::for_tests());
        init_logging(LoggingConfig::for_tests().with_filter("trace"));
        log::info!("still alive");
    }
}
