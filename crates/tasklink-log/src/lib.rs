// ABOUTME: Shared logging setup for tasklink binaries
// ABOUTME: init() for plain stderr logging, init_for() for crate-scoped worker logging

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
}

/// Crate-filtered logging to stderr. The named crates log at `level`,
/// everything else at WARN. RUST_LOG directives still apply on top.
/// Used by worker binaries so tonic/h2 chatter stays quiet.
pub fn init_for(crate_names: &[&str], level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(crate_names, level))
        .with_target(false)
        .init();
}

/// Build the filter used by [`init_for`].
pub fn filter_for(crate_names: &[&str], level: Level) -> EnvFilter {
    let level_name = level.as_str().to_lowercase();
    crate_names.iter().fold(
        EnvFilter::from_default_env().add_directive(Level::WARN.into()),
        |filter, name| match format!("{name}={level_name}").parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_init() {
        let _ = super::init as fn();
    }

    #[test]
    fn exports_init_for() {
        let _ = super::init_for as fn(&[&str], Level);
    }

    #[test]
    fn test_filter_for_includes_crate_directives() {
        let filter = filter_for(&["tasklink_sdk", "tasklink_grpc"], Level::DEBUG);
        let rendered = filter.to_string();
        assert!(rendered.contains("tasklink_sdk=debug"), "got {rendered}");
        assert!(rendered.contains("tasklink_grpc=debug"), "got {rendered}");
        assert!(rendered.contains("warn"), "got {rendered}");
    }
}
