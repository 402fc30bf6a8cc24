//! Shared setup for unit and integration tests.

use std::path::PathBuf;
use std::sync::Once;

use tracing::debug;
use tracing_subscriber::{filter::filter_fn, fmt, prelude::*, EnvFilter};

static TEST_SETUP: Once = Once::new();

/// Installs a test-writer subscriber once per process.
///
/// `RUST_LOG` overrides the default `phylim=debug`; rayon's own events are
/// dropped.
pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("phylim=debug"));
        let layer = fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_filter(filter_fn(|metadata| !metadata.target().starts_with("rayon")))
            .with_filter(env_filter);

        // another harness may own the global subscriber already
        if tracing_subscriber::registry().with(layer).try_init().is_ok() {
            debug!("test logging ready");
        }
    });
}

/// Path of a fit file shipped under `tests/resources/fits`.
pub fn fit_fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/resources/fits")
        .join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_repeated_calls_when_initializing_then_no_panic() {
        init_test_setup();
        init_test_setup();
    }

    #[test]
    fn given_fixture_name_when_resolving_then_file_exists() {
        assert!(fit_fixture("chainsaw_tip.json").is_file());
    }
}
