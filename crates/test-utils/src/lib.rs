pub mod builders;
pub mod fake_runner;
pub mod fetcher;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

use localci::config::{parse_documents, resolve, ResolveOptions, ResolvedPipeline};
use localci::errors::Result;

use crate::fetcher::MapFetcher;

static INIT: Once = Once::new();

/// Install a test-captured tracing subscriber once per test binary.
///
/// Output only shows for failing tests; `RUST_LOG` picks the level.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Fail the test if `f` takes longer than five seconds.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("test did not finish within 5 seconds")
}

/// Resolve a pipeline written inline, without any includes available.
pub fn resolve_yaml(text: &str) -> Result<ResolvedPipeline> {
    resolve_yaml_with(text, &MapFetcher::new(), &ResolveOptions::default())
}

/// Resolve a pipeline written inline with the given fetcher and options.
pub fn resolve_yaml_with(
    text: &str,
    fetcher: &MapFetcher,
    options: &ResolveOptions,
) -> Result<ResolvedPipeline> {
    resolve(parse_documents(text)?, fetcher, options)
}

/// Options carrying the given CLI-level variables.
pub fn options_with_vars(vars: &[(&str, &str)]) -> ResolveOptions {
    let mut options = ResolveOptions::default();
    for (key, value) in vars {
        options.cli.insert(key.to_string(), value.to_string());
    }
    options
}
