use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once per test binary.
///
/// Honors `RUST_LOG`; defaults to debug output for the store crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("boxstate_core=debug,boxstate_testing=debug"));
    // Later calls in the same binary find a subscriber already installed.
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok()
    {
        tracing::debug!("test tracing initialized");
    }
}
