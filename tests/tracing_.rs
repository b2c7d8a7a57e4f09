#![allow(dead_code)]

use tracing_subscriber::EnvFilter;

/// Routes `tracing` output to the test harness. Filtered by `RUST_LOG`.
pub fn init() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}
