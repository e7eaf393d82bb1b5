//! Default configuration values

/// Manifest file name looked up in the working directory
pub const MANIFEST_FILE: &str = "polybuild.toml";

/// Per-stage time budget (in seconds)
pub const STAGE_TIMEOUT_SECS: u64 = 1800;

/// Attempts allowed for a stage that hits a transient environment error
pub const TRANSIENT_ATTEMPTS: u32 = 3;

/// Initial delay between transient retries (in milliseconds)
pub const RETRY_BASE_DELAY_MS: u64 = 2000;

/// Upper bound on the delay between transient retries (in milliseconds)
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Lines of tool output kept for error reports
pub const OUTPUT_TAIL_LINES: usize = 40;

/// Cache namespace used when the manifest does not name one
pub const CACHE_NAMESPACE: &str = "default";

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
