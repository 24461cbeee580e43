/// Entry point for the cgroup sampler.
///
/// Discovers the cgroup confining this process and prints its memory and CPU
/// accounting metrics as JSON lines on stdout, once per sampling interval.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the sampling loop fails.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug CGROUP_SAMPLER_INTERVAL_MS=500 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    cgroup_sampler::run().await
}
