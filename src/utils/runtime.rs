use anyhow::Result;

/// Runtime used by the daemon. Probes run on the blocking pool, so a single worker is enough.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
