//! Isolated worker: reads one submission on stdin, writes one framed report
//! on stdout. Spawned by `ProcessEngine` with limits already applied; not
//! meant to be run by hand.

use std::io;

fn main() -> anyhow::Result<()> {
    // stdout carries the report, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "datasandbox=info".to_string()),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let report = datasandbox::worker::serve(io::stdin().lock(), io::stdout().lock())?;
    tracing::debug!("datasandbox-worker finished: {}", report.status());
    Ok(())
}
