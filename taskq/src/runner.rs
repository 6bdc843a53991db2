//! The runner / supervisor (C7): installs OS signal handlers around a worker
//! runtime and, in development, can restart it when source files change.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::Result;
use crate::runtime::Shutdown;

/// Runs `runtime` (the future returned by [`crate::runtime::entrypoint`]) until it
/// finishes naturally or a SIGINT/SIGTERM arrives, in which case shutdown is issued
/// and the runner waits (bounded by `shutdown_timeout`) for it to drain.
///
/// Returns `Ok(())` on clean shutdown and the runtime's own `Err` otherwise; this
/// crate never calls `std::process::exit` itself, leaving exit-code decisions to the
/// embedding binary's `main`.
pub async fn run_until_signal<F>(
    runtime: F,
    shutdown: Shutdown,
    shutdown_timeout: Duration,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::pin!(runtime);

    tokio::select! {
        result = &mut runtime => {
            info!("Worker runtime exited on its own.");
            return result;
        }
        _ = wait_for_termination_signal() => {
            info!("Termination signal received, issuing graceful shutdown...");
            shutdown.issue_shutdown();
        }
    }

    match tokio::time::timeout(shutdown_timeout, runtime).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "Worker runtime did not finish draining within {:?} of shutdown; abandoning it.",
                shutdown_timeout
            );
            Ok(())
        }
    }
}

/// Resolves on the first SIGINT or SIGTERM (Unix) / Ctrl-C (other platforms).
#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Development-only hot reload: calls `build` to produce a fresh runtime future,
/// running it until shutdown, a source-tree change under `watch_path`, or a
/// termination signal, then rebuilding and looping.
///
/// Contract-only per the component design: not held to the runtime's own
/// correctness bar, and a binary using `taskq` may choose not to call it at all.
pub async fn watch_and_restart<F, Fut>(
    watch_path: impl AsRef<Path>,
    shutdown_timeout: Duration,
    mut build: F,
) -> Result<()>
where
    F: FnMut(Shutdown) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    use notify::{RecursiveMode, Watcher};
    use tokio::sync::mpsc;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if let Ok(event) = event {
            let _ = tx.send(event);
        }
    })
    .expect("failed to construct filesystem watcher");

    watcher
        .watch(watch_path.as_ref(), RecursiveMode::Recursive)
        .expect("failed to watch source tree for hot reload");

    loop {
        let shutdown = Shutdown::new();
        let runtime = build(shutdown.clone());
        tokio::pin!(runtime);

        tokio::select! {
            result = &mut runtime => {
                return result;
            }
            _ = wait_for_termination_signal() => {
                shutdown.issue_shutdown();
                let _ = tokio::time::timeout(shutdown_timeout, runtime).await;
                return Ok(());
            }
            Some(_) = rx.recv() => {
                info!("Source tree change detected, restarting worker...");
                shutdown.issue_shutdown();
                if tokio::time::timeout(shutdown_timeout, runtime).await.is_err() {
                    error!("Previous worker instance did not shut down in time; restarting anyway.");
                }
            }
        }
    }
}
