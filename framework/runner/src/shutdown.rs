use tokio::signal;
use surge_core::prelude::ShutdownHandle;

/// Broadcast a shutdown when the user presses Ctrl-C.
///
/// This is the only hard stop. In-flight requests are cancelled and virtual users exit at their
/// next iteration boundary.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Received shutdown signal, shutting down...");
                listener_handle.shutdown();
            }
            Err(e) => {
                log::warn!("Failed to listen for Ctrl-C, the run can only end when its stages finish: {e:?}");
            }
        }
    });

    handle
}
