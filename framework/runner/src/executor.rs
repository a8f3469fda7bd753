use std::future::Future;

use surge_core::prelude::{ShutdownHandle, ShutdownSignalError};

/// Bridges virtual user threads onto the shared tokio runtime.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, shutdown_handle: ShutdownHandle) -> Self {
        Self {
            runtime,
            shutdown_handle,
        }
    }

    /// Run async code in place, blocking the calling virtual user until it completes. Other
    /// virtual users keep running while this one waits.
    ///
    /// The future is only cancelled by a run-wide shutdown such as Ctrl-C, in which case the result
    /// is a [ShutdownSignalError]. Retiring a virtual user never cancels work in progress.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = shutdown_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }

    /// Block on a future without racing it against the shutdown signal. The caller is expected to
    /// handle shutdown itself.
    pub(crate) fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}
