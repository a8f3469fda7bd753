use tokio::sync::watch;

/// Asks a single virtual user to stop once its current iteration is complete.
///
/// Retiring is cooperative. The owning worker checks [RetireListener::is_retired] between
/// iterations and may race [RetireListener::retired] against its pacing delay, but nothing
/// interrupts an iteration that is already running.
#[derive(Debug)]
pub struct RetireHandle {
    sender: watch::Sender<bool>,
}

impl RetireHandle {
    /// Create a handle together with the listener that the worker should own.
    pub fn new() -> (Self, RetireListener) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, RetireListener { receiver })
    }

    pub fn retire(&self) {
        // `send_replace` never fails, even if the worker has already exited and dropped its listener.
        self.sender.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct RetireListener {
    receiver: watch::Receiver<bool>,
}

impl RetireListener {
    pub fn is_retired(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the worker has been retired.
    ///
    /// If the [RetireHandle] is dropped without retiring, this never resolves.
    pub async fn retired(&mut self) {
        if self.receiver.wait_for(|retired| *retired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retire_is_visible_to_listener() {
        let (handle, listener) = RetireHandle::new();
        assert!(!listener.is_retired());

        handle.retire();

        assert!(listener.is_retired());
        assert!(listener.clone().is_retired());
    }

    #[tokio::test]
    async fn retired_resolves_after_retire() {
        let (handle, mut listener) = RetireHandle::new();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.retire();
        });

        tokio::time::timeout(Duration::from_secs(5), listener.retired())
            .await
            .expect("Retire signal was not received");
    }

    #[tokio::test]
    async fn dropped_handle_does_not_retire() {
        let (handle, mut listener) = RetireHandle::new();
        drop(handle);

        let result = tokio::time::timeout(Duration::from_millis(20), listener.retired()).await;
        assert!(result.is_err());
        assert!(!listener.is_retired());
    }
}
