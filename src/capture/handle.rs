//! Scoped ownership of an open capture source

use super::traits::{CaptureSource, RecordingSink};
use crate::utils::error::DeviceError;
use uuid::Uuid;

/// An open camera/microphone source owned by the session.
///
/// Dropping the handle closes the source, so every path that leaves the
/// camera phases releases the device.
pub struct CaptureHandle {
    id: Uuid,
    source: Box<dyn CaptureSource>,
    open: bool,
}

impl CaptureHandle {
    pub fn new(source: Box<dyn CaptureSource>) -> Self {
        let id = Uuid::new_v4();
        tracing::info!("Capture opened: {} ({})", source.label(), id);
        Self {
            id,
            source,
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Start a recorder on this source
    pub async fn start_recording(&mut self) -> Result<RecordingSink, DeviceError> {
        if !self.open {
            return Err(DeviceError::NotReadable("capture source is closed".to_string()));
        }
        self.source.start_recording().await
    }

    /// Stop all tracks. Idempotent.
    pub fn close(&mut self) {
        if self.open {
            self.source.close();
            self.open = false;
            tracing::info!("Capture closed: {} ({})", self.source.label(), self.id);
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("id", &self.id)
            .field("open", &self.open)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CaptureSource for CountingSource {
        fn label(&self) -> String {
            "counting".to_string()
        }

        async fn start_recording(&mut self) -> Result<RecordingSink, DeviceError> {
            let (_feed, sink) = RecordingSink::channel(1);
            Ok(sink)
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_close_is_idempotent_and_runs_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut handle = CaptureHandle::new(Box::new(CountingSource {
            closes: closes.clone(),
        }));
        handle.close();
        handle.close();
        assert!(!handle.is_open());
        drop(handle);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let handle = CaptureHandle::new(Box::new(CountingSource {
            closes: closes.clone(),
        }));
        drop(handle);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_closed_handle_refuses_recording() {
        let mut handle = CaptureHandle::new(Box::new(CountingSource {
            closes: Arc::new(AtomicUsize::new(0)),
        }));
        handle.close();
        assert!(matches!(
            handle.start_recording().await,
            Err(DeviceError::NotReadable(_))
        ));
    }
}
