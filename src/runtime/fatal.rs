use crate::stream::error::ReaderError;
use anyhow::Error as AnyError;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Single-assignment slot shared by every reader of one task run. The first
/// reader to fail wins; later failures are logged and dropped.
#[derive(Clone, Default)]
pub struct FirstErrorLatch {
    inner: Arc<OnceLock<CapturedError>>,
}

#[derive(Clone)]
struct CapturedError {
    inner: Arc<AnyError>,
}

impl CapturedError {
    fn new(inner: AnyError) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl fmt::Debug for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapturedError").field(&self.inner).finish()
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner.as_ref(), f)
    }
}

impl std::error::Error for CapturedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        (**self.inner).source()
    }
}

impl FirstErrorLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches a reader failure. Returns `true` if this call won the slot.
    pub fn trigger(&self, error: ReaderError) -> bool {
        let kind = error.kind();
        let stage = error.stage();
        let error = AnyError::new(error);

        match self.inner.set(CapturedError::new(error)) {
            Ok(()) => {
                if let Some(captured) = self.inner.get() {
                    tracing::error!(
                        %kind,
                        stage = ?stage,
                        error = format!("{:#}", captured.inner),
                        "stream reader failed; task will report the error on next poll"
                    );
                }
                true
            }
            Err(dropped) => {
                tracing::debug!(
                    %kind,
                    stage = ?stage,
                    error = %dropped,
                    "ignoring reader failure; an earlier error is already latched"
                );
                false
            }
        }
    }

    /// Latches a failure raised outside a reader, such as a panicked task.
    pub fn trigger_external(&self, context: &str, error: AnyError) -> bool {
        match self.inner.set(CapturedError::new(error)) {
            Ok(()) => {
                tracing::error!(context, "fatal task error latched");
                true
            }
            Err(dropped) => {
                tracing::debug!(
                    context,
                    error = %dropped,
                    "ignoring task error; an earlier error is already latched"
                );
                false
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.get().is_some()
    }

    pub fn error(&self) -> Option<AnyError> {
        self.inner
            .get()
            .map(|captured| AnyError::new(captured.clone()))
    }
}
