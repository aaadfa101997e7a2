use crate::model::partition::FeedKind;
use anyhow::Error as AnyError;

/// Step of the fetch loop that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStage {
    Fetch,
    Convert,
}

/// Failure that stopped a stream reader. Every instance is fatal to the reader
/// that produced it.
#[derive(Debug)]
pub struct ReaderError {
    kind: FeedKind,
    stage: ReaderStage,
    source: AnyError,
}

impl ReaderError {
    pub fn new(kind: FeedKind, stage: ReaderStage, source: AnyError) -> Self {
        Self {
            kind,
            stage,
            source,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn stage(&self) -> ReaderStage {
        self.stage
    }

    pub fn into_source(self) -> AnyError {
        self.source
    }
}

impl core::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let step = match self.stage {
            ReaderStage::Fetch => "fetch",
            ReaderStage::Convert => "convert",
        };
        write!(f, "{} reader {step} failed", self.kind)
    }
}

impl std::error::Error for ReaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
