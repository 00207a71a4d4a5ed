use crate::codec::Codec;
use crate::grid::PixelGrid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Receives a finished grid. Being `FnOnce`, it can fire at most once.
pub type Sink = Box<dyn FnOnce(PixelGrid) + Send + 'static>;

/// Lifecycle of one decode task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    Created,
    MetadataDecoding,
    PixelDecoding,
    Normalizing,
    Published,
    Failed,
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::MetadataDecoding => "metadata decoding",
            Self::PixelDecoding => "pixel decoding",
            Self::Normalizing => "normalizing",
            Self::Published => "published",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One unit of decode work: a labelled asset, the codec that reads it, and
/// where the finished grid goes.
///
/// Nothing is validated here; a bad asset only fails once it is decoded.
pub struct DecodeTask {
    pub(crate) label: String,
    pub(crate) bytes: Arc<[u8]>,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) sink: Option<Sink>,
}

impl DecodeTask {
    pub fn new(label: impl Into<String>, bytes: impl Into<Arc<[u8]>>, codec: Arc<dyn Codec>) -> Self {
        Self {
            label: label.into(),
            bytes: bytes.into(),
            codec,
            sink: None,
        }
    }

    /// Publishes the grid to `sink` instead of returning it from the join.
    pub fn on_complete<F>(mut self, sink: F) -> Self
    where
        F: FnOnce(PixelGrid) + Send + 'static,
    {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }
}

impl fmt::Debug for DecodeTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeTask")
            .field("label", &self.label)
            .field("bytes", &self.bytes.len())
            .field("codec", &self.codec.name())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
