use crate::task::TaskStage;
use thiserror::Error;

/// Failure raised by a codec while reading an encoded byte stream.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unrecognized image format")]
    UnknownFormat,
    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("Image dimensions {width}x{height} exceed the {max}px side limit")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("Codec panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// A decode step failed; `label` and `stage` identify the asset and the step.
    #[error("failed to decode `{label}` during {stage}: {source}")]
    Codec {
        label: String,
        stage: TaskStage,
        #[source]
        source: CodecError,
    },
    #[error("decode task for `{label}` terminated without reporting a result")]
    TaskPanicked { label: String },
    #[error("failed to spawn decode task for `{label}`: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Nothing to decode")]
    Empty,
}

impl IngestError {
    pub(crate) fn codec(label: &str, stage: TaskStage, source: CodecError) -> Self {
        Self::Codec {
            label: label.to_string(),
            stage,
            source,
        }
    }

    /// Label of the asset this error belongs to, if it is scoped to one task.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Codec { label, .. } | Self::TaskPanicked { label } | Self::Spawn { label, .. } => {
                Some(label.as_str())
            }
            Self::InvalidConfig(_) | Self::Empty => None,
        }
    }

    /// Stage at which a decode failed (`None` for errors outside the decode steps).
    pub fn stage(&self) -> Option<TaskStage> {
        match self {
            Self::Codec { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
