//! Core library for decoding encoded image assets into uniform RGBA pixel grids.
//!
//! - Codecs: one [`Codec`] object per format (PNG/JPEG/GIF/BMP/TIFF via `image`, magic-byte sniffing, or any two closures via [`FnCodec`])
//! - Scheduler: `dispatch` runs one thread per [`DecodeTask`] and returns a [`Batch`] to `join`; `decode_all` is the blocking variant
//! - Normalization: every source is narrowed to 8-bit RGBA, in an exact or square-by-height [`PixelGrid`]
//!
//! Quick example:
//! ```ignore
//! use std::sync::Arc;
//! use pixel_ingest_core::prelude::*;
//! # fn main() -> anyhow::Result<()> {
//! let registry = CodecRegistry::with_builtin();
//! let png = registry.get("png").expect("png codec");
//! let tasks = vec![
//!   DecodeTask::new("logo", std::fs::read("logo.png")?, png.clone()),
//!   DecodeTask::new("icon", std::fs::read("icon.png")?, png)
//!       .on_complete(|grid| println!("icon: {}x{}", grid.width(), grid.height())),
//! ];
//! let report = dispatch(tasks, IngestConfig::default())?.join();
//! for (label, grid) in report.into_grids()? {
//!     println!("{label}: {:?}", grid.get(0, 0));
//! }
//! # Ok(()) }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod export;
pub mod grid;
pub mod normalize;
pub mod scheduler;
pub mod task;

pub use codec::*;
pub use config::*;
pub use error::*;
pub use export::*;
pub use grid::*;
pub use normalize::*;
pub use scheduler::*;
pub use task::*;

/// Convenience prelude for common types and functions.
/// Importing `pixel_ingest_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::codec::{
        ByteStream, Codec, CodecRegistry, Dimensions, FnCodec, GuessedCodec, ImageCodec,
        PixelSource,
    };
    pub use crate::config::{FailurePolicy, IngestConfig, IngestConfigBuilder};
    pub use crate::error::{CodecError, IngestError};
    pub use crate::grid::PixelGrid;
    pub use crate::normalize::{GridShape, Truncation};
    pub use crate::scheduler::{Batch, BatchReport, Delivery, TaskReport};
    pub use crate::task::{DecodeTask, TaskStage};
    pub use crate::{decode_all, dispatch, run_task};
}
