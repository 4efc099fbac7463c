// Scrub Preview - Library Entry Point
//
// Turns a video into sprite sheets plus an index record that maps a playback
// time to a thumbnail rectangle, for hover-scrub previews on a seek bar.

pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod metadata;
pub mod preview;
pub mod server;
pub mod tools;

pub use config::{OutputLayout, PreviewConfig};
pub use error::{PreviewError, Result};
pub use preview::index::IndexRecord;
pub use preview::lookup::{locate, HoverFrame};
pub use preview::{build_preview, BuildRequest, FfmpegBackend, MediaBackend};
