// SPDX-License-Identifier: MPL-2.0

//! Export pipelines
//!
//! Exports never share a renderer with playback: each job builds its own, so
//! filter state cannot interleave with a live preview.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ VideoSource  │ ──▶ │  VideoCompositor  │ ──▶ │ FrameWriter  │
//! │ (GStreamer)  │     │  - Renderer       │     │  (mp4mux)    │
//! │              │     │  - FIFO requests  │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`compositor`]: request/response frame composition on a serial worker
//! - [`session`]: one reader → compositor → writer pass with progress and cancel
//! - [`exporter`]: the image, video and frame-batch entry points

pub mod compositor;
pub mod exporter;
pub mod session;

pub use compositor::{CompositionRequest, VideoCompositor};
pub use exporter::{ExportFrame, MediaExporter};
pub use session::{ExportProgress, ExportSession, ExportStatus};
