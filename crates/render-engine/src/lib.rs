//! Chromacast Render Engine
//!
//! Real-time compositing of a keyed foreground over a background, and the
//! export boundary for finished captures.
//!
//! # Pipeline Architecture
//!
//! ```text
//! foreground source ──┐
//!                     ├── ChromaKeyRule ── composite ──► RenderSurface ──► capture
//! background source ──┘                                       ▲
//!                                                             │
//!                          FramePump (tick, yield, repeat) ───┘
//!
//! ExportArtifact ──► data URL (base64) ──► Uploader ──► reference
//! ```

pub mod compositor;
pub mod export;
pub mod pump;
pub mod surface;

pub use compositor::*;
pub use export::*;
pub use pump::*;
pub use surface::*;
