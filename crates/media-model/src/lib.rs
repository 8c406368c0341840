//! Chromacast Media Model
//!
//! Defines the data contracts shared by every stage of the pipeline:
//! - **Frame:** Fixed-size RGBA pixel grid sampled from a timeline
//! - **Chroma key:** The classification rule that marks replaceable pixels
//! - **Artifact:** Ordered encoded chunks and the finalized export blob
//!
//! Frames are row-major RGBA with 8 bits per channel. All frames taking
//! part in one composite share identical dimensions.

pub mod artifact;
pub mod chroma;
pub mod frame;

pub use artifact::*;
pub use chroma::*;
pub use frame::*;
