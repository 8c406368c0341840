//! Frame decoder backend implementations.
//!
//! Each backend turns some timeline into a sequence of frames at the
//! source's configured dimensions. Actual video decoding stays outside
//! this crate; the backends here cover still-image sequences and
//! synthetic timelines.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chromacast_common::config::SourceEntry;
use chromacast_common::error::{ChromacastError, ChromacastResult};
use chromacast_media_model::{Dimensions, Frame, Rgba};
use image::imageops::FilterType;

/// Trait for frame decoder backends.
pub trait FrameDecoder: Send {
    /// Decode the next frame. Returns `None` at the end of the timeline.
    fn next_frame(&mut self) -> ChromacastResult<Option<Frame>>;

    /// Seek back to the first frame.
    fn rewind(&mut self) -> ChromacastResult<()>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Plays a directory of still images in file-name order.
pub struct ImageSequenceDecoder {
    files: Vec<PathBuf>,
    cursor: usize,
    dims: Dimensions,
}

impl ImageSequenceDecoder {
    /// Open a directory of frames, or a single image treated as a
    /// one-frame timeline.
    pub fn open(path: &Path, dims: Dimensions) -> ChromacastResult<Self> {
        if !path.exists() {
            return Err(ChromacastError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let files = if path.is_dir() {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(path)? {
                let candidate = entry?.path();
                if candidate.is_file() && is_image_file(&candidate) {
                    files.push(candidate);
                }
            }
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        if files.is_empty() {
            return Err(ChromacastError::source(format!(
                "No image frames found in {}",
                path.display()
            )));
        }

        tracing::debug!(path = %path.display(), frames = files.len(), "Opened image sequence");
        Ok(Self {
            files,
            cursor: 0,
            dims,
        })
    }

    /// Number of frames in the sequence.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameDecoder for ImageSequenceDecoder {
    fn next_frame(&mut self) -> ChromacastResult<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        decode_image_file(path, self.dims).map(Some)
    }

    fn rewind(&mut self) -> ChromacastResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn name(&self) -> &str {
        "image-sequence"
    }
}

/// Produces frames of a single color.
pub struct SolidColorDecoder {
    dims: Dimensions,
    color: Rgba,
    length: Option<u64>,
    produced: u64,
}

impl SolidColorDecoder {
    /// A timeline that never ends.
    pub fn endless(dims: Dimensions, color: Rgba) -> Self {
        Self {
            dims,
            color,
            length: None,
            produced: 0,
        }
    }

    /// A timeline of exactly `frames` frames.
    pub fn finite(dims: Dimensions, color: Rgba, frames: u64) -> Self {
        Self {
            dims,
            color,
            length: Some(frames),
            produced: 0,
        }
    }
}

impl FrameDecoder for SolidColorDecoder {
    fn next_frame(&mut self) -> ChromacastResult<Option<Frame>> {
        if self.length.is_some_and(|len| self.produced >= len) {
            return Ok(None);
        }
        self.produced += 1;
        Ok(Some(Frame::filled(self.dims, self.color)))
    }

    fn rewind(&mut self) -> ChromacastResult<()> {
        self.produced = 0;
        Ok(())
    }

    fn name(&self) -> &str {
        "solid-color"
    }
}

/// Stub decoder for testing: replays pre-built frames.
pub struct StubDecoder {
    frames: VecDeque<Frame>,
    played: Vec<Frame>,
}

impl StubDecoder {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            played: Vec::new(),
        }
    }
}

impl FrameDecoder for StubDecoder {
    fn next_frame(&mut self) -> ChromacastResult<Option<Frame>> {
        match self.frames.pop_front() {
            Some(frame) => {
                self.played.push(frame.clone());
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    fn rewind(&mut self) -> ChromacastResult<()> {
        let mut replay: VecDeque<Frame> = std::mem::take(&mut self.played).into();
        replay.append(&mut self.frames);
        self.frames = replay;
        Ok(())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Open the decoder for a configured timeline.
pub fn open_decoder(entry: &SourceEntry) -> ChromacastResult<Box<dyn FrameDecoder>> {
    let dims = Dimensions::new(entry.playback.width, entry.playback.height);
    let decoder = ImageSequenceDecoder::open(&entry.uri, dims)?;
    tracing::info!(
        uri = %entry.uri.display(),
        frames = decoder.len(),
        "Using image-sequence decoder"
    );
    Ok(Box::new(decoder))
}

/// Decode a still image into a frame of the requested size.
pub fn decode_image_file(path: &Path, dims: Dimensions) -> ChromacastResult<Frame> {
    let image = image::open(path).map_err(|e| {
        ChromacastError::source(format!("Failed to decode {}: {e}", path.display()))
    })?;

    let image = if image.width() == dims.width && image.height() == dims.height {
        image
    } else {
        image.resize_exact(dims.width, dims.height, FilterType::Triangle)
    };

    Frame::from_rgba(dims, image.to_rgba8().into_raw())
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba as ImageRgba};

    fn write_png(path: &Path, width: u32, height: u32, color: [u8; 4]) {
        let img = ImageBuffer::from_pixel(width, height, ImageRgba(color));
        img.save(path).unwrap();
    }

    #[test]
    fn test_image_sequence_plays_in_name_order() {
        let dir = std::env::temp_dir().join("chromacast_test_sequence_order");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        write_png(&dir.join("frame_002.png"), 4, 2, [0, 0, 200, 255]);
        write_png(&dir.join("frame_001.png"), 4, 2, [200, 0, 0, 255]);
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        let dims = Dimensions::new(4, 2);
        let mut decoder = ImageSequenceDecoder::open(&dir, dims).unwrap();
        assert_eq!(decoder.len(), 2);

        let first = decoder.next_frame().unwrap().unwrap();
        assert_eq!(first.pixel(0, 0), Some(Rgba::new(200, 0, 0, 255)));
        let second = decoder.next_frame().unwrap().unwrap();
        assert_eq!(second.pixel(3, 1), Some(Rgba::new(0, 0, 200, 255)));
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.rewind().unwrap();
        assert_eq!(decoder.next_frame().unwrap().unwrap(), first);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_image_is_resized_to_configured_dimensions() {
        let dir = std::env::temp_dir().join("chromacast_test_sequence_resize");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("still.png");
        write_png(&path, 16, 16, [10, 20, 30, 255]);

        let frame = decode_image_file(&path, Dimensions::new(8, 4)).unwrap();
        assert_eq!(frame.dimensions(), Dimensions::new(8, 4));
        assert_eq!(frame.pixel(7, 3), Some(Rgba::new(10, 20, 30, 255)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_path_is_file_not_found() {
        let missing = std::env::temp_dir().join("chromacast_test_no_such_timeline");
        let result = ImageSequenceDecoder::open(&missing, Dimensions::new(2, 2));
        assert!(matches!(result, Err(ChromacastError::FileNotFound { .. })));
    }

    #[test]
    fn test_solid_color_finite_rewinds() {
        let dims = Dimensions::new(2, 2);
        let mut decoder = SolidColorDecoder::finite(dims, Rgba::opaque(1, 2, 3), 2);
        assert!(decoder.next_frame().unwrap().is_some());
        assert!(decoder.next_frame().unwrap().is_some());
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.rewind().unwrap();
        assert!(decoder.next_frame().unwrap().is_some());
    }

    #[test]
    fn test_stub_decoder_replays_after_rewind() {
        let dims = Dimensions::new(1, 1);
        let a = Frame::filled(dims, Rgba::opaque(1, 0, 0));
        let b = Frame::filled(dims, Rgba::opaque(2, 0, 0));
        let mut decoder = StubDecoder::new(vec![a.clone(), b.clone()]);
        assert_eq!(decoder.next_frame().unwrap(), Some(a.clone()));
        decoder.rewind().unwrap();
        assert_eq!(decoder.next_frame().unwrap(), Some(a));
        assert_eq!(decoder.next_frame().unwrap(), Some(b));
        assert_eq!(decoder.next_frame().unwrap(), None);
    }
}
