//! Multi-page TIFF export for frame sequences.
//!
//! A sequence is written as one multi-page 8-bit grayscale TIFF. The file is
//! first written to a hidden sibling, synced, and renamed over the target so
//! that a reader never sees a half-written stack.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cage_results::image_saver::{ImageSaver, TiffStackSaver};
//!
//! let frames: Vec<Frame> = store.snapshot(cage, SequenceKind::Primary)?;
//! TiffStackSaver.save(Path::new("Images/M1.tif"), &frames)?;
//! ```

use crate::error::{ResultsError, ResultsResult};
use crate::frame::Frame;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tiff::encoder::{colortype, TiffEncoder};

/// Durably persists a frame sequence to a single file.
pub trait ImageSaver: Send + Sync {
    /// Write `frames`, in order, as one file at `path`.
    fn save(&self, path: &Path, frames: &[Frame]) -> ResultsResult<()>;
}

/// [`ImageSaver`] writing multi-page TIFF files.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiffStackSaver;

impl TiffStackSaver {
    fn temp_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("stack.tif");
        path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
    }

    fn encode(path: &Path, frames: &[Frame]) -> ResultsResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        {
            let mut encoder = TiffEncoder::new(&mut writer)?;
            for frame in frames {
                encoder.write_image::<colortype::Gray8>(
                    frame.width(),
                    frame.height(),
                    frame.as_bytes(),
                )?;
            }
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}

impl ImageSaver for TiffStackSaver {
    fn save(&self, path: &Path, frames: &[Frame]) -> ResultsResult<()> {
        if frames.is_empty() {
            return Err(ResultsError::EmptyStack(path.to_path_buf()));
        }

        let first = &frames[0];
        for (i, frame) in frames.iter().enumerate() {
            if frame.width() != first.width() || frame.height() != first.height() {
                return Err(ResultsError::Configuration(format!(
                    "Frame {} has inconsistent dimensions: {}x{} vs expected {}x{}",
                    i,
                    frame.width(),
                    frame.height(),
                    first.width(),
                    first.height()
                )));
            }
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = Self::temp_path(path);
        if let Err(e) = Self::encode(&tmp, frames) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, path)?;

        tracing::debug!(
            path = ?path,
            num_frames = frames.len(),
            dimensions = format!("{}x{}", first.width(), first.height()),
            "Wrote TIFF stack"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tiff::decoder::{Decoder, DecodingResult};

    #[test]
    fn test_write_multi_page_stack() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Images").join("stack.tif");

        let frames: Vec<Frame> = (0..3u8).map(|v| Frame::filled(8, 4, v * 10)).collect();
        TiffStackSaver.save(&path, &frames).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        let mut pages = 0;
        loop {
            assert_eq!(decoder.dimensions().unwrap(), (8, 4));
            match decoder.read_image().unwrap() {
                DecodingResult::U8(data) => assert!(data.iter().all(|&v| v == pages * 10)),
                _ => panic!("expected 8-bit page"),
            }
            pages += 1;
            if !decoder.more_images() {
                break;
            }
            decoder.next_image().unwrap();
        }
        assert_eq!(pages, 3);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("one.tif");
        TiffStackSaver.save(&path, &[Frame::filled(2, 2, 1)]).unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("one.tif")]);
    }

    #[test]
    fn test_inconsistent_dimensions_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mixed.tif");

        let frames = [Frame::filled(4, 3, 0), Frame::filled(8, 8, 0)];
        let err = TiffStackSaver.save(&path, &frames).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Frame 1 has inconsistent dimensions"));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_stack_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.tif");

        let result = TiffStackSaver.save(&path, &[]);
        assert!(matches!(result, Err(ResultsError::EmptyStack(_))));
        assert!(!path.exists());
    }
}
