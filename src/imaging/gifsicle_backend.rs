//! GIF backend that shells out to `gifsicle`.
//!
//! Only `resize` and `thumbnail` of a GIF into a GIF are implemented;
//! everything else falls through to the next backend registered for the
//! output format. The GIF is
//! piped through stdin/stdout so nothing touches disk.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{
    backfill_dimensions, calculate_center_crop, scaling_factor, should_scale,
};
use super::params::Options;
use crate::file::ImageFile;
use crate::types::Format;
use image::ImageDecoder;
use image::codecs::gif::GifDecoder;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

pub const DEFAULT_EXECUTABLE: &str = "gifsicle";

#[derive(Debug, Clone)]
pub struct GifsicleBackend {
    executable: PathBuf,
}

impl GifsicleBackend {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Resolve an executable name against `PATH`. Paths containing a
    /// separator are checked as-is.
    pub fn locate(executable: &str) -> Option<PathBuf> {
        let candidate = Path::new(executable);
        if candidate.components().count() > 1 {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(executable))
            .find(|full| full.is_file())
    }

    /// Run gifsicle with `args`, feeding `input` on stdin.
    fn exec(&self, args: &[String], input: &[u8]) -> Result<Vec<u8>, BackendError> {
        debug!(executable = %self.executable.display(), ?args, "running gifsicle");
        let mut child = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin from another thread so a full stdout pipe cannot
        // deadlock the child.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::ProcessingFailed("gifsicle stdin unavailable".into()))?;
        let input = input.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child.wait_with_output()?;
        writer
            .join()
            .map_err(|_| BackendError::ProcessingFailed("gifsicle stdin writer panicked".into()))??;

        if !output.status.success() {
            return Err(BackendError::ProcessingFailed(format!(
                "gifsicle exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

/// Logical screen size of a GIF, read from its header.
fn gif_dimensions(bytes: &[u8]) -> Result<(u32, u32), BackendError> {
    Ok(GifDecoder::new(Cursor::new(bytes))?.dimensions())
}

/// gifsicle reads and writes GIF only.
fn check_gif(file: &ImageFile, options: &Options) -> Result<(), BackendError> {
    if options.format != Format::Gif || Format::detect(&file.source) != Some(Format::Gif) {
        return Err(BackendError::NotImplemented);
    }
    Ok(())
}

pub fn resize_args(target: (u32, u32)) -> Vec<String> {
    vec!["--resize".to_string(), format!("{}x{}", target.0, target.1)]
}

pub fn thumbnail_args(source: (u32, u32), target: (u32, u32)) -> Vec<String> {
    let (left, top, crop_w, crop_h) = calculate_center_crop(source, target);
    vec![
        "--crop".to_string(),
        format!("{left},{top}+{crop_w}x{crop_h}"),
        "--resize".to_string(),
        format!("{}x{}", target.0, target.1),
    ]
}

impl ImageBackend for GifsicleBackend {
    fn name(&self) -> &'static str {
        "gifsicle"
    }

    fn resize(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        check_gif(file, options)?;
        let source = gif_dimensions(&file.source)?;
        let target = backfill_dimensions(source, (options.width, options.height));
        if !should_scale(scaling_factor(source, target), options.upscale) {
            return Ok(file.source.to_vec());
        }
        self.exec(&resize_args(target), &file.source)
    }

    fn thumbnail(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        check_gif(file, options)?;
        let source = gif_dimensions(&file.source)?;
        let target = backfill_dimensions(source, (options.width, options.height));
        if !should_scale(scaling_factor(source, target), options.upscale) {
            return Ok(file.source.to_vec());
        }
        self.exec(&thumbnail_args(source, target), &file.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{animated_gif_bytes, png_bytes};
    use bytes::Bytes;

    fn bogus() -> GifsicleBackend {
        GifsicleBackend::new("/nonexistent/bin/gifsicle")
    }

    fn gif(width: u32, height: u32) -> ImageFile {
        ImageFile::new("anim.gif", Bytes::from(animated_gif_bytes(width, height, 2)))
    }

    #[test]
    fn resize_args_format() {
        assert_eq!(resize_args((100, 50)), vec!["--resize", "100x50"]);
    }

    #[test]
    fn thumbnail_args_center_crop_then_resize() {
        assert_eq!(
            thumbnail_args((400, 200), (100, 100)),
            vec!["--crop", "100,0+200x200", "--resize", "100x100"]
        );
    }

    #[test]
    fn guard_returns_source_without_running() {
        let file = gif(40, 40);
        let options = Options {
            width: 80,
            height: 80,
            upscale: false,
            format: Format::Gif,
            ..Options::default()
        };
        let out = bogus().resize(&file, &options).unwrap();
        assert_eq!(out, file.source.to_vec());
    }

    #[test]
    fn missing_executable_is_io_error() {
        let file = gif(40, 40);
        let options = Options {
            width: 20,
            height: 20,
            format: Format::Gif,
            ..Options::default()
        };
        assert!(matches!(
            bogus().thumbnail(&file, &options),
            Err(BackendError::Io(_))
        ));
    }

    #[test]
    fn other_operations_fall_through() {
        let file = gif(10, 10);
        let options = Options::default();
        assert!(matches!(
            bogus().rotate(&file, &options),
            Err(BackendError::NotImplemented)
        ));
        assert!(matches!(
            bogus().flat(&file, &options),
            Err(BackendError::NotImplemented)
        ));
    }

    #[test]
    fn non_gif_falls_through() {
        let png = ImageFile::new("cat.png", Bytes::from(png_bytes(10, 10)));
        let options = Options {
            width: 5,
            height: 5,
            format: Format::Gif,
            ..Options::default()
        };
        assert!(matches!(
            bogus().resize(&png, &options),
            Err(BackendError::NotImplemented)
        ));

        let to_png = Options {
            format: Format::Png,
            ..options
        };
        assert!(matches!(
            bogus().thumbnail(&gif(10, 10), &to_png),
            Err(BackendError::NotImplemented)
        ));
    }

    #[test]
    fn locate_unknown_executable() {
        assert!(GifsicleBackend::locate("picstash-no-such-binary").is_none());
        assert!(GifsicleBackend::locate("/nonexistent/bin/gifsicle").is_none());
    }
}
