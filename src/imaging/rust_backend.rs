//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, BMP, TIFF, WebP) | `image::load_from_memory` |
//! | Decode animated GIF | `GifDecoder` + `AnimationDecoder::into_frames` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Thumbnail | `DynamicImage::resize_to_fill` |
//! | Fit | `DynamicImage::resize` |
//! | Rotate / Flip | `rotate90/180/270`, `fliph`, `flipv` |
//! | Flat | `imageops::overlay` |
//! | GIF frames | `rayon` per frame, `imageops::dither` onto a web-safe palette |
//! | Encode JPEG | `JpegEncoder::new_with_quality` |
//!
//! Rotation angles are counter-clockwise.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{
    backfill_dimensions, calculate_fit_dimensions, parse_hex_color, parse_position,
    position_rect, scaling_factor, should_scale, tile_cell, tile_offset,
};
use super::params::{FlipAxis, Operation, Options, Quality, Rotation, Stick};
use crate::file::ImageFile;
use crate::types::Format;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, ColorMap, FilterType};
use image::{AnimationDecoder, DynamicImage, Frame, GenericImageView, Rgba, RgbaImage};
use rayon::prelude::*;
use std::io::Cursor;

const FILTER: FilterType = FilterType::Lanczos3;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }

    fn run(
        &self,
        file: &ImageFile,
        operation: Operation,
        options: &Options,
    ) -> Result<Vec<u8>, BackendError> {
        let source_format = Format::detect(&file.source);

        if options.format == Format::Gif
            && source_format == Some(Format::Gif)
            && let Some(frames) = decode_animation(&file.source)?
        {
            return run_animation(file, frames, operation, options);
        }

        let img = load_image(&file.source)?;
        if operation.is_resize_family() && !passes_scale_guard(img.dimensions(), options) {
            // Nothing to scale: hand back the original bytes when the
            // format is unchanged so the output is byte-identical.
            if source_format == Some(options.format) {
                return Ok(file.source.to_vec());
            }
            return encode(&img, options.format, options.quality);
        }

        let out = match operation {
            Operation::Flat => {
                let foregrounds = load_foregrounds(options)?;
                DynamicImage::ImageRgba8(compose(img.into_rgba8(), &foregrounds, options)?)
            }
            _ => transform(img, operation, options)?,
        };
        encode(&out, options.format, options.quality)
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn load_image(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    Ok(image::load_from_memory(bytes)?)
}

fn load_foregrounds(options: &Options) -> Result<Vec<DynamicImage>, BackendError> {
    options
        .images
        .iter()
        .map(|fg| load_image(fg.content()))
        .collect()
}

/// All frames of a GIF, or `None` for a single-frame image.
fn decode_animation(bytes: &[u8]) -> Result<Option<Vec<Frame>>, BackendError> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let frames = decoder.into_frames().collect_frames()?;
    Ok((frames.len() > 1).then_some(frames))
}

fn passes_scale_guard(source: (u32, u32), options: &Options) -> bool {
    let target = backfill_dimensions(source, (options.width, options.height));
    should_scale(scaling_factor(source, target), options.upscale)
}

/// Apply a geometry operation to one decoded image.
fn transform(
    img: DynamicImage,
    operation: Operation,
    options: &Options,
) -> Result<DynamicImage, BackendError> {
    let source = img.dimensions();
    let (w, h) = backfill_dimensions(source, (options.width, options.height));

    let out = match operation {
        Operation::Resize | Operation::Thumbnail | Operation::Fit if (w, h) == source => img,
        Operation::Resize => img.resize_exact(w, h, FILTER),
        Operation::Thumbnail => img.resize_to_fill(w, h, FILTER),
        Operation::Fit => {
            let (fit_w, fit_h) = calculate_fit_dimensions(source, (w, h));
            img.resize_exact(fit_w, fit_h, FILTER)
        }
        Operation::Rotate => match options.rotation().map_err(BackendError::Validation)? {
            Rotation::Deg90 => img.rotate270(),
            Rotation::Deg180 => img.rotate180(),
            Rotation::Deg270 => img.rotate90(),
        },
        Operation::Flip => match options.flip_axis().map_err(BackendError::Validation)? {
            FlipAxis::Horizontal => img.fliph(),
            FlipAxis::Vertical => img.flipv(),
        },
        Operation::Flat | Operation::Noop => img,
    };
    Ok(out)
}

/// Draw the foregrounds onto a background, either pinned to a corner
/// (`stick`) or tiled inside the `pos` rectangle.
fn compose(
    mut background: RgbaImage,
    foregrounds: &[DynamicImage],
    options: &Options,
) -> Result<RgbaImage, BackendError> {
    if let Some(stick) = options.stick {
        let (bg_w, bg_h) = background.dimensions();
        for fg in foregrounds {
            let (w, h) = backfill_dimensions(fg.dimensions(), (options.width, options.height));
            let tile = if (w, h) == fg.dimensions() {
                fg.to_rgba8()
            } else {
                fg.resize_exact(w, h, FILTER).to_rgba8()
            };
            let right = bg_w as i64 - w as i64;
            let bottom = bg_h as i64 - h as i64;
            let (x, y) = match stick {
                Stick::TopLeft => (0, 0),
                Stick::TopRight => (right, 0),
                Stick::BottomLeft => (0, bottom),
                Stick::BottomRight => (right, bottom),
            };
            imageops::overlay(&mut background, &tile, x, y);
        }
        return Ok(background);
    }

    let ratios = parse_position(options.position.as_deref().unwrap_or(""))
        .map_err(BackendError::Validation)?;
    let fill = options
        .color
        .as_deref()
        .map(parse_hex_color)
        .transpose()
        .map_err(BackendError::Validation)?;

    let rect = position_rect(background.dimensions(), ratios);
    if rect.width == 0 || rect.height == 0 {
        return Ok(background);
    }
    let area = (rect.width, rect.height);

    let mut foreground = match fill {
        Some(rgba) => RgbaImage::from_pixel(rect.width, rect.height, Rgba(rgba)),
        None => RgbaImage::new(rect.width, rect.height),
    };

    let count = foregrounds.len() as u32;
    let (cell_w, cell_h) = tile_cell(area, count);
    for (i, fg) in foregrounds.iter().enumerate() {
        let tile = fg.resize(cell_w.max(1), cell_h.max(1), FILTER).to_rgba8();
        let (x, y) = tile_offset(area, count, i as u32, tile.dimensions());
        imageops::overlay(&mut foreground, &tile, x, y);
    }

    imageops::overlay(&mut background, &foreground, rect.x as i64, rect.y as i64);
    Ok(background)
}

/// Transform every frame of an animated GIF with the same operation.
///
/// The scale guard is evaluated once, on the first frame. Frames are
/// processed in parallel and collected in order; the first failing frame
/// aborts the whole transform.
fn run_animation(
    file: &ImageFile,
    frames: Vec<Frame>,
    operation: Operation,
    options: &Options,
) -> Result<Vec<u8>, BackendError> {
    let first = frames
        .first()
        .map(|f| f.buffer().dimensions())
        .unwrap_or_default();
    if operation.is_resize_family() && !passes_scale_guard(first, options) {
        return Ok(file.source.to_vec());
    }

    let foregrounds = if operation == Operation::Flat {
        load_foregrounds(options)?
    } else {
        Vec::new()
    };

    let frames = frames
        .into_par_iter()
        .map(|frame| -> Result<Frame, BackendError> {
            let delay = frame.delay();
            let mut buffer = match operation {
                Operation::Flat => compose(frame.into_buffer(), &foregrounds, options)?,
                _ => {
                    let img = DynamicImage::ImageRgba8(frame.into_buffer());
                    transform(img, operation, options)?.into_rgba8()
                }
            };
            imageops::dither(&mut buffer, &WebSafePalette);
            Ok(Frame::from_parts(buffer, 0, 0, delay))
        })
        .collect::<Result<Vec<_>, BackendError>>()?;

    encode_animation(frames)
}

fn encode_animation(frames: Vec<Frame>) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder.set_repeat(Repeat::Infinite)?;
        encoder.encode_frames(frames)?;
    }
    Ok(buf)
}

/// Encode a still image in the requested format.
fn encode(img: &DynamicImage, format: Format, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    match format {
        Format::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value().clamp(1, 100));
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
        }
        Format::Png => img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?,
        other => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_to(&mut Cursor::new(&mut buf), other.to_image_format())?,
    }
    Ok(buf)
}

/// The 216-color web-safe cube plus one fully transparent entry.
struct WebSafePalette;

impl WebSafePalette {
    const TRANSPARENT: usize = 216;

    fn level(channel: u8) -> usize {
        (channel as usize + 25) / 51
    }
}

impl ColorMap for WebSafePalette {
    type Color = Rgba<u8>;

    fn index_of(&self, color: &Rgba<u8>) -> usize {
        if color[3] < 128 {
            return Self::TRANSPARENT;
        }
        Self::level(color[0]) * 36 + Self::level(color[1]) * 6 + Self::level(color[2])
    }

    fn map_color(&self, color: &mut Rgba<u8>) {
        if color[3] < 128 {
            *color = Rgba([0, 0, 0, 0]);
            return;
        }
        for channel in color.0.iter_mut().take(3) {
            *channel = (Self::level(*channel) * 51) as u8;
        }
        color[3] = 255;
    }
}

impl ImageBackend for RustBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn resize(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        self.run(file, Operation::Resize, options)
    }

    fn thumbnail(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        self.run(file, Operation::Thumbnail, options)
    }

    fn fit(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        self.run(file, Operation::Fit, options)
    }

    fn rotate(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        self.run(file, Operation::Rotate, options)
    }

    fn flip(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        self.run(file, Operation::Flip, options)
    }

    fn flat(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        self.run(file, Operation::Flat, options)
    }
}
