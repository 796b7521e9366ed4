//! Parameter types for engine operations.
//!
//! These describe *what* to do, not *how*. The
//! [`Engine`](super::engine::Engine) hands them to whichever
//! [`ImageBackend`](super::backend::ImageBackend) claims the source format.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality, 0–100, default 95. Out-of-range values are rejected.
//! - [`Operation`]: the seven operation kinds.
//! - [`Options`]: geometry and encoding options shared by every operation.
//! - [`EngineOperation`]: one pipeline stage, an operation paired with its options.

use crate::file::ImageFile;
use crate::types::Format;
use std::fmt;
use std::str::FromStr;

/// Quality setting for lossy image encoding (0–100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub const DEFAULT: Quality = Quality(95);

    pub fn try_new(value: u32) -> Result<Self, String> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or_else(|| format!("quality must be between 0 and 100, got {value}"))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Resize,
    Thumbnail,
    Fit,
    Rotate,
    Flip,
    Flat,
    /// Passes the current bytes through untouched. No re-encoding happens,
    /// so a requested output format only changes the extension and
    /// Content-Type, not the bytes.
    Noop,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Resize => "resize",
            Operation::Thumbnail => "thumbnail",
            Operation::Fit => "fit",
            Operation::Rotate => "rotate",
            Operation::Flip => "flip",
            Operation::Flat => "flat",
            Operation::Noop => "noop",
        }
    }

    /// Operations subject to the scale guard.
    pub fn is_resize_family(self) -> bool {
        matches!(
            self,
            Operation::Resize | Operation::Thumbnail | Operation::Fit
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resize" => Ok(Operation::Resize),
            "thumbnail" => Ok(Operation::Thumbnail),
            "fit" => Ok(Operation::Fit),
            "rotate" => Ok(Operation::Rotate),
            "flip" => Ok(Operation::Flip),
            "flat" => Ok(Operation::Flat),
            "noop" => Ok(Operation::Noop),
            other => Err(format!("invalid method {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

impl FromStr for FlipAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "h" => Ok(FlipAxis::Horizontal),
            "v" => Ok(FlipAxis::Vertical),
            other => Err(format!("invalid flip position {other}, expected h or v")),
        }
    }
}

/// Quarter turns accepted by `rotate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Deg90,
    Deg180,
    Deg270,
}

impl TryFrom<u32> for Rotation {
    type Error = String;

    fn try_from(degree: u32) -> Result<Self, Self::Error> {
        match degree {
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(format!("invalid rotation {other}, expected 90, 180 or 270")),
        }
    }
}

/// Corner a `flat` foreground is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stick {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl FromStr for Stick {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top-left" => Ok(Stick::TopLeft),
            "top-right" => Ok(Stick::TopRight),
            "bottom-left" => Ok(Stick::BottomLeft),
            "bottom-right" => Ok(Stick::BottomRight),
            other => Err(format!(
                "invalid stick {other}, expected top-left, top-right, bottom-left or bottom-right"
            )),
        }
    }
}

/// Options shared by every operation. Fields an operation does not use are
/// ignored.
#[derive(Debug, Clone)]
pub struct Options {
    /// Target width; `0` means "derive from the aspect ratio".
    pub width: u32,
    /// Target height; `0` means "derive from the aspect ratio".
    pub height: u32,
    pub upscale: bool,
    pub quality: Quality,
    pub degree: u32,
    /// Raw `pos` parameter: flip axis for `flip`, rectangle for `flat`.
    pub position: Option<String>,
    pub stick: Option<Stick>,
    /// Hex background color for `flat`.
    pub color: Option<String>,
    /// Foreground images for `flat`.
    pub images: Vec<ImageFile>,
    /// Resolved output format.
    pub format: Format,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            upscale: true,
            quality: Quality::DEFAULT,
            degree: 90,
            position: None,
            stick: None,
            color: None,
            images: Vec::new(),
            format: Format::Png,
        }
    }
}

impl Options {
    pub fn flip_axis(&self) -> Result<FlipAxis, String> {
        self.position
            .as_deref()
            .ok_or_else(|| "flip requires a position (h or v)".to_string())?
            .parse()
    }

    pub fn rotation(&self) -> Result<Rotation, String> {
        Rotation::try_from(self.degree)
    }
}

/// One stage of a transform pipeline.
#[derive(Debug, Clone)]
pub struct EngineOperation {
    pub operation: Operation,
    pub options: Options,
}

impl EngineOperation {
    pub fn new(operation: Operation, options: Options) -> Self {
        Self { operation, options }
    }
}
