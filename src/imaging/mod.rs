//! Image transformation: operation chains over pluggable codec backends.
//!
//! | Operation | Native backend | gifsicle |
//! |---|---|---|
//! | **Resize** | `resize_exact` + Lanczos3 | `--resize` |
//! | **Thumbnail** | `resize_to_fill` | `--crop` then `--resize` |
//! | **Fit** | `resize` (aspect kept) | |
//! | **Rotate** | `rotate90/180/270` | |
//! | **Flip** | `fliph` / `flipv` | |
//! | **Flat** | `imageops::overlay` | |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for geometry (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`] + [`GifsicleBackend`]
//! - **Engine**: [`Engine`], backend selection and chaining

pub mod backend;
mod calculations;
pub mod engine;
pub mod gifsicle_backend;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use calculations::{
    backfill_dimensions, calculate_center_crop, calculate_fit_dimensions, parse_hex_color,
    parse_position, scaling_factor, should_scale,
};
pub use engine::Engine;
pub use gifsicle_backend::GifsicleBackend;
pub use params::{EngineOperation, FlipAxis, Operation, Options, Quality, Rotation, Stick};
pub use rust_backend::RustBackend;
