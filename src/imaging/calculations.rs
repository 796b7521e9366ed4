//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.
//! Backends call them so that every backend agrees on the same geometry.

/// Scale factor needed to cover `target` from `source`: the larger of the
/// two axis ratios.
///
/// A factor above `1.0` means the operation would enlarge the image.
pub fn scaling_factor(source: (u32, u32), target: (u32, u32)) -> f64 {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;
    let fx = tgt_w as f64 / src_w.max(1) as f64;
    let fy = tgt_h as f64 / src_h.max(1) as f64;
    fx.max(fy)
}

/// The scale guard: shrinking always proceeds, enlarging only when asked.
///
/// # Examples
/// ```
/// # use picstash::imaging::should_scale;
/// assert!(should_scale(0.5, false));
/// assert!(!should_scale(2.0, false));
/// assert!(should_scale(2.0, true));
/// ```
pub fn should_scale(factor: f64, upscale: bool) -> bool {
    factor < 1.0 || upscale
}

/// Fill in a zero target dimension from the source aspect ratio.
///
/// Both zero means "no geometry change" and returns the source size.
pub fn backfill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = (source.0.max(1), source.1.max(1));
    match target {
        (0, 0) => source,
        (0, h) => {
            let w = (h as f64 * src_w as f64 / src_h as f64).round() as u32;
            (w.max(1), h)
        }
        (w, 0) => {
            let h = (w as f64 * src_h as f64 / src_w as f64).round() as u32;
            (w, h.max(1))
        }
        dims => dims,
    }
}

/// Largest size with the source aspect ratio that fits inside `target`.
pub fn calculate_fit_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = (source.0.max(1) as f64, source.1.max(1) as f64);
    let (tgt_w, tgt_h) = (target.0 as f64, target.1 as f64);
    let ratio = (tgt_w / src_w).min(tgt_h / src_h);
    let w = (src_w * ratio).round().max(1.0) as u32;
    let h = (src_h * ratio).round().max(1.0) as u32;
    (w.min(target.0.max(1)), h.min(target.1.max(1)))
}

/// Center crop window for a thumbnail: `(left, top, width, height)` in
/// source pixels, with the aspect ratio of `target`.
pub fn calculate_center_crop(source: (u32, u32), target: (u32, u32)) -> (u32, u32, u32, u32) {
    let (src_w, src_h) = source;
    let src_ratio = src_w as f64 / src_h.max(1) as f64;
    let dst_ratio = target.0 as f64 / target.1.max(1) as f64;

    let (crop_w, crop_h) = if src_ratio > dst_ratio {
        (((dst_ratio * src_h as f64) + 0.5) as u32, src_h)
    } else {
        (src_w, ((src_w as f64 / dst_ratio) + 0.5) as u32)
    };
    let crop_w = crop_w.min(src_w);
    let crop_h = crop_h.min(src_h);

    let left = (src_w - crop_w) / 2;
    let top = (src_h - crop_h) / 2;
    (left, top, crop_w, crop_h)
}

/// A pixel rectangle: origin plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Parse a `flat` position: four dot-separated percentages
/// `x0.y0.x1.y1` of the canvas. Missing components keep their default
/// (`0.0.100.100`, the whole canvas).
pub fn parse_position(pos: &str) -> Result<[u32; 4], String> {
    let mut ratios = [0, 0, 100, 100];
    if pos.is_empty() {
        return Ok(ratios);
    }
    for (slot, part) in ratios.iter_mut().zip(pos.split('.')) {
        let value: u32 = part
            .parse()
            .map_err(|_| format!("invalid position {pos}: {part} is not a percentage"))?;
        *slot = value.min(100);
    }
    Ok(ratios)
}

/// Rectangle selected by `ratios` on a canvas. An inverted rectangle
/// collapses to zero size.
pub fn position_rect(canvas: (u32, u32), ratios: [u32; 4]) -> Rect {
    let (w, h) = (canvas.0 as u64, canvas.1 as u64);
    let x0 = (w * ratios[0] as u64 / 100) as u32;
    let y0 = (h * ratios[1] as u64 / 100) as u32;
    let x1 = (w * ratios[2] as u64 / 100) as u32;
    let y1 = (h * ratios[3] as u64 / 100) as u32;
    Rect {
        x: x0,
        y: y0,
        width: x1.saturating_sub(x0),
        height: y1.saturating_sub(y0),
    }
}

/// Cell size for tiling `count` foregrounds into `area`: side by side when
/// the area is wider than tall, stacked otherwise.
pub fn tile_cell(area: (u32, u32), count: u32) -> (u32, u32) {
    let count = count.max(1);
    if area.0 > area.1 {
        (area.0 / count, area.1)
    } else {
        (area.0, area.1 / count)
    }
}

/// Top-left offset, relative to `area`, at which the `index`th tile of
/// size `tile` is centered inside its cell.
pub fn tile_offset(area: (u32, u32), count: u32, index: u32, tile: (u32, u32)) -> (i64, i64) {
    let (cell_w, cell_h) = tile_cell(area, count);
    let center = |cell: u32, size: u32| (cell as i64 - size as i64) / 2;
    if area.0 > area.1 {
        (
            index as i64 * cell_w as i64 + center(cell_w, tile.0),
            center(area.1, tile.1),
        )
    } else {
        (
            center(area.0, tile.0),
            index as i64 * cell_h as i64 + center(cell_h, tile.1),
        )
    }
}

/// Parse a `rgb` or `rrggbb` hex color, with or without `#`, into opaque
/// RGBA.
pub fn parse_hex_color(color: &str) -> Result<[u8; 4], String> {
    let hex = color.trim_start_matches('#');
    let invalid = || format!("invalid color {color}, expected rgb or rrggbb hex");
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
    match hex.len() {
        3 => {
            let mut out = [0, 0, 0, 255];
            for (slot, i) in out.iter_mut().zip(0..3) {
                let v = channel(&hex[i..i + 1])?;
                *slot = v * 17;
            }
            Ok(out)
        }
        6 => Ok([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            255,
        ]),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Scale guard
    // =========================================================================

    #[test]
    fn scaling_factor_takes_the_larger_ratio() {
        assert_eq!(scaling_factor((50, 50), (100, 100)), 2.0);
        assert_eq!(scaling_factor((200, 100), (100, 100)), 1.0);
        assert_eq!(scaling_factor((400, 400), (100, 50)), 0.25);
    }

    #[test]
    fn equal_size_without_upscale_is_a_no_op() {
        assert!(!should_scale(scaling_factor((50, 50), (50, 50)), false));
    }

    // =========================================================================
    // Dimension math
    // =========================================================================

    #[test]
    fn backfill_width_from_height() {
        assert_eq!(backfill_dimensions((400, 200), (0, 100)), (200, 100));
    }

    #[test]
    fn backfill_height_from_width() {
        assert_eq!(backfill_dimensions((400, 200), (100, 0)), (100, 50));
    }

    #[test]
    fn backfill_both_zero_keeps_source() {
        assert_eq!(backfill_dimensions((400, 200), (0, 0)), (400, 200));
        assert_eq!(backfill_dimensions((400, 200), (30, 40)), (30, 40));
    }

    #[test]
    fn fit_keeps_aspect_inside_box() {
        assert_eq!(calculate_fit_dimensions((400, 200), (100, 100)), (100, 50));
        assert_eq!(calculate_fit_dimensions((200, 400), (100, 100)), (50, 100));
        assert_eq!(calculate_fit_dimensions((50, 50), (100, 200)), (100, 100));
    }

    #[test]
    fn center_crop_wide_source() {
        assert_eq!(calculate_center_crop((400, 200), (100, 100)), (100, 0, 200, 200));
    }

    #[test]
    fn center_crop_tall_source() {
        assert_eq!(calculate_center_crop((200, 400), (100, 100)), (0, 100, 200, 200));
    }

    // =========================================================================
    // Flat layout
    // =========================================================================

    #[test]
    fn position_defaults_to_full_canvas() {
        assert_eq!(parse_position("").unwrap(), [0, 0, 100, 100]);
        assert_eq!(parse_position("10.20").unwrap(), [10, 20, 100, 100]);
    }

    #[test]
    fn position_rejects_non_numeric() {
        assert!(parse_position("a.b.c.d").is_err());
    }

    #[test]
    fn position_rect_scales_to_canvas() {
        let rect = position_rect((200, 100), [0, 50, 100, 100]);
        assert_eq!(
            rect,
            Rect {
                x: 0,
                y: 50,
                width: 200,
                height: 50
            }
        );
    }

    #[test]
    fn inverted_position_collapses() {
        let rect = position_rect((200, 100), [80, 80, 20, 20]);
        assert_eq!((rect.width, rect.height), (0, 0));
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex_color("ff8000"), Ok([255, 128, 0, 255]));
        assert_eq!(parse_hex_color("#fff"), Ok([255, 255, 255, 255]));
        assert!(parse_hex_color("zzzzzz").is_err());
        assert!(parse_hex_color("ffff").is_err());
    }

    #[test]
    fn tiles_run_along_the_longer_axis() {
        assert_eq!(tile_cell((300, 100), 3), (100, 100));
        assert_eq!(tile_cell((100, 300), 3), (100, 100));
        assert_eq!(tile_cell((100, 100), 2), (100, 50));
    }

    #[test]
    fn tile_offsets_center_in_cells() {
        assert_eq!(tile_offset((300, 100), 3, 0, (50, 50)), (25, 25));
        assert_eq!(tile_offset((300, 100), 3, 2, (50, 50)), (225, 25));
        assert_eq!(tile_offset((100, 300), 3, 1, (100, 40)), (0, 130));
    }
}
