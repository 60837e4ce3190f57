//! Mirror coordinate translation
//!
//! A mirrored viewer sees the slide flipped horizontally. Its requested
//! window `[x, x + w*ds)` (level 0 frame) maps to the native window that
//! ends where the mirrored one starts, measured from the right edge.

/// Native decode origin for a mirrored request.
///
/// `level0_width` and `level_width` are the slide widths at level 0 and at
/// the requested level. The downsample ratio is the integer quotient of the
/// two, so pyramids with non power-of-two ratios can drift by a few pixels;
/// this is left as is to keep cache entries stable.
///
/// Only x is transformed; mirroring is horizontal. `None` when the origin
/// does not fit in an `i64`.
pub fn mirrored_origin_x(level0_width: i64, level_width: i64, x: i64, w: u32) -> Option<i64> {
    let multiplier = if level_width > 0 {
        level0_width / level_width
    } else {
        1
    };
    level0_width
        .checked_sub(x)?
        .checked_sub(i64::from(w).checked_mul(multiplier)?)
}
