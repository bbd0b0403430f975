//! Deterministic logo stamping.
//!
//! The logo is scaled to 30% of the background width (aspect ratio kept),
//! resampled with Lanczos3 and pasted centered, using its own alpha channel
//! as the blend mask. The canvas never changes size; whatever falls outside
//! it is clipped.
//!
//! Scaled sizes are rounded half to even on exact integer ratios, so a
//! 15px wide background gets a 4px logo.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use serde::Serialize;

use crate::error::CompositeError;

/// Logo width as a fraction of the background width, `3/10`.
const LOGO_WIDTH_NUMERATOR: u64 = 3;
const LOGO_WIDTH_DENOMINATOR: u64 = 10;

/// Scaled logos taller than this many background heights are rejected
/// instead of being resampled and mostly clipped.
pub const MAX_LOGO_HEIGHT_RATIO: u32 = 32;

/// Where and how large the logo lands on the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogoPlacement {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

pub fn plan_placement(
    background_width: u32,
    background_height: u32,
    logo_width: u32,
    logo_height: u32,
) -> Result<LogoPlacement, CompositeError> {
    if background_width == 0 || background_height == 0 {
        return Err(CompositeError::EmptyBackground {
            width: background_width,
            height: background_height,
        });
    }
    if logo_width == 0 || logo_height == 0 {
        return Err(CompositeError::EmptyLogo {
            width: logo_width,
            height: logo_height,
        });
    }

    let width = round_half_even(
        u64::from(background_width) * LOGO_WIDTH_NUMERATOR,
        LOGO_WIDTH_DENOMINATOR,
    );
    let height = round_half_even(u64::from(logo_height) * width, u64::from(logo_width));
    if width == 0 || height == 0 {
        return Err(CompositeError::DegenerateScale {
            logo_width,
            logo_height,
            background_width,
        });
    }
    // width <= background_width, so only the height can run away.
    let width = width as u32;
    if height > u64::from(background_height) * u64::from(MAX_LOGO_HEIGHT_RATIO) {
        return Err(CompositeError::OversizedLogo {
            width,
            height,
            background_height,
            max_ratio: MAX_LOGO_HEIGHT_RATIO,
        });
    }
    let height = height as u32;

    Ok(LogoPlacement {
        x: (i64::from(background_width) - i64::from(width)).div_euclid(2),
        y: (i64::from(background_height) - i64::from(height)).div_euclid(2),
        width,
        height,
    })
}

/// `numerator / denominator` rounded to the nearest integer, ties to even.
fn round_half_even(numerator: u64, denominator: u64) -> u64 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    match (remainder * 2).cmp(&denominator) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal => quotient + (quotient % 2),
    }
}

/// Stamps `logo` onto a copy of `background`.
pub fn composite_logo(
    background: &DynamicImage,
    logo: &DynamicImage,
) -> Result<(RgbaImage, LogoPlacement), CompositeError> {
    let mut canvas = background.to_rgba8();
    let logo = logo.to_rgba8();
    let placement = plan_placement(
        canvas.width(),
        canvas.height(),
        logo.width(),
        logo.height(),
    )?;

    let resized = imageops::resize(
        &logo,
        placement.width,
        placement.height,
        FilterType::Lanczos3,
    );
    paste_with_alpha_mask(&mut canvas, &resized, placement.x, placement.y);
    Ok((canvas, placement))
}

/// Blends every channel, alpha included, as
/// `round((overlay * a + canvas * (255 - a)) / 255)` where `a` is the
/// overlay pixel's alpha.
fn paste_with_alpha_mask(canvas: &mut RgbaImage, overlay: &RgbaImage, x: i64, y: i64) {
    let canvas_width = i64::from(canvas.width());
    let canvas_height = i64::from(canvas.height());
    for (ox, oy, pixel) in overlay.enumerate_pixels() {
        let cx = x + i64::from(ox);
        let cy = y + i64::from(oy);
        if cx < 0 || cy < 0 || cx >= canvas_width || cy >= canvas_height {
            continue;
        }
        let mask = u32::from(pixel[3]);
        if mask == 0 {
            continue;
        }
        let target = canvas.get_pixel_mut(cx as u32, cy as u32);
        if mask == 255 {
            *target = *pixel;
            continue;
        }
        for channel in 0..4 {
            let over = u32::from(pixel[channel]);
            let under = u32::from(target[channel]);
            target[channel] = ((over * mask + under * (255 - mask) + 127) / 255) as u8;
        }
    }
}
