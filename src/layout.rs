use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;

/// Convert 8-bit RGB to Rgb565.
pub const fn rgb(r: u8, g: u8, b: u8) -> Rgb565 {
    Rgb565::new(r >> 3, g >> 2, b >> 3)
}

// ── Palette ─────────────────────────────────────────────────────────

pub const BG: Rgb565 = rgb(20, 24, 32);

pub const LINE_COLOR: Rgb565 = rgb(56, 63, 76);

pub const CARD_FILL: Rgb565 = rgb(20, 25, 35);
pub const CARD_BORDER: Rgb565 = rgb(63, 75, 95);

pub const TEXT_HEADER: Rgb565 = rgb(222, 225, 230);
pub const TEXT_CLOCK: Rgb565 = rgb(182, 187, 196);
pub const TEXT_METAR: Rgb565 = rgb(232, 235, 240);
pub const TEXT_STATUS: Rgb565 = rgb(140, 148, 160);
pub const TEXT_STALE: Rgb565 = rgb(238, 180, 80);

// Flight-category tints for the header badge.
pub const CAT_VFR: Rgb565 = rgb(96, 210, 120);
pub const CAT_MVFR: Rgb565 = rgb(100, 160, 255);
pub const CAT_IFR: Rgb565 = rgb(235, 100, 100);
pub const CAT_LIFR: Rgb565 = rgb(220, 120, 235);

/// Badge color for a dataserver flight category string.
pub fn category_color(category: &str) -> Rgb565 {
    match category {
        "VFR" => CAT_VFR,
        "MVFR" => CAT_MVFR,
        "IFR" => CAT_IFR,
        "LIFR" => CAT_LIFR,
        _ => TEXT_CLOCK,
    }
}

// ── Layout constants ────────────────────────────────────────────────

pub const SCREEN_W: i32 = 320;
pub const SCREEN_H: i32 = 240;

pub const HEADER_LINE_Y: i32 = 32;
pub const CARD_MARGIN: i32 = 10;
pub const CARD_RADIUS: i32 = 10;
pub const CARD_Y: i32 = 42;
pub const CARD_PAD_X: i32 = 14;
pub const CARD_PAD_Y: i32 = 10;
pub const STATUS_Y: i32 = SCREEN_H - 10;

/// Row advance of the METAR grid font (PROFONT_18_POINT is 12x22 px, which
/// bounds the grid at 22 columns by 7 rows inside the card).
pub const CELL_H: i32 = 22;

// ── Helpers ─────────────────────────────────────────────────────────

use crate::framebuffer::Framebuffer;
use embedded_graphics::primitives::{PrimitiveStyleBuilder, Rectangle, RoundedRectangle};

/// Fill a horizontal line across the full screen width.
pub fn draw_hline(fb: &mut Framebuffer, y: i32, color: Rgb565) {
    let style = PrimitiveStyleBuilder::new().fill_color(color).build();
    Rectangle::new(Point::new(0, y), Size::new(fb.size().width, 1))
        .into_styled(style)
        .draw(fb)
        .ok();
}

/// Draw a filled rounded rectangle with border (card style).
#[allow(clippy::too_many_arguments)]
pub fn draw_card(
    fb: &mut Framebuffer,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    radius: u32,
    fill: Rgb565,
    border: Rgb565,
    border_width: u32,
) {
    // Draw border rect first (slightly larger)
    if border_width > 0 {
        let style = PrimitiveStyleBuilder::new().fill_color(border).build();
        RoundedRectangle::with_equal_corners(
            Rectangle::new(Point::new(x, y), Size::new(w as u32, h as u32)),
            Size::new(radius, radius),
        )
        .into_styled(style)
        .draw(fb)
        .ok();

        // Draw fill inside
        let bw = border_width as i32;
        let inner_style = PrimitiveStyleBuilder::new().fill_color(fill).build();
        RoundedRectangle::with_equal_corners(
            Rectangle::new(
                Point::new(x + bw, y + bw),
                Size::new((w - 2 * bw) as u32, (h - 2 * bw) as u32),
            ),
            Size::new(
                radius.saturating_sub(border_width),
                radius.saturating_sub(border_width),
            ),
        )
        .into_styled(inner_style)
        .draw(fb)
        .ok();
    } else {
        let style = PrimitiveStyleBuilder::new().fill_color(fill).build();
        RoundedRectangle::with_equal_corners(
            Rectangle::new(Point::new(x, y), Size::new(w as u32, h as u32)),
            Size::new(radius, radius),
        )
        .into_styled(style)
        .draw(fb)
        .ok();
    }
}
