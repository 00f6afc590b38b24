//! Drawing helpers on top of embedded-graphics.
//!
//! Everything is laid out in pixel coordinates with the 7×13 font and the
//! text anchored at its top-left corner. Large text is drawn through
//! [`Scaled`], which multiplies both the position and every glyph pixel.

use std::convert::Infallible;

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_7X13;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use panel_hal::{Frame, HEIGHT, WIDTH};

/// Characters that fit on one row of the panel in the base font.
pub const COLUMNS: usize = 18;

const STYLE: MonoTextStyle<'static, BinaryColor> = MonoTextStyle::new(&FONT_7X13, BinaryColor::On);
const RULE: PrimitiveStyle<BinaryColor> = PrimitiveStyle::with_stroke(BinaryColor::On, 1);

/// Draws into a frame at an integer magnification.
pub struct Scaled<'a> {
    frame: &'a mut Frame,
    scale: u32,
}

impl<'a> Scaled<'a> {
    pub fn new(frame: &'a mut Frame, scale: u32) -> Self {
        Self {
            frame,
            scale: scale.max(1),
        }
    }
}

impl OriginDimensions for Scaled<'_> {
    fn size(&self) -> Size {
        Size::new(WIDTH.div_ceil(self.scale), HEIGHT.div_ceil(self.scale))
    }
}

impl DrawTarget for Scaled<'_> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            let (x0, y0) = (point.x as u32 * self.scale, point.y as u32 * self.scale);
            for dy in 0..self.scale {
                for dx in 0..self.scale {
                    self.frame.set(x0 + dx, y0 + dy, color.is_on());
                }
            }
        }
        Ok(())
    }
}

pub fn draw_text(frame: &mut Frame, x: i32, y: i32, text: &str) {
    let _ = Text::with_baseline(text, Point::new(x, y), STYLE, Baseline::Top).draw(frame);
}

/// `x` and `y` are in scaled units, like the glyphs.
pub fn draw_large(frame: &mut Frame, x: i32, y: i32, text: &str, scale: u32) {
    let mut target = Scaled::new(frame, scale);
    let _ = Text::with_baseline(text, Point::new(x, y), STYLE, Baseline::Top).draw(&mut target);
}

/// Title row plus the rule under it.
pub fn draw_header(frame: &mut Frame, title: &str) {
    draw_text(frame, 2, 0, &center(title, COLUMNS));
    draw_rule(frame, 15);
}

pub fn draw_footer(frame: &mut Frame) {
    draw_rule(frame, HEIGHT as i32 - 2);
}

fn draw_rule(frame: &mut Frame, y: i32) {
    let _ = Line::new(Point::new(0, y), Point::new(WIDTH as i32 - 1, y))
        .into_styled(RULE)
        .draw(frame);
}

/// Outlined bar filled to `percent` of its width.
pub fn draw_bar(frame: &mut Frame, top_left: Point, size: Size, percent: f64) {
    let _ = Rectangle::new(top_left, size).into_styled(RULE).draw(frame);
    let filled = (percent.clamp(0.0, 100.0) / 100.0 * f64::from(size.width)).round() as u32;
    if filled > 0 {
        let _ = Rectangle::new(top_left, Size::new(filled, size.height))
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(frame);
    }
}

/// Left-pads `text` so it sits in the middle of `width` columns.
pub fn center(text: &str, width: usize) -> String {
    let len = text.chars().count();
    let pad = width.saturating_sub(len) / 2;
    format!("{}{text}", " ".repeat(pad))
}

/// Splits `text` into chunks of at most `n` characters.
pub fn split_by_n(text: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(n.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_pads_on_the_left_only() {
        assert_eq!(center("STOP", 18), "       STOP");
        assert_eq!(center("a much longer title here", 18), "a much longer title here");
    }

    #[test]
    fn split_keeps_the_tail() {
        let text = "x".repeat(40);
        let lines = split_by_n(&text, 18);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].len(), 4);
        assert!(split_by_n("", 18).is_empty());
        assert_eq!(split_by_n("héllo", 2), ["hé", "ll", "o"]);
    }

    #[test]
    fn scaled_text_covers_blocks() {
        let mut small = Frame::new();
        draw_text(&mut small, 0, 0, "8");
        let mut large = Frame::new();
        draw_large(&mut large, 0, 0, "8", 3);
        assert_eq!(large.lit_pixels(), small.lit_pixels() * 9);
    }

    #[test]
    fn bar_fill_tracks_percent() {
        let mut empty = Frame::new();
        draw_bar(&mut empty, Point::new(0, 22), Size::new(128, 14), 0.0);
        let mut half = Frame::new();
        draw_bar(&mut half, Point::new(0, 22), Size::new(128, 14), 50.0);
        assert!(half.lit_pixels() > empty.lit_pixels());
        assert!(half.get(10, 28));
        assert!(!half.get(100, 28));
    }
}
