use std::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;

pub const WIDTH: u32 = 128;
pub const HEIGHT: u32 = 64;

const BYTES: usize = (WIDTH * HEIGHT / 8) as usize;

/// A 128×64 one-bit frame, row-major, MSB first.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bits: Box<[u8; BYTES]>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            bits: Box::new([0; BYTES]),
        }
    }

    pub fn clear(&mut self) {
        self.bits.fill(0);
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        match Self::index(x, y) {
            Some((byte, mask)) => self.bits[byte] & mask != 0,
            None => false,
        }
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        if let Some((byte, mask)) = Self::index(x, y) {
            if on {
                self.bits[byte] |= mask;
            } else {
                self.bits[byte] &= !mask;
            }
        }
    }

    pub fn lit_pixels(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_blank(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    /// Coordinates of every lit pixel.
    pub fn lit(&self) -> impl Iterator<Item = Point> + '_ {
        (0..HEIGHT).flat_map(move |y| {
            (0..WIDTH)
                .filter(move |x| self.get(*x, y))
                .map(move |x| Point::new(x as i32, y as i32))
        })
    }

    fn index(x: u32, y: u32) -> Option<(usize, u8)> {
        if x >= WIDTH || y >= HEIGHT {
            return None;
        }
        let bit = (y * WIDTH + x) as usize;
        Some((bit / 8, 0x80 >> (bit % 8)))
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("lit_pixels", &self.lit_pixels())
            .finish()
    }
}

impl OriginDimensions for Frame {
    fn size(&self) -> Size {
        Size::new(WIDTH, HEIGHT)
    }
}

impl DrawTarget for Frame {
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
            self.set(point.x as u32, point.y as u32, color.is_on());
        }
        Ok(())
    }
}
