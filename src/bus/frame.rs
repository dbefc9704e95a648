use crate::color::Rgb;
use crate::timing::ChipsetTiming3Phase;

/// Order in which a chipset expects the color components on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ColorOrder {
    #[default]
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ColorOrder {
    /// Wire bytes of one pixel
    pub const fn apply(self, color: Rgb) -> [u8; 3] {
        let (r, g, b) = (color.r, color.g, color.b);
        match self {
            Self::Rgb => [r, g, b],
            Self::Rbg => [r, b, g],
            Self::Grb => [g, r, b],
            Self::Gbr => [g, b, r],
            Self::Brg => [b, r, g],
            Self::Bgr => [b, g, r],
        }
    }
}

/// A frame handed to a transmit engine.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub pixels: &'a [Rgb],
    pub color_order: ColorOrder,
    pub timing: &'a ChipsetTiming3Phase,
}

impl<'a> Frame<'a> {
    /// Wire bytes, three per pixel
    pub fn bytes(&self) -> FrameBytes<'a> {
        FrameBytes::new(self.pixels, self.color_order)
    }

    pub const fn byte_len(&self) -> usize {
        self.pixels.len() * 3
    }
}

/// Iterator over the wire bytes of a pixel buffer.
#[derive(Debug, Clone)]
pub struct FrameBytes<'a> {
    pixels: core::slice::Iter<'a, Rgb>,
    order: ColorOrder,
    pending: [u8; 3],
    next: usize,
}

impl<'a> FrameBytes<'a> {
    pub fn new(pixels: &'a [Rgb], order: ColorOrder) -> Self {
        Self {
            pixels: pixels.iter(),
            order,
            pending: [0; 3],
            next: 3,
        }
    }
}

impl Iterator for FrameBytes<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.next == 3 {
            let pixel = self.pixels.next()?;
            self.pending = self.order.apply(*pixel);
            self.next = 0;
        }
        let byte = self.pending[self.next];
        self.next += 1;
        Some(byte)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.pixels.len() * 3 + (3 - self.next);
        (len, Some(len))
    }
}

impl ExactSizeIterator for FrameBytes<'_> {}
