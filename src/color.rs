use smart_leds::RGB8;

/// Pixel type of the externally owned buffers handed to transmit engines
pub type Rgb = RGB8;
