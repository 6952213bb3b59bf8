//! WS2812 strip driver
//!
//! Keeps an in-memory framebuffer and pushes it to the LEDs through the RMT
//! peripheral when refreshed.

use crate::{BoardError, config};
use alloc::vec::Vec;
use esp_hal::gpio::Level;
use esp_hal::rmt::{PulseCode, TxChannel};
use esp_println::println;
use smart_leds::RGB8;

/// All channels off
pub const BLACK: RGB8 = RGB8 { r: 0, g: 0, b: 0 };

/// One color per pixel, index 0 is the pixel closest to the data pin
pub type Frame = [RGB8; config::PIXEL_COUNT];

/// Minimal contract the rest of the firmware needs from an LED strip
pub trait StripDriver {
    /// Number of addressable pixels
    fn pixel_count(&self) -> usize;

    /// Stage a pixel color; nothing is visible until [`StripDriver::refresh`]
    fn set_pixel(&mut self, index: usize, color: RGB8) -> Result<(), BoardError>;

    /// Push all staged pixels to the hardware
    fn refresh(&mut self) -> Result<(), BoardError>;

    /// Stage the whole strip at once
    fn set_frame(&mut self, frame: &[RGB8]) -> Result<(), BoardError> {
        if frame.len() != self.pixel_count() {
            return Err(BoardError::LedError);
        }
        for (index, color) in frame.iter().enumerate() {
            self.set_pixel(index, *color)?;
        }
        Ok(())
    }

    /// Stage every pixel with the same color
    fn fill(&mut self, color: RGB8) -> Result<(), BoardError> {
        for index in 0..self.pixel_count() {
            self.set_pixel(index, color)?;
        }
        Ok(())
    }
}

/// WS2812 strip on an RMT transmit channel
pub struct Ws2812Strip<TX>
where
    TX: TxChannel,
{
    channel: Option<TX>,
    framebuffer: Frame,
}

impl<TX> Ws2812Strip<TX>
where
    TX: TxChannel,
{
    /// Create a new strip driver, all pixels off
    pub fn new(channel: TX) -> Self {
        Self {
            channel: Some(channel),
            framebuffer: [BLACK; config::PIXEL_COUNT],
        }
    }

    /// Turn every LED off immediately
    pub fn clear(&mut self) -> Result<(), BoardError> {
        self.fill(BLACK)?;
        self.refresh()
    }

    fn transmit(&mut self, pulses: &[u32]) -> Result<(), BoardError> {
        let channel = self.channel.take().ok_or(BoardError::LedError)?;

        let transaction = match channel.transmit(pulses) {
            Ok(transaction) => transaction,
            Err(e) => {
                println!("[LED] RMT transmit failed: {:?}", e);
                return Err(BoardError::LedError);
            }
        };

        match transaction.wait() {
            Ok(channel) => {
                self.channel = Some(channel);
                Ok(())
            }
            Err((e, channel)) => {
                // The channel is handed back even on failure, so the next frame can still go out
                self.channel = Some(channel);
                println!("[LED] RMT transaction failed: {:?}", e);
                Err(BoardError::LedError)
            }
        }
    }
}

impl<TX> StripDriver for Ws2812Strip<TX>
where
    TX: TxChannel,
{
    fn pixel_count(&self) -> usize {
        self.framebuffer.len()
    }

    fn set_pixel(&mut self, index: usize, color: RGB8) -> Result<(), BoardError> {
        let pixel = self
            .framebuffer
            .get_mut(index)
            .ok_or(BoardError::LedError)?;
        *pixel = color;
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), BoardError> {
        let pulses = frame_to_pulses(&self.framebuffer);
        self.transmit(&pulses)
    }
}

/// Encode a frame as RMT pulses: GRB byte order, MSB first, then a reset pulse
pub fn frame_to_pulses(frame: &[RGB8]) -> Vec<u32> {
    let mut pulses = Vec::with_capacity(frame.len() * 24 + 1);
    for color in frame {
        for byte in [color.g, color.r, color.b] {
            pulses.extend_from_slice(&byte_to_pulses(byte));
        }
    }

    // Reset: 80us low at 10MHz, zero-length second half ends the transmission
    pulses.push(PulseCode::new(Level::Low, 800, Level::Low, 0));
    pulses
}

/// Convert a single byte to RMT pulses
/// Uses WS2812 timing at 10MHz: 1-bit = 9 high + 3 low cycles, 0-bit = 3 high + 9 low cycles
fn byte_to_pulses(byte: u8) -> [u32; 8] {
    let mut pulses = [0u32; 8];

    for (i, pulse) in pulses.iter_mut().enumerate() {
        let bit = (byte >> (7 - i)) & 1;
        *pulse = if bit == 1 {
            // 900ns high + 300ns low
            PulseCode::new(Level::High, 9, Level::Low, 3)
        } else {
            // 300ns high + 900ns low
            PulseCode::new(Level::High, 3, Level::Low, 9)
        };
    }

    pulses
}
