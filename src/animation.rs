//! Disco animation
//!
//! Lights a random subset of the strip with rainbow colors every
//! [`config::ANIMATION_INTERVAL_MS`] until a static color takes over.

use crate::led_control::{BLACK, Frame, StripDriver};
use crate::led_state::LedCoordinator;
use crate::{BoardError, config};
use embassy_time::{Duration, Timer};
use esp_println::println;
use smart_leds::RGB8;

/// Colors sampled by the animation, in rainbow order
pub const RAINBOW_PALETTE: [RGB8; 7] = [
    RGB8 { r: 255, g: 0, b: 0 },   // red
    RGB8 { r: 255, g: 127, b: 0 }, // orange
    RGB8 { r: 255, g: 255, b: 0 }, // yellow
    RGB8 { r: 0, g: 255, b: 0 },   // green
    RGB8 { r: 0, g: 0, b: 255 },   // blue
    RGB8 { r: 75, g: 0, b: 130 },  // indigo
    RGB8 { r: 148, g: 0, b: 211 }, // violet
];

/// Source of random numbers for the animation
pub trait RandomSource {
    fn next_u32(&mut self) -> u32;

    /// Value in `0..bound`; `bound` must be non-zero
    fn below(&mut self, bound: usize) -> usize {
        (self.next_u32() % bound as u32) as usize
    }
}

/// Small xorshift generator, seeded once from the hardware RNG at boot
#[derive(Debug, Clone)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    /// A zero seed would get stuck at zero, so it is replaced
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }
}

impl RandomSource for XorShift32 {
    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }
}

/// Palette entry as drawn while animating
pub fn dimmed(color: RGB8) -> RGB8 {
    RGB8 {
        r: color.r % config::ANIMATION_CHANNEL_MODULUS,
        g: color.g % config::ANIMATION_CHANNEL_MODULUS,
        b: color.b % config::ANIMATION_CHANNEL_MODULUS,
    }
}

/// Fill `frame` with the next animation step and return how many pixels are lit
///
/// Picks `k` in `1..=len`, then `k` distinct pixels (duplicates are drawn
/// again), each with a random dimmed palette color. Everything else is black.
pub fn next_frame<R: RandomSource>(rng: &mut R, frame: &mut Frame) -> usize {
    let pixel_count = frame.len();
    let lit = rng.below(pixel_count) + 1;

    let mut chosen = [false; config::PIXEL_COUNT];
    let mut picked = 0;
    while picked < lit {
        let index = rng.below(pixel_count);
        if chosen[index] {
            continue;
        }
        chosen[index] = true;
        picked += 1;
    }

    for (pixel, &on) in frame.iter_mut().zip(chosen.iter()) {
        *pixel = if on {
            dimmed(RAINBOW_PALETTE[rng.below(RAINBOW_PALETTE.len())])
        } else {
            BLACK
        };
    }

    lit
}

/// Run the animation until a static color is applied
///
/// Leaves the strip showing the coordinator's static color. Returns the
/// number of frames that were actually drawn.
pub async fn run<S, R>(coordinator: &LedCoordinator<S>, rng: &mut R) -> Result<u32, BoardError>
where
    S: StripDriver,
    R: RandomSource,
{
    let mut frame = [BLACK; config::PIXEL_COUNT];
    let mut drawn = 0u32;

    println!("[ANIM] Disco animation started");

    while coordinator.is_animation_active() {
        next_frame(rng, &mut frame);
        if coordinator.commit_animation_frame(&frame).await? {
            drawn += 1;
        }
        Timer::after(Duration::from_millis(config::ANIMATION_INTERVAL_MS)).await;
    }

    coordinator.restore_static_color().await?;
    println!("[ANIM] Animation stopped after {} frames", drawn);
    Ok(drawn)
}
