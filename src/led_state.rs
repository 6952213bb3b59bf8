//! LED state coordinator
//!
//! Owns the strip, the last committed static color and the animation flag.
//! The animation task and the HTTP workers only ever touch the strip through
//! this type, so a frame is always written and refreshed under one lock.

use crate::BoardError;
use crate::color_command::clamp_channel;
use crate::led_control::{BLACK, Frame, StripDriver};
use core::sync::atomic::{AtomicBool, Ordering};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use esp_println::println;
use smart_leds::RGB8;

struct StripState<S> {
    strip: S,
    current_color: RGB8,
}

/// Shared LED state, created once at boot and handed out as `&'static`
pub struct LedCoordinator<S>
where
    S: StripDriver,
{
    /// Only ever goes from `true` to `false`
    animation_active: AtomicBool,
    state: Mutex<CriticalSectionRawMutex, StripState<S>>,
}

impl<S> LedCoordinator<S>
where
    S: StripDriver,
{
    /// Wrap a strip; animation starts out active and the static color is black
    pub fn new(strip: S) -> Self {
        Self {
            animation_active: AtomicBool::new(true),
            state: Mutex::new(StripState {
                strip,
                current_color: BLACK,
            }),
        }
    }

    /// Whether the animation is still allowed to draw
    pub fn is_animation_active(&self) -> bool {
        self.animation_active.load(Ordering::Acquire)
    }

    /// Last committed static color
    pub async fn current_color(&self) -> RGB8 {
        self.state.lock().await.current_color
    }

    /// Show a solid color and stop the animation for good
    ///
    /// Each channel is clamped to `0..=MAX_CHANNEL_VALUE` first; the clamped
    /// color is what gets stored and shown.
    pub async fn apply_static_color(&self, color: RGB8) -> Result<(), BoardError> {
        let color = RGB8 {
            r: clamp_channel(color.r as i32),
            g: clamp_channel(color.g as i32),
            b: clamp_channel(color.b as i32),
        };
        let mut state = self.state.lock().await;

        state.current_color = color;
        // Plain load/store: the C3 has no atomic swap, and every writer holds the lock here
        if self.animation_active.load(Ordering::Acquire) {
            self.animation_active.store(false, Ordering::Release);
            println!("[LED] Static color override, animation disabled");
        }

        state.strip.fill(color)?;
        state.strip.refresh()
    }

    /// Write a full frame and refresh
    pub async fn commit_frame(&self, frame: &Frame) -> Result<(), BoardError> {
        let mut state = self.state.lock().await;
        state.strip.set_frame(frame)?;
        state.strip.refresh()
    }

    /// Write an animation frame unless a static color took over meanwhile
    ///
    /// Returns `false` when the frame was dropped.
    pub async fn commit_animation_frame(&self, frame: &Frame) -> Result<bool, BoardError> {
        let mut state = self.state.lock().await;

        // Checked under the lock: a static color applied after the caller's own
        // check must stay the last thing written to the strip.
        if !self.is_animation_active() {
            return Ok(false);
        }

        state.strip.set_frame(frame)?;
        state.strip.refresh()?;
        Ok(true)
    }

    /// Redraw the strip with the current static color
    pub async fn restore_static_color(&self) -> Result<(), BoardError> {
        let mut state = self.state.lock().await;
        let color = state.current_color;
        state.strip.fill(color)?;
        state.strip.refresh()
    }

    /// Run a closure against the strip while holding the lock
    pub async fn with_strip<T>(&self, f: impl FnOnce(&mut S) -> T) -> T {
        let mut state = self.state.lock().await;
        f(&mut state.strip)
    }
}
