//! Color commands submitted by clients
//!
//! Parses the `red=..&green=..&blue=..` form body and applies it through the
//! LED coordinator. Bad input never fails: unreadable fields become 0 and
//! out-of-range values are clamped into `0..=MAX_CHANNEL_VALUE`.

use crate::led_control::StripDriver;
use crate::led_state::LedCoordinator;
use crate::{BoardError, config};
use esp_println::println;
use smart_leds::RGB8;

/// Raw channel values as submitted, before clamping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorCommand {
    pub red: i32,
    pub green: i32,
    pub blue: i32,
}

/// Acknowledgement returned once a color is on the strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorAck {
    pub applied: RGB8,
}

impl ColorAck {
    /// Plain text body sent back to the client
    pub const MESSAGE: &'static str = "Color updated";
}

/// Clamp a submitted channel value into `0..=MAX_CHANNEL_VALUE`
///
/// Negative values floor to 0 rather than wrapping through `u8`.
pub fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, config::MAX_CHANNEL_VALUE as i32) as u8
}

impl ColorCommand {
    pub const fn new(red: i32, green: i32, blue: i32) -> Self {
        Self { red, green, blue }
    }

    /// Parse a `red=<int>&green=<int>&blue=<int>` form body
    ///
    /// Fields are read in that fixed order. Scanning stops at the first
    /// literal or number that does not match, and every field from there on
    /// stays 0. Only the first [`config::MAX_FORM_BODY`] bytes are
    /// considered, and a NUL byte ends the input.
    pub fn from_form(body: &[u8]) -> Self {
        let body = &body[..body.len().min(config::MAX_FORM_BODY)];
        let body = body.split(|&b| b == 0).next().unwrap_or_default();

        let mut command = Self::default();
        let mut rest = body;

        for (literal, field) in [
            (b"red=".as_slice(), &mut command.red),
            (b"&green=".as_slice(), &mut command.green),
            (b"&blue=".as_slice(), &mut command.blue),
        ] {
            let Some(after) = rest.strip_prefix(literal) else {
                break;
            };
            let Some((value, used)) = scan_int(after) else {
                break;
            };
            *field = value;
            rest = &after[used..];
        }

        command
    }

    /// The color that will actually be shown
    pub fn clamped(&self) -> RGB8 {
        RGB8 {
            r: clamp_channel(self.red),
            g: clamp_channel(self.green),
            b: clamp_channel(self.blue),
        }
    }
}

/// Parse an optionally signed decimal prefix, ignoring whatever follows it
///
/// Returns 0 when there are no digits. Saturates instead of overflowing.
pub fn parse_leading_int(text: &[u8]) -> i32 {
    scan_int(text).map(|(value, _)| value).unwrap_or(0)
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | 0x0B | 0x0C | b'\r')
}

/// Leading whitespace, optional sign, at least one digit
///
/// Returns the value and the number of bytes consumed, or `None` when no
/// digits follow.
fn scan_int(text: &[u8]) -> Option<(i32, usize)> {
    let mut at = text.iter().take_while(|&&b| is_space(b)).count();
    let negative = match text.get(at) {
        Some(b'-') => {
            at += 1;
            true
        }
        Some(b'+') => {
            at += 1;
            false
        }
        _ => false,
    };

    let digits = text[at..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }

    let mut value: i32 = 0;
    for &byte in &text[at..at + digits] {
        let digit = (byte - b'0') as i32;
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }

    Some((value, at + digits))
}

/// Clamp and apply a command; the first call permanently stops the animation
pub async fn handle<S>(
    coordinator: &LedCoordinator<S>,
    command: ColorCommand,
) -> Result<ColorAck, BoardError>
where
    S: StripDriver,
{
    let color = command.clamped();
    coordinator.apply_static_color(color).await?;

    println!(
        "[LED] Set color to R: {}, G: {}, B: {} (requested {}, {}, {})",
        color.r, color.g, color.b, command.red, command.green, command.blue
    );

    Ok(ColorAck { applied: color })
}
