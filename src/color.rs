use std::fmt;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Straight (non-premultiplied) RGBA color with channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColorRgba {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA`; the leading `#` is optional.
    pub fn from_hex(raw: &str) -> Result<Self> {
        let digits = raw.trim().trim_start_matches('#');
        if !matches!(digits.len(), 6 | 8) || !digits.is_ascii() {
            bail!("color '{raw}' must be #RRGGBB or #RRGGBBAA");
        }

        let channel = |index: usize| -> Result<f32> {
            let pair = &digits[index * 2..index * 2 + 2];
            u8::from_str_radix(pair, 16)
                .map(|value| f32::from(value) / 255.0)
                .map_err(|_| anyhow!("color '{raw}' has invalid hex digits '{pair}'"))
        };

        Ok(Self {
            r: channel(0)?,
            g: channel(1)?,
            b: channel(2)?,
            a: if digits.len() == 8 { channel(3)? } else { 1.0 },
        })
    }

    pub fn validate(&self, label: &str) -> Result<()> {
        for (channel, value) in [("r", self.r), ("g", self.g), ("b", self.b), ("a", self.a)] {
            if !value.is_finite() {
                bail!("{label}.{channel} must be finite");
            }
            if !(0.0..=1.0).contains(&value) {
                bail!("{label}.{channel} must be within [0, 1], got {value}");
            }
        }
        Ok(())
    }

    /// Clamp every channel into `[0, 1]`; non-finite channels become `fallback`'s.
    pub fn clamped_or(self, fallback: Self) -> Self {
        let fix = |value: f32, fallback: f32| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                fallback
            }
        };
        Self {
            r: fix(self.r, fallback.r),
            g: fix(self.g, fallback.g),
            b: fix(self.b, fallback.b),
            a: fix(self.a, fallback.a),
        }
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        let quantize = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        [
            quantize(self.r),
            quantize(self.g),
            quantize(self.b),
            quantize(self.a),
        ]
    }

    pub fn to_skia(self) -> tiny_skia::Color {
        let [r, g, b, a] = self.to_rgba8();
        tiny_skia::Color::from_rgba8(r, g, b, a)
    }
}

impl fmt::Display for ColorRgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.to_rgba8();
        if a == u8::MAX {
            write!(f, "#{r:02X}{g:02X}{b:02X}")
        } else {
            write!(f, "#{r:02X}{g:02X}{b:02X}{a:02X}")
        }
    }
}

impl Serialize for ColorRgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColor {
    Hex(String),
    Channels(ColorChannels),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ColorChannels {
    r: f32,
    g: f32,
    b: f32,
    #[serde(default = "default_alpha")]
    a: f32,
}

fn default_alpha() -> f32 {
    1.0
}

impl<'de> Deserialize<'de> for ColorRgba {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawColor::deserialize(deserializer)? {
            RawColor::Hex(raw) => Self::from_hex(&raw).map_err(serde::de::Error::custom),
            RawColor::Channels(ColorChannels { r, g, b, a }) => Ok(Self { r, g, b, a }),
        }
    }
}
