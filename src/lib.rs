pub mod clock;
pub mod color;
pub mod column;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod error_codes;
pub mod glyphs;
pub mod painter;
#[cfg(feature = "play")]
pub mod play;
pub mod rng;
pub mod surface;

pub use color::ColorRgba;
pub use column::{Column, Reentry};
pub use config::{load_config, RainConfig, RainConfigFile};
pub use engine::{GridSize, RainEngine, TickStats};
pub use glyphs::GlyphSet;
pub use painter::GlyphPainter;
pub use rng::{RandomSource, XorShift64};
pub use surface::{PixmapSurface, RecordingSurface, Surface};

/// FNV-1a over a byte buffer; stable frame fingerprints for tests and `render`.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
