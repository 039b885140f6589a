use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::rng::RandomSource;

/// Katakana plus digits, the classic rain alphabet.
pub const DEFAULT_GLYPHS: &str =
    "アイウエオカキクケコサシスセソタチツテトナニヌネノハヒフヘホマミムメモヤユヨラリルレロワヲン0123456789";

/// Ordered, non-empty set of symbols the rain draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphSet {
    symbols: Vec<char>,
}

impl GlyphSet {
    /// Build a set from user text.
    ///
    /// Control characters are dropped. A set that ends up empty or
    /// whitespace-only falls back to [`DEFAULT_GLYPHS`].
    pub fn new(text: &str) -> Self {
        let symbols = text
            .chars()
            .filter(|ch| !ch.is_control())
            .collect::<Vec<_>>();
        if symbols.iter().all(|ch| ch.is_whitespace()) {
            return Self::default();
        }
        Self { symbols }
    }

    /// `true` when `text` would be replaced by the default set.
    pub fn falls_back(text: &str) -> bool {
        text.chars()
            .filter(|ch| !ch.is_control())
            .all(char::is_whitespace)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    #[cfg(test)]
    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    #[cfg(test)]
    pub fn contains(&self, glyph: char) -> bool {
        self.symbols.contains(&glyph)
    }

    /// Uniformly random symbol from the set.
    pub fn random_glyph<R: RandomSource + ?Sized>(&self, rng: &mut R) -> char {
        let index = rng.next_bounded(self.symbols.len().saturating_sub(1));
        self.symbols.get(index).copied().unwrap_or('0')
    }
}

impl Default for GlyphSet {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_GLYPHS.chars().collect(),
        }
    }
}

impl fmt::Display for GlyphSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for symbol in &self.symbols {
            write!(f, "{symbol}")?;
        }
        Ok(())
    }
}

impl Serialize for GlyphSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GlyphSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::new(&text))
    }
}
