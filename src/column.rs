//! Per-column fall state.

use serde::{Deserialize, Serialize};

use crate::glyphs::GlyphSet;
use crate::rng::RandomSource;

/// Where a column's head goes after it resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reentry {
    /// Random position in `[-rows, 0]`, so re-entries stay staggered.
    #[default]
    Staggered,
    /// Exactly row 0: the column re-enters on the next tick.
    Top,
}

/// One vertical strip of the rain.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    position: f64,
    speed: f64,
    last_head_row: i64,
    revealed: Vec<Option<char>>,
    generation: u64,
}

impl Column {
    pub fn new(position: f64, speed: f64, num_rows: usize) -> Self {
        Self {
            position,
            speed,
            last_head_row: -1,
            revealed: vec![None; num_rows],
            generation: 0,
        }
    }

    /// Fresh column with a random start above the visible area.
    pub fn spawn<R: RandomSource + ?Sized>(
        num_rows: usize,
        speed_min: f64,
        speed_max: f64,
        rng: &mut R,
    ) -> Self {
        let position = rng.range_f64(-(num_rows as f64), 0.0);
        let speed = rng.range_f64(speed_min, speed_max);
        Self::new(position, speed, num_rows)
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn last_head_row(&self) -> i64 {
        self.last_head_row
    }

    /// Number of resets this column has gone through.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn num_rows(&self) -> usize {
        self.revealed.len()
    }

    /// Integer row of the head (floor of the fractional position).
    pub fn head_row(&self) -> i64 {
        self.position.floor() as i64
    }

    /// Glyph already revealed at `row`, if any.
    pub fn glyph_at(&self, row: i64) -> Option<char> {
        let index = usize::try_from(row).ok()?;
        self.revealed.get(index).copied().flatten()
    }

    pub fn revealed_count(&self) -> usize {
        self.revealed.iter().filter(|cell| cell.is_some()).count()
    }

    /// Glyph for `row`, picking one on first reveal. `None` off the grid.
    pub fn reveal<R: RandomSource + ?Sized>(
        &mut self,
        row: i64,
        glyphs: &GlyphSet,
        rng: &mut R,
    ) -> Option<char> {
        let index = usize::try_from(row).ok()?;
        let cell = self.revealed.get_mut(index)?;
        Some(*cell.get_or_insert_with(|| glyphs.random_glyph(rng)))
    }

    /// Rows exposed since the last tick: `[max(0, last_head), head)` clipped to the grid.
    pub fn trail_rows(&self, head: i64) -> std::ops::Range<i64> {
        let start = self.last_head_row.max(0);
        let end = head.min(self.revealed.len() as i64);
        start..end.max(start)
    }

    /// Record the head drawn this tick. Heads above the grid leave it at -1.
    pub(crate) fn set_last_head_row(&mut self, head: i64) {
        self.last_head_row = self.last_head_row.max(head);
    }

    pub(crate) fn advance(&mut self) {
        self.position += self.speed;
    }

    /// `true` once the head has passed the bottom row.
    pub fn is_below_grid(&self) -> bool {
        self.head_row() >= self.revealed.len() as i64
    }

    /// Send the head back above the grid and forget every revealed glyph.
    pub fn reset<R: RandomSource + ?Sized>(&mut self, reentry: Reentry, rng: &mut R) {
        self.position = match reentry {
            Reentry::Staggered => rng.range_f64(-(self.revealed.len() as f64), 0.0),
            Reentry::Top => 0.0,
        };
        self.last_head_row = -1;
        self.revealed.iter_mut().for_each(|cell| *cell = None);
        self.generation += 1;
    }
}

/// Initial state for a whole grid, one column per strip.
pub fn spawn_columns<R: RandomSource + ?Sized>(
    num_cols: usize,
    num_rows: usize,
    speed_min: f64,
    speed_max: f64,
    rng: &mut R,
) -> Vec<Column> {
    (0..num_cols)
        .map(|_| Column::spawn(num_rows, speed_min, speed_max, rng))
        .collect()
}
