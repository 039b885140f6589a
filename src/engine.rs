//! The rain compositor: owns the columns, the random source and the surface,
//! and advances everything by one tick at a time.

use crate::color::ColorRgba;
use crate::column::{spawn_columns, Column};
use crate::config::RainConfig;
use crate::rng::{RandomSource, XorShift64};
use crate::surface::{Rect, Surface};

/// Columns and rows for a surface; rows include two rows of headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct GridSize {
    pub columns: usize,
    pub rows: usize,
}

impl GridSize {
    pub fn for_surface(width: u32, height: u32, col_size: u32) -> Self {
        if col_size == 0 {
            return Self::default();
        }
        Self {
            columns: (width / col_size) as usize,
            rows: (height / col_size) as usize + 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns == 0 || self.rows == 0
    }
}

/// What one tick did. Purely informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickStats {
    /// Nothing was drawn: zero columns or a zero-sized surface.
    pub idle: bool,
    pub trail_cells: usize,
    pub head_cells: usize,
    /// Cells revealed this tick whose band lies fully outside the raster.
    pub culled_cells: usize,
    pub resets: usize,
}

pub struct RainEngine<S, R = XorShift64> {
    config: RainConfig,
    surface: S,
    rng: R,
    grid: GridSize,
    columns: Vec<Column>,
    ticks: u64,
}

impl<S: Surface> RainEngine<S, XorShift64> {
    /// Engine seeded from `config.seed`, or from entropy when unset.
    pub fn new(config: RainConfig, surface: S) -> Self {
        let rng = seeded_rng(config.seed);
        Self::with_rng(config, surface, rng)
    }

    /// Swap in a fresh generator (pinned seed or entropy) and start over.
    pub fn reseed(&mut self, seed: Option<u64>) {
        self.rng = seeded_rng(seed);
        self.reinitialize();
    }

    /// Replace the configuration and the generator seeded from its `seed`,
    /// then rebuild once.
    pub fn on_config_change_reseeded(&mut self, config: RainConfig) {
        self.rng = seeded_rng(config.seed);
        self.on_config_change(config);
    }
}

fn seeded_rng(seed: Option<u64>) -> XorShift64 {
    match seed {
        Some(seed) => XorShift64::from_seed(seed),
        None => XorShift64::from_entropy(),
    }
}

impl<S: Surface, R: RandomSource> RainEngine<S, R> {
    pub fn with_rng(config: RainConfig, surface: S, rng: R) -> Self {
        let mut engine = Self {
            config: config.sanitized(),
            surface,
            rng,
            grid: GridSize::default(),
            columns: Vec::new(),
            ticks: 0,
        };
        engine.reinitialize();
        engine
    }

    pub fn config(&self) -> &RainConfig {
        &self.config
    }

    pub fn grid(&self) -> GridSize {
        self.grid
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Ticks that actually drew something since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Resize the surface and rebuild all state for it.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.surface.resize(width, height);
        self.reinitialize();
    }

    /// Replace the configuration and rebuild all state. Nothing is patched in place.
    pub fn on_config_change(&mut self, config: RainConfig) {
        self.config = config.sanitized();
        self.reinitialize();
    }

    /// Fresh columns for the current surface size, raster cleared to the background.
    pub fn reinitialize(&mut self) {
        let (width, height) = self.surface.size();
        self.grid = GridSize::for_surface(width, height, self.config.col_size);
        self.columns = spawn_columns(
            self.grid.columns,
            self.grid.rows,
            self.config.speed_min,
            self.config.speed_max,
            &mut self.rng,
        );

        if width > 0 && height > 0 {
            self.surface.fill_rect(
                Rect::from_size(width, height),
                self.config.background_color,
                1.0,
            );
        }

        tracing::debug!(
            width,
            height,
            columns = self.grid.columns,
            rows = self.grid.rows,
            "rain grid initialized"
        );
    }

    /// Advance the rain by one frame and present it.
    pub fn tick(&mut self) -> TickStats {
        let (width, height) = self.surface.size();
        if self.grid.is_empty() || width == 0 || height == 0 {
            return TickStats {
                idle: true,
                ..TickStats::default()
            };
        }

        let config = &self.config;
        let cell = config.col_size;
        let rows = self.grid.rows as i64;
        let mut stats = TickStats::default();

        self.surface.fill_rect(
            Rect::from_size(width, height),
            config.background_color,
            config.fade_alpha,
        );

        for (index, column) in self.columns.iter_mut().enumerate() {
            let x = index as i64 * i64::from(cell);
            let head = column.head_row();

            for row in column.trail_rows(head) {
                if let Some(glyph) = column.reveal(row, &config.glyphs, &mut self.rng) {
                    if draw_cell(&mut self.surface, glyph, x, row, cell, height, config.trail_color) {
                        stats.trail_cells += 1;
                    } else {
                        stats.culled_cells += 1;
                    }
                }
            }

            if head >= 0 && head < rows {
                if let Some(glyph) = column.reveal(head, &config.glyphs, &mut self.rng) {
                    if draw_cell(&mut self.surface, glyph, x, head, cell, height, config.head_color) {
                        stats.head_cells += 1;
                    } else {
                        stats.culled_cells += 1;
                    }
                }
            }

            column.set_last_head_row(head);
            column.advance();

            if column.is_below_grid() && self.rng.chance(config.reset_chance) {
                column.reset(config.reentry, &mut self.rng);
                stats.resets += 1;
            }
        }

        self.surface.present();
        self.ticks += 1;
        tracing::trace!(
            tick = self.ticks,
            trail = stats.trail_cells,
            heads = stats.head_cells,
            resets = stats.resets,
            "rain tick"
        );
        stats
    }
}

/// Draw one cell unless its band lies fully below the raster. Returns whether it drew.
fn draw_cell<S: Surface>(
    surface: &mut S,
    glyph: char,
    x: i64,
    row: i64,
    cell: u32,
    height: u32,
    color: ColorRgba,
) -> bool {
    let y = row * i64::from(cell);
    if y >= i64::from(height) || y + i64::from(cell) <= 0 {
        return false;
    }
    let (Ok(x), Ok(y)) = (i32::try_from(x), i32::try_from(y)) else {
        return false;
    };
    surface.draw_glyph(glyph, x, y, color, cell);
    true
}

#[cfg(test)]
mod tests {
    use super::{GridSize, RainEngine};
    use crate::column::{Column, Reentry};
    use crate::config::RainConfig;
    use crate::rng::XorShift64;
    use crate::surface::{DrawCall, RecordingSurface};

    const CELL: u32 = 10;

    fn single_column_config(reset_chance: f64) -> RainConfig {
        RainConfig {
            col_size: CELL,
            speed_min: 1.0,
            speed_max: 1.0,
            reset_chance,
            ..RainConfig::default()
        }
    }

    /// One column, five rows (three visible plus headroom), head at row 0.
    fn single_column_engine(reset_chance: f64) -> RainEngine<RecordingSurface> {
        let surface = RecordingSurface::new(CELL, 3 * CELL);
        let mut engine =
            RainEngine::with_rng(single_column_config(reset_chance), surface, XorShift64::from_seed(5));
        assert_eq!(engine.grid(), GridSize { columns: 1, rows: 5 });
        engine.columns[0] = Column::new(0.0, 1.0, 5);
        engine.surface_mut().clear();
        engine
    }

    fn glyph_rows(engine: &RainEngine<RecordingSurface>) -> Vec<(i32, bool)> {
        let head_color = engine.config().head_color;
        engine
            .surface()
            .glyph_calls()
            .map(|(_, _, y, color)| (y / CELL as i32, color == head_color))
            .collect()
    }

    #[test]
    fn grid_size_adds_two_rows_of_headroom() {
        assert_eq!(GridSize::for_surface(100, 50, 14), GridSize { columns: 7, rows: 5 });
        assert_eq!(GridSize::for_surface(13, 50, 14).columns, 0);
        assert!(GridSize::for_surface(10, 10, 0).is_empty());
    }

    #[test]
    fn first_tick_draws_only_the_head() {
        let mut engine = single_column_engine(1.0);
        let stats = engine.tick();

        assert_eq!(stats.head_cells, 1);
        assert_eq!(stats.trail_cells, 0);
        assert_eq!(glyph_rows(&engine), vec![(0, true)]);
        assert_eq!(engine.columns()[0].position(), 1.0);
        assert_eq!(engine.columns()[0].last_head_row(), 0);
    }

    #[test]
    fn later_ticks_redraw_the_previous_head_as_trail() {
        let mut engine = single_column_engine(1.0);
        engine.tick();
        let head_glyph = engine.columns()[0].glyph_at(0);
        engine.surface_mut().clear();

        engine.tick();
        assert_eq!(glyph_rows(&engine), vec![(0, false), (1, true)]);
        assert_eq!(engine.columns()[0].glyph_at(0), head_glyph);
    }

    #[test]
    fn certain_reset_fires_on_the_tick_that_passes_the_bottom() {
        let mut engine = single_column_engine(1.0);
        for _ in 0..4 {
            let stats = engine.tick();
            assert_eq!(stats.resets, 0);
        }
        assert_eq!(engine.columns()[0].position(), 4.0);

        let stats = engine.tick();
        assert_eq!(stats.resets, 1);
        // Row 4 is headroom below the 30px raster, so its head is culled.
        assert_eq!(stats.culled_cells, 2);

        let column = &engine.columns()[0];
        assert!((-5.0..=0.0).contains(&column.position()));
        assert_eq!(column.last_head_row(), -1);
        assert_eq!(column.revealed_count(), 0);
        assert_eq!(column.generation(), 1);
    }

    #[test]
    fn zero_reset_chance_leaves_the_column_frozen_below() {
        let mut engine = single_column_engine(0.0);
        // Tick 6 still walks the last headroom row as trail; after that nothing is left.
        for _ in 0..6 {
            engine.tick();
        }
        engine.surface_mut().clear();

        for _ in 0..50 {
            let stats = engine.tick();
            assert_eq!(stats.resets, 0);
            assert_eq!(stats.head_cells + stats.trail_cells + stats.culled_cells, 0);
        }
        assert_eq!(engine.columns()[0].position(), 56.0);
        assert_eq!(engine.surface().glyph_calls().count(), 0);
    }

    #[test]
    fn top_reentry_restarts_at_row_zero() {
        let mut config = single_column_config(1.0);
        config.reentry = Reentry::Top;
        let mut engine = single_column_engine(1.0);
        engine.on_config_change(config);
        engine.columns[0] = Column::new(4.0, 1.0, 5);
        engine.tick();
        assert_eq!(engine.columns()[0].position(), 0.0);
    }

    #[test]
    fn tick_fades_before_drawing_and_presents_last() {
        let mut engine = single_column_engine(1.0);
        engine.tick();
        let calls = engine.surface().calls();
        match calls.first() {
            Some(DrawCall::Fill { alpha, .. }) => assert_eq!(*alpha, engine.config().fade_alpha),
            other => panic!("expected fade fill first, got {other:?}"),
        }
        assert_eq!(calls.last(), Some(&DrawCall::Present));
    }

    #[test]
    fn fast_columns_reveal_every_skipped_row() {
        let mut engine = single_column_engine(0.0);
        engine.columns[0] = Column::new(0.0, 2.5, 5);
        engine.tick();
        engine.tick();
        // Head went 0 -> 2; rows 0 and 1 are trail, row 2 is the head.
        assert_eq!(engine.columns()[0].revealed_count(), 3);
    }

    #[test]
    fn narrow_surface_is_idle() {
        let mut engine = single_column_engine(1.0);
        engine.on_resize(CELL - 1, 100);
        engine.surface_mut().clear();

        let stats = engine.tick();
        assert!(stats.idle);
        assert!(engine.surface().calls().is_empty());
        assert_eq!(engine.ticks(), 0);
    }

    #[test]
    fn resize_rebuilds_columns_for_new_size() {
        let mut engine = single_column_engine(1.0);
        engine.on_resize(CELL * 4, CELL * 6);
        assert_eq!(engine.grid(), GridSize { columns: 4, rows: 8 });
        assert_eq!(engine.columns().len(), 4);
        assert!(engine.columns().iter().all(|column| column.num_rows() == 8));
    }

    #[test]
    fn reinitialize_clears_raster_to_background() {
        let mut engine = single_column_engine(1.0);
        engine.on_resize(CELL * 2, CELL * 2);
        match engine.surface().calls() {
            [DrawCall::Fill { alpha, color, .. }] => {
                assert_eq!(*alpha, 1.0);
                assert_eq!(*color, engine.config().background_color);
            }
            other => panic!("expected a single opaque clear, got {other:?}"),
        }
    }

    #[test]
    fn reseeded_config_change_matches_a_fresh_engine() {
        let mut engine = RainEngine::new(
            RainConfig {
                seed: Some(1),
                ..RainConfig::default()
            },
            RecordingSurface::new(200, 100),
        );
        engine.surface_mut().clear();

        let next = RainConfig {
            seed: Some(9),
            col_size: 20,
            ..RainConfig::default()
        };
        engine.on_config_change_reseeded(next.clone());
        let fresh = RainEngine::new(next, RecordingSurface::new(200, 100));

        assert_eq!(engine.columns(), fresh.columns());
        assert_eq!(engine.surface().calls().len(), 1, "grid should be rebuilt once");
    }
}
