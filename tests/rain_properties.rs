use glyphrain::surface::DrawCall;
use glyphrain::{Column, GlyphSet, RainConfig, RainEngine, RecordingSurface};

const CELL: u32 = 10;

fn config(seed: u64, reset_chance: f64) -> RainConfig {
    RainConfig {
        col_size: CELL,
        speed_min: 0.4,
        speed_max: 2.5,
        reset_chance,
        seed: Some(seed),
        ..RainConfig::default()
    }
}

#[test]
fn heads_only_move_down_between_resets() {
    for seed in [3, 17, 99] {
        let mut engine = RainEngine::new(config(seed, 0.3), RecordingSurface::new(200, 140));
        let mut previous: Vec<Column> = engine.columns().to_vec();

        for _ in 0..300 {
            engine.tick();
            for (before, after) in previous.iter().zip(engine.columns()) {
                if before.generation() == after.generation() {
                    assert!(
                        after.last_head_row() >= before.last_head_row(),
                        "seed {seed}: last head row went from {} to {}",
                        before.last_head_row(),
                        after.last_head_row()
                    );
                } else {
                    assert_eq!(after.generation(), before.generation() + 1);
                    assert_eq!(after.last_head_row(), -1);
                }
            }
            previous = engine.columns().to_vec();
        }
    }
}

#[test]
fn revealed_glyphs_never_change_until_reset() {
    let mut engine = RainEngine::new(config(5, 0.2), RecordingSurface::new(200, 140));
    let mut previous: Vec<Column> = engine.columns().to_vec();

    for _ in 0..250 {
        engine.tick();
        for (before, after) in previous.iter().zip(engine.columns()) {
            if before.generation() != after.generation() {
                continue;
            }
            for row in 0..before.num_rows() as i64 {
                if let Some(glyph) = before.glyph_at(row) {
                    assert_eq!(after.glyph_at(row), Some(glyph));
                }
            }
        }
        previous = engine.columns().to_vec();
    }
}

#[test]
fn initial_columns_start_above_the_grid_within_speed_range() {
    let engine = RainEngine::new(config(11, 0.3), RecordingSurface::new(640, 480));
    let grid = engine.grid();
    assert_eq!(grid.columns, 64);
    assert_eq!(grid.rows, 50);
    for column in engine.columns() {
        assert!((-(grid.rows as f64)..=0.0).contains(&column.position()));
        assert!((0.4..=2.5).contains(&column.speed()));
        assert_eq!(column.revealed_count(), 0);
    }
}

#[test]
fn drawn_glyphs_come_from_the_set_and_sit_on_the_grid() {
    let mut cfg = config(8, 0.3);
    cfg.glyphs = GlyphSet::new("01");
    let head = cfg.head_color;
    let trail = cfg.trail_color;
    let mut engine = RainEngine::new(cfg, RecordingSurface::new(200, 140));
    for _ in 0..100 {
        engine.tick();
    }

    let mut drawn = 0;
    for (glyph, x, y, color) in engine.surface().glyph_calls() {
        drawn += 1;
        assert!(glyph == '0' || glyph == '1', "unexpected glyph {glyph:?}");
        assert_eq!(x % CELL as i32, 0);
        assert_eq!(y % CELL as i32, 0);
        assert!((0..140).contains(&y), "culled rows must not be drawn");
        assert!(color == head || color == trail);
    }
    assert!(drawn > 0);
}

#[test]
fn columns_without_reset_chance_go_quiet() {
    let mut engine = RainEngine::new(config(2, 0.0), RecordingSurface::new(200, 100));
    // Rows are 12 and positions start >= -12 with speed >= 0.4.
    for _ in 0..80 {
        engine.tick();
    }
    engine.surface_mut().clear();
    let stats = engine.tick();

    assert_eq!(stats.resets, 0);
    assert_eq!(engine.surface().glyph_calls().count(), 0);
    assert_eq!(engine.surface().draw_count(), 1, "only the fade fill remains");
    assert_eq!(engine.surface().calls().last(), Some(&DrawCall::Present));
}

#[test]
fn shrinking_below_one_column_idles_without_drawing() {
    let mut engine = RainEngine::new(config(4, 0.3), RecordingSurface::new(200, 140));
    engine.tick();

    engine.on_resize(CELL - 1, 140);
    assert_eq!(engine.grid().columns, 0);
    engine.surface_mut().clear();

    let stats = engine.tick();
    assert!(stats.idle);
    assert!(engine.surface().calls().is_empty());

    engine.on_resize(200, 140);
    engine.surface_mut().clear();
    assert!(!engine.tick().idle);
    assert!(!engine.surface().calls().is_empty());
}

#[test]
fn zero_sized_surface_idles() {
    let mut engine = RainEngine::new(config(4, 0.3), RecordingSurface::new(0, 0));
    assert!(engine.surface().calls().is_empty());
    assert!(engine.tick().idle);
    assert!(engine.surface().calls().is_empty());
}

#[test]
fn config_change_rebuilds_the_grid() {
    let mut engine = RainEngine::new(config(6, 0.3), RecordingSurface::new(200, 140));
    for _ in 0..20 {
        engine.tick();
    }

    let mut bigger = config(6, 0.3);
    bigger.col_size = 20;
    engine.on_config_change(bigger);

    assert_eq!(engine.grid().columns, 10);
    assert_eq!(engine.grid().rows, 9);
    assert!(engine.columns().iter().all(|column| column.revealed_count() == 0));
}
