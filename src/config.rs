//! Rain configuration: the YAML file format, its resolution into an immutable
//! [`RainConfig`], and `--set key=value` overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::color::ColorRgba;
use crate::column::Reentry;
use crate::error_codes::{CodedError, CONFIG_INVALID, CONFIG_PARSE_FAILED, CONFIG_READ_FAILED};
use crate::glyphs::GlyphSet;

pub const DEFAULT_COL_SIZE: u32 = 14;
/// Cells are cached as `col_size²` masks per glyph, so the size is capped.
pub const COL_SIZE_MAX: u32 = 256;
pub const DEFAULT_SPEED: f64 = 1.25;
pub const DEFAULT_TRAIL_LENGTH: f64 = 12.0;
pub const DEFAULT_RESET_CHANCE: f64 = 0.3;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 50;
pub const DEFAULT_TRAIL_COLOR: ColorRgba = ColorRgba::rgb(0.0, 0.65, 0.0);
pub const DEFAULT_HEAD_COLOR: ColorRgba = ColorRgba::rgb(0.9, 1.0, 0.9);
pub const DEFAULT_BACKGROUND_COLOR: ColorRgba = ColorRgba::BLACK;

/// `speed_min = speed * 0.4`, `speed_max = speed * 1.6`.
pub const SPEED_MIN_FACTOR: f64 = 0.4;
pub const SPEED_MAX_FACTOR: f64 = 1.6;

/// `fade_alpha = 0.16 - trail_length * 0.01`.
pub const FADE_ALPHA_BASE: f64 = 0.16;
pub const FADE_ALPHA_PER_TRAIL_STEP: f64 = 0.01;
pub const TRAIL_LENGTH_MIN: f64 = 1.0;
pub const TRAIL_LENGTH_MAX: f64 = 15.0;

/// Configuration file as written by a user. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RainConfigFile {
    #[serde(default)]
    pub col_size: Option<u32>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub speed_min: Option<f64>,
    #[serde(default)]
    pub speed_max: Option<f64>,
    #[serde(default)]
    pub trail_length: Option<f64>,
    #[serde(default)]
    pub fade_alpha: Option<f32>,
    #[serde(default)]
    pub trail_color: Option<ColorRgba>,
    #[serde(default)]
    pub head_color: Option<ColorRgba>,
    #[serde(default)]
    pub background_color: Option<ColorRgba>,
    #[serde(default)]
    pub glyphs: Option<String>,
    #[serde(default)]
    pub reset_chance: Option<f64>,
    #[serde(default)]
    pub reentry: Option<Reentry>,
    #[serde(default)]
    pub frame_interval_ms: Option<u64>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub font: Option<FontSource>,
}

/// TrueType/OpenType font used to rasterize glyphs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FontSource {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Fully resolved configuration consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RainConfig {
    pub col_size: u32,
    pub speed_min: f64,
    pub speed_max: f64,
    pub fade_alpha: f32,
    pub trail_color: ColorRgba,
    pub head_color: ColorRgba,
    pub background_color: ColorRgba,
    pub glyphs: GlyphSet,
    pub reset_chance: f64,
    pub reentry: Reentry,
    pub frame_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<FontSource>,
}

impl Default for RainConfig {
    fn default() -> Self {
        Self {
            col_size: DEFAULT_COL_SIZE,
            speed_min: DEFAULT_SPEED * SPEED_MIN_FACTOR,
            speed_max: DEFAULT_SPEED * SPEED_MAX_FACTOR,
            fade_alpha: fade_alpha_for_trail_length(DEFAULT_TRAIL_LENGTH),
            trail_color: DEFAULT_TRAIL_COLOR,
            head_color: DEFAULT_HEAD_COLOR,
            background_color: DEFAULT_BACKGROUND_COLOR,
            glyphs: GlyphSet::default(),
            reset_chance: DEFAULT_RESET_CHANCE,
            reentry: Reentry::default(),
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            seed: None,
            font: None,
        }
    }
}

impl RainConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    /// Copy with every value forced into a range the engine can run with.
    ///
    /// Hand-built configs skip [`RainConfigFile::resolve`]; the engine runs
    /// them through this instead of failing.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let finite_or = |value: f64, fallback: f64| {
            if value.is_finite() {
                value
            } else {
                fallback
            }
        };

        let speed_a = finite_or(self.speed_min, defaults.speed_min).max(0.0);
        let speed_b = finite_or(self.speed_max, defaults.speed_max).max(0.0);
        let fade_alpha = if self.fade_alpha.is_finite() {
            self.fade_alpha.clamp(0.0, 1.0)
        } else {
            defaults.fade_alpha
        };

        Self {
            col_size: self.col_size.clamp(1, COL_SIZE_MAX),
            speed_min: speed_a.min(speed_b),
            speed_max: speed_a.max(speed_b),
            fade_alpha,
            trail_color: self.trail_color.clamped_or(defaults.trail_color),
            head_color: self.head_color.clamped_or(defaults.head_color),
            background_color: self.background_color.clamped_or(defaults.background_color),
            glyphs: if self.glyphs.is_empty() {
                defaults.glyphs
            } else {
                self.glyphs.clone()
            },
            reset_chance: finite_or(self.reset_chance, defaults.reset_chance).clamp(0.0, 1.0),
            reentry: self.reentry,
            frame_interval_ms: self.frame_interval_ms.max(1),
            seed: self.seed,
            font: self.font.clone(),
        }
    }
}

pub fn fade_alpha_for_trail_length(trail_length: f64) -> f32 {
    (FADE_ALPHA_BASE - trail_length * FADE_ALPHA_PER_TRAIL_STEP) as f32
}

impl RainConfigFile {
    /// Fill in defaults, derive the speed range and fade alpha, validate.
    ///
    /// Relative font paths are resolved against `base_dir`.
    pub fn resolve(self, base_dir: &Path) -> Result<RainConfig> {
        self.resolve_inner(base_dir)
            .map_err(|error| CodedError::config(CONFIG_INVALID, format!("{error:#}")).into())
    }

    fn resolve_inner(self, base_dir: &Path) -> Result<RainConfig> {
        let col_size = self.col_size.unwrap_or(DEFAULT_COL_SIZE);
        if !(1..=COL_SIZE_MAX).contains(&col_size) {
            bail!("col_size must be in 1..={COL_SIZE_MAX}, got {col_size}");
        }

        let (speed_min, speed_max) = match (self.speed, self.speed_min, self.speed_max) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                bail!("speed cannot be combined with speed_min/speed_max")
            }
            (Some(speed), None, None) => {
                require_finite("speed", speed)?;
                if speed <= 0.0 {
                    bail!("speed must be > 0, got {speed}");
                }
                (speed * SPEED_MIN_FACTOR, speed * SPEED_MAX_FACTOR)
            }
            (None, min, max) => (
                min.unwrap_or(DEFAULT_SPEED * SPEED_MIN_FACTOR),
                max.unwrap_or(DEFAULT_SPEED * SPEED_MAX_FACTOR),
            ),
        };
        require_finite("speed_min", speed_min)?;
        require_finite("speed_max", speed_max)?;
        if speed_min <= 0.0 {
            bail!("speed_min must be > 0, got {speed_min}");
        }
        if speed_min > speed_max {
            bail!("speed_min ({speed_min}) must be <= speed_max ({speed_max})");
        }

        let fade_alpha = match (self.fade_alpha, self.trail_length) {
            (Some(_), Some(_)) => bail!("fade_alpha cannot be combined with trail_length"),
            (Some(alpha), None) => alpha,
            (None, trail_length) => {
                let trail_length = trail_length.unwrap_or(DEFAULT_TRAIL_LENGTH);
                require_finite("trail_length", trail_length)?;
                if !(TRAIL_LENGTH_MIN..=TRAIL_LENGTH_MAX).contains(&trail_length) {
                    bail!(
                        "trail_length must be within [{TRAIL_LENGTH_MIN}, {TRAIL_LENGTH_MAX}], got {trail_length}"
                    );
                }
                fade_alpha_for_trail_length(trail_length)
            }
        };
        if !fade_alpha.is_finite() || fade_alpha <= 0.0 || fade_alpha > 1.0 {
            bail!("fade_alpha must be within (0, 1], got {fade_alpha}");
        }

        let reset_chance = self.reset_chance.unwrap_or(DEFAULT_RESET_CHANCE);
        require_finite("reset_chance", reset_chance)?;
        if !(0.0..=1.0).contains(&reset_chance) {
            bail!("reset_chance must be within [0, 1], got {reset_chance}");
        }

        let frame_interval_ms = self.frame_interval_ms.unwrap_or(DEFAULT_FRAME_INTERVAL_MS);
        if frame_interval_ms == 0 {
            bail!("frame_interval_ms must be >= 1");
        }

        let trail_color = self.trail_color.unwrap_or(DEFAULT_TRAIL_COLOR);
        let head_color = self.head_color.unwrap_or(DEFAULT_HEAD_COLOR);
        let background_color = self.background_color.unwrap_or(DEFAULT_BACKGROUND_COLOR);
        trail_color.validate("trail_color")?;
        head_color.validate("head_color")?;
        background_color.validate("background_color")?;

        let glyphs = match self.glyphs.as_deref() {
            Some(text) => {
                if GlyphSet::falls_back(text) {
                    tracing::warn!("glyphs is empty or whitespace-only; using the default set");
                }
                GlyphSet::new(text)
            }
            None => GlyphSet::default(),
        };

        let font = self
            .font
            .map(|font| resolve_font_source(font, base_dir))
            .transpose()?;

        Ok(RainConfig {
            col_size,
            speed_min,
            speed_max,
            fade_alpha,
            trail_color,
            head_color,
            background_color,
            glyphs,
            reset_chance,
            reentry: self.reentry.unwrap_or_default(),
            frame_interval_ms,
            seed: self.seed,
            font,
        })
    }
}

fn require_finite(label: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        bail!("{label} must be finite");
    }
    Ok(())
}

fn resolve_font_source(font: FontSource, base_dir: &Path) -> Result<FontSource> {
    let path = if font.path.is_absolute() {
        font.path
    } else {
        base_dir.join(&font.path)
    };

    if !path.is_file() {
        bail!("font.path does not exist or is not a file: {}", path.display());
    }

    if let Some(digest) = &font.sha256 {
        if digest.len() != 64 || !digest.chars().all(|ch| ch.is_ascii_hexdigit()) {
            bail!("font.sha256 must be 64 hex characters");
        }
    }

    Ok(FontSource {
        path,
        sha256: font.sha256.map(|digest| digest.to_ascii_lowercase()),
    })
}

/// One `--set key=value` override. The value is parsed as a YAML scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigOverride {
    pub key: String,
    pub value: Value,
}

impl ConfigOverride {
    pub fn parse(raw: &str) -> Result<Self> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("override '{raw}' must look like key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("override '{raw}' has an empty key");
        }

        let value = serde_yaml::from_str::<Value>(value.trim())
            .with_context(|| format!("override '{raw}' has an unparseable value"))?;
        Ok(Self {
            key: key.to_owned(),
            value,
        })
    }
}

pub fn load_config(path: &Path) -> Result<RainConfig> {
    load_config_with_overrides(path, &[])
}

pub fn load_config_with_overrides(path: &Path, overrides: &[ConfigOverride]) -> Result<RainConfig> {
    let contents = fs::read_to_string(path).map_err(|error| {
        CodedError::config(
            CONFIG_READ_FAILED,
            format!("failed to read config {}: {error}", path.display()),
        )
    })?;
    let base_dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    parse_config_str(&contents, &base_dir, overrides)
        .with_context(|| format!("invalid rain config {}", path.display()))
}

/// Config file when given, built-in defaults otherwise; overrides apply to both.
pub fn load_config_or_default(path: Option<&Path>, overrides: &[ConfigOverride]) -> Result<RainConfig> {
    match path {
        Some(path) => load_config_with_overrides(path, overrides),
        None => parse_config_str("", Path::new("."), overrides),
    }
}

/// Parse config text. `base_dir` anchors relative paths inside it.
pub fn parse_config_str(
    contents: &str,
    base_dir: &Path,
    overrides: &[ConfigOverride],
) -> Result<RainConfig> {
    let document = serde_yaml::from_str::<Value>(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        CodedError::config(
            CONFIG_PARSE_FAILED,
            format!("failed to parse yaml at {location}: {error}"),
        )
    })?;

    let mut mapping = match document {
        Value::Mapping(mapping) => mapping,
        Value::Null => Mapping::new(),
        other => {
            return Err(CodedError::config(
                CONFIG_PARSE_FAILED,
                format!("config must be a mapping of options, got {}", value_kind(&other)),
            )
            .into())
        }
    };

    for entry in overrides {
        mapping.insert(Value::String(entry.key.clone()), entry.value.clone());
    }

    let file: RainConfigFile = serde_yaml::from_value(Value::Mapping(mapping))
        .map_err(|error| CodedError::config(CONFIG_PARSE_FAILED, error.to_string()))?;
    file.resolve(base_dir)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{
        load_config_or_default, parse_config_str, ConfigOverride, RainConfig, COL_SIZE_MAX,
        DEFAULT_FRAME_INTERVAL_MS,
    };
    use crate::column::Reentry;
    use crate::error_codes::{find_coded_error, CONFIG_INVALID, CONFIG_PARSE_FAILED};
    use crate::glyphs::GlyphSet;

    fn parse(text: &str) -> anyhow::Result<RainConfig> {
        parse_config_str(text, Path::new("."), &[])
    }

    fn error_code(text: &str) -> &'static str {
        let error = parse(text).expect_err("config should be rejected");
        find_coded_error(&error).expect("error should be coded").code
    }

    #[test]
    fn empty_document_resolves_to_defaults() {
        let config = parse("").expect("empty config should resolve");
        assert_eq!(config, RainConfig::default());
        assert_eq!(config.col_size, 14);
        assert!((config.speed_min - 0.5).abs() < 1e-9);
        assert!((config.speed_max - 2.0).abs() < 1e-9);
        assert!((config.fade_alpha - 0.04).abs() < 1e-6);
        assert_eq!(config.frame_interval_ms, DEFAULT_FRAME_INTERVAL_MS);
    }

    #[test]
    fn single_speed_derives_range() {
        let config = parse("speed: 2.0").expect("config should resolve");
        assert!((config.speed_min - 0.8).abs() < 1e-9);
        assert!((config.speed_max - 3.2).abs() < 1e-9);
    }

    #[test]
    fn trail_length_maps_linearly_to_fade_alpha() {
        let short = parse("trail_length: 1").expect("config should resolve");
        let long = parse("trail_length: 15").expect("config should resolve");
        assert!((short.fade_alpha - 0.15).abs() < 1e-6);
        assert!((long.fade_alpha - 0.01).abs() < 1e-6);
    }

    #[test]
    fn explicit_values_are_kept() {
        let config = parse(
            r##"
col_size: 20
speed_min: 0.3
speed_max: 0.9
fade_alpha: 0.1
trail_color: "#00FF00"
head_color: { r: 1.0, g: 1.0, b: 1.0 }
glyphs: "01"
reset_chance: 1.0
reentry: top
frame_interval_ms: 33
seed: 99
"##,
        )
        .expect("config should resolve");
        assert_eq!(config.col_size, 20);
        assert_eq!(config.speed_min, 0.3);
        assert_eq!(config.speed_max, 0.9);
        assert_eq!(config.fade_alpha, 0.1);
        assert_eq!(config.trail_color.to_rgba8(), [0, 255, 0, 255]);
        assert_eq!(config.glyphs, GlyphSet::new("01"));
        assert_eq!(config.reentry, Reentry::Top);
        assert_eq!(config.seed, Some(99));
        assert_eq!(config.frame_interval().as_millis(), 33);
    }

    #[test]
    fn blank_glyphs_fall_back_to_default() {
        let config = parse("glyphs: \"   \"").expect("config should resolve");
        assert_eq!(config.glyphs, GlyphSet::default());
    }

    #[test]
    fn invalid_ranges_are_coded_invalid() {
        assert_eq!(error_code("col_size: 0"), CONFIG_INVALID);
        assert_eq!(error_code("col_size: 4096"), CONFIG_INVALID);
        assert_eq!(error_code("speed_min: 2.0\nspeed_max: 1.0"), CONFIG_INVALID);
        assert_eq!(error_code("reset_chance: 1.5"), CONFIG_INVALID);
        assert_eq!(error_code("trail_length: 40"), CONFIG_INVALID);
        assert_eq!(error_code("fade_alpha: 0.0"), CONFIG_INVALID);
        assert_eq!(error_code("frame_interval_ms: 0"), CONFIG_INVALID);
        assert_eq!(error_code("speed: 1.0\nspeed_min: 0.5"), CONFIG_INVALID);
        assert_eq!(error_code("fade_alpha: 0.1\ntrail_length: 3"), CONFIG_INVALID);
    }

    #[test]
    fn unknown_fields_and_bad_yaml_are_parse_failures() {
        assert_eq!(error_code("colour: red"), CONFIG_PARSE_FAILED);
        assert_eq!(error_code("col_size: [1, 2"), CONFIG_PARSE_FAILED);
        assert_eq!(error_code("- just\n- a list"), CONFIG_PARSE_FAILED);
    }

    #[test]
    fn missing_font_file_is_rejected() {
        assert_eq!(
            error_code("font: { path: does/not/exist.ttf }"),
            CONFIG_INVALID
        );
    }

    #[test]
    fn overrides_replace_file_values() {
        let overrides = [
            ConfigOverride::parse("col_size=10").expect("override should parse"),
            ConfigOverride::parse("reentry=top").expect("override should parse"),
        ];
        let config = parse_config_str("col_size: 20", Path::new("."), &overrides)
            .expect("config should resolve");
        assert_eq!(config.col_size, 10);
        assert_eq!(config.reentry, Reentry::Top);
    }

    #[test]
    fn override_requires_key_value_shape() {
        assert!(ConfigOverride::parse("speed").is_err());
        assert!(ConfigOverride::parse("=2").is_err());
    }

    #[test]
    fn sanitized_repairs_hand_built_configs() {
        let mut config = RainConfig::default();
        config.col_size = 0;
        config.speed_min = 3.0;
        config.speed_max = 1.0;
        config.reset_chance = f64::NAN;
        config.fade_alpha = 7.0;
        let fixed = config.sanitized();
        assert_eq!(fixed.col_size, 1);
        config.col_size = 4096;
        assert_eq!(config.sanitized().col_size, COL_SIZE_MAX);
        assert_eq!((fixed.speed_min, fixed.speed_max), (1.0, 3.0));
        assert_eq!(fixed.reset_chance, 0.3);
        assert_eq!(fixed.fade_alpha, 1.0);
    }

    #[test]
    fn missing_path_means_defaults_plus_overrides() {
        let overrides = [ConfigOverride::parse("seed=12").expect("override should parse")];
        let config = load_config_or_default(None, &overrides).expect("defaults should resolve");
        assert_eq!(
            config,
            RainConfig {
                seed: Some(12),
                ..RainConfig::default()
            }
        );
    }
}
