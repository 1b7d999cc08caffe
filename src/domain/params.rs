//! Typed render parameters and the resolver that builds them from raw query values.
//!
//! Numeric inputs are parsed permissively (leading whitespace, optional sign,
//! longest numeric prefix) so that `"120px"` reads as `120`. Validation order is
//! width, height, scale presence, scale value, then the scaled bounds; the first
//! failure wins.

use once_cell::sync::Lazy;
use regex::Regex;

use super::error::ValidationError;

/// Background applied when the caller supplies no usable color.
pub const DEFAULT_BACKGROUND: &str = "white";
/// Background sentinel that makes raster captures omit the backdrop.
pub const TRANSPARENT_BACKGROUND: &str = "transparent";

// The two alternatives are anchored separately: the named branch only at the
// start, the hex branch only at the end. Tests pin the resulting behaviour.
static BG_COLOR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(![A-Za-z]+)|([0-9A-Fa-f]{3,8})$").expect("background color pattern is valid")
});

/// Themes understood by the diagramming library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Default,
    Neutral,
    Dark,
    Forest,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Default => "default",
            Theme::Neutral => "neutral",
            Theme::Dark => "dark",
            Theme::Forest => "forest",
        }
    }

    /// Case-insensitive lookup. Unknown names yield `None` so the library default applies.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "default" => Some(Theme::Default),
            "neutral" => Some(Theme::Neutral),
            "dark" => Some(Theme::Dark),
            "forest" => Some(Theme::Forest),
            _ => None,
        }
    }
}

/// Outcome of testing the strict `bgColor` specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundSpecifier {
    /// `!name` form; carries the name without the prefix.
    Named(String),
    /// Bare hex digits; carries the value with a `#` prepended.
    Hex(String),
    Invalid,
}

impl BackgroundSpecifier {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !BG_COLOR_PATTERN.is_match(trimmed) {
            return BackgroundSpecifier::Invalid;
        }

        match trimmed.strip_prefix('!') {
            Some(name) => BackgroundSpecifier::Named(name.to_string()),
            None => BackgroundSpecifier::Hex(format!("#{trimmed}")),
        }
    }

    /// CSS color for this specifier, or `fallback` unchanged when it is invalid.
    pub fn into_color(self, fallback: &str) -> String {
        match self {
            BackgroundSpecifier::Named(color) | BackgroundSpecifier::Hex(color) => color,
            BackgroundSpecifier::Invalid => fallback.to_string(),
        }
    }
}

/// Combine the permissive `backgroundColor` input with the strict `bgColor` override.
pub fn resolve_background(background_color: Option<&str>, bg_color: Option<&str>) -> String {
    let fallback = background_color.unwrap_or(DEFAULT_BACKGROUND);
    match bg_color {
        Some(strict) => BackgroundSpecifier::parse(strict).into_color(fallback),
        None => fallback.to_string(),
    }
}

/// Raster encodings offered by the image endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageType {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageType {
    /// Case-insensitive lookup falling back to PNG for anything unrecognised.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("jpeg") => ImageType::Jpeg,
            Some("webp") => ImageType::Webp,
            _ => ImageType::Png,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageType::Png => "png",
            ImageType::Jpeg => "jpeg",
            ImageType::Webp => "webp",
        }
    }

    /// JPEG has no alpha channel; transparent pixels would come out black.
    pub fn supports_alpha(self) -> bool {
        !matches!(self, ImageType::Jpeg)
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageType::Png => "image/png",
            ImageType::Jpeg => "image/jpeg",
            ImageType::Webp => "image/webp",
        }
    }
}

/// Artifact kind requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Image(ImageType),
    Pdf,
}

impl OutputFormat {
    /// Stable label used in logs and metrics.
    pub fn label(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Image(image) => image.as_str(),
            OutputFormat::Pdf => "pdf",
        }
    }
}

/// Target dimensions after scaling, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl RenderSize {
    pub fn is_unset(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }

    /// Both dimensions, when the caller pinned the full viewport.
    pub fn both(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

/// Query values exactly as received; `None` means the parameter was absent.
#[derive(Debug, Clone, Default)]
pub struct RawRenderParams {
    pub theme: Option<String>,
    pub background_color: Option<String>,
    pub bg_color: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub scale: Option<String>,
    pub image_type: Option<String>,
}

/// Fully validated render configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub theme: Option<Theme>,
    pub background: Option<String>,
    pub size: RenderSize,
    pub image_type: ImageType,
}

impl RenderParams {
    /// Library defaults with no overrides; used to measure a diagram's natural size.
    pub fn natural() -> Self {
        Self {
            theme: None,
            background: None,
            size: RenderSize::default(),
            image_type: ImageType::Png,
        }
    }

    pub fn omits_background(&self) -> bool {
        self.background.as_deref() == Some(TRANSPARENT_BACKGROUND)
    }
}

/// Validates raw query values against the configured dimension bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamResolver {
    max_width: u32,
    max_height: u32,
}

impl ParamResolver {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
        }
    }

    pub fn resolve(&self, raw: &RawRenderParams) -> Result<RenderParams, ValidationError> {
        let size = self.resolve_size(
            raw.width.as_deref(),
            raw.height.as_deref(),
            raw.scale.as_deref(),
        )?;

        Ok(RenderParams {
            theme: raw.theme.as_deref().and_then(Theme::parse),
            background: Some(resolve_background(
                raw.background_color.as_deref(),
                raw.bg_color.as_deref(),
            )),
            size,
            image_type: ImageType::parse_or_default(raw.image_type.as_deref()),
        })
    }

    pub fn resolve_size(
        &self,
        width: Option<&str>,
        height: Option<&str>,
        scale: Option<&str>,
    ) -> Result<RenderSize, ValidationError> {
        let width = parse_dimension(width, "width")?;
        let height = parse_dimension(height, "height")?;

        let scale = match present(scale) {
            Some(raw) => {
                if width.is_none() && height.is_none() {
                    return Err(ValidationError::new(
                        "scale",
                        "scale can only be set when either width or height is set",
                    ));
                }
                match parse_float_prefix(raw) {
                    Some(value) if (1.0..=3.0).contains(&value) => value,
                    _ => {
                        return Err(ValidationError::new(
                            "scale",
                            "invalid scale value - must be a number between 1 and 3",
                        ));
                    }
                }
            }
            None => 1.0,
        };

        Ok(RenderSize {
            width: scale_within(width, scale, self.max_width, "width")?,
            height: scale_within(height, scale, self.max_height, "height")?,
        })
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|raw| !raw.is_empty())
}

fn parse_dimension(raw: Option<&str>, field: &'static str) -> Result<Option<i64>, ValidationError> {
    let Some(raw) = present(raw) else {
        return Ok(None);
    };
    match parse_int_prefix(raw) {
        Some(value) if value != 0 => Ok(Some(value)),
        _ => Err(ValidationError::new(field, format!("invalid {field} value"))),
    }
}

fn scale_within(
    value: Option<i64>,
    scale: f64,
    max: u32,
    field: &'static str,
) -> Result<Option<u32>, ValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let scaled = (value as f64 * scale).round();
    if scaled <= 0.0 || scaled > f64::from(max) {
        return Err(ValidationError::new(
            field,
            format!("the scaled {field} must be between 0 and {max}"),
        ));
    }
    Ok(Some(scaled as u32))
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|byte| byte.is_ascii_digit()).count()
}

/// Leading integer of `raw`, read like JavaScript's `parseInt` without a radix:
/// a `0x`/`0X` prefix switches to hexadecimal.
fn parse_int_prefix(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let (digits, radix) = match unsigned.get(..2) {
        Some("0x" | "0X") => (&unsigned[2..], 16),
        _ => (unsigned, 10),
    };
    let end = digits
        .bytes()
        .take_while(|byte| char::from(*byte).is_digit(radix))
        .count();
    if end == 0 {
        return None;
    }

    let magnitude = i64::from_str_radix(&digits[..end], radix).unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_float_prefix(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_start();
    let bytes = trimmed.as_bytes();

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_digits = count_digits(&bytes[end..]);
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = count_digits(&bytes[end + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let exponent_digits = count_digits(&bytes[exponent.min(bytes.len())..]);
        if exponent_digits > 0 {
            end = exponent + exponent_digits;
        }
    }

    trimmed[..end].parse::<f64>().ok()
}
