//! Design config builder.
//!
//! Resolves a [`QrRenderRequest`] into a [`RenderConfig`] where every styling choice is concrete.
//! Building is pure: the same request always yields the same config and nothing outside the
//! arguments is read.

use thiserror::Error;

use crate::options::{Color, CornerDotType, CornerSquareType, DesignOptions, DotType, OutputFormat};
use crate::qrcode::{ErrorCorrection, Version};

pub const DEFAULT_LOGO_SIZE: f32 = 0.4;

/// Largest accepted edge in pixels. PNG output allocates the full RGBA canvas.
pub const MAX_SIZE: u32 = 4096;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("content is empty")]
    EmptyContent,
    #[error("size must be within 1..=4096, got {0}")]
    InvalidSize(u32),
    #[error("margin {margin} leaves no room for modules in a {size}px image")]
    MarginTooLarge { margin: u32, size: u32 },
    #[error("logo size {0} is outside (0, 1]")]
    InvalidLogoSize(f32),
    #[error("type number {0} is outside 1..=40")]
    InvalidTypeNumber(u8),
}

/// What the host asks to have drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct QrRenderRequest {
    pub content: String,
    pub size: u32,
    pub format: OutputFormat,
    pub design_options: Option<DesignOptions>,
}

impl QrRenderRequest {
    pub fn new(content: impl Into<String>, size: u32) -> Self {
        QrRenderRequest {
            content: content.into(),
            size,
            format: OutputFormat::Svg,
            design_options: None,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_design_options(mut self, options: DesignOptions) -> Self {
        self.design_options = Some(options);
        self
    }

    pub fn resolve(&self) -> Result<RenderConfig, ConfigError> {
        build_config(&self.content, self.size, self.format, self.design_options.as_ref())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DotStyle {
    pub kind: DotType,
    pub color: Color,
}

/// `kind: None` draws the finder frame module by module with the dot shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerSquareStyle {
    pub kind: Option<CornerSquareType>,
    pub color: Color,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerDotStyle {
    pub kind: Option<CornerDotType>,
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogoConfig {
    pub source: String,
    pub size_ratio: f32,
    pub margin: u32,
    pub hide_background_dots: bool,
}

/// Fully resolved rendering configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    pub content: String,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub margin: u32,
    /// `None` picks the smallest version that fits.
    pub version: Option<Version>,
    pub error_correction: ErrorCorrection,
    pub dots: DotStyle,
    pub corners_square: CornerSquareStyle,
    pub corners_dot: CornerDotStyle,
    pub background: Color,
    pub logo: Option<LogoConfig>,
}

impl RenderConfig {
    /// `true` when moving from `self` to `other` changes the encoded symbol, not just its looks.
    pub fn changes_symbol(&self, other: &RenderConfig) -> bool {
        self.content != other.content
            || self.version != other.version
            || self.error_correction != other.error_correction
    }
}

/// Maps a request onto a render config.
///
/// `content` and `size` are echoed verbatim; a missing option takes its default.
pub fn build_config(
    content: &str,
    size: u32,
    format: OutputFormat,
    options: Option<&DesignOptions>,
) -> Result<RenderConfig, ConfigError> {
    if content.is_empty() {
        return Err(ConfigError::EmptyContent);
    }
    if size == 0 || size > MAX_SIZE {
        return Err(ConfigError::InvalidSize(size));
    }

    let defaults = DesignOptions::default();
    let options = options.unwrap_or(&defaults);

    let margin = options.margin.unwrap_or(0);
    if margin.saturating_mul(2) >= size {
        return Err(ConfigError::MarginTooLarge { margin, size });
    }

    let version = match options.qr_options.type_number {
        None | Some(0) => None,
        Some(n) => Some(Version::checked(n).ok_or(ConfigError::InvalidTypeNumber(n))?),
    };

    let dots = DotStyle {
        kind: options.dots_options.kind.unwrap_or_default(),
        color: options.dots_options.color.unwrap_or(Color::BLACK),
    };

    let logo = match &options.image {
        Some(source) if !source.is_empty() => {
            let image_options = &options.image_options;
            let size_ratio = image_options.image_size.unwrap_or(DEFAULT_LOGO_SIZE);
            if !(size_ratio > 0.0 && size_ratio <= 1.0) {
                return Err(ConfigError::InvalidLogoSize(size_ratio));
            }
            Some(LogoConfig {
                source: source.clone(),
                size_ratio,
                margin: image_options.margin.unwrap_or(0),
                hide_background_dots: image_options.hide_background_dots.unwrap_or(true),
            })
        }
        _ => None,
    };

    Ok(RenderConfig {
        content: content.to_string(),
        width: size,
        height: size,
        format,
        margin,
        version,
        error_correction: options.qr_options.error_correction_level.unwrap_or_default(),
        dots,
        corners_square: CornerSquareStyle {
            kind: options.corners_square_options.kind,
            color: options.corners_square_options.color.unwrap_or(dots.color),
        },
        corners_dot: CornerDotStyle {
            kind: options.corners_dot_options.kind,
            color: options.corners_dot_options.color.unwrap_or(dots.color),
        },
        background: options.background_options.color.unwrap_or(Color::WHITE),
        logo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DotsOptions;

    #[test]
    fn test_defaults_echo_request() {
        let config = build_config("https://example.com", 256, OutputFormat::Svg, None).unwrap();
        assert_eq!(config.content, "https://example.com");
        assert_eq!(config.width, 256);
        assert_eq!(config.height, 256);
        assert_eq!(config.format, OutputFormat::Svg);
        assert_eq!(config.format.to_string(), "svg");
        assert_eq!(config.margin, 0);
        assert_eq!(config.version, None);
        assert_eq!(config.error_correction, ErrorCorrection::Quartile);
        assert_eq!(config.dots, DotStyle { kind: DotType::Square, color: Color::BLACK });
        assert_eq!(config.corners_square.kind, None);
        assert_eq!(config.background, Color::WHITE);
        assert!(config.logo.is_none());
    }

    #[test]
    fn test_request_resolve_matches_builder() {
        let request = QrRenderRequest::new("https://example.com", 256);
        assert_eq!(
            request.resolve().unwrap(),
            build_config("https://example.com", 256, OutputFormat::Svg, None).unwrap()
        );
    }

    #[test]
    fn test_echo_over_many_inputs() {
        let inputs = [
            ("a", 1),
            ("0123456789", 64),
            ("mailto:someone@example.com", 4096),
        ];
        for (content, size) in inputs {
            let config = build_config(content, size, OutputFormat::Png, None).unwrap();
            assert_eq!(config.content, content);
            assert_eq!((config.width, config.height), (size, size));
        }
    }

    #[test]
    fn test_rejects_invalid_requests() {
        assert_eq!(build_config("", 256, OutputFormat::Svg, None), Err(ConfigError::EmptyContent));
        assert_eq!(build_config("x", 0, OutputFormat::Svg, None), Err(ConfigError::InvalidSize(0)));
        assert_eq!(
            build_config("x", 100_000, OutputFormat::Png, None),
            Err(ConfigError::InvalidSize(100_000))
        );

        let mut options = DesignOptions::default();
        options.margin = Some(50);
        assert_eq!(
            build_config("x", 100, OutputFormat::Svg, Some(&options)),
            Err(ConfigError::MarginTooLarge { margin: 50, size: 100 })
        );

        let mut options = DesignOptions::default();
        options.qr_options.type_number = Some(41);
        assert_eq!(
            build_config("x", 100, OutputFormat::Svg, Some(&options)),
            Err(ConfigError::InvalidTypeNumber(41))
        );

        let mut options = DesignOptions::default();
        options.image = Some("logo.png".into());
        options.image_options.image_size = Some(1.5);
        assert_eq!(
            build_config("x", 100, OutputFormat::Svg, Some(&options)),
            Err(ConfigError::InvalidLogoSize(1.5))
        );
    }

    #[test]
    fn test_corner_colors_inherit_dot_color() {
        let red = Color::rgb(255, 0, 0);
        let options = DesignOptions {
            dots_options: DotsOptions { kind: Some(DotType::Dots), color: Some(red) },
            ..Default::default()
        };
        let config = build_config("x", 100, OutputFormat::Svg, Some(&options)).unwrap();
        assert_eq!(config.corners_square.color, red);
        assert_eq!(config.corners_dot.color, red);
    }

    #[test]
    fn test_logo_defaults() {
        let options = DesignOptions { image: Some("logo.png".into()), ..Default::default() };
        let logo = build_config("x", 100, OutputFormat::Png, Some(&options)).unwrap().logo.unwrap();
        assert_eq!(logo.source, "logo.png");
        assert_eq!(logo.size_ratio, DEFAULT_LOGO_SIZE);
        assert_eq!(logo.margin, 0);
        assert!(logo.hide_background_dots);
    }

    #[test]
    fn test_changes_symbol() {
        let a = build_config("x", 100, OutputFormat::Svg, None).unwrap();
        let mut b = a.clone();
        b.width = 300;
        b.height = 300;
        assert!(!a.changes_symbol(&b));
        b.content = "y".into();
        assert!(a.changes_symbol(&b));
    }
}
