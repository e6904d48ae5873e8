//! Design options: the styling vocabulary a host passes along with a render request.
//!
//! Every field is optional. Field names are camelCase so a host can hand over the JSON it already
//! stores for a QR design:
//!
//! ```rust
//! use qrstyle::options::{DesignOptions, DotType};
//!
//! let options = DesignOptions::from_json(r##"{
//!     "margin": 8,
//!     "dotsOptions": { "type": "rounded", "color": "#4267b2" },
//!     "backgroundOptions": { "color": "#ffffff" },
//!     "qrOptions": { "errorCorrectionLevel": "H" }
//! }"##).unwrap();
//!
//! assert_eq!(options.dots_options.kind, Some(DotType::Rounded));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::qrcode::ErrorCorrection;

/// Output produced by the rendering engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Svg,
    Png,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Svg => f.write_str("svg"),
            OutputFormat::Png => f.write_str("png"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid color {0:?}, expected #rgb, #rrggbb, #rrggbbaa or transparent")]
pub struct ParseColorError(pub String);

/// An sRGB color with straight alpha.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 255 }
    }

    pub fn is_opaque(&self) -> bool {
        self.a == 255
    }

    /// `#rrggbb`, alpha omitted.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_rgba(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("transparent") {
            return Ok(Color::TRANSPARENT);
        }
        let err = || ParseColorError(s.to_string());
        let hex = trimmed.strip_prefix('#').ok_or_else(err)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
        let short = |i: usize| {
            u8::from_str_radix(&hex[i..i + 1], 16)
                .map(|v| v * 17)
                .map_err(|_| err())
        };
        match hex.len() {
            3 => Ok(Color::rgb(short(0)?, short(1)?, short(2)?)),
            6 => Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Color { r: channel(0)?, g: channel(2)?, b: channel(4)?, a: channel(6)? }),
            _ => Err(err()),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ParseColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> String {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 0 {
            f.write_str("transparent")
        } else if self.is_opaque() {
            f.write_str(&self.to_hex())
        } else {
            write!(f, "{}{:02x}", self.to_hex(), self.a)
        }
    }
}

/// Shape of the data modules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DotType {
    #[default]
    Square,
    Dots,
    Rounded,
    ExtraRounded,
    Classy,
    ClassyRounded,
}

/// Shape of the 7x7 finder frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CornerSquareType {
    Square,
    Dot,
    ExtraRounded,
}

/// Shape of the 3x3 finder centers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CornerDotType {
    Square,
    Dot,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DotsOptions {
    #[serde(rename = "type")]
    pub kind: Option<DotType>,
    pub color: Option<Color>,
}

/// When `kind` is unset the finder frame is drawn module by module in the dot shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CornersSquareOptions {
    #[serde(rename = "type")]
    pub kind: Option<CornerSquareType>,
    pub color: Option<Color>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CornersDotOptions {
    #[serde(rename = "type")]
    pub kind: Option<CornerDotType>,
    pub color: Option<Color>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackgroundOptions {
    pub color: Option<Color>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageOptions {
    /// Clear the modules under the logo.
    pub hide_background_dots: Option<bool>,
    /// Fraction of the error-correctable area the logo may cover, in `(0, 1]`.
    pub image_size: Option<f32>,
    /// Padding around the logo, in pixels.
    pub margin: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QrOptions {
    /// Fixed symbol version, `0` or unset to pick the smallest that fits.
    pub type_number: Option<u8>,
    pub error_correction_level: Option<ErrorCorrection>,
}

/// Visual customization layered onto the QR payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DesignOptions {
    /// Quiet zone in pixels on every side.
    pub margin: Option<u32>,
    pub qr_options: QrOptions,
    /// Logo location: an URL or data URI for SVG output, a local path for PNG output.
    pub image: Option<String>,
    pub image_options: ImageOptions,
    pub dots_options: DotsOptions,
    pub corners_square_options: CornersSquareOptions,
    pub corners_dot_options: CornersDotOptions,
    pub background_options: BackgroundOptions,
}

impl DesignOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colors() {
        assert_eq!("#000".parse::<Color>().unwrap(), Color::BLACK);
        assert_eq!("#FFFFFF".parse::<Color>().unwrap(), Color::WHITE);
        assert_eq!("#4267b2".parse::<Color>().unwrap(), Color::rgb(0x42, 0x67, 0xb2));
        assert_eq!("#11223380".parse::<Color>().unwrap().a, 0x80);
        assert_eq!("transparent".parse::<Color>().unwrap(), Color::TRANSPARENT);
    }

    #[test]
    fn test_reject_bad_colors() {
        for bad in ["", "red", "#12", "#12345", "#gggggg", "000000"] {
            assert!(bad.parse::<Color>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_color_display() {
        assert_eq!(Color::rgb(1, 2, 3).to_string(), "#010203");
        assert_eq!(Color { r: 1, g: 2, b: 3, a: 4 }.to_string(), "#01020304");
        assert_eq!(Color::TRANSPARENT.to_string(), "transparent");
    }

    #[test]
    fn test_design_options_from_dashboard_json() {
        let options = DesignOptions::from_json(
            r##"{
                "image": "https://cdn.example.com/logo.png",
                "imageOptions": { "hideBackgroundDots": false, "imageSize": 0.3, "margin": 4 },
                "dotsOptions": { "type": "classy-rounded", "color": "#ff0000" },
                "cornersSquareOptions": { "type": "extra-rounded" },
                "cornersDotOptions": { "type": "dot", "color": "#00ff00" },
                "qrOptions": { "typeNumber": 0, "errorCorrectionLevel": "M" }
            }"##,
        )
        .unwrap();

        assert_eq!(options.dots_options.kind, Some(DotType::ClassyRounded));
        assert_eq!(options.dots_options.color, Some(Color::rgb(255, 0, 0)));
        assert_eq!(options.corners_square_options.kind, Some(CornerSquareType::ExtraRounded));
        assert_eq!(options.corners_square_options.color, None);
        assert_eq!(options.corners_dot_options.kind, Some(CornerDotType::Dot));
        assert_eq!(options.image_options.image_size, Some(0.3));
        assert_eq!(options.qr_options.error_correction_level, Some(ErrorCorrection::Medium));
        assert_eq!(options.margin, None);
    }

    #[test]
    fn test_unknown_dot_type_is_rejected() {
        assert!(DesignOptions::from_json(r#"{ "dotsOptions": { "type": "stars" } }"#).is_err());
    }

    #[test]
    fn test_json_survives_serialization() {
        let mut options = DesignOptions::default();
        options.background_options.color = Some(Color::TRANSPARENT);
        options.dots_options.kind = Some(DotType::Dots);
        let json = options.to_json().unwrap();
        assert!(json.contains("\"dotsOptions\""));
        assert_eq!(DesignOptions::from_json(&json).unwrap(), options);
    }
}
