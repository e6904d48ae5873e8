//! Drawing helpers.
//!
//! A [`Scene`] is the styled geometry of one symbol: a list of filled outlines in pixel
//! coordinates plus an optional logo placement. The same scene is serialized to SVG markup by
//! [`render_svg`] or painted into an RGBA buffer by [`render_raster`], so both formats agree on
//! every shape.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};

use crate::config::{LogoConfig, RenderConfig};
use crate::options::{Color, CornerDotType, CornerSquareType, DotType};
use crate::qrcode::{ErrorCorrection, QrMatrix};

/// Where the symbol sits inside the image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layout {
    /// Modules per side.
    pub modules: i32,
    /// Whole pixels per module.
    pub dot_size: f32,
    pub origin_x: f32,
    pub origin_y: f32,
}

impl Layout {
    /// Returns `None` when the image is too small to give each module at least one pixel.
    pub fn compute(matrix: &QrMatrix, config: &RenderConfig) -> Option<Layout> {
        let modules = matrix.size() as u32;
        let drawable = config
            .width
            .min(config.height)
            .saturating_sub(config.margin.saturating_mul(2));
        let dot = drawable / modules;
        if dot == 0 {
            return None;
        }
        Some(Layout {
            modules: matrix.size(),
            dot_size: dot as f32,
            origin_x: ((config.width - modules * dot) / 2) as f32,
            origin_y: ((config.height - modules * dot) / 2) as f32,
        })
    }

    fn module_origin(&self, x: i32, y: i32) -> (f32, f32) {
        (self.origin_x + x as f32 * self.dot_size, self.origin_y + y as f32 * self.dot_size)
    }
}

/// A closed outline in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Outline {
    /// Rectangle with per-corner radii: top-left, top-right, bottom-right, bottom-left.
    Rect { x: f32, y: f32, w: f32, h: f32, radii: [f32; 4] },
    Circle { cx: f32, cy: f32, r: f32 },
}

impl Outline {
    fn square(x: f32, y: f32, side: f32, radius: f32) -> Self {
        Outline::Rect { x, y, w: side, h: side, radii: [radius; 4] }
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        match *self {
            Outline::Circle { cx, cy, r } => (px - cx).powi(2) + (py - cy).powi(2) <= r * r,
            Outline::Rect { x, y, w, h, radii: [tl, tr, br, bl] } => {
                if px < x || py < y || px > x + w || py > y + h {
                    return false;
                }
                let in_arc =
                    |cx: f32, cy: f32, r: f32| (px - cx).powi(2) + (py - cy).powi(2) <= r * r;
                if tl > 0.0 && px < x + tl && py < y + tl {
                    return in_arc(x + tl, y + tl, tl);
                }
                if tr > 0.0 && px > x + w - tr && py < y + tr {
                    return in_arc(x + w - tr, y + tr, tr);
                }
                if br > 0.0 && px > x + w - br && py > y + h - br {
                    return in_arc(x + w - br, y + h - br, br);
                }
                if bl > 0.0 && px < x + bl && py > y + h - bl {
                    return in_arc(x + bl, y + h - bl, bl);
                }
                true
            }
        }
    }

    /// `(left, top, right, bottom)`
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        match *self {
            Outline::Circle { cx, cy, r } => (cx - r, cy - r, cx + r, cy + r),
            Outline::Rect { x, y, w, h, .. } => (x, y, x + w, y + h),
        }
    }

    fn write_path(&self, out: &mut String) {
        match *self {
            Outline::Circle { cx, cy, r } => {
                *out += &format!(
                    "M{},{}a{r},{r} 0 1,0 {},0a{r},{r} 0 1,0 {},0z",
                    num(cx - r),
                    num(cy),
                    num(2.0 * r),
                    num(-2.0 * r),
                    r = num(r)
                );
            }
            Outline::Rect { x, y, w, h, radii: [tl, tr, br, bl] } => {
                *out += &format!("M{},{}H{}", num(x + tl), num(y), num(x + w - tr));
                if tr > 0.0 {
                    *out += &format!("A{r},{r} 0 0 1 {},{}", num(x + w), num(y + tr), r = num(tr));
                }
                *out += &format!("V{}", num(y + h - br));
                if br > 0.0 {
                    let (ex, ey) = (num(x + w - br), num(y + h));
                    *out += &format!("A{r},{r} 0 0 1 {ex},{ey}", r = num(br));
                }
                *out += &format!("H{}", num(x + bl));
                if bl > 0.0 {
                    *out += &format!("A{r},{r} 0 0 1 {},{}", num(x), num(y + h - bl), r = num(bl));
                }
                *out += &format!("V{}", num(y + tl));
                if tl > 0.0 {
                    *out += &format!("A{r},{r} 0 0 1 {},{}", num(x + tl), num(y), r = num(tl));
                }
                *out += "z";
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Fill(Outline),
    /// Area inside `outer` but outside `inner`.
    Ring { outer: Outline, inner: Outline },
}

impl Shape {
    pub fn contains(&self, px: f32, py: f32) -> bool {
        match self {
            Shape::Fill(outline) => outline.contains(px, py),
            Shape::Ring { outer, inner } => outer.contains(px, py) && !inner.contains(px, py),
        }
    }

    fn is_ring(&self) -> bool {
        matches!(self, Shape::Ring { .. })
    }

    fn bounds(&self) -> (f32, f32, f32, f32) {
        match self {
            Shape::Fill(outline) => outline.bounds(),
            Shape::Ring { outer, .. } => outer.bounds(),
        }
    }

    fn write_path(&self, out: &mut String) {
        match self {
            Shape::Fill(outline) => outline.write_path(out),
            Shape::Ring { outer, inner } => {
                outer.write_path(out);
                inner.write_path(out);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mark {
    pub shape: Shape,
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogoPlacement {
    pub source: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

/// Square block of modules cleared for the logo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LogoArea {
    start: i32,
    side: i32,
}

impl LogoArea {
    fn compute(matrix: &QrMatrix, logo: &LogoConfig) -> Option<LogoArea> {
        let count = matrix.size();
        // share of the symbol the error correction can rebuild
        let coverage = match matrix.error_correction() {
            ErrorCorrection::Low => 0.07,
            ErrorCorrection::Medium => 0.15,
            ErrorCorrection::Quartile => 0.25,
            ErrorCorrection::High => 0.30,
        };
        let area = logo.size_ratio * coverage * (count * count) as f32;
        let mut side = area.sqrt().floor() as i32;
        if (count - side) % 2 != 0 {
            side -= 1;
        }
        (side > 0).then(|| LogoArea { start: (count - side) / 2, side })
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        let range = self.start..self.start + self.side;
        range.contains(&x) && range.contains(&y)
    }
}

/// Styled geometry of a symbol, ready to be written out.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub background: Color,
    pub layout: Layout,
    pub marks: Vec<Mark>,
    pub logo: Option<LogoPlacement>,
}

impl Scene {
    /// Returns `None` when the configured size cannot fit the symbol.
    pub fn build(matrix: &QrMatrix, config: &RenderConfig) -> Option<Scene> {
        let layout = Layout::compute(matrix, config)?;
        let d = layout.dot_size;
        let logo_area = config.logo.as_ref().and_then(|logo| LogoArea::compute(matrix, logo));
        let hidden = |x: i32, y: i32| {
            config.logo.as_ref().map_or(false, |logo| logo.hide_background_dots)
                && logo_area.map_or(false, |area| area.contains(x, y))
        };
        let is_data_dot =
            |x: i32, y: i32| matrix.is_dark(x, y) && !matrix.is_finder(x, y) && !hidden(x, y);

        let mut marks = Vec::new();
        for y in 0..layout.modules {
            for x in 0..layout.modules {
                if !is_data_dot(x, y) {
                    continue;
                }
                let (px, py) = layout.module_origin(x, y);
                let outline =
                    dot_outline(config.dots.kind, px, py, d, |dx, dy| is_data_dot(x + dx, y + dy));
                marks.push(Mark { shape: Shape::Fill(outline), color: config.dots.color });
            }
        }

        for (fx, fy) in matrix.finder_origins() {
            let (px, py) = layout.module_origin(fx, fy);
            let ring = |x: i32, y: i32| {
                (0..7).contains(&x) && (0..7).contains(&y) && (x - 3).abs().max((y - 3).abs()) == 3
            };
            let center = |x: i32, y: i32| (x - 3).abs().max((y - 3).abs()) <= 1;

            let square_color = config.corners_square.color;
            match config.corners_square.kind {
                Some(kind) => marks.push(Mark {
                    shape: corner_square_shape(kind, px, py, d),
                    color: square_color,
                }),
                None => {
                    let frame = (0..7)
                        .flat_map(|my| (0..7).map(move |mx| (mx, my)))
                        .filter(|&(mx, my)| ring(mx, my));
                    for (mx, my) in frame {
                        let (ox, oy) = layout.module_origin(fx + mx, fy + my);
                        let joined = |dx: i32, dy: i32| ring(mx + dx, my + dy);
                        let outline = dot_outline(config.dots.kind, ox, oy, d, joined);
                        marks.push(Mark { shape: Shape::Fill(outline), color: square_color });
                    }
                }
            }

            let dot_color = config.corners_dot.color;
            match config.corners_dot.kind {
                Some(CornerDotType::Square) => marks.push(Mark {
                    shape: Shape::Fill(Outline::square(px + 2.0 * d, py + 2.0 * d, 3.0 * d, 0.0)),
                    color: dot_color,
                }),
                Some(CornerDotType::Dot) => marks.push(Mark {
                    shape: Shape::Fill(Outline::Circle {
                        cx: px + 3.5 * d,
                        cy: py + 3.5 * d,
                        r: 1.5 * d,
                    }),
                    color: dot_color,
                }),
                None => {
                    for (mx, my) in (2..5).flat_map(|my| (2..5).map(move |mx| (mx, my))) {
                        let (ox, oy) = layout.module_origin(fx + mx, fy + my);
                        let joined = |dx: i32, dy: i32| center(mx + dx, my + dy);
                        let outline = dot_outline(config.dots.kind, ox, oy, d, joined);
                        marks.push(Mark { shape: Shape::Fill(outline), color: dot_color });
                    }
                }
            }
        }

        let logo = match (&config.logo, logo_area) {
            (Some(logo), Some(area)) => {
                let (ax, ay) = layout.module_origin(area.start, area.start);
                let inset = logo.margin as f32;
                let size = area.side as f32 * d - 2.0 * inset;
                (size > 0.0).then(|| LogoPlacement {
                    source: logo.source.clone(),
                    x: ax + inset,
                    y: ay + inset,
                    size,
                })
            }
            _ => None,
        };

        Some(Scene {
            width: config.width,
            height: config.height,
            background: config.background,
            layout,
            marks,
            logo,
        })
    }
}

/// Outline of one module at `(x, y)` with side `d`. `neighbor(dx, dy)` reports whether the
/// adjacent module in that direction is drawn with the same style.
fn dot_outline(
    kind: DotType,
    x: f32,
    y: f32,
    d: f32,
    neighbor: impl Fn(i32, i32) -> bool,
) -> Outline {
    let left = neighbor(-1, 0);
    let right = neighbor(1, 0);
    let top = neighbor(0, -1);
    let bottom = neighbor(0, 1);
    // a corner is free when neither side touching it continues into a neighbor
    let free = [!left && !top, !top && !right, !right && !bottom, !bottom && !left];
    let radii = |r: [f32; 4]| {
        let mut out = [0.0; 4];
        for i in 0..4 {
            if free[i] {
                out[i] = r[i];
            }
        }
        out
    };

    match kind {
        DotType::Square => Outline::square(x, y, d, 0.0),
        DotType::Dots => Outline::Circle { cx: x + d / 2.0, cy: y + d / 2.0, r: d / 2.0 },
        DotType::Rounded => Outline::Rect { x, y, w: d, h: d, radii: radii([d * 0.35; 4]) },
        DotType::ExtraRounded => Outline::Rect { x, y, w: d, h: d, radii: radii([d * 0.5; 4]) },
        DotType::Classy => Outline::Rect {
            x,
            y,
            w: d,
            h: d,
            radii: radii([d * 0.5, 0.0, d * 0.5, 0.0]),
        },
        DotType::ClassyRounded => Outline::Rect {
            x,
            y,
            w: d,
            h: d,
            radii: radii([d * 0.5, d * 0.25, d * 0.5, d * 0.25]),
        },
    }
}

fn corner_square_shape(kind: CornerSquareType, x: f32, y: f32, d: f32) -> Shape {
    match kind {
        CornerSquareType::Square => Shape::Ring {
            outer: Outline::square(x, y, 7.0 * d, 0.0),
            inner: Outline::square(x + d, y + d, 5.0 * d, 0.0),
        },
        CornerSquareType::Dot => {
            let (cx, cy) = (x + 3.5 * d, y + 3.5 * d);
            Shape::Ring {
                outer: Outline::Circle { cx, cy, r: 3.5 * d },
                inner: Outline::Circle { cx, cy, r: 2.5 * d },
            }
        }
        CornerSquareType::ExtraRounded => Shape::Ring {
            outer: Outline::square(x, y, 7.0 * d, 2.5 * d),
            inner: Outline::square(x + d, y + d, 5.0 * d, 1.5 * d),
        },
    }
}

/// Serializes a scene as a standalone SVG document.
///
/// Consecutive marks sharing a color are merged into a single `<path>`.
pub fn render_svg(scene: &Scene) -> String {
    let (w, h) = (scene.width, scene.height);
    let mut result = String::new();
    result += &format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" \
         width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n"
    );
    if scene.background.a > 0 {
        result += &format!(
            "\t<rect x=\"0\" y=\"0\" width=\"{w}\" height=\"{h}\"{}/>\n",
            fill_attrs(scene.background)
        );
    }

    let marks = &scene.marks;
    let mut i = 0;
    while i < marks.len() {
        let color = marks[i].color;
        let ring = marks[i].shape.is_ring();
        let mut d = String::new();
        while i < marks.len() && marks[i].color == color && marks[i].shape.is_ring() == ring {
            marks[i].shape.write_path(&mut d);
            i += 1;
        }
        let rule = if ring { " fill-rule=\"evenodd\"" } else { "" };
        result += &format!("\t<path d=\"{d}\"{}{rule}/>\n", fill_attrs(color));
    }

    if let Some(logo) = &scene.logo {
        result += &format!(
            "\t<image href=\"{}\" x=\"{}\" y=\"{}\" width=\"{size}\" height=\"{size}\" \
             preserveAspectRatio=\"xMidYMid meet\"/>\n",
            escape_attr(&logo.source),
            num(logo.x),
            num(logo.y),
            size = num(logo.size)
        );
    }
    result += "</svg>\n";
    result
}

/// Paints a scene into an RGBA buffer, sampling each pixel at its center.
///
/// The logo, if any, is read from the local file system.
///
/// # Errors
///
/// Returns an `image::ImageError` if the logo cannot be opened or decoded.
pub fn render_raster(scene: &Scene) -> Result<RgbaImage, image::ImageError> {
    let background = Rgba(scene.background.to_rgba());
    let mut img = RgbaImage::from_pixel(scene.width, scene.height, background);
    for mark in &scene.marks {
        paint(&mut img, &mark.shape, mark.color);
    }

    if let Some(logo) = &scene.logo {
        let source = image::open(&logo.source)?.to_rgba8();
        let (lw, lh) = source.dimensions();
        let scale = logo.size / lw.max(lh).max(1) as f32;
        let fit = |side: u32| ((side as f32 * scale).round() as u32).max(1);
        let (tw, th) = (fit(lw), fit(lh));
        let resized = imageops::resize(&source, tw, th, FilterType::Triangle);
        let x = (logo.x + (logo.size - tw as f32) / 2.0).round() as i64;
        let y = (logo.y + (logo.size - th as f32) / 2.0).round() as i64;
        imageops::overlay(&mut img, &resized, x, y);
    }
    Ok(img)
}

fn paint(img: &mut RgbaImage, shape: &Shape, color: Color) {
    if color.a == 0 {
        return;
    }
    let (left, top, right, bottom) = shape.bounds();
    let clamp_x = |v: f32| (v.max(0.0) as u32).min(img.width());
    let clamp_y = |v: f32| (v.max(0.0) as u32).min(img.height());
    let (x0, x1) = (clamp_x(left.floor()), clamp_x(right.ceil()));
    let (y0, y1) = (clamp_y(top.floor()), clamp_y(bottom.ceil()));
    for py in y0..y1 {
        for px in x0..x1 {
            if shape.contains(px as f32 + 0.5, py as f32 + 0.5) {
                blend(img.get_pixel_mut(px, py), color);
            }
        }
    }
}

fn blend(dst: &mut Rgba<u8>, color: Color) {
    if color.is_opaque() {
        *dst = Rgba(color.to_rgba());
        return;
    }
    let a = f32::from(color.a) / 255.0;
    let mix = |s: u8, d: u8| (f32::from(s) * a + f32::from(d) * (1.0 - a)).round() as u8;
    let out_a = a + f32::from(dst[3]) / 255.0 * (1.0 - a);
    *dst = Rgba([
        mix(color.r, dst[0]),
        mix(color.g, dst[1]),
        mix(color.b, dst[2]),
        (out_a * 255.0).round() as u8,
    ]);
}

/// Encodes an RGBA buffer as PNG bytes.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Plain black-on-white SVG with `border` light modules around the symbol, one unit per module.
pub fn to_svg_string(qr: &QrMatrix, border: i32) -> String {
    let border = border.max(0);
    let dimension = qr.size() + border * 2;
    let mut result = String::new();
    result += "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
    result += &format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" viewBox=\"0 0 {0} {0}\" \
         stroke=\"none\">\n",
        dimension
    );
    result += "\t<rect width=\"100%\" height=\"100%\" fill=\"#FFFFFF\"/>\n";
    result += "\t<path d=\"";
    let mut first = true;
    for y in 0..qr.size() {
        for x in 0..qr.size() {
            if qr.is_dark(x, y) {
                if !first {
                    result += " ";
                }
                first = false;
                result += &format!("M{},{}h1v1h-1z", x + border, y + border);
            }
        }
    }
    result += "\" fill=\"#000000\"/>\n";
    result += "</svg>\n";
    result
}

/// Terminal preview: two block characters per module, one line per row.
pub fn to_ascii(qr: &QrMatrix, border: i32) -> String {
    let mut result = String::new();
    for y in -border..qr.size() + border {
        for x in -border..qr.size() + border {
            let c = if qr.is_dark(x, y) { '█' } else { ' ' };
            result.push(c);
            result.push(c);
        }
        result.push('\n');
    }
    result
}

fn fill_attrs(color: Color) -> String {
    if color.is_opaque() {
        format!(" fill=\"{}\"", color.to_hex())
    } else {
        format!(" fill=\"{}\" fill-opacity=\"{}\"", color.to_hex(), num(f32::from(color.a) / 255.0))
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// two decimals, trailing zeros dropped
fn num(v: f32) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{}", rounded)
    }
}
