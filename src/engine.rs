//! Rendering engine seam.
//!
//! The adapter talks to an engine through three contract points: [`Engine::construct`],
//! [`EngineInstance::update`] and [`EngineInstance::attach`]. Engines are obtained through an
//! [`EngineLoader`], whose future is the only suspension point of a render.
//!
//! [`StyledEngine`] is the built-in engine: it encodes with [`crate::qrcode`] and draws with
//! [`crate::helper`].

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use log::{debug, trace};
use thiserror::Error;

use crate::config::RenderConfig;
use crate::helper::{encode_png, render_raster, render_svg, Scene};
use crate::options::OutputFormat;
use crate::qrcode::{EncodeError, QrMatrix, Segment, Version};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("{size}px cannot fit {modules} modules")]
    TooSmall { size: u32, modules: i32 },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

/// What an instance hands to its surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderedOutput {
    Svg(String),
    Png(Vec<u8>),
}

impl RenderedOutput {
    pub fn format(&self) -> OutputFormat {
        match self {
            RenderedOutput::Svg(_) => OutputFormat::Svg,
            RenderedOutput::Png(_) => OutputFormat::Png,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RenderedOutput::Svg(svg) => svg.as_bytes(),
            RenderedOutput::Png(png) => png,
        }
    }
}

/// The UI element rendered output is attached to.
pub trait Surface {
    /// Removes whatever the surface currently shows.
    fn clear(&mut self);
    /// Shows `output`, replacing the previous output of the same instance.
    fn present(&mut self, output: &RenderedOutput);
}

/// A surface shared between the host view and the instance attached to it.
pub type SharedSurface = Rc<RefCell<dyn Surface>>;

pub trait Engine {
    type Instance: EngineInstance;

    fn construct(&self, config: &RenderConfig) -> Result<Self::Instance, EngineError>;
}

/// A live, mutable rendering of one symbol.
pub trait EngineInstance {
    /// Re-renders in place. Once attached, the new output is presented to the same surface.
    fn update(&mut self, config: &RenderConfig) -> Result<(), EngineError>;

    fn attach(&mut self, surface: SharedSurface) -> Result<(), EngineError>;

    fn output(&self) -> &RenderedOutput;
}

pub type LoadFuture<E> = Pin<Box<dyn Future<Output = Result<E, EngineError>>>>;

/// One-time asynchronous source of an engine.
pub trait EngineLoader {
    type Engine: Engine + 'static;

    fn load(&self) -> LoadFuture<Self::Engine>;
}

/// Resolves [`StyledEngine`] without suspending.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinLoader;

impl EngineLoader for BuiltinLoader {
    type Engine = StyledEngine;

    fn load(&self) -> LoadFuture<StyledEngine> {
        Box::pin(std::future::ready(Ok(StyledEngine)))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StyledEngine;

impl Engine for StyledEngine {
    type Instance = StyledQr;

    fn construct(&self, config: &RenderConfig) -> Result<StyledQr, EngineError> {
        let matrix = encode(config)?;
        let output = draw(&matrix, config)?;
        debug!(
            "constructed styled QR: version {}, {}x{} {}",
            matrix.version().value(),
            config.width,
            config.height,
            config.format
        );
        Ok(StyledQr { config: config.clone(), matrix, output, surface: None })
    }
}

/// Instance of [`StyledEngine`].
pub struct StyledQr {
    config: RenderConfig,
    matrix: QrMatrix,
    output: RenderedOutput,
    surface: Option<SharedSurface>,
}

impl StyledQr {
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn matrix(&self) -> &QrMatrix {
        &self.matrix
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }
}

impl EngineInstance for StyledQr {
    fn update(&mut self, config: &RenderConfig) -> Result<(), EngineError> {
        // Only styling changed: keep the encoded symbol.
        let matrix = if self.config.changes_symbol(config) {
            encode(config)?
        } else {
            self.matrix.clone()
        };
        let output = draw(&matrix, config)?;
        trace!("updated styled QR in place: {}x{} {}", config.width, config.height, config.format);

        self.matrix = matrix;
        self.output = output;
        self.config = config.clone();
        if let Some(surface) = &self.surface {
            surface.borrow_mut().present(&self.output);
        }
        Ok(())
    }

    fn attach(&mut self, surface: SharedSurface) -> Result<(), EngineError> {
        surface.borrow_mut().present(&self.output);
        self.surface = Some(surface);
        Ok(())
    }

    fn output(&self) -> &RenderedOutput {
        &self.output
    }
}

fn encode(config: &RenderConfig) -> Result<QrMatrix, EngineError> {
    let (min, max) = match config.version {
        Some(version) => (version, version),
        None => (Version::MIN, Version::MAX),
    };
    let seg = Segment::make_text(&config.content);
    Ok(QrMatrix::encode_segments(&[seg], config.error_correction, min, max, None, true)?)
}

fn draw(matrix: &QrMatrix, config: &RenderConfig) -> Result<RenderedOutput, EngineError> {
    let scene = Scene::build(matrix, config).ok_or(EngineError::TooSmall {
        size: config.width.min(config.height),
        modules: matrix.size(),
    })?;
    Ok(match config.format {
        OutputFormat::Svg => RenderedOutput::Svg(render_svg(&scene)),
        OutputFormat::Png => RenderedOutput::Png(encode_png(&render_raster(&scene)?)?),
    })
}

/// In-memory surface that keeps the last presented output.
#[derive(Debug, Default)]
pub struct BufferSurface {
    output: Option<RenderedOutput>,
    clears: usize,
    presents: usize,
}

impl BufferSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a new surface for sharing; keep a typed clone to inspect it later.
    pub fn shared() -> Rc<RefCell<BufferSurface>> {
        Rc::new(RefCell::new(BufferSurface::new()))
    }

    pub fn output(&self) -> Option<&RenderedOutput> {
        self.output.as_ref()
    }

    pub fn clears(&self) -> usize {
        self.clears
    }

    pub fn presents(&self) -> usize {
        self.presents
    }
}

impl Surface for BufferSurface {
    fn clear(&mut self) {
        self.output = None;
        self.clears += 1;
    }

    fn present(&mut self, output: &RenderedOutput) {
        self.output = Some(output.clone());
        self.presents += 1;
    }
}
