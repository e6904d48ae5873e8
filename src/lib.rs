//! # qrstyle
//!
//! Styled QR code rendering behind a lazily initialised, in-place updated render adapter.
//!
//! A host view describes what it wants drawn with a [`QrRenderRequest`]: the payload, a pixel
//! size, an output format and optional [`DesignOptions`]. The request is resolved into a
//! [`RenderConfig`] and handed to a [`RenderAdapter`], which owns a single engine instance per
//! mounted view. The first render loads the engine asynchronously and attaches its output to the
//! view's surface; later renders update that same instance.
//!
//! ## Features
//!
//! - Encode text in numeric, alphanumeric or byte mode, QR Code Model 2 versions 1 to 40, four
//!   error correction levels.
//! - Style dots (square, dots, rounded, extra-rounded, classy, classy-rounded), finder frames and
//!   centers, colors, background and a center logo.
//! - Output standalone SVG or PNG.
//!
//! ## Example
//!
//! ```rust
//! use qrstyle::{BufferSurface, BuiltinLoader, LoadOutcome, QrRenderRequest, RenderAdapter};
//!
//! let surface = BufferSurface::shared();
//! let mut adapter = RenderAdapter::new(BuiltinLoader);
//! adapter.mount(surface.clone()).unwrap();
//!
//! let task = adapter.render(&QrRenderRequest::new("https://example.com", 256)).unwrap();
//! if let Some(task) = task {
//!     assert_eq!(pollster::block_on(task).unwrap(), LoadOutcome::Attached);
//! }
//!
//! // Updates the attached instance in place.
//! adapter.render(&QrRenderRequest::new("https://example.com", 300)).unwrap();
//! assert!(surface.borrow().output().is_some());
//! ```
//!
//! ## Modules
//!
//! - [`qrcode`]: encoding text into a module matrix.
//! - [`helper`]: drawing a matrix as SVG or pixels.
//! - [`options`] and [`config`]: design options and the config builder.
//! - [`engine`]: the engine contract and the built-in engine.
//! - [`adapter`]: the render adapter.
//! - [`navigation`]: the creation-flow routes.

#![forbid(unsafe_code)]

pub mod adapter;
pub mod config;
pub mod engine;
pub mod helper;
pub mod navigation;
pub mod options;
pub mod qrcode;

pub use adapter::{AdapterState, LoadOutcome, LoadTask, RenderAdapter, RenderError};
pub use config::{build_config, ConfigError, QrRenderRequest, RenderConfig};
pub use engine::{
    BufferSurface, BuiltinLoader, Engine, EngineError, EngineInstance, EngineLoader, RenderedOutput,
    SharedSurface, StyledEngine, StyledQr, Surface,
};
pub use navigation::CreationFlow;
pub use options::{Color, DesignOptions, OutputFormat};
pub use qrcode::{EncodeError, ErrorCorrection, QrMatrix};
