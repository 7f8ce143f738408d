//! Deepfry is a layered image compositing engine with interactive transform
//! handles and a "deep-fried" pixel-effects pipeline.
//!
//! The public API is engine-oriented:
//!
//! - Build an [`Engine`] from an explicit [`EngineConfig`]
//! - Install category assets or decoded bitmaps as layers
//! - Drive pointer input and the dirty-flag [`Engine::tick`] render loop
//! - Hook [`fx::deep_fry`] in as the whole-frame post-process
//! - Export the composited frame as a PNG
#![forbid(unsafe_code)]

pub mod assets;
pub mod composite;
pub mod core;
pub mod engine;
pub mod error;
pub mod fx;
pub mod layer;
pub mod manifest;
pub mod surface;

pub use crate::assets::{AssetFetcher, FsFetcher, PreparedImage};
pub use crate::core::{Canvas, LayerId, Point, Rgba8Premul, Vec2};
pub use crate::engine::{Engine, EngineConfig, PostProcess, PostProcessOutcome, RenderReport};
pub use crate::error::{DeepfryError, DeepfryResult};
pub use crate::fx::{FryParams, deep_fry};
pub use crate::layer::{HandleKind, Layer};
pub use crate::manifest::{Manifest, ManifestCategory, ManifestItem};
pub use crate::surface::Surface;
