//! Glimmer render core: shader program instance caching and back-to-front
//! translucency batching for a single-threaded render loop.
//!
//! Two independent stacks:
//!
//! - **Shader stack** ([`shader`]): named program fragments combined with
//!   compile-time option sets into tuple-keyed, reference-counted,
//!   lazily compiled-and-linked program instances shared across call sites.
//! - **Alpha stack** ([`alpha`]): per-frame collection of translucent
//!   triangles, stable radix sort by depth key, and re-packing into
//!   per-material contiguous index runs for minimal draw calls.
//!
//! All GPU access goes through an explicitly constructed
//! [`RenderDevice`] wrapping a [`GpuBackend`]; there are no process-wide
//! singletons. Everything here runs on exactly one render thread.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::doc_markdown)]

pub mod alpha;
pub mod device;
pub mod errors;
pub mod shader;

pub use alpha::{
    AlphaPipeline, AlphaScene, DrawBatch, DrawInfo, DrawableId, ExternalFaceRange, MaterialId,
    SortedDrawable, SortedMaterial, face_sort_key,
};
pub use device::{GpuBackend, GpuHandle, HeadlessBackend, HeadlessProbe, IndexFormat, RenderDevice};
pub use errors::{GlimmerError, Result};
pub use shader::{
    BuildMode, CompileState, FragmentIndex, InstanceState, ProgramSelection, ShaderInstanceHandle,
    ShaderManager, ShaderOptions, ShaderStage,
};
