//! Translucency Sorting & Batching
//!
//! The alpha stack, bottom-up:
//!
//! - [`AlphaFaceCollector`] — per-frame scratch list of submitted triangles
//! - [`RadixFaceSorter`] — stable radix sort over the scalar depth keys
//! - [`FaceBatcher`] — re-packs the sorted permutation into per-material
//!   contiguous index runs
//! - [`AlphaPipeline`] — composition: `add_face` → `sort` → `draw`
//!
//! Drawables and materials stay outside this crate; the pipeline references
//! them by id and resolves them through an [`AlphaScene`] at sort/draw time.
//! A run whose drawable or material no longer resolves is dropped, never
//! fatal — transparency rendering is best-effort and must not abort a frame.

mod batcher;
mod collector;
mod pipeline;
mod radix;

pub use batcher::{DrawBatch, FaceBatcher};
pub use collector::{AlphaFaceCollector, Face};
pub use pipeline::AlphaPipeline;
pub use radix::RadixFaceSorter;

use glam::{Mat4, Vec3};

use crate::device::{GpuHandle, IndexFormat, RenderDevice};
use crate::errors::Result;

/// Scene-assigned drawable identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawableId(pub u32);

/// Scene-assigned material identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// Per-frame information handed through to the material draw path.
#[derive(Debug, Clone, Copy)]
pub struct DrawInfo {
    /// View matrix of the frame being drawn.
    pub view: Mat4,
    /// Frame counter, for caches keyed by frame.
    pub frame: u64,
}

/// A restricted view onto a portion of a shared index buffer, handed to a
/// drawable for the duration of one batch draw.
#[derive(Debug, Clone, Copy)]
pub struct ExternalFaceRange {
    pub buffer: GpuHandle,
    pub format: IndexFormat,
    /// Offset into the index buffer, in indices.
    pub first_index: u32,
    pub index_count: u32,
    /// Smallest vertex index the range references (backend range hint).
    pub min_vertex: u32,
    /// Largest vertex index the range references.
    pub max_vertex: u32,
}

/// Geometry source the alpha pipeline can temporarily redirect.
pub trait SortedDrawable {
    /// Vertex count of the active vertex buffer; decides 16- vs 32-bit
    /// index packing.
    fn vertex_count(&self) -> usize;

    /// Restricts the drawable's index source to an external range.
    fn bind_external_faces(&mut self, range: &ExternalFaceRange);

    /// The active external range, if one is bound. Material draw paths
    /// query this to issue the ranged draw.
    fn external_range(&self) -> Option<ExternalFaceRange>;

    /// Restores the drawable's default internal geometry source.
    fn restore_internal_faces(&mut self);

    /// Sets up the drawable's transform state before the material draws.
    fn apply_transform(&mut self, device: &mut RenderDevice);
}

/// Material pass surface the pipeline invokes for translucent batches.
pub trait SortedMaterial {
    /// Issues the alpha-only draw for the drawable's current face source.
    fn draw_alpha(
        &mut self,
        device: &mut RenderDevice,
        drawable: &mut dyn SortedDrawable,
        info: &DrawInfo,
    ) -> Result<()>;
}

/// Resolver from ids to live drawables/materials for one frame.
///
/// Returning `None` is not an error; the affected batch is skipped.
pub trait AlphaScene {
    /// Vertex count of a drawable, for index-width selection at sort time.
    fn vertex_count(&self, id: DrawableId) -> Option<usize>;

    /// Resolves a (drawable, material) pair for drawing.
    fn resolve_pair(
        &mut self,
        drawable: DrawableId,
        material: MaterialId,
    ) -> Option<(&mut dyn SortedDrawable, &mut dyn SortedMaterial)>;
}

/// Sort key of a triangle: the sum (not average) of the view-space Z of its
/// three vertices under the given transform. All submitters of one frame
/// must use the same transform convention; the sorter never renormalizes.
#[must_use]
pub fn face_sort_key(view: &Mat4, a: Vec3, b: Vec3, c: Vec3) -> f32 {
    view.transform_point3(a).z + view.transform_point3(b).z + view.transform_point3(c).z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_sort_key_sums_view_z() {
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
        let key = face_sort_key(
            &view,
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 2.0),
            Vec3::new(0.0, 1.0, 3.0),
        );
        // (1-10) + (2-10) + (3-10) = -24
        assert!((key - -24.0).abs() < 1e-6);
    }
}
