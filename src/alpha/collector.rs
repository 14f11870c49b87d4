//! Alpha Face Collector
//!
//! Per-frame scratch storage for translucent triangles. Faces are ephemeral:
//! submitted during one frame's geometry phase, consumed by `sort()`, never
//! persisted across frames.

use super::{DrawableId, MaterialId};

/// One submitted translucent triangle.
#[derive(Debug, Clone, Copy)]
pub struct Face {
    pub drawable: DrawableId,
    pub material: MaterialId,
    pub indices: [u32; 3],
    /// Scalar depth proxy; see [`face_sort_key`](super::face_sort_key).
    pub key: f32,
}

/// Growable scratch list of the frame's translucent faces.
#[derive(Debug, Default)]
pub struct AlphaFaceCollector {
    faces: Vec<Face>,
}

/// Minimum number of entries added per storage growth, so tiny incremental
/// submissions don't reallocate per face.
const GROWTH_FLOOR: usize = 100;

impl AlphaFaceCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the face count and releases the scratch storage. Called at the
    /// start of a frame or explicitly by the owner.
    pub fn reset(&mut self) {
        self.faces = Vec::new();
    }

    /// Appends one triangle. Storage grows geometrically with a floor of
    /// [`GROWTH_FLOOR`] entries per growth.
    pub fn add_face(
        &mut self,
        drawable: DrawableId,
        material: MaterialId,
        a: u32,
        b: u32,
        c: u32,
        key: f32,
    ) {
        if self.faces.len() == self.faces.capacity() {
            let grow = self.faces.capacity().max(GROWTH_FLOOR);
            self.faces.reserve(grow);
        }
        self.faces.push(Face {
            drawable,
            material,
            indices: [a, b, c],
            key,
        });
    }

    /// The submitted faces, in submission order.
    #[inline]
    #[must_use]
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Marks the faces consumed (count back to zero, capacity kept).
    pub(crate) fn consume(&mut self) {
        self.faces.clear();
    }
}
