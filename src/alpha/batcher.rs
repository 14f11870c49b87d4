//! Face Batcher
//!
//! Walks the sorted permutation and merges maximal runs of *adjacent* faces
//! sharing (drawable, material) into one packed index range per run. Merging
//! only ever joins neighbours in sorted order, so global depth order is left
//! intact — batching reduces draw calls, it never reorders across a depth
//! boundary.
//!
//! Each run packs into the 16-bit output array when the drawable's vertex
//! buffer holds at most 65535 vertices, and into the 32-bit array otherwise.
//! The cutoff is a vertex *count* check: a drawable with exactly 65536
//! vertices packs 32-bit even if the run happens to reference low indices.

use super::collector::Face;
use super::{AlphaScene, DrawableId, MaterialId};

/// One contiguous run of sorted faces sharing owner and material, emitted as
/// a single packed index range.
#[derive(Debug, Clone, Copy)]
pub struct DrawBatch {
    /// Offset into the 16- or 32-bit index array, in indices.
    pub first_index: u32,
    pub index_count: u32,
    /// Smallest vertex index referenced by the run.
    pub min_vertex: u32,
    /// Largest vertex index referenced by the run.
    pub max_vertex: u32,
    pub drawable: DrawableId,
    pub material: MaterialId,
    pub use_32bit: bool,
}

/// Packs sorted face runs into per-width index arrays plus batch descriptors.
#[derive(Debug, Default)]
pub struct FaceBatcher {
    indices16: Vec<u16>,
    indices32: Vec<u32>,
    batches: Vec<DrawBatch>,
}

/// Largest vertex count a drawable may have and still pack 16-bit.
const MAX_U16_VERTICES: usize = u16::MAX as usize;

impl FaceBatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the index arrays and batch list from a sorted permutation.
    ///
    /// `scene` supplies per-drawable vertex counts; a drawable the scene
    /// cannot size packs 32-bit (the safe width) and is left for the draw
    /// phase to drop.
    pub fn rebuild(&mut self, faces: &[Face], order: &[u32], scene: &dyn AlphaScene) {
        self.indices16.clear();
        self.indices32.clear();
        self.batches.clear();

        let mut run_start = 0;
        while run_start < order.len() {
            let lead = faces[order[run_start] as usize];
            let mut run_end = run_start + 1;
            while run_end < order.len() {
                let face = faces[order[run_end] as usize];
                if face.drawable != lead.drawable || face.material != lead.material {
                    break;
                }
                run_end += 1;
            }

            let use_32bit = scene
                .vertex_count(lead.drawable)
                .is_none_or(|count| count > MAX_U16_VERTICES);

            let first_index = if use_32bit {
                self.indices32.len() as u32
            } else {
                self.indices16.len() as u32
            };
            let mut min_vertex = u32::MAX;
            let mut max_vertex = 0;

            for &slot in &order[run_start..run_end] {
                for index in faces[slot as usize].indices {
                    min_vertex = min_vertex.min(index);
                    max_vertex = max_vertex.max(index);
                    if use_32bit {
                        self.indices32.push(index);
                    } else {
                        debug_assert!(index <= u32::from(u16::MAX));
                        self.indices16.push(index as u16);
                    }
                }
            }

            self.batches.push(DrawBatch {
                first_index,
                index_count: ((run_end - run_start) * 3) as u32,
                min_vertex,
                max_vertex,
                drawable: lead.drawable,
                material: lead.material,
                use_32bit,
            });
            run_start = run_end;
        }
    }

    /// The batches, in sorted (back-to-front) order.
    #[inline]
    #[must_use]
    pub fn batches(&self) -> &[DrawBatch] {
        &self.batches
    }

    /// Packed 16-bit index data for this frame.
    #[inline]
    #[must_use]
    pub fn indices16(&self) -> &[u16] {
        &self.indices16
    }

    /// Packed 32-bit index data for this frame.
    #[inline]
    #[must_use]
    pub fn indices32(&self) -> &[u32] {
        &self.indices32
    }

    /// Drops the batch list and packed data.
    pub fn clear(&mut self) {
        self.indices16.clear();
        self.indices32.clear();
        self.batches.clear();
    }
}
