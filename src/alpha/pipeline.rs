//! Alpha Pipeline
//!
//! Composition of collector, sorter, and batcher plus the two shared GPU
//! index buffers (one 16-bit, one 32-bit, created lazily). The frame
//! contract is `add_face* → sort → draw`, once each per frame:
//!
//! - `sort` consumes the submitted faces and rebuilds the batch list;
//!   calling it again before any new `add_face` is a safe no-op that keeps
//!   the previous batch list.
//! - `draw` walks the batches in sorted order, temporarily redirecting each
//!   drawable's face source to its slice of the shared index buffer. A batch
//!   whose drawable or material no longer resolves is dropped; the frame
//!   never fails here.

use super::batcher::{DrawBatch, FaceBatcher};
use super::collector::AlphaFaceCollector;
use super::radix::RadixFaceSorter;
use super::{AlphaScene, DrawInfo, DrawableId, ExternalFaceRange, MaterialId};
use crate::device::{GpuHandle, IndexFormat, NULL_HANDLE, RenderDevice};

/// Owner of the per-frame translucency pipeline.
#[derive(Debug, Default)]
pub struct AlphaPipeline {
    collector: AlphaFaceCollector,
    sorter: RadixFaceSorter,
    batcher: FaceBatcher,
    buffer16: GpuHandle,
    buffer32: GpuHandle,
    /// True once the current submissions were consumed by `sort`.
    consumed: bool,
}

impl AlphaPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears submitted faces and the batch list for a new frame.
    pub fn reset(&mut self) {
        self.collector.reset();
        self.batcher.clear();
        self.consumed = false;
    }

    /// Deletes the shared GPU index buffers and resets the pipeline.
    ///
    /// Call before dropping the pipeline while the device is still alive;
    /// the pipeline stays usable and lazily recreates the buffers on the
    /// next `sort`.
    pub fn destroy(&mut self, device: &mut RenderDevice) {
        if self.buffer16 != NULL_HANDLE {
            device.backend().delete_buffer(self.buffer16);
            self.buffer16 = NULL_HANDLE;
        }
        if self.buffer32 != NULL_HANDLE {
            device.backend().delete_buffer(self.buffer32);
            self.buffer32 = NULL_HANDLE;
        }
        self.reset();
    }

    /// Submits one translucent triangle for this frame.
    pub fn add_face(
        &mut self,
        drawable: DrawableId,
        material: MaterialId,
        a: u32,
        b: u32,
        c: u32,
        key: f32,
    ) {
        self.collector.add_face(drawable, material, a, b, c, key);
        self.consumed = false;
    }

    /// Sorts the submitted faces back-to-front and rebuilds the batch list,
    /// uploading the packed index data to the shared buffers.
    ///
    /// With zero submitted faces this clears the batch list and returns —
    /// unless the faces were already consumed by a previous `sort`, in which
    /// case the previous batch list is kept unchanged.
    pub fn sort(&mut self, device: &mut RenderDevice, scene: &dyn AlphaScene) {
        if self.collector.is_empty() {
            if !self.consumed {
                self.batcher.clear();
            }
            return;
        }

        let order = self
            .sorter
            .sort(self.collector.faces().iter().map(|face| face.key));
        self.batcher.rebuild(self.collector.faces(), order, scene);

        if !self.batcher.indices16().is_empty() {
            if self.buffer16 == NULL_HANDLE {
                self.buffer16 = device.backend().create_index_buffer();
            }
            device
                .backend()
                .upload_indices_u16(self.buffer16, self.batcher.indices16());
        }
        if !self.batcher.indices32().is_empty() {
            if self.buffer32 == NULL_HANDLE {
                self.buffer32 = device.backend().create_index_buffer();
            }
            device
                .backend()
                .upload_indices_u32(self.buffer32, self.batcher.indices32());
        }

        self.collector.consume();
        self.consumed = true;
    }

    /// Draws every batch in sorted order.
    ///
    /// Per batch: bind the right index buffer, hand the drawable a
    /// restricted view onto its index range, apply its transform, invoke the
    /// material's alpha draw path, then restore the drawable's internal face
    /// source — restored even when the draw path errors.
    pub fn draw(&self, device: &mut RenderDevice, scene: &mut dyn AlphaScene, info: &DrawInfo) {
        for batch in self.batcher.batches() {
            let Some((drawable, material)) = scene.resolve_pair(batch.drawable, batch.material)
            else {
                log::debug!(
                    "dropping alpha batch: drawable {:?} / material {:?} not resolvable",
                    batch.drawable,
                    batch.material
                );
                continue;
            };

            let (buffer, format) = if batch.use_32bit {
                (self.buffer32, IndexFormat::Uint32)
            } else {
                (self.buffer16, IndexFormat::Uint16)
            };
            device.backend().bind_index_buffer(buffer, format);

            let range = ExternalFaceRange {
                buffer,
                format,
                first_index: batch.first_index,
                index_count: batch.index_count,
                min_vertex: batch.min_vertex,
                max_vertex: batch.max_vertex,
            };
            drawable.bind_external_faces(&range);
            drawable.apply_transform(device);
            if let Err(err) = material.draw_alpha(device, drawable, info) {
                log::warn!(
                    "alpha draw of material {:?} failed: {err}",
                    batch.material
                );
            }
            drawable.restore_internal_faces();
        }
    }

    /// Faces currently submitted and not yet consumed.
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.collector.len()
    }

    /// Batches produced by the last `sort`.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batcher.batches().len()
    }

    /// The batch list produced by the last `sort`, in draw order.
    #[must_use]
    pub fn batches(&self) -> &[DrawBatch] {
        self.batcher.batches()
    }

    /// Packed 16-bit index data of the last `sort`.
    #[must_use]
    pub fn indices16(&self) -> &[u16] {
        self.batcher.indices16()
    }

    /// Packed 32-bit index data of the last `sort`.
    #[must_use]
    pub fn indices32(&self) -> &[u32] {
        self.batcher.indices32()
    }
}

impl Drop for AlphaPipeline {
    fn drop(&mut self) {
        // Drop has no device access; live buffers leak. Surface it instead
        // of hiding it.
        if self.buffer16 != NULL_HANDLE || self.buffer32 != NULL_HANDLE {
            log::warn!("alpha pipeline dropped with live index buffers; call destroy first");
        }
    }
}
