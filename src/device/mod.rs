//! Render Device Context
//!
//! [`RenderDevice`] is the explicitly constructed context object that every
//! shader and alpha-pipeline operation goes through. It wraps a boxed
//! [`GpuBackend`] and tracks the currently bound program handle so the
//! single-active-program invariant can be enforced without asking the driver.
//!
//! There is no global device singleton; the owning scene or render context
//! constructs a `RenderDevice` and passes it by `&mut` down the frame loop.

mod backend;
mod headless;

pub use backend::{GpuBackend, GpuHandle, IndexFormat, NULL_HANDLE};
pub use headless::{HeadlessBackend, HeadlessProbe};

/// Device context: backend access plus bound-program tracking.
pub struct RenderDevice {
    backend: Box<dyn GpuBackend>,
    bound_program: GpuHandle,
}

impl RenderDevice {
    /// Wraps a backend into a device context.
    #[must_use]
    pub fn new(backend: Box<dyn GpuBackend>) -> Self {
        Self {
            backend,
            bound_program: NULL_HANDLE,
        }
    }

    /// Convenience constructor for tests and tools: a headless device.
    #[must_use]
    pub fn headless() -> Self {
        Self::new(Box::new(HeadlessBackend::new()))
    }

    /// The program handle currently bound on this device (`0` when none).
    #[inline]
    #[must_use]
    pub fn bound_program(&self) -> GpuHandle {
        self.bound_program
    }

    /// Makes a program current and records it as bound.
    pub(crate) fn bind_program(&mut self, program: GpuHandle) {
        self.backend.use_program(program);
        self.bound_program = program;
    }

    /// Clears the current program.
    pub(crate) fn unbind_program(&mut self) {
        self.backend.use_program(NULL_HANDLE);
        self.bound_program = NULL_HANDLE;
    }

    /// Issues an indexed triangle-list draw from the bound index buffer.
    ///
    /// The entry point material draw paths use; `first_index`/`index_count`
    /// select the range, `min_vertex`/`max_vertex` hint at the referenced
    /// vertex span.
    pub fn draw_indexed(
        &mut self,
        first_index: u32,
        index_count: u32,
        min_vertex: u32,
        max_vertex: u32,
    ) {
        self.backend
            .draw_indexed(first_index, index_count, min_vertex, max_vertex);
    }

    /// Raw backend access for the crate internals.
    #[inline]
    pub(crate) fn backend(&mut self) -> &mut dyn GpuBackend {
        self.backend.as_mut()
    }
}

impl std::fmt::Debug for RenderDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDevice")
            .field("bound_program", &self.bound_program)
            .finish_non_exhaustive()
    }
}
