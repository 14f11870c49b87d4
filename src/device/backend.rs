//! Graphics Backend Abstraction
//!
//! The render core never talks to a driver directly; everything goes through
//! the [`GpuBackend`] trait so the shader state machine and the alpha pipeline
//! can run against a real context or against [`HeadlessBackend`] in tests.
//!
//! Handles are plain `u32`s with `0` meaning "no object", matching the wire
//! convention of GL-style drivers. All calls are immediate and blocking; the
//! trait is consumed from exactly one render thread.
//!
//! [`HeadlessBackend`]: super::headless::HeadlessBackend

use crate::shader::ShaderStage;

/// Raw backend object handle. `0` is the null handle.
pub type GpuHandle = u32;

/// The null handle constant, for readability at call sites.
pub const NULL_HANDLE: GpuHandle = 0;

/// Element width of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices, usable when the vertex count fits in `u16`.
    Uint16,
    /// 32-bit indices.
    Uint32,
}

/// Immediate-mode graphics driver primitives consumed by the render core.
///
/// Errors are driver diagnostic logs; the caller wraps them into the crate
/// error type together with resource names.
pub trait GpuBackend {
    // ── Shader objects ───────────────────────────────────────────────────────

    /// Compiles one stage's preprocessed source into a shader object.
    ///
    /// Returns the new object handle, or the driver's compile log on failure.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<GpuHandle, String>;

    /// Deletes a shader object.
    fn delete_shader(&mut self, shader: GpuHandle);

    // ── Programs ─────────────────────────────────────────────────────────────

    /// Creates an empty program object.
    fn create_program(&mut self) -> GpuHandle;

    /// Attaches a compiled shader object to a program.
    fn attach_shader(&mut self, program: GpuHandle, shader: GpuHandle);

    /// Detaches a shader object from a program.
    fn detach_shader(&mut self, program: GpuHandle, shader: GpuHandle);

    /// Links a program from its attached shader objects.
    ///
    /// Returns the driver's link log on failure.
    fn link_program(&mut self, program: GpuHandle) -> Result<(), String>;

    /// Deletes a program object.
    fn delete_program(&mut self, program: GpuHandle);

    /// Makes a program current, or clears the current program for `0`.
    fn use_program(&mut self, program: GpuHandle);

    // ── Introspection ────────────────────────────────────────────────────────

    /// Resolves a uniform name against a linked program.
    fn uniform_location(&mut self, program: GpuHandle, name: &str) -> Option<i32>;

    /// Resolves a vertex attribute name against a linked program.
    fn attribute_location(&mut self, program: GpuHandle, name: &str) -> Option<i32>;

    // ── Uniform upload (current program) ─────────────────────────────────────

    fn set_uniform_f32(&mut self, location: i32, value: f32);
    fn set_uniform_i32(&mut self, location: i32, value: i32);
    fn set_uniform_vec2(&mut self, location: i32, value: [f32; 2]);
    fn set_uniform_vec3(&mut self, location: i32, value: [f32; 3]);
    fn set_uniform_vec4(&mut self, location: i32, value: [f32; 4]);
    fn set_uniform_mat4(&mut self, location: i32, value: &[f32; 16]);

    // ── Textures ─────────────────────────────────────────────────────────────

    /// Binds a texture object to a texture unit.
    fn bind_texture(&mut self, unit: u32, texture: GpuHandle);

    // ── Index buffers ────────────────────────────────────────────────────────

    /// Creates an index buffer object.
    fn create_index_buffer(&mut self) -> GpuHandle;

    /// Uploads 16-bit index data, replacing the buffer contents.
    fn upload_indices_u16(&mut self, buffer: GpuHandle, data: &[u16]);

    /// Uploads 32-bit index data, replacing the buffer contents.
    fn upload_indices_u32(&mut self, buffer: GpuHandle, data: &[u32]);

    /// Binds an index buffer as the active element source.
    fn bind_index_buffer(&mut self, buffer: GpuHandle, format: IndexFormat);

    /// Deletes a buffer object.
    fn delete_buffer(&mut self, buffer: GpuHandle);

    // ── Draw calls ───────────────────────────────────────────────────────────

    /// Issues an indexed triangle-list draw from the bound index buffer.
    ///
    /// `first_index`/`index_count` select the range, `min_vertex`/`max_vertex`
    /// are the referenced-vertex range hint.
    fn draw_indexed(&mut self, first_index: u32, index_count: u32, min_vertex: u32, max_vertex: u32);
}
