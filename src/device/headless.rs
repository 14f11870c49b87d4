//! Headless Backend
//!
//! A driverless [`GpuBackend`] that simulates compile/link outcomes and
//! records every object operation. It exists so the shader state machine and
//! the alpha pipeline can be exercised in tests and CI without a GPU.
//!
//! # Simulation rules
//!
//! - `compile_shader` fails iff the preprocessed source contains an `#error`
//!   directive; the directive line becomes the diagnostic log.
//! - `link_program` fails when no shader objects are attached, or once after
//!   [`HeadlessProbe::fail_next_link`].
//! - Uniform/attribute locations are handed out sequentially per program on
//!   first query; names registered via [`HeadlessProbe::add_missing_name`]
//!   resolve to `None`.
//!
//! A [`HeadlessProbe`] cloned off the backend before boxing it into a
//! [`RenderDevice`](super::RenderDevice) keeps counters and uploaded data
//! inspectable after the move.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::backend::{GpuBackend, GpuHandle, IndexFormat, NULL_HANDLE};
use crate::shader::ShaderStage;

#[derive(Debug)]
struct ShaderObject {
    #[allow(dead_code)]
    stage: ShaderStage,
}

#[derive(Debug, Default)]
struct ProgramObject {
    attached: Vec<GpuHandle>,
    linked: bool,
    uniform_locations: FxHashMap<String, i32>,
    attribute_locations: FxHashMap<String, i32>,
    next_location: i32,
}

#[derive(Debug, Default)]
struct BufferObject {
    data_u16: Vec<u16>,
    data_u32: Vec<u32>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_handle: GpuHandle,
    shaders: FxHashMap<GpuHandle, ShaderObject>,
    programs: FxHashMap<GpuHandle, ProgramObject>,
    buffers: FxHashMap<GpuHandle, BufferObject>,
    current_program: GpuHandle,
    bound_index_buffer: Option<(GpuHandle, IndexFormat)>,
    texture_units: FxHashMap<u32, GpuHandle>,
    missing_names: FxHashSet<String>,
    draw_calls: Vec<(u32, u32, u32, u32)>,
    fail_next_link: bool,
    compile_calls: u32,
    link_calls: u32,
    deleted_programs: u32,
    uniform_writes: u32,
}

impl HeadlessState {
    fn alloc(&mut self) -> GpuHandle {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Recording, driverless backend. See the module docs for simulation rules.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones an inspection handle that stays valid after the backend is
    /// boxed into a device.
    #[must_use]
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            state: Rc::clone(&self.state),
        }
    }
}

impl GpuBackend for HeadlessBackend {
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<GpuHandle, String> {
        let mut state = self.state.borrow_mut();
        state.compile_calls += 1;
        if let Some(line) = source.lines().find(|l| l.trim_start().starts_with("#error")) {
            return Err(format!("{stage} shader rejected: {}", line.trim()));
        }
        let handle = state.alloc();
        state.shaders.insert(handle, ShaderObject { stage });
        Ok(handle)
    }

    fn delete_shader(&mut self, shader: GpuHandle) {
        self.state.borrow_mut().shaders.remove(&shader);
    }

    fn create_program(&mut self) -> GpuHandle {
        let mut state = self.state.borrow_mut();
        let handle = state.alloc();
        state.programs.insert(handle, ProgramObject::default());
        handle
    }

    fn attach_shader(&mut self, program: GpuHandle, shader: GpuHandle) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program) {
            p.attached.push(shader);
        }
    }

    fn detach_shader(&mut self, program: GpuHandle, shader: GpuHandle) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program) {
            p.attached.retain(|&s| s != shader);
        }
    }

    fn link_program(&mut self, program: GpuHandle) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        state.link_calls += 1;
        if state.fail_next_link {
            state.fail_next_link = false;
            return Err("forced link failure".to_string());
        }
        let Some(p) = state.programs.get_mut(&program) else {
            return Err(format!("unknown program handle {program}"));
        };
        if p.attached.is_empty() {
            return Err("no shader objects attached".to_string());
        }
        p.linked = true;
        Ok(())
    }

    fn delete_program(&mut self, program: GpuHandle) {
        let mut state = self.state.borrow_mut();
        if state.programs.remove(&program).is_some() {
            state.deleted_programs += 1;
        }
    }

    fn use_program(&mut self, program: GpuHandle) {
        self.state.borrow_mut().current_program = program;
    }

    fn uniform_location(&mut self, program: GpuHandle, name: &str) -> Option<i32> {
        let mut state = self.state.borrow_mut();
        if state.missing_names.contains(name) {
            return None;
        }
        let p = state.programs.get_mut(&program)?;
        if !p.linked {
            return None;
        }
        if let Some(&loc) = p.uniform_locations.get(name) {
            return Some(loc);
        }
        let loc = p.next_location;
        p.next_location += 1;
        p.uniform_locations.insert(name.to_string(), loc);
        Some(loc)
    }

    fn attribute_location(&mut self, program: GpuHandle, name: &str) -> Option<i32> {
        let mut state = self.state.borrow_mut();
        if state.missing_names.contains(name) {
            return None;
        }
        let p = state.programs.get_mut(&program)?;
        if !p.linked {
            return None;
        }
        if let Some(&loc) = p.attribute_locations.get(name) {
            return Some(loc);
        }
        let loc = p.next_location;
        p.next_location += 1;
        p.attribute_locations.insert(name.to_string(), loc);
        Some(loc)
    }

    fn set_uniform_f32(&mut self, _location: i32, _value: f32) {
        self.state.borrow_mut().uniform_writes += 1;
    }

    fn set_uniform_i32(&mut self, _location: i32, _value: i32) {
        self.state.borrow_mut().uniform_writes += 1;
    }

    fn set_uniform_vec2(&mut self, _location: i32, _value: [f32; 2]) {
        self.state.borrow_mut().uniform_writes += 1;
    }

    fn set_uniform_vec3(&mut self, _location: i32, _value: [f32; 3]) {
        self.state.borrow_mut().uniform_writes += 1;
    }

    fn set_uniform_vec4(&mut self, _location: i32, _value: [f32; 4]) {
        self.state.borrow_mut().uniform_writes += 1;
    }

    fn set_uniform_mat4(&mut self, _location: i32, _value: &[f32; 16]) {
        self.state.borrow_mut().uniform_writes += 1;
    }

    fn bind_texture(&mut self, unit: u32, texture: GpuHandle) {
        self.state.borrow_mut().texture_units.insert(unit, texture);
    }

    fn create_index_buffer(&mut self) -> GpuHandle {
        let mut state = self.state.borrow_mut();
        let handle = state.alloc();
        state.buffers.insert(handle, BufferObject::default());
        handle
    }

    fn upload_indices_u16(&mut self, buffer: GpuHandle, data: &[u16]) {
        if let Some(b) = self.state.borrow_mut().buffers.get_mut(&buffer) {
            b.data_u16 = data.to_vec();
        }
    }

    fn upload_indices_u32(&mut self, buffer: GpuHandle, data: &[u32]) {
        if let Some(b) = self.state.borrow_mut().buffers.get_mut(&buffer) {
            b.data_u32 = data.to_vec();
        }
    }

    fn bind_index_buffer(&mut self, buffer: GpuHandle, format: IndexFormat) {
        self.state.borrow_mut().bound_index_buffer = Some((buffer, format));
    }

    fn delete_buffer(&mut self, buffer: GpuHandle) {
        self.state.borrow_mut().buffers.remove(&buffer);
    }

    fn draw_indexed(
        &mut self,
        first_index: u32,
        index_count: u32,
        min_vertex: u32,
        max_vertex: u32,
    ) {
        self.state
            .borrow_mut()
            .draw_calls
            .push((first_index, index_count, min_vertex, max_vertex));
    }
}

/// Inspection handle onto a [`HeadlessBackend`]'s recorded state.
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessProbe {
    /// Number of live (created, not yet deleted) shader objects.
    #[must_use]
    pub fn live_shaders(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    /// Number of live program objects.
    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    /// Number of live buffer objects.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    /// Total `compile_shader` invocations (including failed ones).
    #[must_use]
    pub fn compile_calls(&self) -> u32 {
        self.state.borrow().compile_calls
    }

    /// Total `link_program` invocations.
    #[must_use]
    pub fn link_calls(&self) -> u32 {
        self.state.borrow().link_calls
    }

    /// Programs deleted so far.
    #[must_use]
    pub fn deleted_programs(&self) -> u32 {
        self.state.borrow().deleted_programs
    }

    /// Total uniform uploads.
    #[must_use]
    pub fn uniform_writes(&self) -> u32 {
        self.state.borrow().uniform_writes
    }

    /// The program the backend currently has in use.
    #[must_use]
    pub fn current_program(&self) -> GpuHandle {
        self.state.borrow().current_program
    }

    /// The currently bound index buffer, if any.
    #[must_use]
    pub fn bound_index_buffer(&self) -> Option<(GpuHandle, IndexFormat)> {
        self.state.borrow().bound_index_buffer
    }

    /// Texture bound to the given unit (`0` when none).
    #[must_use]
    pub fn texture_at(&self, unit: u32) -> GpuHandle {
        self.state
            .borrow()
            .texture_units
            .get(&unit)
            .copied()
            .unwrap_or(NULL_HANDLE)
    }

    /// Last 16-bit index data uploaded to a buffer.
    #[must_use]
    pub fn indices_u16(&self, buffer: GpuHandle) -> Vec<u16> {
        self.state
            .borrow()
            .buffers
            .get(&buffer)
            .map(|b| b.data_u16.clone())
            .unwrap_or_default()
    }

    /// Last 32-bit index data uploaded to a buffer.
    #[must_use]
    pub fn indices_u32(&self, buffer: GpuHandle) -> Vec<u32> {
        self.state
            .borrow()
            .buffers
            .get(&buffer)
            .map(|b| b.data_u32.clone())
            .unwrap_or_default()
    }

    /// Recorded `draw_indexed` calls: (first_index, index_count, min_vertex,
    /// max_vertex), in issue order.
    #[must_use]
    pub fn draw_calls(&self) -> Vec<(u32, u32, u32, u32)> {
        self.state.borrow().draw_calls.clone()
    }

    /// Makes the next `link_program` call fail.
    pub fn fail_next_link(&self) {
        self.state.borrow_mut().fail_next_link = true;
    }

    /// Registers a uniform/attribute name that resolves to no location.
    pub fn add_missing_name(&self, name: &str) {
        self.state.borrow_mut().missing_names.insert(name.to_string());
    }
}
