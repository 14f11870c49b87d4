//! Shader Instance Handles
//!
//! [`ShaderInstanceHandle`] is the client-facing access path to a shared
//! program instance: a material attaches it to a [`ShaderManager`], assigns
//! fragment names plus an option string, then binds it to issue draws.
//! Handles store an arena id, never a pointer; a handle whose instance was
//! bulk-destroyed by a fragment removal gets [`GlimmerError::InstanceRemoved`]
//! on next use instead of touching freed memory.
//!
//! # Location caches
//!
//! Uniform and attribute locations are resolved by name against the *linked*
//! program and cached under caller-supplied semantic keys (`0..=127`), so
//! per-frame lookups don't hit the driver. The caches record which GPU
//! program they were resolved against and drop themselves when the instance
//! relinks to a new one (hot reload); they are also cleared whenever the
//! handle is re-assigned or detached.
//!
//! # Invariants
//!
//! Detaching (or dropping through re-assign) while the program is bound is a
//! loud error: a handle dying with its program still on the device indicates
//! a control-flow bug in the caller.

use rustc_hash::FxHashMap;

use super::fragment_store::FragmentIndex;
use super::instance::{InstanceId, InstanceKey, InstanceState};
use super::manager::ShaderManager;
use super::options::ShaderOptions;
use super::stage::ShaderStage;
use crate::device::{GpuHandle, NULL_HANDLE, RenderDevice};
use crate::errors::{GlimmerError, Result};

/// Highest usable semantic location cache key.
pub const MAX_SEMANTIC_KEY: u32 = 127;

/// How far `build` drives the instance lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Compile all stage fragments, do not link.
    CompileOnly,
    /// Compile and link.
    Full,
}

/// The stage fragment names and option string a handle is assigned to.
///
/// Geometry and tessellation stages are optional; the option string may be
/// written in any token order (it is canonicalized before keying).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramSelection<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
    pub geometry: Option<&'a str>,
    pub tess_control: Option<&'a str>,
    pub tess_eval: Option<&'a str>,
    pub options: &'a str,
}

/// Client-facing handle onto a shared, reference-counted program instance.
#[derive(Debug)]
pub struct ShaderInstanceHandle {
    name: String,
    manager: Option<u64>,
    instance: Option<InstanceId>,
    uniform_cache: FxHashMap<u32, i32>,
    attribute_cache: FxHashMap<u32, i32>,
    /// GPU program the location caches were resolved against; a relink
    /// changes it and invalidates both caches.
    cached_program: GpuHandle,
}

impl ShaderInstanceHandle {
    /// Creates a detached handle. `name` identifies the owning resource in
    /// diagnostics (typically the material or technique name).
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manager: None,
            instance: None,
            uniform_cache: FxHashMap::default(),
            attribute_cache: FxHashMap::default(),
            cached_program: NULL_HANDLE,
        }
    }

    /// Resource name of this handle.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The arena id of the assigned instance, if any. Two handles assigned
    /// identical keys report the same id.
    #[inline]
    #[must_use]
    pub fn instance_id(&self) -> Option<InstanceId> {
        self.instance
    }

    /// Attaches the handle to a manager.
    ///
    /// Re-attaching to the same manager is a no-op; switching managers while
    /// an instance is assigned is an error.
    pub fn attach(&mut self, manager: &ShaderManager) -> Result<()> {
        match self.manager {
            Some(id) if id != manager.id() && self.instance.is_some() => {
                Err(GlimmerError::ManagerMismatch {
                    name: self.name.clone(),
                })
            }
            _ => {
                self.manager = Some(manager.id());
                Ok(())
            }
        }
    }

    /// Releases the assigned instance and detaches from the manager.
    ///
    /// Fails loudly with [`GlimmerError::StillBound`] while the program is
    /// bound — callers must unbind first.
    pub fn detach(&mut self, manager: &mut ShaderManager, device: &mut RenderDevice) -> Result<()> {
        self.check_manager(manager)?;
        if let Some(id) = self.instance {
            manager.release(device, id)?;
        }
        self.instance = None;
        self.manager = None;
        self.clear_location_caches();
        Ok(())
    }

    /// Assigns the handle to the program identified by the given fragment
    /// names and option string.
    ///
    /// Resolves names to indices, canonicalizes the options, and acquires
    /// the matching instance — sharing an existing one when the exact key is
    /// already live. A previously assigned instance is released first
    /// (refcount transfer semantics); re-assigning while bound is an error.
    pub fn assign(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        selection: &ProgramSelection<'_>,
    ) -> Result<()> {
        self.check_manager(manager)?;

        let vertex = Self::resolve(manager, ShaderStage::Vertex, selection.vertex)?;
        let fragment = Self::resolve(manager, ShaderStage::Fragment, selection.fragment)?;
        let geometry = selection
            .geometry
            .map(|n| Self::resolve(manager, ShaderStage::Geometry, n))
            .transpose()?;
        let tess_control = selection
            .tess_control
            .map(|n| Self::resolve(manager, ShaderStage::TessControl, n))
            .transpose()?;
        let tess_eval = selection
            .tess_eval
            .map(|n| Self::resolve(manager, ShaderStage::TessEval, n))
            .transpose()?;

        let key = InstanceKey {
            vertex,
            fragment,
            geometry,
            tess_control,
            tess_eval,
            options: ShaderOptions::parse(selection.options).canonical_string(),
        };

        // Release the old reference before acquiring the new one; release
        // refuses while bound, which is exactly the invariant we want.
        if let Some(old) = self.instance {
            manager.release(device, old)?;
            self.instance = None;
        }

        self.instance = Some(manager.acquire(key, &self.name));
        self.clear_location_caches();
        Ok(())
    }

    /// Copies the handle by taking another reference on the same instance.
    ///
    /// The underlying program is never duplicated; the clone starts with
    /// empty location caches.
    pub fn clone_ref(&self, manager: &mut ShaderManager) -> Result<ShaderInstanceHandle> {
        self.check_manager(manager)?;
        if let Some(id) = self.instance
            && !manager.add_ref(id)
        {
            return Err(GlimmerError::InstanceRemoved {
                name: self.name.clone(),
            });
        }
        Ok(Self {
            name: self.name.clone(),
            manager: self.manager,
            instance: self.instance,
            uniform_cache: FxHashMap::default(),
            attribute_cache: FxHashMap::default(),
            cached_program: NULL_HANDLE,
        })
    }

    /// Drives compilation (and linking, for [`BuildMode::Full`]) of the
    /// assigned instance.
    pub fn build(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        mode: BuildMode,
    ) -> Result<()> {
        let id = self.assigned(manager)?;
        let (instance, store, cache) = self.parts(manager, id)?;
        match mode {
            BuildMode::CompileOnly => instance.compile(device, store, cache),
            BuildMode::Full => instance.link(device, store, cache),
        }
    }

    /// Binds the program on the device, compiling and linking on demand.
    pub fn bind(&mut self, manager: &mut ShaderManager, device: &mut RenderDevice) -> Result<()> {
        let id = self.assigned(manager)?;
        let (instance, store, cache) = self.parts(manager, id)?;
        instance.bind(device, store, cache)
    }

    /// Unbinds the program. Fails when this handle's instance is not bound.
    pub fn unbind(&mut self, manager: &mut ShaderManager, device: &mut RenderDevice) -> Result<()> {
        let id = self.assigned(manager)?;
        let (instance, _, _) = self.parts(manager, id)?;
        instance.unbind(device)
    }

    /// Current lifecycle state of the assigned instance.
    #[must_use]
    pub fn state(&self, manager: &ShaderManager) -> Option<InstanceState> {
        self.instance.and_then(|id| manager.state(id))
    }

    // ── Location resolution ──────────────────────────────────────────────────

    /// Resolves a uniform location by name, caching it under `key`.
    ///
    /// Requires the instance to be linked. `Ok(None)` means the driver knows
    /// no such active uniform (the GL "-1" case); only hits are cached.
    pub fn uniform_location(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        key: u32,
        name: &str,
    ) -> Result<Option<i32>> {
        Self::check_key(key)?;
        let program = self.checked_program(manager)?;
        if let Some(&location) = self.uniform_cache.get(&key) {
            return Ok(Some(location));
        }
        let location = device.backend().uniform_location(program, name);
        if let Some(location) = location {
            self.uniform_cache.insert(key, location);
        }
        Ok(location)
    }

    /// Resolves a vertex attribute location by name, caching it under `key`.
    pub fn attribute_location(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        key: u32,
        name: &str,
    ) -> Result<Option<i32>> {
        Self::check_key(key)?;
        let program = self.checked_program(manager)?;
        if let Some(&location) = self.attribute_cache.get(&key) {
            return Ok(Some(location));
        }
        let location = device.backend().attribute_location(program, name);
        if let Some(location) = location {
            self.attribute_cache.insert(key, location);
        }
        Ok(location)
    }

    /// Drops one cached uniform location.
    pub fn remove_uniform(&mut self, key: u32) {
        self.uniform_cache.remove(&key);
    }

    /// Drops all cached uniform locations.
    pub fn remove_uniforms(&mut self) {
        self.uniform_cache.clear();
    }

    /// Drops one cached attribute location.
    pub fn remove_attribute(&mut self, key: u32) {
        self.attribute_cache.remove(&key);
    }

    /// Drops all cached attribute locations.
    pub fn remove_attributes(&mut self) {
        self.attribute_cache.clear();
    }

    // ── Uniform upload ───────────────────────────────────────────────────────

    pub fn set_uniform_f32(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        key: u32,
        name: &str,
        value: f32,
    ) -> Result<()> {
        if let Some(location) = self.uniform_for_upload(manager, device, key, name)? {
            device.backend().set_uniform_f32(location, value);
        }
        Ok(())
    }

    pub fn set_uniform_i32(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        key: u32,
        name: &str,
        value: i32,
    ) -> Result<()> {
        if let Some(location) = self.uniform_for_upload(manager, device, key, name)? {
            device.backend().set_uniform_i32(location, value);
        }
        Ok(())
    }

    pub fn set_uniform_vec2(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        key: u32,
        name: &str,
        value: [f32; 2],
    ) -> Result<()> {
        if let Some(location) = self.uniform_for_upload(manager, device, key, name)? {
            device.backend().set_uniform_vec2(location, value);
        }
        Ok(())
    }

    pub fn set_uniform_vec3(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        key: u32,
        name: &str,
        value: [f32; 3],
    ) -> Result<()> {
        if let Some(location) = self.uniform_for_upload(manager, device, key, name)? {
            device.backend().set_uniform_vec3(location, value);
        }
        Ok(())
    }

    pub fn set_uniform_vec4(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        key: u32,
        name: &str,
        value: [f32; 4],
    ) -> Result<()> {
        if let Some(location) = self.uniform_for_upload(manager, device, key, name)? {
            device.backend().set_uniform_vec4(location, value);
        }
        Ok(())
    }

    pub fn set_uniform_mat4(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        key: u32,
        name: &str,
        value: &[f32; 16],
    ) -> Result<()> {
        if let Some(location) = self.uniform_for_upload(manager, device, key, name)? {
            device.backend().set_uniform_mat4(location, value);
        }
        Ok(())
    }

    /// Sets a sampler uniform to a texture unit and binds the texture to
    /// that unit as a side effect.
    pub fn set_uniform_texture(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        key: u32,
        name: &str,
        unit: u32,
        texture: GpuHandle,
    ) -> Result<()> {
        if let Some(location) = self.uniform_for_upload(manager, device, key, name)? {
            device.backend().set_uniform_i32(location, unit as i32);
        }
        device.backend().bind_texture(unit, texture);
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn check_manager(&self, manager: &ShaderManager) -> Result<()> {
        match self.manager {
            None => Err(GlimmerError::NotAttached {
                name: self.name.clone(),
            }),
            Some(id) if id != manager.id() => Err(GlimmerError::ManagerMismatch {
                name: self.name.clone(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn assigned(&self, manager: &ShaderManager) -> Result<InstanceId> {
        self.check_manager(manager)?;
        self.instance.ok_or_else(|| GlimmerError::NotAttached {
            name: self.name.clone(),
        })
    }

    fn parts<'m>(
        &self,
        manager: &'m mut ShaderManager,
        id: InstanceId,
    ) -> Result<(
        &'m mut super::instance::ShaderProgramInstance,
        &'m super::fragment_store::ProgramFragmentStore,
        &'m mut super::fragment_cache::CompiledFragmentCache,
    )> {
        manager
            .parts_mut(id)
            .ok_or_else(|| GlimmerError::InstanceRemoved {
                name: self.name.clone(),
            })
    }

    fn resolve(manager: &ShaderManager, stage: ShaderStage, name: &str) -> Result<FragmentIndex> {
        manager
            .store()
            .index_of(stage, name)
            .ok_or_else(|| GlimmerError::UnknownFragment {
                stage,
                name: name.to_string(),
            })
    }

    fn check_key(key: u32) -> Result<()> {
        if key > MAX_SEMANTIC_KEY {
            return Err(GlimmerError::SemanticKeyOutOfRange { key });
        }
        Ok(())
    }

    /// Common precondition for uniform upload: instance bound, location
    /// resolved. An unknown uniform name is a silent no-op (the driver-side
    /// "-1 location" convention), everything else is a hard error.
    fn uniform_for_upload(
        &mut self,
        manager: &mut ShaderManager,
        device: &mut RenderDevice,
        key: u32,
        name: &str,
    ) -> Result<Option<i32>> {
        let id = self.assigned(manager)?;
        let instance = manager
            .instance(id)
            .ok_or_else(|| GlimmerError::InstanceRemoved {
                name: self.name.clone(),
            })?;
        if !instance.is_in_use() {
            return Err(GlimmerError::NotBound {
                program: self.name.clone(),
            });
        }
        let location = self.uniform_location(manager, device, key, name)?;
        if location.is_none() {
            log::trace!("uniform {name:?} not active in program {:?}", self.name);
        }
        Ok(location)
    }

    fn clear_location_caches(&mut self) {
        self.uniform_cache.clear();
        self.attribute_cache.clear();
        self.cached_program = NULL_HANDLE;
    }

    /// The linked program, with the location caches invalidated when the
    /// instance has relinked to a different GPU program since they were
    /// filled.
    fn checked_program(&mut self, manager: &ShaderManager) -> Result<GpuHandle> {
        let program = self.linked_program(manager)?;
        if program != self.cached_program {
            self.clear_location_caches();
            self.cached_program = program;
        }
        Ok(program)
    }

    /// The linked program's GPU handle, or `NotLinked`.
    fn linked_program(&self, manager: &ShaderManager) -> Result<GpuHandle> {
        let id = self.assigned(manager)?;
        let instance = manager
            .instance(id)
            .ok_or_else(|| GlimmerError::InstanceRemoved {
                name: self.name.clone(),
            })?;
        if !instance.state().contains(InstanceState::LINKED) {
            return Err(GlimmerError::NotLinked {
                program: self.name.clone(),
            });
        }
        Ok(instance.gpu_program())
    }
}

impl Drop for ShaderInstanceHandle {
    fn drop(&mut self) {
        // Drop has no manager access; a still-assigned handle leaks one
        // reference. Surface it instead of hiding it.
        if self.instance.is_some() {
            log::warn!(
                "shader handle {:?} dropped while still attached; instance reference leaked",
                self.name
            );
        }
    }
}
