//! Shader Program Instances
//!
//! A [`ShaderProgramInstance`] is one compiled-and-linked whole program for a
//! specific fragment+options combination, identified by [`InstanceKey`] and
//! shared (via an intrusive reference count) by every handle that requests
//! the same key. Instances live in the manager's slotmap arena; handles hold
//! an [`InstanceId`] rather than a pointer, so bulk removal can never leave a
//! dangling reference — a stale id simply stops resolving.
//!
//! # Lifecycle
//!
//! ```text
//! Defined ──compile──▶ Compiled ──link──▶ Linked ⇄ InUse (bind/unbind)
//!    └──────────────── refcount 0 ──▶ destroyed (GPU program deleted)
//! ```
//!
//! `bind` implies compile+link on demand. At most one handle may have the
//! instance bound at a time; binding while `IN_USE` is a usage error, not a
//! queueing request.

use bitflags::bitflags;
use slotmap::new_key_type;
use smallvec::SmallVec;

use super::fragment_cache::CompiledFragmentCache;
use super::fragment_store::{FragmentIndex, ProgramFragmentStore};
use super::options::ShaderOptions;
use super::stage::ShaderStage;
use crate::device::{GpuHandle, NULL_HANDLE, RenderDevice};
use crate::errors::{GlimmerError, Result};

new_key_type! {
    /// Arena id of a shader program instance.
    pub struct InstanceId;
}

bitflags! {
    /// Lifecycle state mask of a program instance.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InstanceState: u8 {
        /// The instance exists in the arena.
        const DEFINED  = 1 << 0;
        /// Every stage index resolved against the fragment store.
        const LOADED   = 1 << 1;
        /// All required stage entries compiled for this option set.
        const COMPILED = 1 << 2;
        /// The backend program linked successfully.
        const LINKED   = 1 << 3;
        /// Bound on the device by exactly one handle.
        const IN_USE   = 1 << 4;
    }
}

/// The identity tuple of a program instance.
///
/// Two handles assigned the same key share one instance; differing in any
/// field (including the canonical option string) yields a distinct instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub vertex: FragmentIndex,
    pub fragment: FragmentIndex,
    pub geometry: Option<FragmentIndex>,
    pub tess_control: Option<FragmentIndex>,
    pub tess_eval: Option<FragmentIndex>,
    /// Canonical (sorted) option string, see [`ShaderOptions`].
    pub options: String,
}

impl InstanceKey {
    /// The present stages, in pipeline order.
    pub fn stages(&self) -> impl Iterator<Item = (ShaderStage, FragmentIndex)> + '_ {
        [
            Some((ShaderStage::Vertex, self.vertex)),
            Some((ShaderStage::Fragment, self.fragment)),
            self.geometry.map(|i| (ShaderStage::Geometry, i)),
            self.tess_control.map(|i| (ShaderStage::TessControl, i)),
            self.tess_eval.map(|i| (ShaderStage::TessEval, i)),
        ]
        .into_iter()
        .flatten()
    }

    /// Whether the key references a particular fragment.
    #[must_use]
    pub fn references(&self, stage: ShaderStage, index: FragmentIndex) -> bool {
        self.stages().any(|(s, i)| s == stage && i == index)
    }
}

/// A reference-counted, lazily compiled-and-linked whole program.
#[derive(Debug)]
pub struct ShaderProgramInstance {
    key: InstanceKey,
    options: ShaderOptions,
    state: InstanceState,
    gpu_program: GpuHandle,
    refs: u32,
    /// Resource name of the first requester, used in diagnostics only.
    name: String,
}

impl ShaderProgramInstance {
    pub(crate) fn new(key: InstanceKey, name: &str) -> Self {
        let options = ShaderOptions::parse(&key.options);
        Self {
            key,
            options,
            state: InstanceState::DEFINED | InstanceState::LOADED,
            gpu_program: NULL_HANDLE,
            refs: 1,
            name: name.to_string(),
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn refs(&self) -> u32 {
        self.refs
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend program handle; `0` until linked.
    #[inline]
    #[must_use]
    pub fn gpu_program(&self) -> GpuHandle {
        self.gpu_program
    }

    #[inline]
    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.state.contains(InstanceState::IN_USE)
    }

    pub(crate) fn add_ref(&mut self) {
        self.refs += 1;
    }

    /// Decrements the refcount; returns true when the instance should die.
    pub(crate) fn sub_ref(&mut self) -> bool {
        self.refs = self.refs.saturating_sub(1);
        self.refs == 0
    }

    /// Ensures every present stage's fragment entry is compiled for this
    /// option set. Re-checks on every call, which is what picks up fragments
    /// recompiled after a hot reload.
    pub(crate) fn compile(
        &mut self,
        device: &mut RenderDevice,
        store: &ProgramFragmentStore,
        cache: &mut CompiledFragmentCache,
    ) -> Result<()> {
        for (stage, index) in self.key.stages() {
            if let Err(err) = cache.compile(device, store, stage, index, &self.options, &self.name)
            {
                self.state.remove(InstanceState::COMPILED);
                return Err(err);
            }
        }
        self.state.insert(InstanceState::COMPILED);
        Ok(())
    }

    /// Links the program from the compiled stage objects.
    ///
    /// Compiles first when needed. On failure every attachment is undone, the
    /// program handle is deleted and reset to `0`, and the error names all
    /// attached fragments plus this instance's resource name. On success the
    /// stage objects are detached again — the linked program keeps its own
    /// copy, so raw compile objects stay reusable by other instances.
    pub(crate) fn link(
        &mut self,
        device: &mut RenderDevice,
        store: &ProgramFragmentStore,
        cache: &mut CompiledFragmentCache,
    ) -> Result<()> {
        if self.state.contains(InstanceState::LINKED) && self.gpu_program != NULL_HANDLE {
            return Ok(());
        }
        if !self.state.contains(InstanceState::COMPILED) {
            self.compile(device, store, cache)?;
        }

        if self.gpu_program == NULL_HANDLE {
            self.gpu_program = device.backend().create_program();
        }

        let mut attached: SmallVec<[GpuHandle; 5]> = SmallVec::new();
        let mut fragment_names: SmallVec<[&str; 5]> = SmallVec::new();
        for (stage, index) in self.key.stages() {
            // Compile above guarantees these entries exist and are Compiled.
            if let Some(object) = cache.compiled_handle(stage, index, &self.options) {
                device.backend().attach_shader(self.gpu_program, object);
                attached.push(object);
                if let Ok(fragment) = store.fragment(stage, index) {
                    fragment_names.push(fragment.name());
                }
            }
        }

        match device.backend().link_program(self.gpu_program) {
            Ok(()) => {
                for &object in &attached {
                    device.backend().detach_shader(self.gpu_program, object);
                }
                self.state.insert(InstanceState::LINKED);
                Ok(())
            }
            Err(driver_log) => {
                for &object in &attached {
                    device.backend().detach_shader(self.gpu_program, object);
                }
                device.backend().delete_program(self.gpu_program);
                self.gpu_program = NULL_HANDLE;
                self.state.remove(InstanceState::LINKED);
                Err(GlimmerError::LinkFailed {
                    program: self.name.clone(),
                    fragments: fragment_names.join(", "),
                    log: driver_log,
                })
            }
        }
    }

    /// Binds the program on the device, compiling and linking on demand.
    ///
    /// Usage errors (already in use, device busy) are checked before any
    /// state is touched, so a failed bind leaves both the instance and the
    /// device exactly as they were.
    pub(crate) fn bind(
        &mut self,
        device: &mut RenderDevice,
        store: &ProgramFragmentStore,
        cache: &mut CompiledFragmentCache,
    ) -> Result<()> {
        if self.state.contains(InstanceState::IN_USE) {
            return Err(GlimmerError::AlreadyBound {
                program: self.name.clone(),
            });
        }
        if device.bound_program() != NULL_HANDLE {
            return Err(GlimmerError::DeviceBusy {
                bound: device.bound_program(),
            });
        }
        self.link(device, store, cache)?;
        device.bind_program(self.gpu_program);
        self.state.insert(InstanceState::IN_USE);
        Ok(())
    }

    /// Unbinds the program from the device.
    pub(crate) fn unbind(&mut self, device: &mut RenderDevice) -> Result<()> {
        if !self.state.contains(InstanceState::IN_USE) {
            return Err(GlimmerError::NotBound {
                program: self.name.clone(),
            });
        }
        device.unbind_program();
        self.state.remove(InstanceState::IN_USE);
        Ok(())
    }

    /// Drops the linked program (hot-reload invalidation), keeping the
    /// instance itself alive for relinking.
    pub(crate) fn unlink(&mut self, device: &mut RenderDevice) {
        if self.gpu_program != NULL_HANDLE {
            device.backend().delete_program(self.gpu_program);
            self.gpu_program = NULL_HANDLE;
        }
        self.state
            .remove(InstanceState::COMPILED | InstanceState::LINKED);
    }

    /// Deletes the GPU program ahead of arena removal.
    pub(crate) fn destroy(&mut self, device: &mut RenderDevice) {
        if self.state.contains(InstanceState::IN_USE) {
            // Forced destruction (fragment removal cascade): clear the device
            // binding so no dangling bound state survives.
            device.unbind_program();
            self.state.remove(InstanceState::IN_USE);
        }
        if self.gpu_program != NULL_HANDLE {
            device.backend().delete_program(self.gpu_program);
            self.gpu_program = NULL_HANDLE;
        }
    }
}
