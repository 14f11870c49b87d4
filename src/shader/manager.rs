//! Shader Manager
//!
//! Central owner of the shader stack: the fragment store, the compiled
//! fragment cache, and the instance arena with its tuple-key lookup map.
//! There is no global manager singleton — the owning scene or render context
//! constructs one and passes it by `&mut`, with a process-unique id so
//! handles can verify they were handed the manager they attached to.
//!
//! Instances are deduplicated by [`InstanceKey`]: `acquire` on an existing
//! key bumps the refcount, `release` decrements it and destroys the GPU
//! program exactly once when the count reaches zero.

use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::fragment_cache::CompiledFragmentCache;
use super::fragment_store::{FragmentIndex, ProgramFragmentStore};
use super::instance::{InstanceId, InstanceKey, InstanceState, ShaderProgramInstance};
use super::stage::ShaderStage;
use crate::device::RenderDevice;
use crate::errors::{GlimmerError, Result};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Owner of fragment store, compile cache, and the instance arena.
pub struct ShaderManager {
    id: u64,
    store: ProgramFragmentStore,
    cache: CompiledFragmentCache,
    instances: SlotMap<InstanceId, ShaderProgramInstance>,
    lookup: FxHashMap<InstanceKey, InstanceId>,
}

impl Default for ShaderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            store: ProgramFragmentStore::new(),
            cache: CompiledFragmentCache::new(),
            instances: SlotMap::with_key(),
            lookup: FxHashMap::default(),
        }
    }

    /// Process-unique manager id, recorded by attaching handles.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    // ── Fragment store passthroughs ──────────────────────────────────────────

    /// Read access to the fragment store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &ProgramFragmentStore {
        &self.store
    }

    /// Registers a program fragment. See [`ProgramFragmentStore::add_fragment`].
    pub fn add_fragment(
        &mut self,
        stage: ShaderStage,
        name: &str,
        source: impl Into<String>,
    ) -> Result<FragmentIndex> {
        self.store.add_fragment(stage, name, source)
    }

    /// Hot-reloads a fragment's source. Dependent compiled entries become
    /// stale; call [`Self::invalidate_fragment`] to proactively unlink the
    /// instances that reference it.
    pub fn replace_source(
        &mut self,
        stage: ShaderStage,
        index: FragmentIndex,
        source: impl Into<String>,
    ) -> Result<u64> {
        self.store.replace_source(stage, index, source)
    }

    // ── Instance acquisition / release ───────────────────────────────────────

    /// Looks up or creates the instance for a key, taking one reference.
    pub fn acquire(&mut self, key: InstanceKey, name: &str) -> InstanceId {
        if let Some(&id) = self.lookup.get(&key)
            && let Some(instance) = self.instances.get_mut(id)
        {
            instance.add_ref();
            return id;
        }
        let id = self
            .instances
            .insert(ShaderProgramInstance::new(key.clone(), name));
        self.lookup.insert(key, id);
        id
    }

    /// Takes an additional reference on a live instance (handle copy).
    pub fn add_ref(&mut self, id: InstanceId) -> bool {
        if let Some(instance) = self.instances.get_mut(id) {
            instance.add_ref();
            true
        } else {
            false
        }
    }

    /// Releases one reference; the last release deletes the GPU program and
    /// frees the arena slot.
    ///
    /// Releasing an instance that is currently bound is a usage error. A
    /// stale id (instance already destroyed by a removal cascade) is a quiet
    /// no-op — the cascade already did the cleanup.
    pub fn release(&mut self, device: &mut RenderDevice, id: InstanceId) -> Result<()> {
        let Some(instance) = self.instances.get_mut(id) else {
            log::debug!("release of already-destroyed shader instance");
            return Ok(());
        };
        if instance.is_in_use() {
            return Err(GlimmerError::StillBound {
                program: instance.name().to_string(),
            });
        }
        if instance.sub_ref() {
            instance.destroy(device);
            let key = instance.key().clone();
            self.instances.remove(id);
            self.lookup.remove(&key);
        }
        Ok(())
    }

    // ── Fragment removal & invalidation cascades ─────────────────────────────

    /// Removes a fragment from the store, forcibly destroying every instance
    /// that references it (regardless of refcount) and purging its compiled
    /// entries. Instances that were bound are unbound from the device first,
    /// so no dangling bound state survives. Handles discover the destruction
    /// through their now-stale instance id.
    pub fn remove_fragment(
        &mut self,
        device: &mut RenderDevice,
        stage: ShaderStage,
        index: FragmentIndex,
    ) -> Result<()> {
        // Validate before destroying anything.
        self.store.fragment(stage, index)?;

        let doomed: Vec<InstanceId> = self
            .instances
            .iter()
            .filter(|(_, inst)| inst.key().references(stage, index))
            .map(|(id, _)| id)
            .collect();
        for id in doomed {
            if let Some(instance) = self.instances.get_mut(id) {
                if instance.is_in_use() {
                    log::warn!(
                        "destroying bound shader instance {:?} (fragment removed)",
                        instance.name()
                    );
                }
                instance.destroy(device);
                let key = instance.key().clone();
                self.instances.remove(id);
                self.lookup.remove(&key);
            }
        }

        self.cache.remove_fragment_entries(device, stage, index);
        self.store.tombstone(stage, index)
    }

    /// Unlinks every instance referencing a fragment and drops its compiled
    /// entries, so the next build recompiles against the current source.
    /// The hot-reload companion of [`Self::replace_source`].
    ///
    /// Fails without side effects if any affected instance is bound.
    pub fn invalidate_fragment(
        &mut self,
        device: &mut RenderDevice,
        stage: ShaderStage,
        index: FragmentIndex,
    ) -> Result<()> {
        self.store.fragment(stage, index)?;

        if let Some(bound) = self
            .instances
            .values()
            .find(|inst| inst.key().references(stage, index) && inst.is_in_use())
        {
            return Err(GlimmerError::StillBound {
                program: bound.name().to_string(),
            });
        }

        for instance in self.instances.values_mut() {
            if instance.key().references(stage, index) {
                instance.unlink(device);
            }
        }
        self.cache.remove_fragment_entries(device, stage, index);
        Ok(())
    }

    // ── Introspection ────────────────────────────────────────────────────────

    /// Number of live instances in the arena.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Whether an id still resolves to a live instance.
    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(id)
    }

    /// Current reference count of an instance.
    #[must_use]
    pub fn refs(&self, id: InstanceId) -> Option<u32> {
        self.instances.get(id).map(ShaderProgramInstance::refs)
    }

    /// Current lifecycle state of an instance.
    #[must_use]
    pub fn state(&self, id: InstanceId) -> Option<InstanceState> {
        self.instances.get(id).map(ShaderProgramInstance::state)
    }

    /// The arena id an instance key currently maps to, if any.
    #[must_use]
    pub fn instance_for(&self, key: &InstanceKey) -> Option<InstanceId> {
        self.lookup.get(key).copied()
    }

    /// Number of compiled-fragment cache entries.
    #[must_use]
    pub fn compiled_entry_count(&self) -> usize {
        self.cache.entry_count()
    }

    /// Compile state of one (fragment, options) pair.
    #[must_use]
    pub fn compile_state(
        &self,
        stage: ShaderStage,
        index: FragmentIndex,
        options: &super::options::ShaderOptions,
    ) -> super::fragment_cache::CompileState {
        self.cache.state(stage, index, options)
    }

    // ── Internal split-borrow access for handles ─────────────────────────────

    /// Splits the manager into the parts an instance operation needs.
    pub(crate) fn parts_mut(
        &mut self,
        id: InstanceId,
    ) -> Option<(
        &mut ShaderProgramInstance,
        &ProgramFragmentStore,
        &mut CompiledFragmentCache,
    )> {
        let instance = self.instances.get_mut(id)?;
        Some((instance, &self.store, &mut self.cache))
    }

    pub(crate) fn instance(&self, id: InstanceId) -> Option<&ShaderProgramInstance> {
        self.instances.get(id)
    }
}
