//! Program Fragment Store
//!
//! Owns the text source of every named program fragment, per stage. Fragments
//! are immutable once loaded apart from the hot-reload path
//! ([`ProgramFragmentStore::replace_source`]), which bumps a per-fragment
//! version counter that the compiled-fragment cache checks for staleness.
//!
//! Indices are stable insertion-order `u32`s per stage and are never reused;
//! removal tombstones the slot and frees the name for re-registration.

use rustc_hash::FxHashMap;

use super::stage::ShaderStage;
use crate::errors::{GlimmerError, Result};

/// Stable per-stage index of a program fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentIndex(pub u32);

impl FragmentIndex {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One stage's shader source text under a unique (per-stage) name.
#[derive(Debug)]
pub struct ProgramFragment {
    name: String,
    source: String,
    version: u64,
    removed: bool,
}

impl ProgramFragment {
    /// The fragment's registered name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw source text, without option defines.
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Hot-reload version counter; bumped on every source replacement.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Per-stage fragment storage with name→index lookup.
#[derive(Debug, Default)]
pub struct ProgramFragmentStore {
    fragments: [Vec<ProgramFragment>; ShaderStage::COUNT],
    by_name: [FxHashMap<String, FragmentIndex>; ShaderStage::COUNT],
}

impl ProgramFragmentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fragment, returning its stable index.
    ///
    /// Fails with [`GlimmerError::DuplicateFragment`] when the name is already
    /// taken within the stage.
    pub fn add_fragment(
        &mut self,
        stage: ShaderStage,
        name: &str,
        source: impl Into<String>,
    ) -> Result<FragmentIndex> {
        if self.by_name[stage.index()].contains_key(name) {
            return Err(GlimmerError::DuplicateFragment {
                stage,
                name: name.to_string(),
            });
        }
        let list = &mut self.fragments[stage.index()];
        let index = FragmentIndex(list.len() as u32);
        list.push(ProgramFragment {
            name: name.to_string(),
            source: source.into(),
            version: 0,
            removed: false,
        });
        self.by_name[stage.index()].insert(name.to_string(), index);
        Ok(index)
    }

    /// Resolves a fragment name to its index.
    #[must_use]
    pub fn index_of(&self, stage: ShaderStage, name: &str) -> Option<FragmentIndex> {
        self.by_name[stage.index()].get(name).copied()
    }

    /// Fetches a live fragment by index.
    ///
    /// Out-of-bounds and tombstoned indices are distinct errors so callers
    /// can tell a wiring mistake from a removed resource.
    pub fn fragment(&self, stage: ShaderStage, index: FragmentIndex) -> Result<&ProgramFragment> {
        let fragment = self.fragments[stage.index()].get(index.index()).ok_or(
            GlimmerError::FragmentIndexOutOfBounds {
                stage,
                index: index.0,
            },
        )?;
        if fragment.removed {
            return Err(GlimmerError::FragmentRemoved {
                stage,
                index: index.0,
            });
        }
        Ok(fragment)
    }

    /// Replaces a fragment's source text, bumping its version.
    ///
    /// Dependent compiled entries become stale and recompile on their next
    /// explicit compile; already-linked instances are untouched until
    /// [`ShaderManager::invalidate_fragment`] runs.
    ///
    /// [`ShaderManager::invalidate_fragment`]: super::manager::ShaderManager::invalidate_fragment
    pub fn replace_source(
        &mut self,
        stage: ShaderStage,
        index: FragmentIndex,
        source: impl Into<String>,
    ) -> Result<u64> {
        // Validate liveness through the shared accessor first.
        self.fragment(stage, index)?;
        let fragment = &mut self.fragments[stage.index()][index.index()];
        fragment.source = source.into();
        fragment.version = fragment.version.wrapping_add(1);
        Ok(fragment.version)
    }

    /// Number of registered fragments for a stage (tombstones included).
    #[must_use]
    pub fn len(&self, stage: ShaderStage) -> usize {
        self.fragments[stage.index()].len()
    }

    #[must_use]
    pub fn is_empty(&self, stage: ShaderStage) -> bool {
        self.fragments[stage.index()].is_empty()
    }

    /// Tombstones a fragment: the index stays allocated (never reused), the
    /// name becomes free. Cascade handling lives in the manager.
    pub(crate) fn tombstone(&mut self, stage: ShaderStage, index: FragmentIndex) -> Result<()> {
        self.fragment(stage, index)?;
        let fragment = &mut self.fragments[stage.index()][index.index()];
        fragment.removed = true;
        let name = fragment.name.clone();
        self.by_name[stage.index()].remove(&name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let mut store = ProgramFragmentStore::new();
        let idx = store
            .add_fragment(ShaderStage::Vertex, "std_vs", "void main() {}")
            .unwrap();
        assert_eq!(store.index_of(ShaderStage::Vertex, "std_vs"), Some(idx));
        assert_eq!(
            store.fragment(ShaderStage::Vertex, idx).unwrap().name(),
            "std_vs"
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut store = ProgramFragmentStore::new();
        store
            .add_fragment(ShaderStage::Vertex, "std_vs", "a")
            .unwrap();
        let err = store
            .add_fragment(ShaderStage::Vertex, "std_vs", "b")
            .unwrap_err();
        assert!(matches!(err, GlimmerError::DuplicateFragment { .. }));
    }

    #[test]
    fn test_same_name_in_other_stage_is_fine() {
        let mut store = ProgramFragmentStore::new();
        store.add_fragment(ShaderStage::Vertex, "std", "a").unwrap();
        assert!(store.add_fragment(ShaderStage::Fragment, "std", "b").is_ok());
    }

    #[test]
    fn test_replace_source_bumps_version() {
        let mut store = ProgramFragmentStore::new();
        let idx = store.add_fragment(ShaderStage::Fragment, "f", "v0").unwrap();
        assert_eq!(store.fragment(ShaderStage::Fragment, idx).unwrap().version(), 0);
        let v = store.replace_source(ShaderStage::Fragment, idx, "v1").unwrap();
        assert_eq!(v, 1);
        assert_eq!(store.fragment(ShaderStage::Fragment, idx).unwrap().source(), "v1");
    }

    #[test]
    fn test_tombstone_frees_name_keeps_index() {
        let mut store = ProgramFragmentStore::new();
        let idx = store.add_fragment(ShaderStage::Vertex, "v", "a").unwrap();
        store.tombstone(ShaderStage::Vertex, idx).unwrap();
        assert!(matches!(
            store.fragment(ShaderStage::Vertex, idx),
            Err(GlimmerError::FragmentRemoved { .. })
        ));
        assert_eq!(store.index_of(ShaderStage::Vertex, "v"), None);
        // Name is free again; the new registration gets a fresh index.
        let idx2 = store.add_fragment(ShaderStage::Vertex, "v", "b").unwrap();
        assert_ne!(idx, idx2);
    }
}
