//! Compiled Fragment Cache
//!
//! Per (fragment, option set): the backend shader object and its compile
//! state. Entries are shared by every shader-program instance that uses the
//! exact same fragment+options pair, so a fragment used by twenty program
//! variants compiles once per distinct option set, not twenty times.
//!
//! Option sets are keyed by the xxh3 hash of their canonical (sorted) string,
//! the same dedupe-by-content-hash scheme the engine uses for generated
//! shader modules.

use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_64;

use super::fragment_store::{FragmentIndex, ProgramFragmentStore};
use super::options::ShaderOptions;
use super::stage::ShaderStage;
use crate::device::{GpuHandle, NULL_HANDLE, RenderDevice};
use crate::errors::{GlimmerError, Result};

/// Compile state of one (fragment, options) cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileState {
    /// Never compiled (or stale after a source replacement).
    Undefined,
    /// Compiled successfully; the GPU object is live.
    Compiled,
    /// Compilation failed; never retried automatically.
    Invalid,
}

#[derive(Debug)]
struct CompiledFragment {
    state: CompileState,
    gpu: GpuHandle,
    /// Store version the entry was compiled against; a mismatch means the
    /// fragment source was hot-reloaded and the object is stale.
    fragment_version: u64,
    log: Option<String>,
}

type EntryKey = (ShaderStage, FragmentIndex, u64);

/// Shared cache of compiled stage objects, keyed by (stage, fragment, options).
#[derive(Debug, Default)]
pub struct CompiledFragmentCache {
    entries: FxHashMap<EntryKey, CompiledFragment>,
}

impl CompiledFragmentCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(stage: ShaderStage, index: FragmentIndex, options: &ShaderOptions) -> EntryKey {
        (stage, index, xxh3_64(options.canonical_string().as_bytes()))
    }

    /// Compiles a (fragment, options) pair, or returns the cached object.
    ///
    /// Idempotent for entries that are already [`CompileState::Compiled`] at
    /// the fragment's current version. Stale entries (source replaced since
    /// the last compile) are recompiled transparently. Compiling an entry
    /// that is [`CompileState::Invalid`] at the current version is a usage
    /// error. `program_name` only feeds diagnostics.
    pub fn compile(
        &mut self,
        device: &mut RenderDevice,
        store: &ProgramFragmentStore,
        stage: ShaderStage,
        index: FragmentIndex,
        options: &ShaderOptions,
        program_name: &str,
    ) -> Result<GpuHandle> {
        let fragment = store.fragment(stage, index)?;
        let key = Self::key(stage, index, options);

        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.fragment_version == fragment.version() {
                match entry.state {
                    CompileState::Compiled => return Ok(entry.gpu),
                    CompileState::Invalid => {
                        return Err(GlimmerError::FragmentInvalid {
                            fragment: fragment.name().to_string(),
                            program: program_name.to_string(),
                        });
                    }
                    CompileState::Undefined => {}
                }
            } else if entry.gpu != NULL_HANDLE {
                // Stale object from before a hot reload.
                device.backend().delete_shader(entry.gpu);
                entry.gpu = NULL_HANDLE;
                entry.state = CompileState::Undefined;
            }
        }

        let source = inject_options(fragment.source(), options);
        log::trace!(
            "compiling {stage} fragment {:?} for program {program_name:?} (source xxh3 {:016x})",
            fragment.name(),
            xxh3_64(source.as_bytes())
        );

        match device.backend().compile_shader(stage, &source) {
            Ok(gpu) => {
                self.entries.insert(
                    key,
                    CompiledFragment {
                        state: CompileState::Compiled,
                        gpu,
                        fragment_version: fragment.version(),
                        log: None,
                    },
                );
                Ok(gpu)
            }
            Err(driver_log) => {
                self.entries.insert(
                    key,
                    CompiledFragment {
                        state: CompileState::Invalid,
                        gpu: NULL_HANDLE,
                        fragment_version: fragment.version(),
                        log: Some(driver_log.clone()),
                    },
                );
                Err(GlimmerError::CompileFailed {
                    fragment: fragment.name().to_string(),
                    program: program_name.to_string(),
                    log: driver_log,
                })
            }
        }
    }

    /// Compile state of an entry; absent entries are `Undefined`.
    #[must_use]
    pub fn state(
        &self,
        stage: ShaderStage,
        index: FragmentIndex,
        options: &ShaderOptions,
    ) -> CompileState {
        self.entries
            .get(&Self::key(stage, index, options))
            .map_or(CompileState::Undefined, |e| e.state)
    }

    /// GPU object of a compiled entry.
    #[must_use]
    pub fn compiled_handle(
        &self,
        stage: ShaderStage,
        index: FragmentIndex,
        options: &ShaderOptions,
    ) -> Option<GpuHandle> {
        self.entries
            .get(&Self::key(stage, index, options))
            .filter(|e| e.state == CompileState::Compiled)
            .map(|e| e.gpu)
    }

    /// Diagnostic log of an invalid entry.
    #[must_use]
    pub fn diagnostics(
        &self,
        stage: ShaderStage,
        index: FragmentIndex,
        options: &ShaderOptions,
    ) -> Option<&str> {
        self.entries
            .get(&Self::key(stage, index, options))
            .and_then(|e| e.log.as_deref())
    }

    /// Number of cache entries (all states).
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Drops every option variant cached for one fragment, deleting the GPU
    /// objects. Used by fragment removal and invalidation cascades.
    pub(crate) fn remove_fragment_entries(
        &mut self,
        device: &mut RenderDevice,
        stage: ShaderStage,
        index: FragmentIndex,
    ) {
        let doomed: Vec<EntryKey> = self
            .entries
            .keys()
            .filter(|&&(s, i, _)| s == stage && i == index)
            .copied()
            .collect();
        for key in doomed {
            if let Some(entry) = self.entries.remove(&key)
                && entry.gpu != NULL_HANDLE
            {
                device.backend().delete_shader(entry.gpu);
            }
        }
    }
}

/// Splices the option `#define` block into a fragment source: immediately
/// after a leading `#version` pragma, or prepended when there is none.
fn inject_options(source: &str, options: &ShaderOptions) -> String {
    if options.is_empty() {
        return source.to_string();
    }
    let defines = options.define_block();

    let first_line_end = source.find('\n').map_or(source.len(), |p| p + 1);
    let first_line = &source[..first_line_end];
    if first_line.trim_start().starts_with("#version") {
        let mut out = String::with_capacity(source.len() + defines.len() + 1);
        out.push_str(first_line);
        if !first_line.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&defines);
        out.push_str(&source[first_line_end..]);
        out
    } else {
        format!("{defines}{source}")
    }
}
