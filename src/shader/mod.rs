//! Shader Program Management
//!
//! The shader stack, bottom-up:
//!
//! - [`ProgramFragmentStore`] — named per-stage source text, name→index lookup
//! - [`CompiledFragmentCache`] — per (fragment, option set) compiled objects
//! - [`ShaderProgramInstance`] — tuple-keyed, reference-counted whole programs
//! - [`ShaderInstanceHandle`] — the client-facing bind/uniform access path
//! - [`ShaderManager`] — owner of all of the above, one per render context

mod fragment_cache;
mod fragment_store;
mod handle;
mod instance;
mod manager;
mod options;
mod stage;

pub use fragment_cache::{CompileState, CompiledFragmentCache};
pub use fragment_store::{FragmentIndex, ProgramFragment, ProgramFragmentStore};
pub use handle::{BuildMode, MAX_SEMANTIC_KEY, ProgramSelection, ShaderInstanceHandle};
pub use instance::{InstanceId, InstanceKey, InstanceState, ShaderProgramInstance};
pub use manager::ShaderManager;
pub use options::ShaderOptions;
pub use stage::ShaderStage;
