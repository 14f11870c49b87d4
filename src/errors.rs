//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`GlimmerError`] covers all failure modes including:
//! - Program fragment definition and lookup errors
//! - Shader compilation and program link failures
//! - Usage-sequence errors (bind/unbind/detach ordering mistakes)
//!
//! Definition and usage-sequence errors indicate configuration or control-flow
//! bugs in the caller and are raised immediately, never degraded. Compile and
//! link failures are additionally recorded as state on the affected cache
//! entry or instance so it stays queryable for introspection.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, GlimmerError>`.

use thiserror::Error;

use crate::shader::ShaderStage;

/// The main error type for the glimmer render core.
#[derive(Error, Debug)]
pub enum GlimmerError {
    // ========================================================================
    // Fragment Definition & Lookup Errors
    // ========================================================================
    /// A program fragment name was registered twice within one stage.
    #[error("Duplicate {stage} fragment name: {name:?}")]
    DuplicateFragment {
        /// Stage the name collided in
        stage: ShaderStage,
        /// The offending fragment name
        name: String,
    },

    /// A fragment name could not be resolved in the store.
    #[error("Unknown {stage} fragment: {name:?}")]
    UnknownFragment {
        /// Stage that was searched
        stage: ShaderStage,
        /// The unresolved name
        name: String,
    },

    /// A fragment index does not refer to a live store entry.
    #[error("{stage} fragment index {index} out of bounds")]
    FragmentIndexOutOfBounds {
        /// Stage that was indexed
        stage: ShaderStage,
        /// The invalid index
        index: u32,
    },

    /// The fragment at this index has been removed from the store.
    #[error("{stage} fragment index {index} refers to a removed fragment")]
    FragmentRemoved {
        /// Stage of the removed fragment
        stage: ShaderStage,
        /// Index of the tombstoned entry
        index: u32,
    },

    // ========================================================================
    // Compile & Link Errors
    // ========================================================================
    /// A fragment failed to compile for some option set.
    #[error("Failed to compile fragment {fragment:?} of program {program:?}: {log}")]
    CompileFailed {
        /// Name of the fragment that failed
        fragment: String,
        /// Resource name of the enclosing program
        program: String,
        /// Backend diagnostic log
        log: String,
    },

    /// An explicit compile was requested for an entry already marked invalid.
    #[error(
        "Fragment {fragment:?} of program {program:?} is invalid; recompiling it is a usage error"
    )]
    FragmentInvalid {
        /// Name of the invalid fragment
        fragment: String,
        /// Resource name of the enclosing program
        program: String,
    },

    /// The backend failed to link the attached stage objects.
    #[error("Failed to link program {program:?} (fragments: {fragments}): {log}")]
    LinkFailed {
        /// Resource name of the program
        program: String,
        /// Comma-joined names of every attached fragment
        fragments: String,
        /// Backend diagnostic log
        log: String,
    },

    // ========================================================================
    // Usage-Sequence Errors
    // ========================================================================
    /// The handle is not attached to a manager.
    #[error("Shader handle {name:?} is not attached to a manager")]
    NotAttached {
        /// Resource name of the handle
        name: String,
    },

    /// The handle was used with a different manager than it attached to.
    #[error("Shader handle {name:?} was passed a foreign manager")]
    ManagerMismatch {
        /// Resource name of the handle
        name: String,
    },

    /// The referenced instance was destroyed (e.g. by fragment removal).
    #[error("Shader instance of {name:?} no longer exists")]
    InstanceRemoved {
        /// Resource name of the handle
        name: String,
    },

    /// An operation required a linked program.
    #[error("Program {program:?} is not linked")]
    NotLinked {
        /// Resource name of the program
        program: String,
    },

    /// An operation required the program to be bound.
    #[error("Program {program:?} is not bound")]
    NotBound {
        /// Resource name of the program
        program: String,
    },

    /// `bind` was called on an instance that is already in use.
    #[error("Program {program:?} is already bound")]
    AlreadyBound {
        /// Resource name of the program
        program: String,
    },

    /// The device already has a different program bound.
    #[error("Device is busy: program handle {bound} is currently bound")]
    DeviceBusy {
        /// GPU handle of the program occupying the device
        bound: u32,
    },

    /// `detach` or `release` was called while the instance is in use.
    #[error("Program {program:?} is still bound; unbind before detaching")]
    StillBound {
        /// Resource name of the program
        program: String,
    },

    /// A semantic location cache key is outside the supported range.
    #[error("Semantic key {key} out of range (expected 0..=127)")]
    SemanticKeyOutOfRange {
        /// The rejected key
        key: u32,
    },
}

/// Alias for `Result<T, GlimmerError>`.
pub type Result<T> = std::result::Result<T, GlimmerError>;
