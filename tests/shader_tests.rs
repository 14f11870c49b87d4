//! Shader Stack Tests
//!
//! Tests for:
//! - ProgramFragmentStore: duplicate names, unknown names
//! - CompiledFragmentCache: idempotent compile, invalid entries, hot reload
//! - ShaderProgramInstance: key sharing, refcounting, exactly-once destruction
//! - Lifecycle: compile/link/bind/unbind ordering, link failure rollback
//! - ShaderInstanceHandle: misuse detection, location caching, uniforms
//! - ShaderManager: fragment removal cascade, invalidation

use glimmer::{
    BuildMode, GlimmerError, HeadlessBackend, HeadlessProbe, InstanceState, ProgramSelection,
    RenderDevice, ShaderInstanceHandle, ShaderManager, ShaderStage,
};

const VS: &str = "#version 330\nvoid main() { gl_Position = vec4(0.0); }\n";
const FS: &str = "#version 330\nout vec4 color;\nvoid main() { color = vec4(1.0); }\n";
const GS: &str = "#version 330\nvoid main() {}\n";

fn setup() -> (ShaderManager, RenderDevice, HeadlessProbe) {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let device = RenderDevice::new(Box::new(backend));

    let mut manager = ShaderManager::new();
    manager
        .add_fragment(ShaderStage::Vertex, "std_vs", VS)
        .unwrap();
    manager
        .add_fragment(ShaderStage::Fragment, "std_fs", FS)
        .unwrap();
    manager
        .add_fragment(ShaderStage::Geometry, "std_gs", GS)
        .unwrap();
    (manager, device, probe)
}

fn handle_for(
    manager: &mut ShaderManager,
    device: &mut RenderDevice,
    name: &str,
    options: &str,
) -> ShaderInstanceHandle {
    let mut handle = ShaderInstanceHandle::new(name);
    handle.attach(manager).unwrap();
    handle
        .assign(
            manager,
            device,
            &ProgramSelection {
                vertex: "std_vs",
                fragment: "std_fs",
                options,
                ..Default::default()
            },
        )
        .unwrap();
    handle
}

// ============================================================================
// Fragment Store
// ============================================================================

#[test]
fn duplicate_fragment_name_is_rejected() {
    let (mut manager, _, _) = setup();
    let err = manager
        .add_fragment(ShaderStage::Vertex, "std_vs", VS)
        .unwrap_err();
    assert!(matches!(err, GlimmerError::DuplicateFragment { .. }));
}

#[test]
fn assign_with_unknown_fragment_fails() {
    let (mut manager, mut device, _) = setup();
    let mut handle = ShaderInstanceHandle::new("mat");
    handle.attach(&manager).unwrap();
    let err = handle
        .assign(
            &mut manager,
            &mut device,
            &ProgramSelection {
                vertex: "no_such_vs",
                fragment: "std_fs",
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, GlimmerError::UnknownFragment { .. }));
    assert!(handle.instance_id().is_none());
}

// ============================================================================
// Key Sharing & Reference Counting
// ============================================================================

#[test]
fn identical_keys_share_one_instance() {
    let (mut manager, mut device, _) = setup();
    let a = handle_for(&mut manager, &mut device, "mat_a", "USE_MAP");
    let b = handle_for(&mut manager, &mut device, "mat_b", "USE_MAP");

    assert_eq!(a.instance_id(), b.instance_id());
    assert_eq!(manager.instance_count(), 1);
    assert_eq!(manager.refs(a.instance_id().unwrap()), Some(2));

    let mut a = a;
    let mut b = b;
    a.detach(&mut manager, &mut device).unwrap();
    b.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn option_order_does_not_split_instances() {
    let (mut manager, mut device, _) = setup();
    let mut a = handle_for(&mut manager, &mut device, "mat_a", "B=2;A=1");
    let mut b = handle_for(&mut manager, &mut device, "mat_b", "A=1;B=2");

    assert_eq!(a.instance_id(), b.instance_id());

    a.detach(&mut manager, &mut device).unwrap();
    b.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn differing_options_yield_distinct_instances() {
    let (mut manager, mut device, _) = setup();
    let mut a = handle_for(&mut manager, &mut device, "mat_a", "USE_MAP");
    let mut b = handle_for(&mut manager, &mut device, "mat_b", "");

    assert_ne!(a.instance_id(), b.instance_id());
    assert_eq!(manager.instance_count(), 2);

    a.detach(&mut manager, &mut device).unwrap();
    b.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn differing_stage_yields_distinct_instance() {
    let (mut manager, mut device, _) = setup();
    let mut a = handle_for(&mut manager, &mut device, "mat_a", "");

    let mut b = ShaderInstanceHandle::new("mat_b");
    b.attach(&manager).unwrap();
    b.assign(
        &mut manager,
        &mut device,
        &ProgramSelection {
            vertex: "std_vs",
            fragment: "std_fs",
            geometry: Some("std_gs"),
            ..Default::default()
        },
    )
    .unwrap();

    assert_ne!(a.instance_id(), b.instance_id());

    a.detach(&mut manager, &mut device).unwrap();
    b.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn last_detach_destroys_gpu_program_exactly_once() {
    let (mut manager, mut device, probe) = setup();
    let mut a = handle_for(&mut manager, &mut device, "mat_a", "");
    let mut b = a.clone_ref(&mut manager).unwrap();
    let mut c = handle_for(&mut manager, &mut device, "mat_c", "");

    a.build(&mut manager, &mut device, BuildMode::Full).unwrap();
    assert_eq!(probe.live_programs(), 1);
    assert_eq!(manager.refs(a.instance_id().unwrap()), Some(3));

    a.detach(&mut manager, &mut device).unwrap();
    b.detach(&mut manager, &mut device).unwrap();
    assert_eq!(probe.live_programs(), 1, "still referenced by c");
    assert_eq!(probe.deleted_programs(), 0);

    c.detach(&mut manager, &mut device).unwrap();
    assert_eq!(probe.live_programs(), 0);
    assert_eq!(probe.deleted_programs(), 1);
    assert_eq!(manager.instance_count(), 0);
}

#[test]
fn reassign_transfers_reference() {
    let (mut manager, mut device, _) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "A");
    let first = handle.instance_id().unwrap();

    handle
        .assign(
            &mut manager,
            &mut device,
            &ProgramSelection {
                vertex: "std_vs",
                fragment: "std_fs",
                options: "B",
                ..Default::default()
            },
        )
        .unwrap();

    assert!(!manager.contains(first), "old instance released");
    assert_eq!(manager.instance_count(), 1);
    handle.detach(&mut manager, &mut device).unwrap();
}

// ============================================================================
// Compile & Link
// ============================================================================

#[test]
fn compile_is_idempotent() {
    let (mut manager, mut device, probe) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "USE_MAP");

    handle
        .build(&mut manager, &mut device, BuildMode::CompileOnly)
        .unwrap();
    let after_first = probe.compile_calls();
    handle
        .build(&mut manager, &mut device, BuildMode::CompileOnly)
        .unwrap();
    assert_eq!(probe.compile_calls(), after_first, "second compile is a no-op");

    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn shared_fragments_compile_once_per_option_set() {
    let (mut manager, mut device, probe) = setup();
    let mut a = handle_for(&mut manager, &mut device, "mat_a", "USE_MAP");
    let mut b = ShaderInstanceHandle::new("mat_b");
    b.attach(&manager).unwrap();
    b.assign(
        &mut manager,
        &mut device,
        &ProgramSelection {
            vertex: "std_vs",
            fragment: "std_fs",
            geometry: Some("std_gs"),
            options: "USE_MAP",
            ..Default::default()
        },
    )
    .unwrap();

    a.build(&mut manager, &mut device, BuildMode::CompileOnly)
        .unwrap();
    let after_a = probe.compile_calls();
    assert_eq!(after_a, 2, "vertex + fragment");

    // b shares the vertex and fragment entries; only geometry is new.
    b.build(&mut manager, &mut device, BuildMode::CompileOnly)
        .unwrap();
    assert_eq!(probe.compile_calls(), after_a + 1);

    a.detach(&mut manager, &mut device).unwrap();
    b.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn compile_failure_names_fragment_and_program() {
    let (mut manager, mut device, _) = setup();
    manager
        .add_fragment(ShaderStage::Fragment, "broken_fs", "#version 330\n#error nope\n")
        .unwrap();

    let mut handle = ShaderInstanceHandle::new("broken_mat");
    handle.attach(&manager).unwrap();
    handle
        .assign(
            &mut manager,
            &mut device,
            &ProgramSelection {
                vertex: "std_vs",
                fragment: "broken_fs",
                ..Default::default()
            },
        )
        .unwrap();

    let err = handle
        .build(&mut manager, &mut device, BuildMode::CompileOnly)
        .unwrap_err();
    match err {
        GlimmerError::CompileFailed {
            fragment,
            program,
            log,
        } => {
            assert_eq!(fragment, "broken_fs");
            assert_eq!(program, "broken_mat");
            assert!(log.contains("#error"));
        }
        other => panic!("expected CompileFailed, got {other:?}"),
    }

    // The instance stays queryable but not compiled.
    let state = handle.state(&manager).unwrap();
    assert!(!state.contains(InstanceState::COMPILED));

    // Compiling an invalid entry again is a usage error, not a retry.
    let err = handle
        .build(&mut manager, &mut device, BuildMode::CompileOnly)
        .unwrap_err();
    assert!(matches!(err, GlimmerError::FragmentInvalid { .. }));

    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn hot_reload_recompiles_invalid_fragment() {
    let (mut manager, mut device, _) = setup();
    let idx = manager
        .add_fragment(ShaderStage::Fragment, "fixable_fs", "#error wip\n")
        .unwrap();

    let mut handle = ShaderInstanceHandle::new("mat");
    handle.attach(&manager).unwrap();
    handle
        .assign(
            &mut manager,
            &mut device,
            &ProgramSelection {
                vertex: "std_vs",
                fragment: "fixable_fs",
                ..Default::default()
            },
        )
        .unwrap();
    assert!(
        handle
            .build(&mut manager, &mut device, BuildMode::CompileOnly)
            .is_err()
    );

    // Replacing the source bumps the version; the invalid entry is stale
    // now and recompiles instead of erroring.
    manager
        .replace_source(ShaderStage::Fragment, idx, FS)
        .unwrap();
    handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap();
    assert!(handle.state(&manager).unwrap().contains(InstanceState::LINKED));

    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn link_failure_rolls_back_program_handle() {
    let (mut manager, mut device, probe) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");

    probe.fail_next_link();
    let err = handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap_err();
    match err {
        GlimmerError::LinkFailed {
            program, fragments, ..
        } => {
            assert_eq!(program, "mat");
            assert!(fragments.contains("std_vs"));
            assert!(fragments.contains("std_fs"));
        }
        other => panic!("expected LinkFailed, got {other:?}"),
    }
    assert_eq!(probe.live_programs(), 0, "failed program deleted");
    let state = handle.state(&manager).unwrap();
    assert!(!state.contains(InstanceState::LINKED));

    // A later build retries the link and succeeds.
    handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap();
    assert!(handle.state(&manager).unwrap().contains(InstanceState::LINKED));

    handle.detach(&mut manager, &mut device).unwrap();
}

// ============================================================================
// Bind / Unbind & Misuse Detection
// ============================================================================

#[test]
fn bind_implies_compile_and_link() {
    let (mut manager, mut device, probe) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");

    handle.bind(&mut manager, &mut device).unwrap();
    let state = handle.state(&manager).unwrap();
    assert!(state.contains(InstanceState::LINKED));
    assert!(state.contains(InstanceState::IN_USE));
    assert_ne!(probe.current_program(), 0);

    handle.unbind(&mut manager, &mut device).unwrap();
    assert_eq!(probe.current_program(), 0);
    assert!(!handle.state(&manager).unwrap().contains(InstanceState::IN_USE));

    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn bind_while_in_use_raises_and_leaves_device_untouched() {
    let (mut manager, mut device, probe) = setup();
    let mut a = handle_for(&mut manager, &mut device, "mat_a", "");
    let mut b = a.clone_ref(&mut manager).unwrap();

    a.bind(&mut manager, &mut device).unwrap();
    let bound = probe.current_program();

    // Same instance through another handle: already in use.
    let err = b.bind(&mut manager, &mut device).unwrap_err();
    assert!(matches!(err, GlimmerError::AlreadyBound { .. }));
    assert_eq!(probe.current_program(), bound, "device binding unchanged");

    a.unbind(&mut manager, &mut device).unwrap();
    a.detach(&mut manager, &mut device).unwrap();
    b.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn bind_while_device_busy_raises() {
    let (mut manager, mut device, _) = setup();
    let mut a = handle_for(&mut manager, &mut device, "mat_a", "");
    let mut b = handle_for(&mut manager, &mut device, "mat_b", "OTHER");

    a.bind(&mut manager, &mut device).unwrap();
    let err = b.bind(&mut manager, &mut device).unwrap_err();
    assert!(matches!(err, GlimmerError::DeviceBusy { .. }));

    a.unbind(&mut manager, &mut device).unwrap();
    b.bind(&mut manager, &mut device).unwrap();
    b.unbind(&mut manager, &mut device).unwrap();

    a.detach(&mut manager, &mut device).unwrap();
    b.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn unbind_without_bind_raises() {
    let (mut manager, mut device, _) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");
    let err = handle.unbind(&mut manager, &mut device).unwrap_err();
    assert!(matches!(err, GlimmerError::NotBound { .. }));
    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn detach_while_bound_raises() {
    let (mut manager, mut device, _) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");
    handle.bind(&mut manager, &mut device).unwrap();

    let err = handle.detach(&mut manager, &mut device).unwrap_err();
    assert!(matches!(err, GlimmerError::StillBound { .. }));
    // The handle is still usable after the refused detach.
    handle.unbind(&mut manager, &mut device).unwrap();
    handle.detach(&mut manager, &mut device).unwrap();
}

// ============================================================================
// Uniforms & Locations
// ============================================================================

#[test]
fn set_uniform_requires_bound_program() {
    let (mut manager, mut device, _) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");
    handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap();

    let err = handle
        .set_uniform_f32(&mut manager, &mut device, 0, "u_time", 1.0)
        .unwrap_err();
    assert!(matches!(err, GlimmerError::NotBound { .. }));

    handle.bind(&mut manager, &mut device).unwrap();
    handle
        .set_uniform_f32(&mut manager, &mut device, 0, "u_time", 1.0)
        .unwrap();
    handle.unbind(&mut manager, &mut device).unwrap();
    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn uniform_location_requires_linked_program() {
    let (mut manager, mut device, _) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");
    let err = handle
        .uniform_location(&mut manager, &mut device, 0, "u_time")
        .unwrap_err();
    assert!(matches!(err, GlimmerError::NotLinked { .. }));
    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn uniform_locations_are_cached_by_semantic_key() {
    let (mut manager, mut device, probe) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");
    handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap();

    let first = handle
        .uniform_location(&mut manager, &mut device, 3, "u_color")
        .unwrap();
    assert!(first.is_some());

    // Make the driver forget the name: a cached lookup still answers.
    probe.add_missing_name("u_color");
    let second = handle
        .uniform_location(&mut manager, &mut device, 3, "u_color")
        .unwrap();
    assert_eq!(first, second);

    // Clearing the cache entry forces a re-query, which now misses.
    handle.remove_uniform(3);
    let third = handle
        .uniform_location(&mut manager, &mut device, 3, "u_color")
        .unwrap();
    assert!(third.is_none());

    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn reassign_clears_location_caches() {
    let (mut manager, mut device, probe) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "A");
    handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap();
    let first = handle
        .uniform_location(&mut manager, &mut device, 2, "u_tint")
        .unwrap();
    assert!(first.is_some());

    probe.add_missing_name("u_tint");
    handle
        .assign(
            &mut manager,
            &mut device,
            &ProgramSelection {
                vertex: "std_vs",
                fragment: "std_fs",
                options: "B",
                ..Default::default()
            },
        )
        .unwrap();
    handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap();

    // The cache died with the old assignment; the re-query misses.
    let second = handle
        .uniform_location(&mut manager, &mut device, 2, "u_tint")
        .unwrap();
    assert!(second.is_none());

    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn relink_invalidates_cached_uniform_locations() {
    let (mut manager, mut device, _) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");
    handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap();

    // Fill the cache in a resolution order the relinked program will not
    // repeat.
    let a = handle
        .uniform_location(&mut manager, &mut device, 0, "u_a")
        .unwrap();
    let b = handle
        .uniform_location(&mut manager, &mut device, 1, "u_b")
        .unwrap();
    assert_eq!(a, Some(0));
    assert_eq!(b, Some(1));

    let fs_idx = manager
        .store()
        .index_of(ShaderStage::Fragment, "std_fs")
        .unwrap();
    manager
        .invalidate_fragment(&mut device, ShaderStage::Fragment, fs_idx)
        .unwrap();
    handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap();

    // The new program hands out locations in query order; the cache must
    // not answer with the old program's slot.
    let b = handle
        .uniform_location(&mut manager, &mut device, 1, "u_b")
        .unwrap();
    assert_eq!(b, Some(0));

    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn semantic_key_range_is_checked() {
    let (mut manager, mut device, _) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");
    handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap();
    let err = handle
        .uniform_location(&mut manager, &mut device, 128, "u_x")
        .unwrap_err();
    assert!(matches!(err, GlimmerError::SemanticKeyOutOfRange { key: 128 }));
    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn texture_uniform_binds_texture_unit() {
    let (mut manager, mut device, probe) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");
    handle.bind(&mut manager, &mut device).unwrap();

    handle
        .set_uniform_texture(&mut manager, &mut device, 1, "u_diffuse", 2, 42)
        .unwrap();
    assert_eq!(probe.texture_at(2), 42);

    handle.unbind(&mut manager, &mut device).unwrap();
    handle.detach(&mut manager, &mut device).unwrap();
}

// ============================================================================
// Fragment Removal & Invalidation
// ============================================================================

#[test]
fn remove_fragment_destroys_dependent_instances() {
    let (mut manager, mut device, probe) = setup();
    let mut a = handle_for(&mut manager, &mut device, "mat_a", "");
    let mut b = handle_for(&mut manager, &mut device, "mat_b", "USE_MAP");
    a.build(&mut manager, &mut device, BuildMode::Full).unwrap();
    b.build(&mut manager, &mut device, BuildMode::Full).unwrap();
    assert_eq!(probe.live_programs(), 2);

    let vs_idx = manager.store().index_of(ShaderStage::Vertex, "std_vs").unwrap();
    manager
        .remove_fragment(&mut device, ShaderStage::Vertex, vs_idx)
        .unwrap();

    assert_eq!(manager.instance_count(), 0);
    assert_eq!(probe.live_programs(), 0);

    // Stale handles fail loudly on use, and detach cleanly.
    let err = a.bind(&mut manager, &mut device).unwrap_err();
    assert!(matches!(err, GlimmerError::InstanceRemoved { .. }));
    a.detach(&mut manager, &mut device).unwrap();
    b.detach(&mut manager, &mut device).unwrap();

    // The name is free again.
    assert!(manager.add_fragment(ShaderStage::Vertex, "std_vs", VS).is_ok());
}

#[test]
fn remove_fragment_unbinds_bound_instances() {
    let (mut manager, mut device, probe) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");
    handle.bind(&mut manager, &mut device).unwrap();
    assert_ne!(probe.current_program(), 0);

    let fs_idx = manager
        .store()
        .index_of(ShaderStage::Fragment, "std_fs")
        .unwrap();
    manager
        .remove_fragment(&mut device, ShaderStage::Fragment, fs_idx)
        .unwrap();

    assert_eq!(probe.current_program(), 0, "no dangling bound state");
    assert_eq!(device.bound_program(), 0);
    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn invalidate_fragment_forces_relink() {
    let (mut manager, mut device, probe) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");
    handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap();
    let links_before = probe.link_calls();

    let fs_idx = manager
        .store()
        .index_of(ShaderStage::Fragment, "std_fs")
        .unwrap();
    manager.replace_source(ShaderStage::Fragment, fs_idx, FS).unwrap();
    manager
        .invalidate_fragment(&mut device, ShaderStage::Fragment, fs_idx)
        .unwrap();

    assert!(!handle.state(&manager).unwrap().contains(InstanceState::LINKED));
    handle
        .build(&mut manager, &mut device, BuildMode::Full)
        .unwrap();
    assert_eq!(probe.link_calls(), links_before + 1);

    handle.detach(&mut manager, &mut device).unwrap();
}

#[test]
fn invalidate_refuses_while_bound() {
    let (mut manager, mut device, _) = setup();
    let mut handle = handle_for(&mut manager, &mut device, "mat", "");
    handle.bind(&mut manager, &mut device).unwrap();

    let fs_idx = manager
        .store()
        .index_of(ShaderStage::Fragment, "std_fs")
        .unwrap();
    let err = manager
        .invalidate_fragment(&mut device, ShaderStage::Fragment, fs_idx)
        .unwrap_err();
    assert!(matches!(err, GlimmerError::StillBound { .. }));

    handle.unbind(&mut manager, &mut device).unwrap();
    handle.detach(&mut manager, &mut device).unwrap();
}
