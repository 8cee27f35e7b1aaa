//! Session lifecycle tests against the in-process stub runtime.
//!
//! Run with: `cargo test -p bdj-bridge --test session`

use std::path::{Path, PathBuf};
use std::time::Duration;

use bdj_bridge::config::BootConfig;
use bdj_bridge::locator;
use bdj_bridge::runtime::{Arg, LibraryCandidate};
use bdj_bridge::stub::{StubLoader, StubProgram};
use bdj_bridge::{
    BridgeConfig, BridgeError, DiscIdentity, EventCode, Host, NativeFn, NativeTable, Session,
    SessionState,
};

const DISC_ROOT: &str = "/media/disc";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("bdj_bridge=debug")
        .with_test_writer()
        .try_init();
}

/// Config whose boot archive search never finds anything on the test host.
fn config() -> BridgeConfig {
    BridgeConfig {
        boot: BootConfig {
            classpath: None,
            search_paths: vec![PathBuf::from("/nonexistent/libbluray/libbluray.jar")],
            fallback: PathBuf::from("libbluray.jar"),
        },
        ..BridgeConfig::default()
    }
}

fn open_at<'h>(
    disc_root: &'h Path,
    program: &StubProgram,
    config: &BridgeConfig,
) -> Result<Box<Session<'h>>, BridgeError> {
    init_tracing();
    Session::open_with(
        disc_root,
        Host::detached(),
        config,
        &StubLoader::new(program.clone()),
        &NativeTable::new(),
    )
}

fn open(program: &StubProgram) -> Box<Session<'static>> {
    open_at(Path::new(DISC_ROOT), program, &config()).unwrap()
}

fn write_id_bdmv(disc_root: &Path, org_id: [u8; 4], disc_id: [u8; 16]) {
    let mut bytes = Vec::with_capacity(60);
    bytes.extend_from_slice(b"BDID0200");
    bytes.extend_from_slice(&[0u8; 32]);
    bytes.extend_from_slice(&org_id);
    bytes.extend_from_slice(&disc_id);

    let path = DiscIdentity::path_for(disc_root);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

// ── Opening ─────────────────────────────────────────────────────────

#[test]
fn missing_library_leaves_nothing_loaded() {
    let program = StubProgram::default();
    program.set_library_present(false);

    let err = open_at(Path::new(DISC_ROOT), &program, &config()).unwrap_err();

    assert!(matches!(err, BridgeError::ResourceNotFound(_)));
    assert_eq!(program.live_libraries(), 0);
    assert_eq!(program.live_vms(), 0);
    assert!(program.created_with().is_none());
}

#[test]
fn library_without_create_symbol_is_released() {
    let program = StubProgram::default();
    program.set_create_symbol_present(false);

    let err = open_at(Path::new(DISC_ROOT), &program, &config()).unwrap_err();

    match err {
        BridgeError::ResourceNotFound(msg) => assert!(msg.contains("JNI_CreateJavaVM")),
        other => panic!("expected ResourceNotFound, got {other:?}"),
    }
    assert_eq!(program.live_libraries(), 0);
    assert!(program.violations().is_empty());
}

#[test]
fn java_home_restricts_search_to_its_tree() {
    let program = StubProgram::default();
    let root = PathBuf::from("/opt/jdk");
    let expected = locator::paths_under(&root);
    program.accept_only(LibraryCandidate::Path(expected[1].clone()));

    let mut config = config();
    config.runtime.java_home = Some(root);
    let session = open_at(Path::new(DISC_ROOT), &program, &config).unwrap();

    let attempts: Vec<_> = expected.into_iter().map(LibraryCandidate::Path).collect();
    assert_eq!(program.load_attempts(), attempts);
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn creation_failure_rolls_back() {
    let program = StubProgram::default();
    program.set_creation_fails(true);

    let err = open_at(Path::new(DISC_ROOT), &program, &config()).unwrap_err();

    assert!(matches!(err, BridgeError::InitializationFailure(_)));
    assert_eq!(program.live_libraries(), 0);
    assert_eq!(program.live_vms(), 0);
    assert!(program.violations().is_empty());
}

#[test]
fn unrecognized_extra_option_fails_creation() {
    let program = StubProgram::default();
    let mut config = config();
    config.vm.extra_options = vec!["--not-a-vm-option".into()];

    let err = open_at(Path::new(DISC_ROOT), &program, &config).unwrap_err();

    assert!(matches!(err, BridgeError::InitializationFailure(ref m) if m.contains("--not-a-vm-option")));
    assert_eq!(program.live_libraries(), 0);
}

#[test]
fn missing_entry_point_rolls_back() {
    let program = StubProgram::default();
    program.remove_entry("processEvent");

    let err = open_at(Path::new(DISC_ROOT), &program, &config()).unwrap_err();

    assert!(matches!(err, BridgeError::BridgeFailure(ref m) if m.contains("processEvent")));
    assert!(program.destroyed());
    assert_eq!(program.live_vms(), 0);
    assert_eq!(program.live_libraries(), 0);
    assert!(!program.fault_pending());
    assert!(program.calls_to("init").is_empty());
}

#[test]
fn options_are_boot_archive_then_disc_root_then_extras() {
    let program = StubProgram::default();
    let mut config = config();
    config.vm.extra_options = vec!["-Xmx64m".into(), "-Dfile.encoding=UTF-8".into()];

    let _session = open_at(Path::new(DISC_ROOT), &program, &config).unwrap();

    let options = program.created_with().unwrap();
    assert!(!options.ignore_unrecognized);
    assert_eq!(
        options.options,
        vec![
            "-Xbootclasspath/a:libbluray.jar".to_string(),
            "-Dbluray.vfs.root=/media/disc".to_string(),
            "-Xmx64m".to_string(),
            "-Dfile.encoding=UTF-8".to_string(),
        ]
    );
}

#[test]
fn boot_archive_falls_back_when_nothing_is_found() {
    let program = StubProgram::default();
    let session = open(&program);

    assert_eq!(session.boot_archive(), Path::new("libbluray.jar"));
}

#[test]
fn boot_archive_override_is_trusted() {
    let program = StubProgram::default();
    let mut config = config();
    config.boot.classpath = Some(PathBuf::from("/opt/bdj/custom.jar"));

    let session = open_at(Path::new(DISC_ROOT), &program, &config).unwrap();

    assert_eq!(session.boot_archive(), Path::new("/opt/bdj/custom.jar"));
    assert_eq!(
        program.created_with().unwrap().options[0],
        "-Xbootclasspath/a:/opt/bdj/custom.jar"
    );
}

#[test]
fn boot_archive_search_finds_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let found = dir.path().join("libbluray.jar");
    std::fs::write(&found, b"PK").unwrap();

    let program = StubProgram::default();
    let mut config = config();
    config.boot.search_paths = vec![dir.path().join("missing.jar"), found.clone()];

    let session = open_at(Path::new(DISC_ROOT), &program, &config).unwrap();
    assert_eq!(session.boot_archive(), found);
}

#[test]
fn init_receives_handle_and_disc_id() {
    let disc = tempfile::tempdir().unwrap();
    let disc_id = [
        0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67,
        0x89,
    ];
    write_id_bdmv(disc.path(), [0, 0, 0, 1], disc_id);

    let program = StubProgram::default();
    let session = open_at(disc.path(), &program, &config()).unwrap();

    assert_eq!(
        program.calls_to("init"),
        vec![vec![
            Arg::Long(session.handle()),
            Arg::Str("ABCDEF0123456789ABCDEF0123456789".into()),
        ]]
    );
}

#[test]
fn init_receives_zero_id_without_certificate() {
    let disc = tempfile::tempdir().unwrap();
    let program = StubProgram::default();
    let _session = open_at(disc.path(), &program, &config()).unwrap();

    let calls = program.calls_to("init");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][1], Arg::Str(DiscIdentity::ZERO_DISC_ID.into()));
}

#[test]
fn init_fault_is_not_fatal() {
    let program = StubProgram::default();
    program.fault_on("init", "java.lang.RuntimeException: bad disc");

    let session = open(&program);

    assert_eq!(session.state(), SessionState::Ready);
    assert!(!program.fault_pending());
    session.start(1).unwrap();
}

#[test]
fn native_registration_failure_is_not_fatal() {
    extern "C" fn noop() {}

    let program = StubProgram::default();
    program.set_natives_fail(true);
    let natives = NativeTable::new().with_method(
        "org/videolan/Libbluray",
        "getTitleInfoN",
        "(JI)Lorg/videolan/TitleInfo;",
        NativeFn(noop as extern "C" fn() as *mut std::ffi::c_void),
    );

    init_tracing();
    let session = Session::open_with(
        Path::new(DISC_ROOT),
        Host::detached(),
        &config(),
        &StubLoader::new(program.clone()),
        &natives,
    )
    .unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    assert!(program.registered_natives().is_empty());
    assert!(!program.fault_pending());
}

#[test]
fn natives_are_registered_before_init() {
    extern "C" fn noop() {}
    let ptr = NativeFn(noop as extern "C" fn() as *mut std::ffi::c_void);

    let program = StubProgram::default();
    let natives = NativeTable::new()
        .with_method("org/videolan/Libbluray", "getTitleInfoN", "(JI)Lorg/videolan/TitleInfo;", ptr)
        .with_method("java/awt/BDGraphics", "drawN", "(J[IIIII)V", ptr);

    init_tracing();
    let _session = Session::open_with(
        Path::new(DISC_ROOT),
        Host::detached(),
        &config(),
        &StubLoader::new(program.clone()),
        &natives,
    )
    .unwrap();

    assert_eq!(
        program.registered_natives(),
        vec![
            ("org/videolan/Libbluray".to_string(), "getTitleInfoN".to_string()),
            ("java/awt/BDGraphics".to_string(), "drawN".to_string()),
        ]
    );
}

// ── Title control ───────────────────────────────────────────────────

#[test]
fn start_and_stop_follow_hosted_result() {
    let program = StubProgram::default();
    let session = open(&program);

    session.start(7).unwrap();
    session.stop().unwrap();
    assert_eq!(program.calls_to("load"), vec![vec![Arg::Int(7)]]);
    assert_eq!(program.calls_to("unload"), vec![Vec::<Arg>::new()]);

    program.set_load_result(false);
    program.set_unload_result(false);
    assert!(matches!(session.start(7), Err(BridgeError::Rejected { .. })));
    assert!(matches!(session.stop(), Err(BridgeError::Rejected { .. })));
}

#[test]
fn start_fault_is_reported_and_cleared() {
    let program = StubProgram::default();
    program.fault_on("load", "java.lang.IllegalArgumentException: title 99");
    let session = open(&program);

    let err = session.start(99).unwrap_err();

    assert!(err.is_fault());
    assert_eq!(session.state(), SessionState::Ready);
    assert!(!program.fault_pending());
    session.stop().unwrap();
}

#[test]
fn stop_fault_is_reported_and_cleared() {
    let program = StubProgram::default();
    program.fault_on("unload", "java.lang.IllegalStateException: xlet busy");
    let session = open(&program);
    session.start(1).unwrap();

    let err = session.stop().unwrap_err();

    match &err {
        BridgeError::RuntimeFault { entry, fault } => {
            assert!(entry.contains("BDJLoader.unload"));
            assert!(fault.description.contains("xlet busy"));
        }
        other => panic!("expected RuntimeFault, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Running);
    assert!(!program.fault_pending());

    session.process_event(EventCode::Chapter, 1);
    assert_eq!(program.calls_to("processEvent").len(), 1);
}

#[test]
fn out_of_range_title_is_not_dispatched() {
    let program = StubProgram::default();
    let session = open(&program);

    let err = session.start(u32::MAX).unwrap_err();

    assert!(matches!(err, BridgeError::InvalidTitle(u32::MAX)));
    assert!(program.calls_to("load").is_empty());
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn failed_open_error_is_debuggable() {
    let program = StubProgram::default();
    program.set_creation_fails(true);

    let result = open_at(Path::new(DISC_ROOT), &program, &config());

    assert!(format!("{result:?}").contains("InitializationFailure"));
}

// ── Events ──────────────────────────────────────────────────────────

#[test]
fn event_is_relayed_once_with_code_and_param() {
    let program = StubProgram::default();
    let session = open(&program);

    session.process_event(EventCode::PlayItem, 5);

    assert_eq!(
        program.calls_to("processEvent"),
        vec![vec![Arg::Int(2), Arg::Int(5)]]
    );
}

#[test]
fn every_event_code_is_delivered() {
    let program = StubProgram::default();
    let session = open(&program);

    for event in EventCode::ALL {
        session.process_event(event, u32::MAX);
    }

    let calls = program.calls_to("processEvent");
    assert_eq!(calls.len(), EventCode::ALL.len());
    for (call, event) in calls.iter().zip(EventCode::ALL) {
        assert_eq!(call, &vec![Arg::Int(event.code() as i32), Arg::Int(-1)]);
    }
}

#[test]
fn faulting_event_handler_does_not_escape() {
    let program = StubProgram::default();
    program.fault_on("processEvent", "java.lang.NullPointerException");
    let session = open(&program);

    for event in EventCode::ALL {
        session.process_event(event, 0);
        assert!(!program.fault_pending());
    }
    session.start(1).unwrap();
}

#[test]
fn unknown_raw_event_is_rejected() {
    let program = StubProgram::default();
    let session = open(&program);

    let err = session.process_raw_event(9, 1).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidEvent(9)));

    session.process_raw_event(1, 3).unwrap();
    assert_eq!(
        program.calls_to("processEvent"),
        vec![vec![Arg::Int(1), Arg::Int(3)]]
    );
}

#[test]
fn events_from_other_threads_attach_and_detach() {
    let program = StubProgram::default();
    let session = open(&program);

    std::thread::scope(|s| {
        for param in 0..4 {
            let session = &session;
            s.spawn(move || session.process_event(EventCode::Pts, param));
        }
    });

    assert_eq!(program.calls_to("processEvent").len(), 4);
    assert_eq!(program.attach_count(), 4);
    assert_eq!(program.detach_count(), 4);
    assert!(program.violations().is_empty());
}

// ── Teardown ────────────────────────────────────────────────────────

#[test]
fn teardown_notifies_then_destroys_then_unloads() {
    let program = StubProgram::default();
    let session = open(&program);
    session.close();

    assert_eq!(
        program.log(),
        vec![
            "load-library",
            "create-vm",
            "call:init",
            "call:shutdown",
            "destroy-vm",
            "unload-library",
        ]
    );
    assert!(program.violations().is_empty());
}

#[test]
fn close_is_idempotent() {
    let program = StubProgram::default();
    let session = open(&program);

    session.close();
    session.close();
    drop(session);

    assert_eq!(program.calls_to("shutdown").len(), 1);
    assert_eq!(program.live_libraries(), 0);
    assert_eq!(program.live_vms(), 0);
}

#[test]
fn shutdown_fault_does_not_stop_teardown() {
    let program = StubProgram::default();
    program.fault_on("shutdown", "java.lang.IllegalStateException");
    let session = open(&program);

    session.close();

    assert_eq!(session.state(), SessionState::Closed);
    assert!(program.destroyed());
    assert_eq!(program.live_libraries(), 0);
}

#[test]
fn failed_open_without_shutdown_entry_still_tears_down() {
    let program = StubProgram::default();
    program.remove_entry("shutdown");

    let err = open_at(Path::new(DISC_ROOT), &program, &config()).unwrap_err();

    assert!(matches!(err, BridgeError::BridgeFailure(_)));
    assert!(program.calls_to("shutdown").is_empty());
    assert!(program.destroyed());
    assert_eq!(program.live_libraries(), 0);
    assert!(program.violations().is_empty());
}

#[test]
fn close_waits_for_call_in_flight() {
    let program = StubProgram::default();
    program.set_call_delay(Duration::from_millis(50));
    let session = open(&program);

    std::thread::scope(|s| {
        let starter = s.spawn(|| session.start(0));
        s.spawn(|| {
            std::thread::sleep(Duration::from_millis(10));
            session.close();
        });
        // Either order is fine; a start after close is refused.
        let _ = starter.join().unwrap();
    });

    assert_eq!(session.state(), SessionState::Closed);
    assert!(program.violations().is_empty());
    assert_eq!(program.live_libraries(), 0);
}

#[test]
fn events_after_close_are_dropped() {
    let program = StubProgram::default();
    let session = open(&program);
    session.close();

    session.process_event(EventCode::Chapter, 1);
    assert!(program.calls_to("processEvent").is_empty());
    assert!(program.violations().is_empty());
}
