//! Tests for the capture session registry.

use glazyr::managers::session_registry::{SessionRegistry, SessionRegistryTrait};
use glazyr::types::capture::CaptureMeta;
use glazyr::types::errors::SessionError;

fn meta() -> CaptureMeta {
    CaptureMeta::new(3000.0, 1200.0, 1000.0)
}

#[test]
fn test_open_returns_unique_ids() {
    let mut reg = SessionRegistry::new();
    let a = reg.open(1, 10, meta()).unwrap();
    let b = reg.open(2, 10, meta()).unwrap();
    assert_ne!(a, b);
    assert!(!a.is_empty());
    assert_eq!(reg.session_count(), 2);

    let session = reg.get(&a).unwrap();
    assert_eq!(session.tab_id, 1);
    assert_eq!(session.window_id, 10);
    assert_eq!(session.meta, meta());
    assert!(session.created_at > 0);
}

#[test]
fn test_one_session_per_tab() {
    let mut reg = SessionRegistry::new();
    let first = reg.open(7, 1, meta()).unwrap();
    match reg.open(7, 1, meta()) {
        Err(SessionError::TabBusy { tab_id, session_id }) => {
            assert_eq!(tab_id, 7);
            assert_eq!(session_id, first);
        }
        other => panic!("expected TabBusy, got {:?}", other),
    }
    assert_eq!(reg.session_count(), 1);
}

#[test]
fn test_open_rejects_invalid_meta() {
    let mut reg = SessionRegistry::new();
    let err = reg.open(1, 1, CaptureMeta::new(3000.0, 0.0, 1000.0)).unwrap_err();
    assert!(matches!(err, SessionError::InvalidMeta(_)));
    let err = reg.open(1, 1, CaptureMeta::new(4.0e9, 1000.0, 1000.0)).unwrap_err();
    assert!(matches!(err, SessionError::InvalidMeta(_)));
    assert_eq!(reg.session_count(), 0);
    assert!(reg.session_for_tab(1).is_none());
}

#[test]
fn test_validate_checks_tab_without_mutating() {
    let mut reg = SessionRegistry::new();
    let id = reg.open(3, 1, meta()).unwrap();

    assert_eq!(reg.validate(&id, 3).unwrap().session_id, id);
    assert_eq!(
        reg.validate(&id, 4).unwrap_err(),
        SessionError::TabMismatch {
            session_id: id.clone(),
            expected: 3,
            actual: 4,
        }
    );
    // A mismatched lookup leaves the session usable by its owner.
    assert!(reg.validate(&id, 3).is_ok());
    assert_eq!(reg.session_count(), 1);
}

#[test]
fn test_validate_unknown_and_malformed() {
    let reg = SessionRegistry::new();
    assert!(matches!(reg.validate("nope", 1), Err(SessionError::NotFound(_))));
    assert!(matches!(reg.validate("  ", 1), Err(SessionError::MalformedId(_))));
}

#[test]
fn test_close_frees_the_tab() {
    let mut reg = SessionRegistry::new();
    let id = reg.open(5, 1, meta()).unwrap();
    let closed = reg.close(&id).unwrap();
    assert_eq!(closed.session_id, id);
    assert!(reg.close(&id).is_none());
    assert!(reg.session_for_tab(5).is_none());
    assert!(reg.open(5, 1, meta()).is_ok());
}

#[test]
fn test_close_for_tab() {
    let mut reg = SessionRegistry::new();
    let id = reg.open(8, 2, meta()).unwrap();
    reg.open(9, 2, meta()).unwrap();

    assert_eq!(reg.session_for_tab(8).unwrap().session_id, id);
    assert_eq!(reg.close_for_tab(8).unwrap().session_id, id);
    assert!(reg.close_for_tab(8).is_none());
    assert!(reg.get(&id).is_none());
    assert_eq!(reg.session_count(), 1);
}
