//! Tests for the persisted capture history.

use glazyr::database::Database;
use glazyr::managers::capture_store::{CaptureStore, CaptureStoreTrait};
use glazyr::types::capture::{CaptureKind, CapturedImage, MessageSender, OutputFormat};
use glazyr::types::errors::StoreError;
use tempfile::TempDir;

fn store() -> CaptureStore {
    CaptureStore::new(Database::open_in_memory().unwrap())
}

fn image(format: OutputFormat, width: u32, height: u32) -> CapturedImage {
    CapturedImage {
        bytes: vec![0xAB; 16],
        format,
        width,
        height,
    }
}

fn sender() -> MessageSender {
    MessageSender::tab(3, 1, "https://example.com/article")
}

#[test]
fn test_record_and_read_back() {
    let mut s = store();
    let id = s
        .record(CaptureKind::FullPage, &sender(), &image(OutputFormat::Jpeg, 1200, 3000))
        .unwrap();

    let last = s.last_capture().unwrap().unwrap();
    assert_eq!(last.id, id);
    assert_eq!(last.kind, CaptureKind::FullPage);
    assert_eq!(last.tab_id, Some(3));
    assert_eq!(last.url.as_deref(), Some("https://example.com/article"));
    assert_eq!(last.mime_type, "image/jpeg");
    assert_eq!((last.width, last.height), (1200, 3000));
    assert!(last.analysis.is_none());
    assert!(last.analysis_error.is_none());

    let stored = s.image(id).unwrap();
    assert_eq!(stored, image(OutputFormat::Jpeg, 1200, 3000));
}

#[test]
fn test_empty_history() {
    let s = store();
    assert!(s.last_capture().unwrap().is_none());
    assert!(s.list_recent(5).unwrap().is_empty());
    assert!(matches!(s.image(1), Err(StoreError::NotFound(1))));
}

#[test]
fn test_sender_without_tab() {
    let mut s = store();
    let id = s
        .record(CaptureKind::Region, &MessageSender::default(), &image(OutputFormat::Png, 10, 10))
        .unwrap();
    let record = s.last_capture().unwrap().unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.kind, CaptureKind::Region);
    assert!(record.tab_id.is_none());
    assert!(record.url.is_none());
    assert_eq!(s.image(id).unwrap().format, OutputFormat::Png);
}

#[test]
fn test_list_recent_is_newest_first_and_limited() {
    let mut s = store();
    let ids: Vec<i64> = (0..5)
        .map(|i| {
            s.record(CaptureKind::Region, &sender(), &image(OutputFormat::Png, 10 + i, 10))
                .unwrap()
        })
        .collect();

    let recent = s.list_recent(3).unwrap();
    let got: Vec<i64> = recent.iter().map(|r| r.id).collect();
    assert_eq!(got, vec![ids[4], ids[3], ids[2]]);
    assert_eq!(recent[0].width, 14);
}

#[test]
fn test_set_analysis() {
    let mut s = store();
    let id = s
        .record(CaptureKind::FullPage, &sender(), &image(OutputFormat::Jpeg, 1, 1))
        .unwrap();

    s.set_analysis(id, Some("Labels: cat"), None).unwrap();
    let record = s.last_capture().unwrap().unwrap();
    assert_eq!(record.analysis.as_deref(), Some("Labels: cat"));
    assert!(record.analysis_error.is_none());

    s.set_analysis(id, None, Some("Vision/OCR error: offline")).unwrap();
    let record = s.last_capture().unwrap().unwrap();
    assert!(record.analysis.is_none());
    assert_eq!(record.analysis_error.as_deref(), Some("Vision/OCR error: offline"));

    assert!(matches!(
        s.set_analysis(id + 100, Some("x"), None),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_clear() {
    let mut s = store();
    for _ in 0..3 {
        s.record(CaptureKind::Region, &sender(), &image(OutputFormat::Png, 1, 1))
            .unwrap();
    }
    assert_eq!(s.clear().unwrap(), 3);
    assert!(s.last_capture().unwrap().is_none());
}

#[test]
fn test_history_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("glazyr.db");
    let path = path.to_str().unwrap();

    let id = {
        let mut s = CaptureStore::new(Database::open(path).unwrap());
        s.record(CaptureKind::FullPage, &sender(), &image(OutputFormat::Jpeg, 800, 2000))
            .unwrap()
    };

    let s = CaptureStore::new(Database::open(path).unwrap());
    let record = s.last_capture().unwrap().unwrap();
    assert_eq!(record.id, id);
    assert_eq!((record.width, record.height), (800, 2000));
}

#[test]
fn test_record_serializes_camel_case() {
    let mut s = store();
    s.record(CaptureKind::FullPage, &sender(), &image(OutputFormat::Jpeg, 2, 2))
        .unwrap();
    let json = serde_json::to_value(s.last_capture().unwrap().unwrap()).unwrap();
    assert_eq!(json["kind"], "full_page");
    assert_eq!(json["mimeType"], "image/jpeg");
    assert_eq!(json["tabId"], 3);
    assert!(json.get("capturedAt").is_some());
}

#[test]
fn test_record_prunes_beyond_retention() {
    let mut s = CaptureStore::with_retention(Database::open_in_memory().unwrap(), 3);
    let ids: Vec<i64> = (0..5)
        .map(|i| {
            s.record(CaptureKind::FullPage, &sender(), &image(OutputFormat::Jpeg, 10 + i, 10))
                .unwrap()
        })
        .collect();

    let kept: Vec<i64> = s.list_recent(10).unwrap().iter().map(|r| r.id).collect();
    assert_eq!(kept, vec![ids[4], ids[3], ids[2]]);
    assert!(matches!(s.image(ids[0]), Err(StoreError::NotFound(_))));
    assert!(s.image(ids[2]).is_ok());
}

#[test]
fn test_set_retention_prunes_immediately() {
    let mut s = store();
    assert_eq!(s.retention(), glazyr::managers::capture_store::DEFAULT_RETENTION);
    let ids: Vec<i64> = (0..4)
        .map(|_| {
            s.record(CaptureKind::Region, &sender(), &image(OutputFormat::Png, 1, 1))
                .unwrap()
        })
        .collect();

    assert_eq!(s.set_retention(2).unwrap(), 2);
    let kept: Vec<i64> = s.list_recent(10).unwrap().iter().map(|r| r.id).collect();
    assert_eq!(kept, vec![ids[3], ids[2]]);

    // Growing the limit removes nothing.
    assert_eq!(s.set_retention(10).unwrap(), 0);
    assert_eq!(s.list_recent(10).unwrap().len(), 2);
}

#[test]
fn test_zero_retention_keeps_latest() {
    let mut s = CaptureStore::with_retention(Database::open_in_memory().unwrap(), 0);
    assert_eq!(s.retention(), 1);
    s.record(CaptureKind::Region, &sender(), &image(OutputFormat::Png, 1, 1))
        .unwrap();
    let id = s
        .record(CaptureKind::Region, &sender(), &image(OutputFormat::Png, 2, 2))
        .unwrap();
    let kept = s.list_recent(10).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, id);
}
