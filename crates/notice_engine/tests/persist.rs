use std::fs;

use chrono::{TimeZone, Utc};
use notice_core::{Notice, NoticeBatch, IST};
use notice_engine::{ensure_output_dir, AtomicFileWriter, PersistError, SnapshotWriter};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn batch(ids: &[&str]) -> NoticeBatch {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap().with_timezone(&IST);
    let notices = ids
        .iter()
        .map(|id| Notice {
            id: id.to_string(),
            notice_type: "PLACEMENT".to_string(),
            category: "Core".to_string(),
            company: "Initech".to_string(),
            notice_text: "Shortlist out".to_string(),
            notice_by: "CDC".to_string(),
            notice_time: "01-03-2024".to_string(),
        })
        .collect();
    NoticeBatch::new(at, notices)
}

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("out");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("notices.json", "{}").unwrap();
    assert_eq!(first.file_name().unwrap(), "notices.json");
    assert_eq!(fs::read_to_string(&first).unwrap(), "{}");

    let second = writer.write("notices.json", "[]").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "[]");
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write("notices.json", "data");
    assert!(matches!(result, Err(PersistError::OutputDir(_))));
    assert!(!file_path.with_file_name("notices.json").exists());
}

#[test]
fn snapshot_is_indented_json_of_the_batch() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("data").join("notices.json");
    let writer = SnapshotWriter::new(path.clone());

    let written = writer.write(&batch(&["1", "2"])).unwrap();
    assert_eq!(written, path);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("{\n  \"scraped_at\": \"2024-03-01T11:30:00.000000+05:30\""));
    assert!(text.ends_with("}\n"));
    let saved: NoticeBatch = serde_json::from_str(&text).unwrap();
    assert_eq!(saved, batch(&["1", "2"]));
}

#[test]
fn snapshot_overwrites_previous_run() {
    let temp = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(temp.path().join("notices.json"));
    writer.write(&batch(&["1", "2", "3"])).unwrap();
    writer.write(&batch(&["4"])).unwrap();

    let saved: NoticeBatch =
        serde_json::from_str(&fs::read_to_string(writer.path()).unwrap()).unwrap();
    assert_eq!(saved.total_notices(), 1);
    assert_eq!(saved.notices()[0].id, "4");

    let leftovers = fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn empty_batch_is_still_written() {
    let temp = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(temp.path().join("notices.json"));
    writer.write(&batch(&[])).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(writer.path()).unwrap()).unwrap();
    assert_eq!(value["total_notices"], 0);
    assert_eq!(value["notices"], serde_json::json!([]));
}

#[test]
fn path_without_file_name_is_rejected() {
    let writer = SnapshotWriter::new("/".into());
    assert!(matches!(
        writer.write(&batch(&["1"])),
        Err(PersistError::NoFileName(_))
    ));
}
