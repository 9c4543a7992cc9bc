//! Tests for the binary file store
//!
//! These tests verify:
//! - Blocks are appended at fixed size and survive reopen
//! - Logical delete (tombstones) and stat counts
//! - Purge compacts the file, keeps order, and leaves no temp files
//! - Recovery from partial trailing blocks and duplicate live ids
//! - Corrupt block handling under both policies
//! - Restore merge rules

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use filecabinet::codec::{self, FIXED_SIZE};
use filecabinet::config::CorruptionPolicy;
use filecabinet::query::FieldCondition;
use filecabinet::storage::{FileStore, PurgeStat, RecordStore, StoreStat};
use filecabinet::validation::RuleSet;
use filecabinet::{CabinetError, Record, RecordInput, Snapshot, Tax};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn input(first: &str, last: &str) -> RecordInput {
    RecordInput::new(first, last, date(1990, 1, 5), 1200, Tax::from_hundredths(1250), 'A')
}

fn record(id: i32, first: &str, last: &str) -> Record {
    Record::new(id, input(first, last))
}

fn data_path(temp: &TempDir) -> PathBuf {
    temp.path().join("cabinet.db")
}

fn open(path: &Path) -> FileStore {
    open_with(path, CorruptionPolicy::Skip)
}

fn open_with(path: &Path, policy: CorruptionPolicy) -> FileStore {
    FileStore::open(path, Box::new(RuleSet::default_rules().validator()), policy).unwrap()
}

/// John Doe (1), Jane Doe (2), Bob Smith (3)
fn populate(store: &mut FileStore) {
    store.create(&input("John", "Doe")).unwrap();
    store.create(&input("Jane", "Doe")).unwrap();
    store.create(&input("Bob", "Smith")).unwrap();
}

fn ids(store: &mut FileStore) -> Vec<i32> {
    store.iterate().unwrap().map(|r| r.unwrap().id).collect()
}

/// Overwrite a padding byte inside the last-name buffer of block `index`
fn corrupt_block(path: &Path, index: usize) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start((index * FIXED_SIZE + 100) as u64))
        .unwrap();
    file.write_all(&[0xFF]).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_open_creates_empty_file() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);

    let store = open(&path);

    assert!(path.exists());
    assert_eq!(store.file_size().unwrap(), 0);
    assert_eq!(store.get_stat(), StoreStat::default());
}

#[test]
fn test_open_creates_missing_parent_directories() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("dir").join("cabinet.db");

    let _store = open(&path);
    assert!(path.exists());
}

#[test]
fn test_create_appends_fixed_size_blocks() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));

    populate(&mut store);

    assert_eq!(store.file_size().unwrap(), 3 * FIXED_SIZE as u64);
    assert_eq!(store.offsets(), &[0, 180, 360]);
    assert_eq!(ids(&mut store), vec![1, 2, 3]);
}

#[test]
fn test_reopen_restores_records_and_id_sequence() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    {
        let mut store = open(&path);
        populate(&mut store);
    }

    let mut store = open(&path);
    assert_eq!(ids(&mut store), vec![1, 2, 3]);
    assert_eq!(store.create(&input("Amy", "Lee")).unwrap(), 4);
}

#[test]
fn test_deleted_max_id_not_reused_after_reopen() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    {
        let mut store = open(&path);
        populate(&mut store);
        store.delete_by_field("id", "3").unwrap();
    }

    let mut store = open(&path);
    assert_eq!(store.create(&input("Amy", "Lee")).unwrap(), 4);
}

#[test]
fn test_create_invalid_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    let mut bad = input("John", "Doe");
    bad.tax = Tax::from_whole(101);

    assert!(matches!(store.create(&bad), Err(CabinetError::Validation { .. })));
    assert_eq!(store.file_size().unwrap(), 0);
}

#[test]
fn test_decoded_records_match_input() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    populate(&mut store);

    let mut iter = store.iterate().unwrap();
    assert_eq!(iter.next_record().unwrap(), record(1, "John", "Doe"));
}

#[test]
fn test_insert_existing_id_supersedes_old_block() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    let mut store = open(&path);
    populate(&mut store);

    store.insert(1, &input("Johnny", "Doe")).unwrap();

    assert_eq!(store.get_stat(), StoreStat { live: 3, removed: 1 });
    assert_eq!(ids(&mut store), vec![2, 3, 1]);

    let found: Vec<String> = store
        .find_by_first_name("johnny")
        .unwrap()
        .map(|r| r.unwrap().first_name)
        .collect();
    assert_eq!(found, vec!["Johnny".to_string()]);
    assert!(!store.find_by_first_name("John").unwrap().has_more());

    drop(store);
    let mut store = open(&path);
    assert_eq!(ids(&mut store), vec![2, 3, 1]);
}

#[test]
fn test_edit_not_supported() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    populate(&mut store);

    let result = store.edit(1, &input("Johnny", "Doe"));
    assert!(matches!(result, Err(CabinetError::NotSupported(_))));
}

#[test]
fn test_update_many_not_supported() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    populate(&mut store);

    let result = store.update_many(
        &[FieldCondition::parse("id", "1").unwrap()],
        &[FieldCondition::parse("income", "5").unwrap()],
    );
    assert!(matches!(result, Err(CabinetError::NotSupported(_))));
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_tombstones_in_place() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    let mut store = open(&path);
    populate(&mut store);

    assert_eq!(store.delete_by_field("id", "2").unwrap(), vec![2]);

    assert_eq!(store.get_stat(), StoreStat { live: 2, removed: 1 });
    assert_eq!(store.file_size().unwrap(), 3 * FIXED_SIZE as u64);
    assert_eq!(ids(&mut store), vec![1, 3]);

    let bytes = fs::read(&path).unwrap();
    assert!(codec::is_deleted(&bytes[FIXED_SIZE..2 * FIXED_SIZE]));
    assert!(!codec::is_deleted(&bytes[..FIXED_SIZE]));
}

#[test]
fn test_delete_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    {
        let mut store = open(&path);
        populate(&mut store);
        store.delete_by_field("lastname", "DOE").unwrap();
    }

    let mut store = open(&path);
    assert_eq!(store.get_stat(), StoreStat { live: 1, removed: 2 });
    assert_eq!(ids(&mut store), vec![3]);
}

#[test]
fn test_delete_without_match_not_found() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    populate(&mut store);

    let result = store.delete_by_field("block", "z");
    assert!(matches!(result, Err(CabinetError::NotFound(_))));
    assert_eq!(store.get_stat().removed, 0);
}

#[test]
fn test_select_skips_deleted() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    populate(&mut store);
    store.delete_by_field("id", "2").unwrap();

    let selection = store
        .select(&[], &[FieldCondition::parse("lastname", "Doe").unwrap()])
        .unwrap();
    assert_eq!(selection.ids(), vec![1]);
}

// =============================================================================
// Purge Tests
// =============================================================================

#[test]
fn test_purge_compacts_and_preserves_order() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    let mut store = open(&path);
    populate(&mut store);
    store.create(&input("Amy", "Lee")).unwrap();
    store.delete_by_field("id", "2").unwrap();
    store.delete_by_field("id", "3").unwrap();

    let stat = store.purge().unwrap();

    assert_eq!(stat, PurgeStat { purged: 2, total: 4 });
    assert_eq!(store.file_size().unwrap(), 2 * FIXED_SIZE as u64);
    assert_eq!(store.get_stat(), StoreStat { live: 2, removed: 0 });
    assert_eq!(store.offsets(), &[0, 180]);
    assert_eq!(ids(&mut store), vec![1, 4]);
}

#[test]
fn test_purge_leaves_no_temp_files() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    populate(&mut store);
    store.delete_by_field("id", "1").unwrap();

    store.purge().unwrap();

    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
}

#[test]
fn test_store_usable_after_purge() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    let mut store = open(&path);
    populate(&mut store);
    store.delete_by_field("id", "3").unwrap();
    store.purge().unwrap();

    // Ids stay monotonic within the open store
    assert_eq!(store.create(&input("Amy", "Lee")).unwrap(), 4);
    store.delete_by_field("id", "1").unwrap();
    assert_eq!(ids(&mut store), vec![2, 4]);

    drop(store);
    let mut store = open(&path);
    assert_eq!(ids(&mut store), vec![2, 4]);
    assert_eq!(store.get_stat(), StoreStat { live: 2, removed: 1 });
}

#[test]
fn test_purge_without_removed_records() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    populate(&mut store);

    let stat = store.purge().unwrap();
    assert_eq!(stat, PurgeStat { purged: 0, total: 3 });
    assert_eq!(ids(&mut store), vec![1, 2, 3]);
}

#[test]
fn test_purge_after_repeated_replacement() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    let mut store = open(&path);
    populate(&mut store);
    store.insert(2, &input("Janet", "Roe")).unwrap();
    store.insert(2, &input("Janine", "Roe")).unwrap();
    store.delete_by_field("id", "1").unwrap();

    let stat = store.purge().unwrap();

    assert_eq!(stat, PurgeStat { purged: 3, total: 5 });
    assert_eq!(store.offsets(), &[0, 180]);
    assert_eq!(ids(&mut store), vec![3, 2]);

    let selection = store.select(&[], &[FieldCondition::parse("id", "2").unwrap()]).unwrap();
    assert_eq!(selection.records()[0].first_name, "Janine");

    store.insert(3, &input("Robert", "Smith")).unwrap();
    assert_eq!(store.get_stat(), StoreStat { live: 2, removed: 1 });
    assert_eq!(ids(&mut store), vec![2, 3]);
}

#[cfg(unix)]
#[test]
fn test_purge_keeps_file_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    let mut store = open(&path);
    populate(&mut store);
    store.delete_by_field("id", "2").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

    store.purge().unwrap();

    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_partial_trailing_block_truncated_on_open() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    {
        let mut store = open(&path);
        populate(&mut store);
    }
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAB; 50]).unwrap();
    }

    let mut store = open(&path);
    assert_eq!(store.file_size().unwrap(), 3 * FIXED_SIZE as u64);
    assert_eq!(ids(&mut store), vec![1, 2, 3]);
    assert_eq!(store.create(&input("Amy", "Lee")).unwrap(), 4);
    assert_eq!(store.offsets().last(), Some(&540));
}

#[test]
fn test_stray_tail_overwritten_by_next_append() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    let mut store = open(&path);
    populate(&mut store);

    // Leftover bytes from a write that failed partway
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAB; 50]).unwrap();
    }

    assert_eq!(store.create(&input("Amy", "Lee")).unwrap(), 4);
    assert_eq!(store.offsets().last(), Some(&540));
    drop(store);

    let mut store = open_with(&path, CorruptionPolicy::Abort);
    assert_eq!(store.file_size().unwrap(), 4 * FIXED_SIZE as u64);
    assert_eq!(ids(&mut store), vec![1, 2, 3, 4]);
}

#[test]
fn test_duplicate_live_id_resolved_on_open() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    {
        let mut store = open(&path);
        populate(&mut store);
    }
    // Replacement appended but old block never tombstoned
    {
        let block = codec::encode(&record(1, "Johnny", "Doe")).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&block).unwrap();
    }

    let mut store = open(&path);
    assert_eq!(store.get_stat(), StoreStat { live: 3, removed: 1 });

    let selection = store
        .select(&[], &[FieldCondition::parse("id", "1").unwrap()])
        .unwrap();
    assert_eq!(selection.records()[0].first_name, "Johnny");

    let bytes = fs::read(&path).unwrap();
    assert!(codec::is_deleted(&bytes[..FIXED_SIZE]));
}

#[test]
fn test_corrupt_block_skipped_on_open() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    {
        let mut store = open(&path);
        populate(&mut store);
    }
    corrupt_block(&path, 1);

    let mut store = open_with(&path, CorruptionPolicy::Skip);
    assert_eq!(ids(&mut store), vec![1, 3]);
    assert_eq!(store.make_snapshot().unwrap().len(), 2);
}

#[test]
fn test_corrupt_block_aborts_open() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    {
        let mut store = open(&path);
        populate(&mut store);
    }
    corrupt_block(&path, 1);

    let result = FileStore::open(
        &path,
        Box::new(RuleSet::default_rules().validator()),
        CorruptionPolicy::Abort,
    );
    assert!(matches!(result, Err(CabinetError::CorruptRecord(_))));
}

#[test]
fn test_iterator_reports_corruption_and_continues() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    let mut store = open(&path);
    populate(&mut store);

    corrupt_block(&path, 1);

    let results: Vec<_> = store.iterate().unwrap().collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().id, 1);
    assert!(matches!(results[1], Err(CabinetError::CorruptRecord(_))));
    assert_eq!(results[2].as_ref().unwrap().id, 3);

    // Skip policy drops it from snapshots
    let snapshot = store.make_snapshot().unwrap();
    assert_eq!(snapshot.records().iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
}

#[test]
fn test_snapshot_aborts_on_corruption_under_abort_policy() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    let mut store = open_with(&path, CorruptionPolicy::Abort);
    populate(&mut store);

    corrupt_block(&path, 2);

    assert!(matches!(store.make_snapshot(), Err(CabinetError::CorruptRecord(_))));
}

// =============================================================================
// Restore Tests
// =============================================================================

#[test]
fn test_restore_replaces_colliding_id() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    populate(&mut store);

    let accepted = store
        .restore(&Snapshot::new(vec![record(2, "Janet", "Roe"), record(7, "Amy", "Lee")]))
        .unwrap();

    assert_eq!(accepted, 2);
    assert_eq!(store.get_stat(), StoreStat { live: 4, removed: 1 });

    let selection = store.select(&[], &[]).unwrap();
    assert_eq!(selection.ids(), vec![1, 2, 3, 7]);
    assert_eq!(selection.records()[1].first_name, "Janet");
}

#[test]
fn test_restore_invalid_record_never_written() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    populate(&mut store);
    let mut bad = record(2, "Janet", "Roe");
    bad.block = '7';

    assert_eq!(store.restore(&Snapshot::new(vec![bad])).unwrap(), 0);
    assert_eq!(store.file_size().unwrap(), 3 * FIXED_SIZE as u64);
    assert_eq!(store.get_stat(), StoreStat { live: 3, removed: 0 });
}

#[test]
fn test_restore_is_idempotent_on_live_records() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    populate(&mut store);
    let snapshot = Snapshot::new(vec![record(2, "Janet", "Roe")]);

    store.restore(&snapshot).unwrap();
    let once = store.select(&[], &[]).unwrap();
    store.restore(&snapshot).unwrap();
    let twice = store.select(&[], &[]).unwrap();

    assert_eq!(once, twice);
    assert_eq!(store.get_stat().live, 3);
}

#[test]
fn test_restore_advances_next_id() {
    let temp = TempDir::new().unwrap();
    let mut store = open(&data_path(&temp));
    store.restore(&Snapshot::new(vec![record(40, "Zed", "Zulu")])).unwrap();

    assert_eq!(store.create(&input("Amy", "Lee")).unwrap(), 41);
}

#[test]
fn test_restore_appends_in_id_order() {
    let temp = TempDir::new().unwrap();
    let path = data_path(&temp);
    let mut store = open(&path);
    let snapshot = Snapshot::new(vec![
        record(5, "Eve", "Moss"),
        record(3, "Cal", "Reed"),
        record(1, "Amy", "Lee"),
    ]);

    assert_eq!(store.restore(&snapshot).unwrap(), 3);
    assert_eq!(ids(&mut store), vec![1, 3, 5]);

    drop(store);
    let mut store = open(&path);
    assert_eq!(ids(&mut store), vec![1, 3, 5]);
}
