//! Read-only handles must refuse every mutation without side effects,
//! while lookups, decoding, matching and path checks keep working.

use geomdb::core::codec::minor;
use geomdb::{
    Combination, CombinationNode, Database, DatabaseConfig, FullPath, GeomDbError, Record,
};
use tempfile::TempDir;

fn read_only_db(dir: &TempDir) -> (std::path::PathBuf, Database) {
    let path = dir.path().join("ro.g");
    {
        let mut db = Database::create(&path, DatabaseConfig::default()).unwrap();
        db.put(&Record::primitive("a.s", minor::SPHERE, vec![9; 24]).unwrap())
            .unwrap();
        db.put_combination("group", &Combination::new(Some(CombinationNode::leaf("a.s"))))
            .unwrap();
        db.close().unwrap();
    }
    let db = Database::open(&path, DatabaseConfig::read_only()).unwrap();
    (path, db)
}

fn assert_read_only<T: std::fmt::Debug>(result: geomdb::Result<T>) {
    assert!(
        matches!(result, Err(GeomDbError::ReadOnlyViolation)),
        "expected ReadOnlyViolation, got {:?}",
        result
    );
}

#[test]
fn test_every_mutation_rejected() {
    let dir = TempDir::new().unwrap();
    let (path, mut db) = read_only_db(&dir);
    let file_before = std::fs::read(&path).unwrap();
    let record = Record::primitive("b.s", minor::SPHERE, vec![1; 8]).unwrap();

    assert_read_only(db.put(&record));
    assert_read_only(db.put_in_memory(&record));
    assert_read_only(db.persist_in_memory());
    assert_read_only(db.delete("a.s"));
    assert_read_only(db.rename("a.s", "c.s"));
    assert_read_only(db.rename_references("a.s", "c.s"));
    assert_read_only(db.hide("a.s"));
    assert_read_only(db.unhide("a.s"));
    assert_read_only(db.put_combination("g2", &Combination::new(None)));
    assert_read_only(db.remove_member("group", "a.s"));
    assert_read_only(db.delete_everywhere("a.s"));
    assert_read_only(db.delete_matching("*"));
    assert_read_only(db.delete_tree("group"));
    assert_read_only(db.set_title("nope"));

    assert_eq!(db.names(), vec!["a.s", "group"]);
    assert_eq!(db.allocator().extent_count(), 0);
    drop(db);
    assert_eq!(std::fs::read(&path).unwrap(), file_before);
}

#[test]
fn test_reads_still_work() {
    let dir = TempDir::new().unwrap();
    let (_path, db) = read_only_db(&dir);

    assert!(db.is_read_only());
    assert_eq!(db.get("a.s").unwrap().body, vec![9; 24]);
    assert_eq!(db.match_names("*.s"), vec!["a.s".to_string()]);
    assert!(db.validate_path(&FullPath::new(["group", "a.s"])));
    assert_eq!(db.raw("a.s", |view| view.name.to_string()).unwrap(), "a.s");
    assert_eq!(db.title().unwrap(), None);
    assert_eq!(db.tops().unwrap(), vec!["group".to_string()]);
}

#[test]
fn test_builder_refuses_truncating_read_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x.g");
    let result = geomdb::DatabaseBuilder::new()
        .path(&path)
        .read_only()
        .truncate()
        .build();
    assert!(matches!(result, Err(GeomDbError::ReadOnlyViolation)));
    assert!(!path.exists());
}
