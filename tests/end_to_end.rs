use pagekv::{CreateOptions, Db, DeleteOutcome, InsertOutcome, Key, KeyKind};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::tempdir;

fn int32_options() -> CreateOptions {
    CreateOptions {
        key_kind: KeyKind::Int32,
        max_key_size: 4,
    }
}

fn bytes_options(max_key_size: usize) -> CreateOptions {
    CreateOptions {
        key_kind: KeyKind::Bytes,
        max_key_size,
    }
}

#[test]
fn tiny_int32_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    Db::create(&path, int32_options()).unwrap();
    let mut db = Db::open(&path).unwrap();

    assert_eq!(db.insert(Key::Int32(1), b"one").unwrap(), InsertOutcome::Inserted);
    assert_eq!(db.insert(Key::Int32(2), b"two").unwrap(), InsertOutcome::Inserted);
    assert_eq!(db.insert(Key::Int32(3), b"three").unwrap(), InsertOutcome::Inserted);

    let mut buf = [0u8; 16];
    let n = db.search(Key::Int32(1), &mut buf).unwrap();
    assert_eq!(&buf[..n], b"one");
    let n = db.search(Key::Int32(2), &mut buf).unwrap();
    assert_eq!(&buf[..n], b"two");
    let n = db.search(Key::Int32(3), &mut buf).unwrap();
    assert_eq!(&buf[..n], b"three");

    assert_eq!(db.delete(Key::Int32(2)).unwrap(), DeleteOutcome::Deleted);
    assert!(db.search(Key::Int32(2), &mut buf).is_err());
    let n = db.search(Key::Int32(1), &mut buf).unwrap();
    assert_eq!(&buf[..n], b"one");
    let n = db.search(Key::Int32(3), &mut buf).unwrap();
    assert_eq!(&buf[..n], b"three");

    db.verify().unwrap();
}

#[test]
fn duplicate_rejection() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    Db::create(&path, int32_options()).unwrap();
    let mut db = Db::open(&path).unwrap();

    assert_eq!(db.insert(Key::Int32(42), b"a").unwrap(), InsertOutcome::Inserted);
    assert_eq!(db.insert(Key::Int32(42), b"b").unwrap(), InsertOutcome::Duplicate);

    let mut buf = [0u8; 16];
    let n = db.search(Key::Int32(42), &mut buf).unwrap();
    assert_eq!(&buf[..n], b"a");
}

#[test]
fn shuffled_fill_and_drain() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    Db::create(&path, int32_options()).unwrap();
    let mut db = Db::open(&path).unwrap();

    let n: i32 = 2000;
    let mut insert_order: Vec<i32> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(7);
    insert_order.shuffle(&mut rng);

    for &k in &insert_order {
        let value = k.to_string();
        assert_eq!(
            db.insert(Key::Int32(k), value.as_bytes()).unwrap(),
            InsertOutcome::Inserted
        );
    }
    db.verify().unwrap();

    let mut buf = [0u8; 16];
    for &k in &insert_order {
        let len = db.search(Key::Int32(k), &mut buf).unwrap();
        assert_eq!(&buf[..len], k.to_string().as_bytes());
    }

    let mut delete_order: Vec<i32> = (0..n).collect();
    delete_order.shuffle(&mut rng);
    for &k in &delete_order {
        assert_eq!(db.delete(Key::Int32(k)).unwrap(), DeleteOutcome::Deleted);
    }
    db.verify().unwrap();
    assert_eq!(db.delete(Key::Int32(0)).unwrap(), DeleteOutcome::NotFound);
}

#[test]
fn value_block_recycling() {
    // Values are sized so only one fits per block: this makes every delete
    // free a whole block immediately, which is what exercises recycling.
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    Db::create(&path, bytes_options(16)).unwrap();
    let mut db = Db::open(&path).unwrap();

    let key_bytes = |i: u32| -> [u8; 16] {
        let mut k = [0u8; 16];
        k[..4].copy_from_slice(&i.to_ne_bytes());
        k
    };
    let big_value = vec![0xABu8; 5000];

    for i in 0..200u32 {
        let k = key_bytes(i);
        db.insert(Key::Bytes(&k), &big_value).unwrap();
    }

    let original_value_blocks = db.value_block_count();
    assert_eq!(original_value_blocks, 200);

    for i in (0..200u32).step_by(2) {
        let k = key_bytes(i);
        db.delete(Key::Bytes(&k)).unwrap();
    }
    assert_eq!(db.value_block_count(), 100);

    for i in 200..300u32 {
        let k = key_bytes(i);
        db.insert(Key::Bytes(&k), &big_value).unwrap();
    }

    assert!(db.value_block_count() <= original_value_blocks);
    db.verify().unwrap();
}

#[test]
fn deleting_all_keys_collapses_the_root() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    Db::create(&path, int32_options()).unwrap();
    let mut db = Db::open(&path).unwrap();

    let n: i32 = 600;
    for k in 0..n {
        db.insert(Key::Int32(k), b"v").unwrap();
    }
    db.verify().unwrap();

    for k in 0..n {
        db.delete(Key::Int32(k)).unwrap();
    }

    assert_eq!(db.key_total(), 0);
    assert_eq!(db.value_block_count(), 0);
    db.verify().unwrap();
}

#[test]
fn too_big_value_is_rejected_before_any_tree_mutation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    Db::create(&path, int32_options()).unwrap();
    let mut db = Db::open(&path).unwrap();

    for k in 0..200i32 {
        db.insert(Key::Int32(k), b"v").unwrap();
    }
    let key_total_before = db.key_total();
    let value_block_count_before = db.value_block_count();

    let oversized = vec![0u8; 9000];
    assert!(matches!(
        db.insert(Key::Int32(999), &oversized),
        Err(pagekv::Error::TooBig)
    ));

    // A too-big insert must be rejected before any root growth or child
    // split runs, so the tree's shape and value-block count are untouched.
    assert_eq!(db.key_total(), key_total_before);
    assert_eq!(db.value_block_count(), value_block_count_before);
    db.verify().unwrap();
}

#[test]
fn too_big_check_wins_over_duplicate_detection() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    Db::create(&path, int32_options()).unwrap();
    let mut db = Db::open(&path).unwrap();

    db.insert(Key::Int32(1), b"v").unwrap();

    let oversized = vec![0u8; 9000];
    assert!(matches!(
        db.insert(Key::Int32(1), &oversized),
        Err(pagekv::Error::TooBig)
    ));
}

#[test]
fn corruption_detection_on_truncation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    Db::create(&path, int32_options()).unwrap();
    {
        let mut db = Db::open(&path).unwrap();
        db.insert(Key::Int32(1), b"x").unwrap();
    }

    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(4097).unwrap();
    drop(file);

    assert!(Db::open(&path).is_err());
}
