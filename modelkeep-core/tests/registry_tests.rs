use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::{Value, json};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use modelkeep_core::services::{
    DirStore, Record, RecordStore, Registry, StoreError, Submission,
};

// ----------------------- Test stubs -----------------------

/// In-memory store that counts writes and can be told to fail them.
#[derive(Default)]
struct MemStore {
    records: Mutex<Vec<Record>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    write_delay_ms: u64,
}

impl MemStore {
    fn with(records: Vec<Record>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
            ..Self::default()
        })
    }

    fn slow() -> Arc<Self> {
        Arc::new(Self {
            write_delay_ms: 20,
            ..Self::default()
        })
    }

    fn stored(&self, name: &str) -> Option<Record> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.name == name)
            .cloned()
    }
}

impl RecordStore for MemStore {
    fn list_all(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self.records.lock().unwrap().clone())
    }

    fn write(&self, record: &Record) -> Result<(), StoreError> {
        if self.write_delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.write_delay_ms));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: PathBuf::from(format!("mem/{}.json", record.name)),
                source: io::Error::other("disk full"),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut recs = self.records.lock().unwrap();
        recs.retain(|r| r.name != record.name);
        recs.push(record.clone());
        Ok(())
    }
}

fn rec(name: &str, score: f64) -> Record {
    Record::new(name, score, json!({ "from": name }))
}

// ----------------------- Seeding -------------------------

#[test]
fn seed_picks_first_maximum_in_enumeration_order() {
    let store = MemStore::with(vec![]);
    let reg = Registry::seed(
        store,
        vec![rec("a", 5.0), rec("b", 9.0), rec("c", 9.0)],
        "default",
    );
    assert_eq!(reg.active_name(), "b");
    assert_eq!(reg.current_active().score, 9.0);
    assert_eq!(reg.current_active().payload, json!({ "from": "b" }));
    // every name keeps its own record
    assert_eq!(reg.current("a").score, 5.0);
    assert_eq!(reg.current("c").score, 9.0);
    assert_eq!(reg.names(), vec!["a", "b", "c"]);
}

#[test]
fn seed_with_no_candidates_starts_at_zero_on_default_name() {
    let reg = Registry::seed(MemStore::with(vec![]), Vec::new(), "default");
    let current = reg.current_active();
    assert_eq!(current.name, "default");
    assert_eq!(current.score, 0.0);
    assert_eq!(current.payload, Value::Null);
}

#[test]
fn seed_keeps_first_maximum_per_name_for_duplicates() {
    let reg = Registry::seed(
        MemStore::with(vec![]),
        vec![
            Record::new("m", 3.0, json!("first")),
            Record::new("m", 3.0, json!("second")),
            Record::new("m", 1.0, json!("third")),
        ],
        "default",
    );
    assert_eq!(reg.current("m").payload, json!("first"));
}

#[test]
fn seeded_loads_from_the_store() {
    let store = MemStore::with(vec![rec("x", 2.0), rec("y", 8.0)]);
    let reg = Registry::seeded(store, "default").expect("seeded");
    assert_eq!(reg.active_name(), "y");
}

// ----------------------- Current -------------------------

#[test]
fn current_is_stable_without_submissions() {
    let reg = Registry::seed(MemStore::with(vec![]), vec![rec("m", 4.0)], "default");
    let first = reg.current("m");
    for _ in 0..10 {
        assert_eq!(reg.current("m"), first);
    }
}

#[test]
fn current_for_unseen_name_is_zero_without_creating_state() {
    let reg = Registry::seed(MemStore::with(vec![]), Vec::new(), "default");
    let r = reg.current("never-seen");
    assert_eq!(r.name, "never-seen");
    assert_eq!(r.score, 0.0);
    assert_eq!(reg.names(), vec!["default"]);
}

// ----------------------- Submit --------------------------

#[test]
fn higher_score_is_written_then_held() {
    let store = MemStore::with(vec![]);
    let reg = Registry::seed(Arc::clone(&store), vec![rec("m", 5.0)], "default");

    let out = reg.submit("m", 6.0, json!({"w": [1, 2]})).expect("submit");
    assert_eq!(out, Submission::Accepted(Record::new("m", 6.0, json!({"w": [1, 2]}))));
    assert_eq!(reg.current("m").score, 6.0);
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    assert_eq!(store.stored("m").expect("persisted").score, 6.0);
}

#[test]
fn equal_or_lower_scores_are_rejected_without_writing() {
    let store = MemStore::with(vec![]);
    let reg = Registry::seed(Arc::clone(&store), vec![rec("m", 5.0)], "default");
    let before = reg.current("m");

    for s in [5.0, 4.999, 0.0, -1.0, f64::NAN, f64::INFINITY] {
        let out = reg.submit("m", s, json!("nope")).expect("submit");
        assert_eq!(out, Submission::Rejected(before.clone()), "score {s}");
    }
    assert_eq!(reg.current("m"), before);
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
}

#[test]
fn failed_write_is_surfaced_and_memory_is_untouched() {
    let store = MemStore::with(vec![]);
    let reg = Registry::seed(Arc::clone(&store), vec![rec("m", 5.0)], "default");
    store.fail_writes.store(true, Ordering::SeqCst);

    let err = reg.submit("m", 50.0, json!("big")).expect_err("write must fail");
    assert!(matches!(err, StoreError::Io { .. }));
    assert_eq!(reg.current("m").score, 5.0);

    // the commit lock was released: a later submission goes through
    store.fail_writes.store(false, Ordering::SeqCst);
    let out = reg.submit("m", 6.0, json!("ok")).expect("submit");
    assert!(out.is_accepted());
    assert_eq!(reg.current("m").score, 6.0);
}

#[test]
fn invalid_name_is_an_error_and_creates_no_state() {
    let reg = Registry::seed(MemStore::with(vec![]), Vec::new(), "default");
    let err = reg.submit("../up", 10.0, Value::Null).expect_err("invalid");
    assert!(matches!(err, StoreError::InvalidName { .. }));
    assert_eq!(reg.names(), vec!["default"]);
}

#[test]
fn losing_submissions_for_unseen_names_leave_no_state() {
    let store = MemStore::with(vec![]);
    let reg = Registry::seed(Arc::clone(&store), Vec::new(), "default");

    for i in 0..1000 {
        let out = reg.submit(&format!("junk{i}"), 0.0, Value::Null).expect("submit");
        assert_eq!(out, Submission::Rejected(Record::unset(format!("junk{i}"))));
    }
    reg.submit("nan", f64::NAN, Value::Null).expect("submit");
    reg.submit("neg", -3.0, Value::Null).expect("submit");
    assert_eq!(reg.names(), vec!["default"]);
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);

    // a failed first write for a new name is forgotten too
    store.fail_writes.store(true, Ordering::SeqCst);
    reg.submit("fresh", 1.0, Value::Null).expect_err("write must fail");
    assert_eq!(reg.names(), vec!["default"]);
    assert_eq!(reg.current("fresh"), Record::unset("fresh"));
}

#[test]
fn new_name_starts_from_zero() {
    let store = MemStore::with(vec![]);
    let reg = Registry::seed(Arc::clone(&store), vec![rec("a", 100.0)], "default");
    assert!(reg.submit("b", 0.5, Value::Null).expect("submit").is_accepted());
    assert_eq!(reg.current("b").score, 0.5);
    // the active model is not affected by other names
    assert_eq!(reg.current_active().name, "a");
}

#[test]
fn accepted_scores_are_strictly_increasing() {
    let store = MemStore::with(vec![]);
    let reg = Registry::seed(Arc::clone(&store), Vec::new(), "default");
    let mut rng = StdRng::seed_from_u64(7);
    let mut accepted = Vec::new();

    for _ in 0..500 {
        let s: f64 = rng.gen_range(-10.0..100.0);
        let before = reg.current("default").score;
        match reg.submit("default", s, json!(s)).expect("submit") {
            Submission::Accepted(r) => {
                assert!(s > before);
                accepted.push(r.score);
            }
            Submission::Rejected(r) => {
                assert!(s <= before);
                assert_eq!(r.score, before);
            }
        }
    }
    assert!(accepted.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(store.writes.load(Ordering::SeqCst), accepted.len());
}

// ----------------------- Concurrency ---------------------

#[test]
fn racing_equal_submissions_commit_exactly_once() {
    let store = MemStore::slow();
    let reg = Arc::new(Registry::seed(Arc::clone(&store), vec![rec("m", 5.0)], "default"));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let reg = Arc::clone(&reg);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                reg.submit("m", 10.0, json!(i)).expect("submit")
            })
        })
        .collect();

    let results: Vec<Submission> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let accepted = results.iter().filter(|r| r.is_accepted()).count();
    assert_eq!(accepted, 1);
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    assert_eq!(reg.current("m").score, 10.0);
    for r in results.iter().filter(|r| !r.is_accepted()) {
        assert_eq!(r.record().score, 10.0, "losers learn the winning score");
    }
}

#[test]
fn readers_are_not_blocked_by_a_slow_write() {
    let store = Arc::new(MemStore {
        write_delay_ms: 300,
        ..MemStore::default()
    });
    let reg = Arc::new(Registry::seed(Arc::clone(&store), vec![rec("m", 1.0)], "default"));

    let writer = {
        let reg = Arc::clone(&reg);
        thread::spawn(move || reg.submit("m", 2.0, Value::Null).expect("submit"))
    };
    thread::sleep(Duration::from_millis(50));

    let started = std::time::Instant::now();
    // still the old value while the write is in flight
    assert_eq!(reg.current("m").score, 1.0);
    assert!(started.elapsed() < Duration::from_millis(200));

    assert!(writer.join().unwrap().is_accepted());
    assert_eq!(reg.current("m").score, 2.0);
}

#[test]
fn different_names_commit_independently() {
    let store = MemStore::slow();
    let reg = Arc::new(Registry::seed(Arc::clone(&store), Vec::new(), "default"));
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|name| {
            let reg = Arc::clone(&reg);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                reg.submit(name, 1.0, Value::Null).expect("submit")
            })
        })
        .collect();
    for h in handles {
        assert!(h.join().unwrap().is_accepted());
    }
    assert_eq!(store.writes.load(Ordering::SeqCst), 4);
}

// ----------------------- Restart -------------------------

#[test]
fn accepted_record_survives_a_restart() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("data");
    {
        let store = DirStore::open(&dir, "json").expect("open");
        let reg = Registry::seeded(store, "default").expect("seeded");
        assert!(reg
            .submit("default", 12.0, json!({"layers": [3, 4]}))
            .expect("submit")
            .is_accepted());
        assert!(!reg.submit("default", 11.0, json!(null)).expect("submit").is_accepted());
    }

    let store = DirStore::open(&dir, "json").expect("reopen");
    let all = store.list_all().expect("list");
    assert_eq!(all, vec![Record::new("default", 12.0, json!({"layers": [3, 4]}))]);

    let reg = Registry::seeded(store, "default").expect("reseed");
    assert_eq!(reg.current_active().score, 12.0);
}
