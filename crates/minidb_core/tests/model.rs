//! Property tests: the engine behaves like a map, before and after reopen
//! and compaction.

use minidb_core::{Config, Database, Value};
use minidb_storage::InMemoryBackend;
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Set(String, i64),
    Delete(String),
    Compact,
}

fn op() -> impl Strategy<Value = Op> {
    let key = prop::sample::select(vec!["a", "b", "c", "d", "e"]).prop_map(String::from);
    prop_oneof![
        6 => (key.clone(), any::<i64>()).prop_map(|(k, v)| Op::Set(k, v)),
        3 => key.prop_map(Op::Delete),
        1 => Just(Op::Compact),
    ]
}

fn open(memory: &InMemoryBackend) -> Database {
    let config = Config::new().sync_on_write(false).auto_compact(false);
    Database::open_with_backend(Box::new(memory.shared()), config).unwrap()
}

fn assert_matches(db: &Database, model: &BTreeMap<String, i64>) {
    let keys: Vec<String> = model.keys().cloned().collect();
    assert_eq!(db.keys().unwrap(), keys);
    for (key, value) in model {
        assert_eq!(db.get(key).unwrap(), Some(Value::Integer(*value)));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn engine_matches_map_model(ops in prop::collection::vec(op(), 0..60)) {
        let memory = InMemoryBackend::new();
        let mut model = BTreeMap::new();
        {
            let db = open(&memory);
            for op in &ops {
                match op {
                    Op::Set(key, value) => {
                        db.set(key, Value::Integer(*value)).unwrap();
                        model.insert(key.clone(), *value);
                    }
                    Op::Delete(key) => {
                        let existed = model.remove(key).is_some();
                        prop_assert_eq!(db.delete(key).unwrap(), existed);
                    }
                    Op::Compact => {
                        let result = db.compact().unwrap();
                        prop_assert_eq!(result.output_records, model.len());
                    }
                }
            }
            assert_matches(&db, &model);
            db.close().unwrap();
        }

        let db = open(&memory);
        assert_matches(&db, &model);
        prop_assert_eq!(db.stats().live_keys, model.len() as u64);
    }
}
