//! Properties of the statement log across the public API.

use proptest::prelude::*;
use syncdb_core::{CoreError, Store, StoreConfig, Value, COMPANY_KEY, NODE_ID_KEY};

fn store() -> Store {
    Store::open(StoreConfig::in_memory().generate_node_id(false)).unwrap()
}

fn write_strategy() -> impl Strategy<Value = Vec<(i64, String)>> {
    prop::collection::vec((any::<i64>(), "[a-z]{0,12}"), 1..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn sequences_are_one_to_n_in_call_order(writes in write_strategy()) {
        let store = store();
        let mut tx = store.begin().unwrap();
        let id = tx.id().unwrap();
        tx.exec("CREATE TABLE kv (k INTEGER, v TEXT)", &[]).unwrap();
        for (k, v) in &writes {
            tx.exec("INSERT INTO kv VALUES (?, ?)", &[Value::Integer(*k), Value::from(v.as_str())]).unwrap();
        }
        tx.commit().unwrap();

        let bundle = store.bundle(id).unwrap();
        let seqs: Vec<u32> = bundle.entries.iter().map(|e| e.sequence).collect();
        let expected: Vec<u32> = (1..=writes.len() as u32 + 1).collect();
        prop_assert_eq!(seqs, expected);

        for (entry, (k, v)) in bundle.entries.iter().skip(1).zip(&writes) {
            let stmt = entry.decode_statement().unwrap();
            prop_assert_eq!(stmt.params, vec![Value::Integer(*k), Value::from(v.as_str())]);
        }
    }

    #[test]
    fn replay_on_fresh_store_matches_source(writes in write_strategy()) {
        let source = store();
        source.transaction(|tx| {
            tx.exec("CREATE TABLE kv (k INTEGER, v TEXT)", &[])?;
            for (k, v) in &writes {
                tx.exec("INSERT INTO kv VALUES (?, ?)", &[Value::Integer(*k), Value::from(v.as_str())])?;
            }
            Ok(())
        }).unwrap();

        let target = store();
        let ids = source.transaction_ids().unwrap();
        let summary = target.replay_all(&source.bundles(&ids).unwrap());
        prop_assert_eq!(summary.applied, 1);

        let dump = |s: &Store| s.read(|tx| tx.query("SELECT k, v FROM kv ORDER BY rowid", &[])).unwrap();
        prop_assert_eq!(dump(&source), dump(&target));
        let shape = |s: &Store| -> Vec<_> {
            s.bundles(&ids)
                .unwrap()
                .into_iter()
                .flat_map(|b| b.entries)
                .map(|e| (e.transaction_id, e.id, e.sequence, e.statement))
                .collect()
        };
        prop_assert_eq!(shape(&source), shape(&target));
    }
}

#[test]
fn settings_scenario() {
    let store = store();
    let mut tx = store.begin().unwrap();
    assert!(matches!(tx.get("missing-key"), Err(CoreError::KeyNotFound { .. })));
    tx.set("k", "v").unwrap();
    assert_eq!(tx.get("k").unwrap(), "v");
    tx.commit().unwrap();
}

#[test]
fn identity_settings_stay_local() {
    let store = store();
    store
        .transaction(|tx| {
            tx.set(COMPANY_KEY, "acme")?;
            tx.set(NODE_ID_KEY, "n1")
        })
        .unwrap();
    assert!(store.transaction_ids().unwrap().is_empty());
}

#[test]
fn transactions_are_serialized_across_threads() {
    let store = std::sync::Arc::new(store());
    store
        .transaction(|tx| tx.exec("CREATE TABLE n (v INTEGER)", &[]))
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..10 {
                    store
                        .transaction(|tx| {
                            tx.exec("INSERT INTO n VALUES (?)", &[Value::Integer(t * 100 + i)])?;
                            tx.exec("INSERT INTO n VALUES (?)", &[Value::Integer(-(t * 100 + i))])
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let ids = store.transaction_ids().unwrap();
    assert_eq!(ids.len(), 41);
    for bundle in store.bundles(&ids).unwrap() {
        assert!(bundle.has_contiguous_sequence());
    }
}
