//! Property-based checks of the table's single-key invariants: a
//! sequential get/set/delete stream must agree with a plain `HashMap`
//! oracle at every step, and `set` must always report the correct
//! previous value.

use std::collections::HashMap;

use proptest::prelude::*;
use proptest::collection::vec as pvec;

use kv_table_core::{DeleteResult, GetResult, SetResult, Table, TableConfig};

#[derive(Debug, Clone)]
enum Op {
    Set(u8, u64),
    Get(u8),
    Delete(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<u8>(), any::<u64>()).prop_map(|(k, v)| Op::Set(k, v)),
        any::<u8>().prop_map(Op::Get),
        any::<u8>().prop_map(Op::Delete),
    ]
}

fn key_bytes(k: u8) -> [u8; 1] {
    [k]
}

proptest! {
    #[test]
    fn sequential_ops_match_a_hashmap_oracle(ops in pvec(op_strategy(), 1..500)) {
        let table = Table::new(TableConfig {
            initial_buckets: 16,
            max_buckets: 1 << 20,
            upsize_block_size: 4,
        }).unwrap();
        let attachment = table.thread_register();
        let mut oracle: HashMap<u8, u64> = HashMap::new();

        for op in ops {
            match op {
                Op::Set(k, v) => {
                    let key = key_bytes(k);
                    loop {
                        match table.op_set(&attachment, &key, v) {
                            SetResult::Ok { created_new, previous_value } => {
                                let prev = oracle.insert(k, v);
                                prop_assert_eq!(created_new, prev.is_none());
                                prop_assert_eq!(previous_value, prev.unwrap_or(0));
                                break;
                            }
                            SetResult::NeedsResizing => { table.upsize_prepare(&attachment); }
                            SetResult::TryLater => continue,
                            SetResult::Full => {
                                prop_assert!(false, "max_buckets is far above the single-byte key space");
                                break;
                            }
                        }
                    }
                }
                Op::Get(k) => {
                    let key = key_bytes(k);
                    let result = table.op_get(&attachment, &key);
                    match oracle.get(&k) {
                        Some(&v) => prop_assert_eq!(result, GetResult::Found(v)),
                        None => prop_assert_eq!(result, GetResult::NotFound),
                    }
                }
                Op::Delete(k) => {
                    let key = key_bytes(k);
                    loop {
                        match table.op_delete(&attachment, &key) {
                            DeleteResult::Deleted => {
                                prop_assert!(oracle.remove(&k).is_some());
                                break;
                            }
                            DeleteResult::NotFound => {
                                prop_assert!(oracle.remove(&k).is_none());
                                break;
                            }
                            DeleteResult::TryLater => continue,
                        }
                    }
                }
            }
            while table.is_upsizing() {
                table.upsize_migrate_block(&attachment);
            }
        }

        prop_assert_eq!(table.op_size() as usize, oracle.len());
    }

    #[test]
    fn repeated_set_on_one_key_always_reports_the_last_value_as_previous(
        values in pvec(any::<u64>(), 1..64)
    ) {
        let table = Table::new(TableConfig::default()).unwrap();
        let attachment = table.thread_register();
        let key = b"the-only-key";
        let mut last: Option<u64> = None;

        for v in values {
            let result = table.op_set(&attachment, key, v);
            match (result, last) {
                (SetResult::Ok { created_new: true, previous_value: 0 }, None) => {}
                (SetResult::Ok { created_new: false, previous_value }, Some(expected)) => {
                    prop_assert_eq!(previous_value, expected);
                }
                other => prop_assert!(false, "unexpected set result {:?} with last={:?}", other.0, last),
            }
            last = Some(v);
        }
    }
}
