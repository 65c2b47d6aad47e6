//! Property-based tests for the session registry under arbitrary sequences
//! of open/close operations across a handful of tabs.

use std::collections::HashMap;

use glazyr::managers::session_registry::{SessionRegistry, SessionRegistryTrait};
use glazyr::types::capture::CaptureMeta;
use glazyr::types::errors::SessionError;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Open(i64),
    CloseTab(i64),
    CloseOwn(i64),
    ValidateAs { owner: i64, caller: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let tab = 1i64..5;
    prop_oneof![
        tab.clone().prop_map(Op::Open),
        tab.clone().prop_map(Op::CloseTab),
        tab.clone().prop_map(Op::CloseOwn),
        (tab.clone(), tab).prop_map(|(owner, caller)| Op::ValidateAs { owner, caller }),
    ]
}

proptest! {
    #[test]
    fn registry_matches_model(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut reg = SessionRegistry::new();
        let mut model: HashMap<i64, String> = HashMap::new();
        let meta = CaptureMeta::new(2000.0, 800.0, 600.0);

        for op in ops {
            match op {
                Op::Open(tab) => {
                    let result = reg.open(tab, 1, meta);
                    match model.get(&tab) {
                        Some(existing) => {
                            let is_busy = matches!(&result, Err(SessionError::TabBusy { session_id, .. }) if session_id == existing);
                            prop_assert!(is_busy);
                        }
                        None => {
                            let id = result.unwrap();
                            prop_assert!(!model.values().any(|v| v == &id));
                            model.insert(tab, id);
                        }
                    }
                }
                Op::CloseTab(tab) => {
                    let closed = reg.close_for_tab(tab).map(|s| s.session_id);
                    prop_assert_eq!(closed, model.remove(&tab));
                }
                Op::CloseOwn(tab) => {
                    if let Some(id) = model.remove(&tab) {
                        prop_assert_eq!(reg.close(&id).map(|s| s.tab_id), Some(tab));
                    }
                }
                Op::ValidateAs { owner, caller } => {
                    if let Some(id) = model.get(&owner) {
                        let result = reg.validate(id, caller).map(|s| s.tab_id);
                        if owner == caller {
                            prop_assert_eq!(result, Ok(owner));
                        } else {
                            let is_mismatch = matches!(result, Err(SessionError::TabMismatch { .. }));
                            prop_assert!(is_mismatch);
                        }
                    }
                }
            }

            prop_assert_eq!(reg.session_count(), model.len());
            for (tab, id) in &model {
                prop_assert_eq!(reg.session_for_tab(*tab).map(|s| s.session_id.clone()), Some(id.clone()));
            }
        }
    }
}
