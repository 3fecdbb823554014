use freight_exchange::config::Config;
use freight_exchange::engine::loyalty::{account, earn, history, spend};
use freight_exchange::error::AppError;
use freight_exchange::models::loyalty::TransactionKind;
use freight_exchange::state::AppState;
use proptest::prelude::*;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Op {
    Earn(u64),
    Spend(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..5_000).prop_map(Op::Earn),
        (1u64..5_000).prop_map(Op::Spend),
    ]
}

proptest! {
    #[test]
    fn balance_matches_ledger_and_never_goes_negative(ops in prop::collection::vec(op(), 1..60)) {
        let (state, _rx) = AppState::new(Config::default());
        let user_id = Uuid::new_v4();
        let mut expected: u64 = 0;

        for op in ops {
            match op {
                Op::Earn(amount) => {
                    earn(&state, user_id, amount, "test", None).unwrap();
                    expected += amount;
                }
                Op::Spend(amount) => {
                    let result = spend(&state, user_id, amount, "test", None);
                    if amount > expected {
                        let is_insufficient = matches!(result, Err(AppError::InsufficientPoints { .. }));
                        prop_assert!(is_insufficient);
                    } else {
                        prop_assert_eq!(result.unwrap().balance_after, expected - amount);
                        expected -= amount;
                    }
                }
            }
            prop_assert_eq!(account(&state, user_id).balance, expected);
        }

        let net: i128 = history(&state, user_id)
            .iter()
            .map(|tx| match tx.kind {
                TransactionKind::Earn => tx.amount as i128,
                TransactionKind::Spend => -(tx.amount as i128),
            })
            .sum();
        prop_assert_eq!(net, expected as i128);
    }
}
