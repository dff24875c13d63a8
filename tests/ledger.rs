use proptest::prelude::*;

use vigil_guard::ledger::{MemoryLedger, ReputationLedger, Warning};

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(fut)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Po każdym kroku suma punktów == suma punktów ostrzeżeń.
    #[test]
    fn points_equal_warning_sum_after_each_step(
        steps in proptest::collection::vec(1u32..=20, 1..16),
    ) {
        block_on(async {
            let ledger = MemoryLedger::new();
            let mut expected = 0u32;
            for (i, pts) in steps.iter().enumerate() {
                let w = Warning::new(format!("case {i}"), *pts, "Mod#1").unwrap();
                let user = ledger.add_warning(99, w).await.unwrap();
                expected += pts;
                assert_eq!(user.points, expected);
                assert!(user.consistent());
                assert_eq!(user.warnings.len(), i + 1);
            }
        });
    }

    // Clear zeruje wszystko i jest idempotentny niezależnie od historii.
    #[test]
    fn clear_zeroes_state_idempotently(
        steps in proptest::collection::vec(1u32..=20, 0..8),
        clears in 1usize..3,
    ) {
        block_on(async {
            let ledger = MemoryLedger::new();
            for pts in &steps {
                let w = Warning::new("case", *pts, "Mod#1").unwrap();
                ledger.add_warning(5, w).await.unwrap();
            }
            for _ in 0..clears {
                ledger.clear_punishments(5).await.unwrap();
                let user = ledger.get_user(5).await.unwrap();
                assert_eq!(user.points, 0);
                assert!(user.warnings.is_empty());
            }
        });
    }
}

#[tokio::test]
async fn warnings_preserve_insertion_order() {
    let ledger = MemoryLedger::new();
    for (i, pts) in [2u32, 5, 1].iter().enumerate() {
        let w = Warning::new(format!("reason {i}"), *pts, "Mod#1").unwrap();
        ledger.add_warning(3, w).await.unwrap();
    }
    let user = ledger.get_user(3).await.unwrap();
    let reasons: Vec<&str> = user.warnings.iter().map(|w| w.reason.as_str()).collect();
    assert_eq!(reasons, vec!["reason 0", "reason 1", "reason 2"]);
}

#[tokio::test]
async fn unknown_user_reads_as_zero_reputation() {
    let ledger = MemoryLedger::new();
    let user = ledger.get_user(12345).await.unwrap();
    assert_eq!(user.user_id, 12345);
    assert_eq!(user.points, 0);
    assert!(user.warnings.is_empty());
}
