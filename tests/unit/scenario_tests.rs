use docnum_rs::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    fn engine_at(start_ms: u64) -> (Arc<NumberingEngine>, ManualClock) {
        init_tracing();
        let clock = ManualClock::new(start_ms);
        let engine = NumberingEngine::in_memory(EngineConfig::default(), Arc::new(clock.clone()))
            .expect("default config is valid");
        (Arc::new(engine), clock)
    }

    // --- reserve, assign part, let the rest lapse ---

    #[tokio::test]
    async fn test_lapsed_number_is_reclaimed_and_reusable() {
        let (engine, clock) = engine_at(1_000);
        let user = Actor::user("designer");
        let admin = Actor::admin("chief");
        let equipment = EquipmentId(42);

        let session = engine.reserve(&user, equipment, 3, None).await.unwrap();
        assert_eq!(session.unassigned(), vec![1, 2, 3]);

        engine
            .assign(&user, session.token, 1, DocumentDraft::new("General arrangement"))
            .await
            .unwrap();
        engine
            .assign(&user, session.token, 2, DocumentDraft::new("Wiring diagram"))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(1_801));
        let report = engine.sweep_now().await;
        assert_eq!(report.sessions_closed, 1);
        assert_eq!(report.numbers_released, 1);

        // The released number is only reachable explicitly.
        let again = engine
            .reserve_specific(&admin, equipment, vec![3], None)
            .await
            .unwrap();
        assert_eq!(again.unassigned(), vec![3]);

        let fresh = engine.reserve(&user, equipment, 1, None).await.unwrap();
        assert_eq!(fresh.unassigned(), vec![4]);

        // Assigned numbers survive the sweep.
        let assigned: Vec<u64> = engine
            .query(&LedgerQuery::new().equipment(equipment))
            .into_iter()
            .map(|d| d.number)
            .collect();
        assert_eq!(assigned, vec![1, 2]);
    }

    // --- explicit reservation ahead of the sequence ---

    #[tokio::test]
    async fn test_sequential_skips_admin_reserved_number() {
        let (engine, _) = engine_at(0);
        let user = Actor::user("designer");
        let equipment = EquipmentId(42);

        engine
            .reserve_specific(&Actor::admin("chief"), equipment, vec![50], None)
            .await
            .unwrap();

        let session = engine.reserve(&user, equipment, 60, None).await.unwrap();
        let numbers = session.unassigned();
        assert_eq!(numbers.len(), 60);
        assert!(!numbers.contains(&50));
        assert_eq!(numbers.first(), Some(&1));
        assert_eq!(numbers.last(), Some(&61));
    }

    // --- uniqueness under load ---

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sessions_never_share_numbers() {
        let (engine, _) = engine_at(0);
        let equipment = EquipmentId(9);

        let mut handles = Vec::new();
        for worker in 0..16 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let user = Actor::user(format!("user-{worker}"));
                let session = engine.reserve(&user, equipment, 4, None).await.unwrap();
                let mut numbers = Vec::new();
                for i in 0..4 {
                    let doc = engine
                        .assign_next(
                            &user,
                            session.token,
                            DocumentDraft::new(format!("Doc {worker}-{i}")),
                        )
                        .await
                        .unwrap();
                    numbers.push(doc.number);
                }
                numbers
            }));
        }

        let mut seen = BTreeSet::new();
        for handle in handles {
            for number in handle.await.unwrap() {
                assert!(seen.insert(number), "number {number} assigned twice");
            }
        }
        assert_eq!(seen.len(), 64);
        assert_eq!(engine.ledger().len(), 64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_late_assignment_races_sweep() {
        let (engine, clock) = engine_at(0);
        let user = Actor::user("designer");
        let equipment = EquipmentId(5);

        let session = engine.reserve(&user, equipment, 1, None).await.unwrap();
        clock.advance(Duration::from_secs(1_801));

        let assign = {
            let engine = engine.clone();
            let user = user.clone();
            tokio::spawn(async move {
                engine
                    .assign(&user, session.token, 1, DocumentDraft::new("Late"))
                    .await
            })
        };
        let sweep = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sweep_now().await })
        };

        let assigned = assign.await.unwrap();
        sweep.await.unwrap();

        // Either the number was reclaimed or it is bound, never both.
        let sequence = engine.sequence(equipment).await.unwrap();
        match assigned {
            Ok(doc) => {
                assert_eq!(doc.number, 1);
                assert_eq!(sequence.assigned, vec![1]);
            }
            Err(ReservationError::UnknownSession(_)) => {
                assert!(sequence.used.is_empty());
                assert!(engine.ledger().is_empty());
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    // --- idempotent retry ---

    #[tokio::test]
    async fn test_retry_of_lost_reply_returns_same_document() {
        let (engine, _) = engine_at(0);
        let user = Actor::user("designer");
        let session = engine.reserve(&user, EquipmentId(1), 1, None).await.unwrap();
        let draft = DocumentDraft::new("Cable log").with_note("bay 3");

        let first = engine
            .assign(&user, session.token, 1, draft.clone())
            .await
            .unwrap();
        let retry = engine.assign(&user, session.token, 1, draft).await.unwrap();
        assert_eq!(first, retry);
        assert_eq!(engine.ledger().len(), 1);
    }
}
