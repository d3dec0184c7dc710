/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Tests for assigning reserved numbers through sessions.

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::error::ReservationError;
    use crate::ledger::DocumentDraft;
    use crate::ledger::tests::support::FlakyJournal;
    use crate::session::tests::support::{manager, manager_over};
    use crate::session::{NumberRequest, NumberStatus, ReservationKind, SessionState};
    use crate::types::{Actor, EquipmentId, SessionToken};
    use std::sync::atomic::Ordering;

    const EQUIPMENT: EquipmentId = EquipmentId(42);

    #[tokio::test]
    async fn test_reserve_opens_active_session() {
        let (sessions, _) = manager();
        let snapshot = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(3), &Actor::user("op"), None)
            .await
            .unwrap();

        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.kind, ReservationKind::Sequential);
        assert_eq!(snapshot.unassigned(), vec![1, 2, 3]);
        assert_eq!(snapshot.user, "op");
        assert_eq!(snapshot.ttl_ms, 1_800_000);
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_assign_one_marks_number_and_drains() {
        let (sessions, _) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(2), &Actor::user("op"), None)
            .await
            .unwrap()
            .token;

        let first = sessions
            .assign_one(token, 1, DocumentDraft::new("A"), "op")
            .await
            .unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(first.session, token);

        let snapshot = sessions.snapshot(token).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.numbers[0].status, NumberStatus::Assigned);

        sessions
            .assign_one(token, 2, DocumentDraft::new("B"), "op")
            .await
            .unwrap();
        let snapshot = sessions.snapshot(token).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Draining);
        assert!(snapshot.drained_at_ms.is_some());
    }

    #[tokio::test]
    async fn test_assign_unknown_number() {
        let (sessions, _) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &Actor::user("op"), None)
            .await
            .unwrap()
            .token;

        let err = sessions
            .assign_one(token, 7, DocumentDraft::new("A"), "op")
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::UnknownNumber { number: 7, .. }));
    }

    #[tokio::test]
    async fn test_number_of_another_session_is_unknown() {
        let (sessions, _) = manager();
        let op = Actor::user("op");
        let mine = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &op, None)
            .await
            .unwrap();
        let theirs = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &op, None)
            .await
            .unwrap();

        let err = sessions
            .assign_one(mine.token, theirs.unassigned()[0], DocumentDraft::new("A"), "op")
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::UnknownNumber { .. }));
    }

    #[tokio::test]
    async fn test_assign_unknown_session() {
        let (sessions, _) = manager();
        let token = SessionToken::new();
        let err = sessions
            .assign_one(token, 1, DocumentDraft::new("A"), "op")
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::UnknownSession(t) if t == token));
    }

    #[tokio::test]
    async fn test_retry_after_assignment_is_idempotent() {
        let (sessions, _) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(2), &Actor::user("op"), None)
            .await
            .unwrap()
            .token;

        let first = sessions
            .assign_one(token, 1, DocumentDraft::new("A").with_note("n"), "op")
            .await
            .unwrap();
        let retry = sessions
            .assign_one(token, 1, DocumentDraft::new("A").with_note("n"), "op")
            .await
            .unwrap();
        assert_eq!(first, retry);
        assert_eq!(sessions.allocator().ledger().len(), 1);

        let err = sessions
            .assign_one(token, 1, DocumentDraft::new("Changed"), "op")
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::AlreadyAssigned { number: 1, .. }));
    }

    #[tokio::test]
    async fn test_retry_accepted_while_draining() {
        let (sessions, clock) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &Actor::user("op"), None)
            .await
            .unwrap()
            .token;

        let first = sessions
            .assign_one(token, 1, DocumentDraft::new("A"), "op")
            .await
            .unwrap();
        clock.advance(std::time::Duration::from_secs(10));
        let retry = sessions
            .assign_one(token, 1, DocumentDraft::new("A"), "op")
            .await
            .unwrap();
        assert_eq!(first.id, retry.id);
    }

    #[tokio::test]
    async fn test_assign_next_takes_lowest_unassigned() {
        let (sessions, _) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(3), &Actor::user("op"), None)
            .await
            .unwrap()
            .token;

        sessions
            .assign_one(token, 2, DocumentDraft::new("Middle"), "op")
            .await
            .unwrap();
        let a = sessions
            .assign_next(token, DocumentDraft::new("A"), "op")
            .await
            .unwrap();
        let b = sessions
            .assign_next(token, DocumentDraft::new("B"), "op")
            .await
            .unwrap();
        assert_eq!((a.number, b.number), (1, 3));

        let err = sessions
            .assign_next(token, DocumentDraft::new("C"), "op")
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::SessionClosed(_)));
    }

    #[tokio::test]
    async fn test_duplicate_document_keeps_number_reserved() {
        let (sessions, _) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(2), &Actor::user("op"), None)
            .await
            .unwrap()
            .token;

        sessions
            .assign_one(token, 1, DocumentDraft::new("Same"), "op")
            .await
            .unwrap();
        let err = sessions
            .assign_one(token, 2, DocumentDraft::new("SAME"), "op")
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::DuplicateDocument { .. }));

        let snapshot = sessions.snapshot(token).await.unwrap();
        assert_eq!(snapshot.unassigned(), vec![2]);
        assert!(
            sessions
                .assign_one(token, 2, DocumentDraft::new("Other"), "op")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_journal_failure_drops_number_from_session() {
        let (journal, failing) = FlakyJournal::new();
        let (sessions, _) = manager_over(journal, &EngineConfig::default());
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(2), &Actor::user("op"), None)
            .await
            .unwrap()
            .token;

        failing.store(true, Ordering::SeqCst);
        let err = sessions
            .assign_one(token, 1, DocumentDraft::new("A"), "op")
            .await
            .unwrap_err();
        assert!(err.is_transient());
        failing.store(false, Ordering::SeqCst);

        let snapshot = sessions.snapshot(token).await.unwrap();
        assert_eq!(snapshot.unassigned(), vec![2]);
        let sequence = sessions.allocator().snapshot(EQUIPMENT).await.unwrap();
        assert_eq!(sequence.used, vec![2]);
    }

    #[tokio::test]
    async fn test_admin_specific_and_golden_kinds() {
        let (sessions, _) = manager();
        let admin = Actor::admin("root");

        let specific = sessions
            .reserve(EQUIPMENT, NumberRequest::Specific(vec![50]), &admin, None)
            .await
            .unwrap();
        assert_eq!(specific.kind, ReservationKind::AdminSpecific);

        let golden = sessions
            .reserve(
                EQUIPMENT,
                NumberRequest::Golden {
                    count: 2,
                    filter: crate::numbering::GoldenCriteria::ROUND_HUNDRED.into(),
                },
                &admin,
                None,
            )
            .await
            .unwrap();
        assert_eq!(golden.kind, ReservationKind::Golden);
        assert_eq!(golden.unassigned(), vec![100, 200]);

        let regular = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &Actor::user("op"), None)
            .await
            .unwrap();
        assert_eq!(regular.unassigned(), vec![1]);
    }
}
