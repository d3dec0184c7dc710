/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Tests for session expiry, draining and closing.

#[cfg(test)]
mod tests {
    use crate::clock::Clock;
    use crate::error::ReservationError;
    use crate::ledger::DocumentDraft;
    use crate::session::tests::support::manager;
    use crate::session::{NumberRequest, ReservationKind, SessionState};
    use crate::types::{Actor, EquipmentId};
    use std::time::Duration;

    const EQUIPMENT: EquipmentId = EquipmentId(42);
    const TTL: Duration = Duration::from_secs(1800);

    fn op() -> Actor {
        Actor::user("op")
    }

    #[tokio::test]
    async fn test_open_requires_numbers() {
        let (sessions, _) = manager();
        let err = sessions
            .open(EQUIPMENT, &[], ReservationKind::Sequential, "op", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_ttl_override_is_clamped() {
        let (sessions, _) = manager();

        let short = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &op(), Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(short.ttl_ms, 1_000);

        let long = sessions
            .reserve(
                EQUIPMENT,
                NumberRequest::Sequential(1),
                &op(),
                Some(Duration::from_secs(10 * 86_400)),
            )
            .await
            .unwrap();
        assert_eq!(long.ttl_ms, 86_400_000);
    }

    #[tokio::test]
    async fn test_expired_session_closed_on_access() {
        let (sessions, clock) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(3), &op(), None)
            .await
            .unwrap()
            .token;

        clock.advance(TTL + Duration::from_millis(1));
        let err = sessions
            .assign_one(token, 1, DocumentDraft::new("A"), "op")
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::UnknownSession(_)));
        assert!(sessions.is_empty());

        let sequence = sessions.allocator().snapshot(EQUIPMENT).await.unwrap();
        assert!(sequence.used.is_empty());
    }

    #[tokio::test]
    async fn test_exact_ttl_boundary_is_still_live() {
        let (sessions, clock) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &op(), None)
            .await
            .unwrap()
            .token;

        clock.advance(TTL);
        assert!(
            sessions
                .assign_one(token, 1, DocumentDraft::new("A"), "op")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_touch_extends_lifetime() {
        let (sessions, clock) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &op(), None)
            .await
            .unwrap()
            .token;

        clock.advance(Duration::from_secs(1_700));
        let touched = sessions.touch(token).await.unwrap();
        assert_eq!(touched.expires_at_ms(), clock.now_ms() + 1_800_000);

        clock.advance(Duration::from_secs(1_700));
        assert!(
            sessions
                .assign_one(token, 1, DocumentDraft::new("A"), "op")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_add_numbers_only_while_active() {
        let (sessions, _) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &op(), None)
            .await
            .unwrap()
            .token;

        let added = sessions
            .add_numbers(token, NumberRequest::Sequential(2), &op())
            .await
            .unwrap();
        assert_eq!(added, vec![2, 3]);

        for number in 1..=3 {
            sessions
                .assign_one(token, number, DocumentDraft::new(format!("Doc {number}")), "op")
                .await
                .unwrap();
        }
        let err = sessions
            .add_numbers(token, NumberRequest::Sequential(1), &op())
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::SessionClosed(_)));
    }

    #[tokio::test]
    async fn test_add_numbers_to_expired_session() {
        let (sessions, clock) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &op(), None)
            .await
            .unwrap()
            .token;

        clock.advance(TTL * 2);
        let err = sessions
            .add_numbers(token, NumberRequest::Sequential(1), &op())
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::SessionClosed(_)));
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_release_number_frees_it() {
        let (sessions, _) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(2), &op(), None)
            .await
            .unwrap()
            .token;

        sessions.release_number(token, 2).await.unwrap();
        let snapshot = sessions.snapshot(token).await.unwrap();
        assert_eq!(snapshot.unassigned(), vec![1]);

        let sequence = sessions.allocator().snapshot(EQUIPMENT).await.unwrap();
        assert_eq!(sequence.used, vec![1]);

        // Releasing the last number closes the session.
        sessions.release_number(token, 1).await.unwrap();
        assert!(matches!(
            sessions.snapshot(token).await,
            Err(ReservationError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn test_release_assigned_number_rejected() {
        let (sessions, _) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(2), &op(), None)
            .await
            .unwrap()
            .token;
        sessions
            .assign_one(token, 1, DocumentDraft::new("A"), "op")
            .await
            .unwrap();

        assert!(matches!(
            sessions.release_number(token, 1).await,
            Err(ReservationError::AlreadyAssigned { .. })
        ));
        assert!(matches!(
            sessions.release_number(token, 9).await,
            Err(ReservationError::UnknownNumber { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_releases_unassigned() {
        let (sessions, _) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(3), &op(), None)
            .await
            .unwrap()
            .token;
        sessions
            .assign_one(token, 2, DocumentDraft::new("Kept"), "op")
            .await
            .unwrap();

        let released = sessions.cancel(token).await.unwrap();
        assert_eq!(released, vec![1, 3]);
        assert!(matches!(
            sessions.cancel(token).await,
            Err(ReservationError::UnknownSession(_))
        ));

        let sequence = sessions.allocator().snapshot(EQUIPMENT).await.unwrap();
        assert_eq!(sequence.used, vec![2]);
        assert_eq!(sequence.assigned, vec![2]);
    }

    #[tokio::test]
    async fn test_close_if_expired() {
        let (sessions, clock) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(2), &op(), None)
            .await
            .unwrap()
            .token;

        assert_eq!(
            sessions.close_if_expired(token, clock.now_ms()).await.unwrap(),
            None
        );

        let later = clock.now_ms() + 1_800_001;
        assert_eq!(
            sessions.close_if_expired(token, later).await.unwrap(),
            Some(vec![1, 2])
        );
        assert_eq!(sessions.close_if_expired(token, later).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drained_session_closes_after_grace() {
        let (sessions, clock) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &op(), None)
            .await
            .unwrap()
            .token;
        sessions
            .assign_one(token, 1, DocumentDraft::new("A"), "op")
            .await
            .unwrap();

        let within_grace = clock.now_ms() + 30_000;
        assert_eq!(
            sessions.close_if_expired(token, within_grace).await.unwrap(),
            None
        );
        assert_eq!(
            sessions
                .close_if_expired(token, within_grace + 1)
                .await
                .unwrap(),
            Some(vec![])
        );
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_tokens_for_equipment() {
        let (sessions, _) = manager();
        let a = sessions
            .reserve(EquipmentId(1), NumberRequest::Sequential(1), &op(), None)
            .await
            .unwrap()
            .token;
        sessions
            .reserve(EquipmentId(2), NumberRequest::Sequential(1), &op(), None)
            .await
            .unwrap();

        assert_eq!(sessions.tokens().len(), 2);
        assert_eq!(sessions.tokens_for(EquipmentId(1)), vec![a]);
        let snapshot = sessions.snapshot(a).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Active);
    }

    #[tokio::test]
    async fn test_open_claims_unheld_numbers_only() {
        let (sessions, _) = manager();
        let held = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(1), &op(), None)
            .await
            .unwrap();
        sessions
            .allocator()
            .allocate_specific(EQUIPMENT, vec![5, 6])
            .await
            .unwrap();

        let opened = sessions
            .open(EQUIPMENT, &[5, 6], ReservationKind::AdminSpecific, "root", None)
            .await
            .unwrap();
        for numbers in [vec![5], vec![1], vec![99]] {
            let err = sessions
                .open(EQUIPMENT, &numbers, ReservationKind::AdminSpecific, "root", None)
                .await
                .unwrap_err();
            assert!(matches!(err, ReservationError::UnknownNumber { .. }));
        }
        assert_eq!(sessions.len(), 2);

        assert_eq!(sessions.cancel(opened.token).await.unwrap(), vec![5, 6]);
        assert_eq!(sessions.snapshot(held.token).await.unwrap().unassigned(), vec![1]);
    }

    #[tokio::test]
    async fn test_release_numbers_withdraws_from_session() {
        let (sessions, _) = manager();
        let first = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(2), &op(), None)
            .await
            .unwrap()
            .token;

        assert_eq!(
            sessions.release_numbers(EQUIPMENT, vec![1, 50]).await.unwrap(),
            vec![1]
        );
        assert_eq!(sessions.snapshot(first).await.unwrap().unassigned(), vec![2]);

        let second = sessions
            .reserve(
                EQUIPMENT,
                NumberRequest::Specific(vec![1]),
                &Actor::admin("root"),
                None,
            )
            .await
            .unwrap()
            .token;
        let err = sessions
            .assign_one(first, 1, DocumentDraft::new("Stale"), "op")
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::UnknownNumber { number: 1, .. }));
        sessions
            .assign_one(second, 1, DocumentDraft::new("Fresh"), "root")
            .await
            .unwrap();

        // Withdrawing the last number closes the session.
        assert_eq!(
            sessions.release_numbers(EQUIPMENT, vec![2]).await.unwrap(),
            vec![2]
        );
        assert!(matches!(
            sessions.snapshot(first).await,
            Err(ReservationError::UnknownSession(_))
        ));
        assert_eq!(sessions.tokens_for(EQUIPMENT), vec![second]);
    }

    #[tokio::test]
    async fn test_release_numbers_skips_assigned() {
        let (sessions, _) = manager();
        let token = sessions
            .reserve(EQUIPMENT, NumberRequest::Sequential(2), &op(), None)
            .await
            .unwrap()
            .token;
        sessions
            .assign_one(token, 1, DocumentDraft::new("Kept"), "op")
            .await
            .unwrap();

        assert_eq!(
            sessions.release_numbers(EQUIPMENT, vec![1, 2]).await.unwrap(),
            vec![2]
        );
        let snapshot = sessions.snapshot(token).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Draining);
        assert!(snapshot.unassigned().is_empty());

        let sequence = sessions.allocator().snapshot(EQUIPMENT).await.unwrap();
        assert_eq!(sequence.used, vec![1]);
    }
}
