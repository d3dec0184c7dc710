use docnum_rs::ledger::FileJournal;
use docnum_rs::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    fn open(path: &std::path::Path, clock: &ManualClock) -> NumberingEngine<FileJournal> {
        NumberingEngine::open_file(EngineConfig::default(), path, Arc::new(clock.clone()))
            .expect("journal opens")
    }

    #[tokio::test]
    async fn test_assignments_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.journal");
        let clock = ManualClock::new(10_000);
        let user = Actor::user("designer");
        let equipment = EquipmentId(42);

        let token = {
            let engine = open(&path, &clock);
            let session = engine.reserve(&user, equipment, 3, None).await.unwrap();
            engine
                .assign(&user, session.token, 1, DocumentDraft::new("Layout"))
                .await
                .unwrap();
            engine
                .assign(&user, session.token, 3, DocumentDraft::new("Schedule"))
                .await
                .unwrap();
            session.token
        };

        let engine = open(&path, &clock);
        let documents = engine.query(&LedgerQuery::new().equipment(equipment));
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].number, 1);
        assert_eq!(documents[1].doc_name, "Schedule");

        // Sessions are not persisted; the sequence resumes past the high-water mark.
        assert!(matches!(
            engine.session(token).await,
            Err(ReservationError::UnknownSession(_))
        ));
        let sequence = engine.sequence(equipment).await.unwrap();
        assert_eq!(sequence.next_candidate, 4);
        assert_eq!(sequence.assigned, vec![1, 3]);

        let next = engine.reserve(&user, equipment, 1, None).await.unwrap();
        assert_eq!(next.unassigned(), vec![4]);
    }

    #[tokio::test]
    async fn test_amendments_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.journal");
        let clock = ManualClock::new(0);
        let user = Actor::user("designer");
        let admin = Actor::admin("chief");

        let id = {
            let engine = open(&path, &clock);
            let session = engine.reserve(&user, EquipmentId(1), 1, None).await.unwrap();
            let doc = engine
                .assign_next(&user, session.token, DocumentDraft::new("Draft"))
                .await
                .unwrap();
            clock.advance(Duration::from_secs(5));
            engine
                .update_document(
                    &admin,
                    doc.id,
                    DocumentUpdate {
                        doc_name: Some("Issued".to_string()),
                        ..DocumentUpdate::default()
                    },
                )
                .await
                .unwrap();
            doc.id
        };

        let engine = open(&path, &clock);
        let doc = engine.document(id).expect("document replayed");
        assert_eq!(doc.doc_name, "Issued");
        let history = engine.history(id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].at_ms, 5_000);
    }
}
