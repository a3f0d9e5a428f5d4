use std::sync::Arc;

use helpdesk_core::domain::feedback::FeedbackRecord;
use helpdesk_core::errors::DomainError;

use super::{FeedbackRepository, RepositoryError, SubmissionReceipt};
use crate::store::JsonStore;

pub struct JsonFeedbackRepository {
    store: Arc<JsonStore>,
}

impl JsonFeedbackRepository {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl FeedbackRepository for JsonFeedbackRepository {
    async fn record_submission(
        &self,
        record: FeedbackRecord,
    ) -> Result<SubmissionReceipt, RepositoryError> {
        self.store
            .try_mutate(|document| {
                if document.allowances.remaining(&record.user_id) == 0 {
                    return Err(RepositoryError::Domain(DomainError::NoAllowance));
                }
                let remaining = document.allowances.decrement(&record.user_id);
                let record_id = record.id.clone();
                document.feedback.push(record);
                Ok(SubmissionReceipt { record_id, remaining })
            })
            .await
    }

    async fn attach_log_message(
        &self,
        record_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<bool, RepositoryError> {
        let attached = self
            .store
            .mutate(|document| {
                match document.feedback.iter_mut().find(|record| record.id == record_id) {
                    Some(record) => {
                        record.channel_id = Some(channel_id.to_owned());
                        record.message_id = Some(message_id.to_owned());
                        true
                    }
                    None => false,
                }
            })
            .await?;
        Ok(attached)
    }

    async fn remove_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<FeedbackRecord>, RepositoryError> {
        let removed = self
            .store
            .mutate(|document| {
                let index =
                    document.feedback.iter().position(|record| record.is_linked_to(message_id))?;
                Some(document.feedback.remove(index))
            })
            .await?;
        Ok(removed)
    }

    async fn list_newest_first(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError> {
        let records = self
            .store
            .read(|document| {
                let mut records = document.feedback.clone();
                // stable sort keeps later-appended entries first on equal timestamps
                records.reverse();
                records.sort_by(|left, right| right.created_at.cmp(&left.created_at));
                records
            })
            .await;

        Ok(match limit {
            Some(limit) => records.into_iter().take(limit).collect(),
            None => records,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use helpdesk_core::domain::feedback::{FeedbackDraft, FeedbackRecord};
    use helpdesk_core::errors::DomainError;

    use crate::repositories::{
        AllowanceRepository, FeedbackRepository, JsonAllowanceRepository, JsonFeedbackRepository,
        RepositoryError,
    };
    use crate::store::JsonStore;

    fn fixture() -> (TempDir, Arc<JsonStore>) {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(JsonStore::new(dir.path().join("store.json")));
        (dir, store)
    }

    async fn seed(store: &JsonStore, record: FeedbackRecord) {
        store.mutate(|document| document.feedback.push(record)).await.expect("seed record");
    }

    fn record(user_id: &str, rating: &str, offset_secs: i64) -> FeedbackRecord {
        let draft = FeedbackDraft::from_form(rating, Some("ok")).expect("valid draft");
        FeedbackRecord::new(
            user_id,
            format!("user-{user_id}"),
            draft,
            None,
            Utc::now() + Duration::seconds(offset_secs),
        )
    }

    #[tokio::test]
    async fn submission_without_allowance_writes_nothing() {
        let (_dir, store) = fixture();
        let repo = JsonFeedbackRepository::new(store.clone());

        let error = repo.record_submission(record("7", "4", 0)).await.expect_err("no quota");
        assert!(matches!(error, RepositoryError::Domain(DomainError::NoAllowance)));
        assert!(store.load().await.feedback.is_empty());
    }

    #[tokio::test]
    async fn granted_quota_is_consumed_one_per_submission() {
        let (_dir, store) = fixture();
        let feedback = JsonFeedbackRepository::new(store.clone());
        let allowances = JsonAllowanceRepository::new(store.clone());
        allowances.grant("7", 2).await.expect("grant");

        let first = feedback.record_submission(record("7", "5", 0)).await.expect("first");
        let second = feedback.record_submission(record("7", "3", 1)).await.expect("second");
        let third = feedback.record_submission(record("7", "1", 2)).await;

        assert_eq!(first.remaining, 1);
        assert_eq!(second.remaining, 0);
        assert!(matches!(third, Err(RepositoryError::Domain(DomainError::NoAllowance))));
        assert_eq!(store.load().await.feedback.len(), 2);
        assert_eq!(allowances.remaining("7").await.expect("remaining"), 0);
    }

    #[tokio::test]
    async fn concurrent_submissions_never_exceed_quota() {
        let (_dir, store) = fixture();
        let repo = Arc::new(JsonFeedbackRepository::new(store.clone()));
        JsonAllowanceRepository::new(store.clone()).grant("7", 3).await.expect("grant");

        let mut handles = Vec::new();
        for offset in 0..10 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.record_submission(record("7", "4", offset)).await.is_ok()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.expect("join") {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 3);
        assert_eq!(store.load().await.feedback.len(), 3);
    }

    #[tokio::test]
    async fn deleting_log_message_removes_only_linked_record() {
        let (_dir, store) = fixture();
        let repo = JsonFeedbackRepository::new(store.clone());

        let linked = record("1", "5", 0);
        let other = record("2", "2", 1);
        let linked_id = linked.id.clone();
        let other_id = other.id.clone();
        seed(&store, linked).await;
        seed(&store, other).await;
        assert!(repo.attach_log_message(&linked_id, "log", "m-1").await.expect("attach"));
        assert!(repo.attach_log_message(&other_id, "log", "m-2").await.expect("attach"));

        let removed = repo.remove_by_message_id("m-1").await.expect("remove");
        assert_eq!(removed.map(|record| record.id), Some(linked_id));

        let remaining = store.load().await.feedback;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, other_id);

        assert!(repo.remove_by_message_id("unknown").await.expect("remove").is_none());
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_limited() {
        let (_dir, store) = fixture();
        let repo = JsonFeedbackRepository::new(store.clone());
        seed(&store, record("1", "1", 0)).await;
        seed(&store, record("2", "2", 20)).await;
        seed(&store, record("3", "3", 10)).await;

        let all = repo.list_newest_first(None).await.expect("list");
        let users: Vec<_> = all.iter().map(|record| record.user_id.as_str()).collect();
        assert_eq!(users, vec!["2", "3", "1"]);

        let limited = repo.list_newest_first(Some(1)).await.expect("list");
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].user_id, "2");
    }
}
