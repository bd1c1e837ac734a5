use super::Tracker;
use crate::error::TrackerResult;
use crate::queries::_structs::{Message, UserId};
use tracing::info;

impl Tracker {
    /// The latest `message_history_limit` messages exchanged with `other`,
    /// oldest first.
    pub async fn fetch_messages(&self, user_id: UserId, other: UserId) -> TrackerResult<Vec<Message>> {
        self.user(other).await?;
        self.store
            .conversation(user_id, other, self.config.tracking.message_history_limit)
            .await
    }

    pub async fn clear_chat(&self, user_id: UserId, other: UserId) -> TrackerResult<u64> {
        self.user(other).await?;
        let deleted = self.store.delete_conversation(user_id, other).await?;
        info!("User {} cleared {} messages with {}", user_id, deleted, other);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::TrackerError;
    use crate::queries::_structs::NewMessage;
    use crate::store::memory::tests::sample_seed;
    use crate::store::{MemoryStore, TrackerStore};
    use crate::tracker::Tracker;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_history_is_capped_and_clearable() {
        let mut config = Config::default();
        config.tracking.message_history_limit = 3;
        let store = Arc::new(MemoryStore::from_seed(sample_seed()));
        let t0 = Utc::now();
        for i in 0..5 {
            store
                .insert_message(NewMessage {
                    sender_id: if i % 2 == 0 { 1 } else { 2 },
                    recipient_id: if i % 2 == 0 { 2 } else { 1 },
                    bus_id: None,
                    content: format!("m{}", i),
                    created_at: t0 + Duration::seconds(i),
                })
                .await
                .unwrap();
        }
        let tracker = Tracker::new(store, config);

        let history = tracker.fetch_messages(1, 2).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);

        assert_eq!(tracker.clear_chat(2, 1).await.unwrap(), 5);
        assert!(tracker.fetch_messages(1, 2).await.unwrap().is_empty());
        assert!(matches!(tracker.fetch_messages(1, 99).await, Err(TrackerError::NotFound(_))));
    }
}
