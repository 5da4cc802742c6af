/// Owner-scoped bookkeeping: subscription queries and removal.
use super::core::EventBus;
use crate::types::Direction;
use tracing::debug;

impl EventBus {
    /// Removes every handler registered on behalf of `owner`; returns how
    /// many were dropped. Called by the plugin runtime on unload.
    pub async fn remove_handlers_for(&self, owner: &str) -> usize {
        let mut removed = 0;
        let mut empty_keys = Vec::new();

        for mut entry in self.handlers.iter_mut() {
            let before = entry.value().len();
            entry
                .value_mut()
                .retain(|handler| handler.owner.as_deref() != Some(owner));
            removed += before - entry.value().len();
            if entry.value().is_empty() {
                empty_keys.push(entry.key().clone());
            }
        }
        for key in empty_keys {
            // Another registration may have raced the cleanup; only drop
            // keys that are still empty.
            self.handlers.remove_if(&key, |_, handlers| handlers.is_empty());
        }

        if removed > 0 {
            let mut stats = self.stats.write().await;
            stats.total_handlers = stats.total_handlers.saturating_sub(removed as u64);
            debug!("Removed {} handlers owned by {}", removed, owner);
        }
        removed
    }

    /// Removes `owner`'s handlers for one packet subscription.
    pub async fn remove_packet_handlers_for(
        &self,
        owner: &str,
        direction: Direction,
        name: &str,
    ) -> usize {
        self.remove_handlers_for_key(owner, &Self::packet_key(direction, name))
            .await
    }

    /// Removes `owner`'s handlers for one lifecycle-event subscription.
    pub async fn remove_core_handlers_for(&self, owner: &str, event_name: &str) -> usize {
        self.remove_handlers_for_key(owner, &Self::core_key(event_name))
            .await
    }

    /// Removes `owner`'s handlers for a single event key; returns how many
    /// were dropped.
    async fn remove_handlers_for_key(&self, owner: &str, key: &str) -> usize {
        let mut removed = 0;
        if let Some(mut entry) = self.handlers.get_mut(key) {
            let before = entry.value().len();
            entry
                .value_mut()
                .retain(|handler| handler.owner.as_deref() != Some(owner));
            removed = before - entry.value().len();
        }
        if removed > 0 {
            self.handlers.remove_if(key, |_, handlers| handlers.is_empty());
            let mut stats = self.stats.write().await;
            stats.total_handlers = stats.total_handlers.saturating_sub(removed as u64);
            debug!("Removed {} handlers owned by {} for {}", removed, owner, key);
        }
        removed
    }

    /// The event keys `owner` currently subscribes to.
    pub async fn subscription_keys_for(&self, owner: &str) -> Vec<String> {
        let mut keys = Vec::new();
        for entry in self.handlers.iter() {
            if entry
                .value()
                .iter()
                .any(|handler| handler.owner.as_deref() == Some(owner))
            {
                keys.push(entry.key().clone());
            }
        }
        keys.sort();
        keys
    }
}
