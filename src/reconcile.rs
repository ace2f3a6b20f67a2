//! Client-side reconciliation of persisted history with live-pushed events.
//!
//! A client sees the same message from two paths: the history fetch on
//! (re)connect and the live push. The merge is keyed on message id, so the
//! later arrival of a duplicate never creates a second visible entry, and
//! every read re-sorts by `created_at` (persistence order) with id as the
//! tie-break — delivery completion order is irrelevant to rendering.

use std::collections::HashMap;
use uuid::Uuid;

use crate::models::Message;
use crate::websocket::WsEvent;

#[derive(Default, Clone)]
pub struct ConversationView {
    by_id: HashMap<Uuid, Message>,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a history fetch. Existing entries win on content; status only
    /// moves forward, whichever path reported it first.
    pub fn merge_history(&mut self, history: Vec<Message>) {
        for message in history {
            self.upsert(message);
        }
    }

    /// Applies one live event. Unknown-message status events are dropped;
    /// the next history fetch reconciles them.
    pub fn apply_event(&mut self, event: &WsEvent) {
        match event {
            WsEvent::MessageNew { message } => self.upsert(message.clone()),
            WsEvent::MessageStatus {
                message_id,
                delivery_status,
                read_at,
            } => {
                if let Some(existing) = self.by_id.get_mut(message_id) {
                    if delivery_status.rank() > existing.delivery_status.rank() {
                        existing.delivery_status = *delivery_status;
                    }
                    if existing.read_at.is_none() {
                        existing.read_at = *read_at;
                    }
                }
            }
            _ => {}
        }
    }

    fn upsert(&mut self, message: Message) {
        match self.by_id.get_mut(&message.id) {
            None => {
                self.by_id.insert(message.id, message);
            }
            Some(existing) => {
                // duplicate id: keep the first arrival, advance status only
                if message.delivery_status.rank() > existing.delivery_status.rank() {
                    existing.delivery_status = message.delivery_status;
                }
                if existing.read_at.is_none() {
                    existing.read_at = message.read_at;
                }
                existing.is_read = existing.is_read || message.is_read;
                if message.is_deleted {
                    existing.is_deleted = true;
                    existing.deleted_at = message.deleted_at;
                }
            }
        }
    }

    /// The render order: `created_at` ascending, id as the tie-break,
    /// soft-deleted messages hidden.
    pub fn messages(&self) -> Vec<Message> {
        let mut out: Vec<Message> = self
            .by_id
            .values()
            .filter(|m| !m.is_deleted)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryStatus, NewMessage};
    use chrono::{Duration, Utc};

    fn message(content: &str) -> Message {
        let new = NewMessage::text(Uuid::new_v4(), Uuid::new_v4(), None, content);
        Message {
            id: Uuid::new_v4(),
            sender_id: new.sender_id,
            recipient_id: new.recipient_id,
            job_id: None,
            content: new.content,
            message_type: new.message_type,
            attachment: None,
            delivery_status: DeliveryStatus::Sent,
            retry_count: 0,
            is_read: false,
            read_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at: Utc::now(),
            edited_at: None,
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let mut view = ConversationView::new();
        let history = vec![message("one"), message("two"), message("three")];

        view.merge_history(history.clone());
        let first = view.messages();
        view.merge_history(history);
        let second = view.messages();

        assert_eq!(first.len(), 3);
        let ids: Vec<Uuid> = first.iter().map(|m| m.id).collect();
        assert_eq!(ids, second.iter().map(|m| m.id).collect::<Vec<_>>());
    }

    #[test]
    fn live_push_then_history_refetch_does_not_duplicate() {
        let mut view = ConversationView::new();
        let msg = message("hello");

        view.apply_event(&WsEvent::MessageNew {
            message: msg.clone(),
        });
        view.merge_history(vec![msg]);

        assert_eq!(view.messages().len(), 1);
    }

    #[test]
    fn render_order_follows_created_at_not_arrival_order() {
        let mut view = ConversationView::new();
        let mut early = message("persisted first");
        let mut late = message("persisted second");
        early.created_at = Utc::now() - Duration::seconds(10);
        late.created_at = Utc::now();

        // the earlier message's push retries completed later
        view.apply_event(&WsEvent::MessageNew {
            message: late.clone(),
        });
        view.apply_event(&WsEvent::MessageNew {
            message: early.clone(),
        });

        let rendered = view.messages();
        assert_eq!(rendered[0].id, early.id);
        assert_eq!(rendered[1].id, late.id);
    }

    #[test]
    fn identical_timestamps_break_ties_by_id() {
        let mut view = ConversationView::new();
        let now = Utc::now();
        let mut m1 = message("a");
        let mut m2 = message("b");
        m1.created_at = now;
        m2.created_at = now;

        view.merge_history(vec![m2.clone(), m1.clone()]);
        let rendered = view.messages();
        let mut expected = vec![m1.id, m2.id];
        expected.sort();
        assert_eq!(rendered.iter().map(|m| m.id).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn status_events_advance_but_never_regress() {
        let mut view = ConversationView::new();
        let msg = message("status");
        view.merge_history(vec![msg.clone()]);

        view.apply_event(&WsEvent::MessageStatus {
            message_id: msg.id,
            delivery_status: DeliveryStatus::Read,
            read_at: Some(Utc::now()),
        });
        assert_eq!(view.messages()[0].delivery_status, DeliveryStatus::Read);

        // a stale `delivered` event arriving out of order is ignored
        view.apply_event(&WsEvent::MessageStatus {
            message_id: msg.id,
            delivery_status: DeliveryStatus::Delivered,
            read_at: None,
        });
        assert_eq!(view.messages()[0].delivery_status, DeliveryStatus::Read);
        assert!(view.messages()[0].read_at.is_some());
    }

    #[test]
    fn deleted_messages_are_hidden_but_keep_their_id_slot() {
        let mut view = ConversationView::new();
        let mut msg = message("gone");
        view.merge_history(vec![msg.clone()]);

        msg.is_deleted = true;
        msg.deleted_at = Some(Utc::now());
        view.merge_history(vec![msg.clone()]);

        assert!(view.messages().is_empty());
        // the id is still occupied: a duplicate cannot resurrect the entry
        assert_eq!(view.len(), 1);
    }
}
