use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Deterministic address for a conversation: the participant pair ordered
/// (min, max) plus the optional job context. Two users can have a general
/// thread and separate per-job threads at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub job_id: Option<Uuid>,
}

impl ConversationKey {
    pub fn new(x: Uuid, y: Uuid, job_id: Option<Uuid>) -> Self {
        let (user_a, user_b) = if x <= y { (x, y) } else { (y, x) };
        Self {
            user_a,
            user_b,
            job_id,
        }
    }

    /// Re-orders the pair; applied to keys received from the wire, where the
    /// client is not trusted to have ordered them.
    pub fn normalized(self) -> Self {
        Self::new(self.user_a, self.user_b, self.job_id)
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The other participant, if `user_id` is part of this conversation.
    pub fn peer_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user_a == user_id {
            Some(self.user_b)
        } else if self.user_b == user_id {
            Some(self.user_a)
        } else {
            None
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.job_id {
            Some(job) => write!(f, "conv:{}:{}:{}", self.user_a, self.user_b, job),
            None => write!(f, "conv:{}:{}", self.user_a, self.user_b),
        }
    }
}
