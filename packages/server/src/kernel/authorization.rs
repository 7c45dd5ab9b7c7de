use std::collections::HashSet;

use crate::common::ChatId;
use crate::kernel::BaseAuthorizationGate;

/// Admits only the configured chats.
#[derive(Debug, Clone, Default)]
pub struct AllowlistGate {
    allowed: HashSet<ChatId>,
}

impl AllowlistGate {
    pub fn new(allowed: impl IntoIterator<Item = ChatId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl BaseAuthorizationGate for AllowlistGate {
    fn is_authorized(&self, chat_id: ChatId) -> bool {
        self.allowed.contains(&chat_id)
    }
}
