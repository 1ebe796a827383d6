use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use ledgerscan_llm::{ChatGateway, ChatMessage};
use parking_lot::Mutex;

use crate::cache::ResponseCache;
use crate::store::MemoryStore;

/// Replays canned replies in order and records every request.
#[derive(Default)]
pub(crate) struct ScriptedGateway {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGateway {
    pub(crate) fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let gateway = Self::default();
        for reply in replies {
            gateway.replies.lock().push_back(Ok(reply.into()));
        }
        gateway
    }

    pub(crate) fn push_failure(&self, message: &str) {
        self.replies.lock().push_back(Err(message.to_string()));
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub(crate) fn request(&self, idx: usize) -> Vec<ChatMessage> {
        self.requests.lock()[idx].clone()
    }
}

impl ChatGateway for ScriptedGateway {
    fn complete(&self, messages: &[ChatMessage], _max_tokens: u32) -> anyhow::Result<String> {
        self.requests.lock().push(messages.to_vec());
        match self.replies.lock().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

pub(crate) fn memory_cache() -> (Arc<MemoryStore>, ResponseCache) {
    let store = Arc::new(MemoryStore::new());
    let cache = ResponseCache::new(Box::new(store.clone()), Duration::ZERO);
    (store, cache)
}
