#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use ledgerscan_core::{
    FsStore, KvStore, Ledger, LedgerSettings, NarrativeSource, ResponseCache, UploadedDocument,
};
use ledgerscan_llm::{ChatGateway, ChatMessage};
use parking_lot::Mutex;

/// Answers from a queue; an `Err` entry simulates an upstream failure.
#[derive(Default)]
pub struct FakeGateway {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: Mutex<usize>,
}

impl FakeGateway {
    pub fn new(replies: Vec<std::result::Result<&str, &str>>) -> Arc<Self> {
        let gateway = Self::default();
        gateway.replies.lock().extend(
            replies
                .into_iter()
                .map(|r| r.map(str::to_string).map_err(str::to_string)),
        );
        Arc::new(gateway)
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl ChatGateway for FakeGateway {
    fn complete(&self, _messages: &[ChatMessage], _max_tokens: u32) -> Result<String> {
        *self.calls.lock() += 1;
        match self.replies.lock().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("fake gateway exhausted")),
        }
    }
}

pub fn ledger(gateway: &Arc<FakeGateway>, store: impl KvStore + 'static) -> Ledger {
    ledger_with_narrative(gateway, store, NarrativeSource::Template)
}

pub fn ledger_with_narrative(
    gateway: &Arc<FakeGateway>,
    store: impl KvStore + 'static,
    narrative: NarrativeSource,
) -> Ledger {
    let settings = LedgerSettings {
        narrative,
        ..LedgerSettings::default()
    };
    Ledger::new(
        Box::new(gateway.clone()),
        ResponseCache::new(Box::new(store), Duration::ZERO),
        settings,
    )
}

pub fn fs_store(root: &std::path::Path) -> FsStore {
    FsStore::open(root).expect("open store")
}

pub fn png(name: &str, bytes: &[u8]) -> UploadedDocument {
    UploadedDocument::new(name, "image/png", bytes.to_vec())
}

pub fn reply(kind: &str, total: f64) -> String {
    format!(r#"{{"transaction_type": "{kind}", "party_name": "مورد", "total_amount": {total}}}"#)
}
