//! Scriptable in-process provider for engine tests.
//!
//! Each trait method pops its next scripted response from a queue; an
//! empty queue defaults to a benign success (empty terminal page, fresh
//! subscription, extended expiry). Every call is recorded so tests can
//! assert on attempt counts.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::provider::{
    ChangePage, ProviderClient, ProviderError, ProviderSubscription,
};
use mailsync_core::ChangeMessage;

type PageResult = Result<ChangePage, ProviderError>;
type OpResult = Result<(), ProviderError>;

/// A change record with plausible fields for the given message id.
pub(crate) fn message(id: &str) -> ChangeMessage {
    ChangeMessage {
        id: Some(id.to_string()),
        removed: false,
        subject: Some(format!("subject {id}")),
        sender_email: Some("sender@y.com".into()),
        sender_name: Some("Sender".into()),
        recipients: vec!["a@x.com".into()],
        received_at: Some(Utc::now()),
        has_attachments: false,
        is_read: false,
        importance: Some("NORMAL".into()),
        body_preview: Some(format!("preview {id}")),
        body_content: Some(format!("<p>body {id}</p>")),
        body_content_type: Some("HTML".into()),
        categories: vec![],
        conversation_id: Some("conv-1".into()),
        raw: None,
    }
}

#[derive(Default)]
pub(crate) struct FakeProvider {
    initial_pages: Mutex<VecDeque<PageResult>>,
    delta_pages: Mutex<VecDeque<PageResult>>,
    next_pages: Mutex<VecDeque<PageResult>>,
    create_results: Mutex<VecDeque<OpResult>>,
    renew_results: Mutex<VecDeque<OpResult>>,
    delete_results: Mutex<VecDeque<OpResult>>,
    created_count: AtomicUsize,
    deleted_ids: Mutex<Vec<String>>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        FakeProvider::default()
    }

    pub fn queue_initial(&self, result: PageResult) {
        self.initial_pages.lock().unwrap().push_back(result);
    }

    pub fn queue_delta(&self, result: PageResult) {
        self.delta_pages.lock().unwrap().push_back(result);
    }

    pub fn queue_next(&self, result: PageResult) {
        self.next_pages.lock().unwrap().push_back(result);
    }

    pub fn queue_create(&self, result: OpResult) {
        self.create_results.lock().unwrap().push_back(result);
    }

    pub fn queue_renew(&self, result: OpResult) {
        self.renew_results.lock().unwrap().push_back(result);
    }

    pub fn queue_delete(&self, result: OpResult) {
        self.delete_results.lock().unwrap().push_back(result);
    }

    /// How many times the named trait method was invoked.
    pub fn calls_for(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|name| **name == method)
            .count()
    }

    /// Subscription ids passed to `delete_subscription`, in order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted_ids.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str) {
        self.calls.lock().unwrap().push(method);
    }

    fn pop_page(&self, queue: &Mutex<VecDeque<PageResult>>) -> PageResult {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChangePage::end(vec![])))
    }

    fn pop_op(&self, queue: &Mutex<VecDeque<OpResult>>) -> OpResult {
        queue.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn create_subscription(
        &self,
        _address: &str,
    ) -> Result<ProviderSubscription, ProviderError> {
        self.record("create_subscription");
        self.pop_op(&self.create_results)?;

        let n = self.created_count.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ProviderSubscription {
            id: format!("sub-{n}"),
            expires_at: Utc::now() + Duration::hours(72),
        })
    }

    async fn renew_subscription(
        &self,
        _subscription_id: &str,
    ) -> Result<DateTime<Utc>, ProviderError> {
        self.record("renew_subscription");
        self.pop_op(&self.renew_results)?;
        Ok(Utc::now() + Duration::hours(72))
    }

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), ProviderError> {
        self.record("delete_subscription");
        self.deleted_ids
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        self.pop_op(&self.delete_results)
    }

    async fn fetch_initial_page(
        &self,
        _address: &str,
        _look_back_days: i64,
        _page_size: u32,
    ) -> Result<ChangePage, ProviderError> {
        self.record("fetch_initial_page");
        self.pop_page(&self.initial_pages)
    }

    async fn fetch_changes_since(&self, _cursor: &str) -> Result<ChangePage, ProviderError> {
        self.record("fetch_changes_since");
        self.pop_page(&self.delta_pages)
    }

    async fn fetch_next_page(&self, _page_token: &str) -> Result<ChangePage, ProviderError> {
        self.record("fetch_next_page");
        self.pop_page(&self.next_pages)
    }
}
