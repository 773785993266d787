//! Check pipeline and scheduler behaviour against the in-memory store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use cart_rotom::crypto::{encrypt_card, AesGcmCipher, NewCard};
use cart_rotom::models::{
    Agent, AgentStatus, CheckLogEntry, CheckResult, CheckStateUpdate, CheckStrategy, Condition,
    LogResult, NotificationPreference, PaymentMethodRecord, TelegramLink,
};
use cart_rotom::notifications::{Delivery, Notifier, NotifyOutcome, WebhookKind};
use cart_rotom::repository::{
    AgentRepository, InMemoryStore, PaymentMethodRepository, RepositoryError, UserRepository,
};
use cart_rotom::scrapers::{FetchError, FetchVia, FetchedPage, PageFetcher, PageRetriever};
use cart_rotom::services::{Scheduler, StockChecker, BOT_DETECTED_MESSAGE};

const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

const IN_STOCK: &str = "<html><body><h1>Switch OLED</h1><p>In Stock Now</p></body></html>";
const SOLD_OUT: &str = "<html><body><h1>Switch OLED</h1><p>Sorry, currently Sold Out</p></body></html>";
const WALL: &str = "<html><head><title>Pardon Our Interruption</title></head><body></body></html>";

/// Serves whatever HTML it currently holds, or fails when set to.
struct FakePage {
    html: Mutex<Option<String>>,
    via: FetchVia,
}

impl FakePage {
    fn new(html: &str, via: FetchVia) -> Arc<Self> {
        Arc::new(Self {
            html: Mutex::new(Some(html.to_string())),
            via,
        })
    }

    fn set(&self, html: &str) {
        *self.html.lock().unwrap() = Some(html.to_string());
    }

    fn fail(&self) {
        *self.html.lock().unwrap() = None;
    }
}

#[async_trait]
impl PageFetcher for FakePage {
    async fn fetch(&self, _url: &str) -> Result<FetchedPage, FetchError> {
        match self.html.lock().unwrap().clone() {
            Some(html) => Ok(FetchedPage {
                html,
                status: 200,
                via: self.via,
            }),
            None => Err(FetchError::Status(503)),
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    calls: Mutex<Vec<(String, bool)>>,
}

impl RecordingNotifier {
    fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, _user_id: &str, agent: &Agent, in_stock: bool) -> NotifyOutcome {
        self.calls.lock().unwrap().push((agent.id.clone(), in_stock));
        NotifyOutcome::Sent(Delivery::Webhook(WebhookKind::Generic))
    }
}

struct Harness {
    store: InMemoryStore,
    http: Arc<FakePage>,
    browser: Arc<FakePage>,
    notifier: Arc<RecordingNotifier>,
    checker: StockChecker,
}

impl Harness {
    fn new(html: &str) -> Self {
        Self::build(html, true)
    }

    fn without_browser(html: &str) -> Self {
        Self::build(html, false)
    }

    fn build(html: &str, with_browser: bool) -> Self {
        let store = InMemoryStore::new();
        let http = FakePage::new(html, FetchVia::Http);
        let browser = FakePage::new(IN_STOCK, FetchVia::Browser);
        let notifier = Arc::new(RecordingNotifier::default());
        let fallback: Option<Arc<dyn PageFetcher>> = if with_browser {
            Some(browser.clone())
        } else {
            None
        };

        let checker = StockChecker::new(
            Arc::new(store.clone()),
            PageRetriever::new(http.clone(), fallback),
            notifier.clone(),
            Arc::new(AesGcmCipher::from_hex(KEY).unwrap()),
        );

        Self {
            store,
            http,
            browser,
            notifier,
            checker,
        }
    }

    async fn add_agent(&self, check: CheckStrategy) -> Agent {
        let agent = Agent::new("ash", "https://shop.example.com/products/oled", check);
        self.store.save_agent(&agent).await.unwrap();
        agent
    }

    async fn reload(&self, agent: &Agent) -> Agent {
        self.store
            .get_agent(&agent.user_id, &agent.id)
            .await
            .unwrap()
            .unwrap()
    }

    /// Run one cycle against the stored state of `agent`.
    async fn cycle(&self, agent: &Agent) -> Agent {
        let current = self.reload(agent).await;
        self.checker.check_agent(&current).await.unwrap();
        self.reload(agent).await
    }

    async fn check_entries(&self, agent: &Agent) -> Vec<CheckLogEntry> {
        self.store
            .logs(&agent.user_id, &agent.id)
            .await
            .into_iter()
            .filter(|e| e.result.is_check())
            .collect()
    }
}

#[tokio::test]
async fn first_in_stock_result_notifies() {
    let h = Harness::new(IN_STOCK);
    let agent = h.add_agent(CheckStrategy::default()).await;

    let report = h.checker.check_agent(&agent).await.unwrap();
    assert_eq!(report.result, CheckResult::InStock);
    assert_eq!(report.message, "No negative keywords found (Assumed In Stock)");
    assert!(report.notified.as_ref().is_some_and(NotifyOutcome::is_sent));

    let stored = h.reload(&agent).await;
    assert_eq!(stored.last_result, Some(CheckResult::InStock));
    assert_eq!(stored.last_http_status, Some(200));
    assert!(stored.last_checked.is_some());
    assert_eq!(h.notifier.calls(), vec![(agent.id.clone(), true)]);
}

#[tokio::test]
async fn sold_out_page_with_default_keywords() {
    let h = Harness::new(SOLD_OUT);
    let agent = h.add_agent(CheckStrategy::default()).await;

    let stored = h.cycle(&agent).await;
    assert_eq!(stored.last_result, Some(CheckResult::OutOfStock));

    let logs = h.check_entries(&agent).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "Found negative keyword: 'sold out'");
}

#[tokio::test]
async fn unchanged_result_stays_quiet() {
    let h = Harness::new(SOLD_OUT);
    let agent = h.add_agent(CheckStrategy::default()).await;

    h.cycle(&agent).await;
    h.cycle(&agent).await;
    h.cycle(&agent).await;

    assert_eq!(h.notifier.calls().len(), 1);
    assert_eq!(h.check_entries(&agent).await.len(), 3);
}

#[tokio::test]
async fn out_to_in_transition_fires_once() {
    let h = Harness::new(SOLD_OUT);
    let agent = h.add_agent(CheckStrategy::default()).await;

    h.cycle(&agent).await;
    h.http.set(IN_STOCK);
    let stored = h.cycle(&agent).await;

    assert_eq!(stored.last_result, Some(CheckResult::InStock));
    assert_eq!(
        h.notifier.calls(),
        vec![(agent.id.clone(), false), (agent.id.clone(), true)]
    );
}

#[tokio::test]
async fn bot_detection_suppresses_notifications_both_ways() {
    let h = Harness::new(IN_STOCK);
    let agent = h.add_agent(CheckStrategy::default()).await;
    h.cycle(&agent).await;
    assert_eq!(h.notifier.calls().len(), 1);

    // Blocked on both strategies
    h.http.set(WALL);
    h.browser.set(WALL);
    let stored = h.cycle(&agent).await;
    assert_eq!(stored.last_result, Some(CheckResult::BotDetected));
    assert_eq!(h.notifier.calls().len(), 1);

    let logs = h.check_entries(&agent).await;
    assert_eq!(logs.last().unwrap().result, LogResult::BotDetected);
    assert_eq!(logs.last().unwrap().message, BOT_DETECTED_MESSAGE);

    // Coming back from BOT_DETECTED does not alert either
    h.http.set(SOLD_OUT);
    let stored = h.cycle(&agent).await;
    assert_eq!(stored.last_result, Some(CheckResult::OutOfStock));
    assert_eq!(h.notifier.calls().len(), 1);

    // A real change afterwards does
    h.http.set(IN_STOCK);
    h.cycle(&agent).await;
    assert_eq!(h.notifier.calls().len(), 2);
}

#[tokio::test]
async fn blocked_page_still_caches_thumbnail() {
    let wall = r#"<html><head><title>Pardon Our Interruption</title>
        <meta property="og:image" content="/img/oled.jpg"></head><body></body></html>"#;
    let h = Harness::new(wall);
    h.browser.set(WALL);
    let agent = h.add_agent(CheckStrategy::default()).await;

    let report = h.checker.check_agent(&agent).await.unwrap();
    assert_eq!(report.result, CheckResult::BotDetected);
    assert!(report.notified.is_none());

    // Browser wall has no image, so the HTTP wall's image is not used either
    let stored = h.reload(&agent).await;
    assert_eq!(stored.last_result, Some(CheckResult::BotDetected));
    assert_eq!(stored.thumbnail, None);

    // Without a second wall the first one is what remains
    let h = Harness::without_browser(wall);
    let agent = h.add_agent(CheckStrategy::default()).await;
    let stored = h.cycle(&agent).await;
    assert_eq!(stored.last_result, Some(CheckResult::BotDetected));
    assert_eq!(
        stored.thumbnail.as_deref(),
        Some("https://shop.example.com/img/oled.jpg")
    );
}

#[tokio::test]
async fn blocked_page_recovered_by_browser() {
    let h = Harness::new(WALL);
    h.browser.set(SOLD_OUT);
    let agent = h.add_agent(CheckStrategy::default()).await;

    let report = h.checker.check_agent(&agent).await.unwrap();
    assert_eq!(report.result, CheckResult::OutOfStock);
    assert_eq!(report.http_status, 200);
}

#[tokio::test]
async fn browser_failure_counts_as_bot_detection() {
    let h = Harness::new(WALL);
    h.browser.fail();
    let agent = h.add_agent(CheckStrategy::default()).await;

    let report = h.checker.check_agent(&agent).await.unwrap();
    assert_eq!(report.result, CheckResult::BotDetected);
    assert!(report.notified.is_none());
    assert_eq!(h.check_entries(&agent).await.len(), 1);
}

#[tokio::test]
async fn fetch_failure_without_fallback_is_error() {
    let h = Harness::without_browser(IN_STOCK);
    h.http.fail();
    let agent = h.add_agent(CheckStrategy::default()).await;

    let stored = h.cycle(&agent).await;
    assert_eq!(stored.last_result, Some(CheckResult::Error));
    assert_eq!(stored.last_http_status, Some(503));

    let logs = h.check_entries(&agent).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].result, LogResult::Error);
    assert_eq!(logs[0].http_status, 503);
    assert!(h.notifier.calls().is_empty());
}

#[tokio::test]
async fn invalid_selector_is_error_not_panic() {
    let h = Harness::new(IN_STOCK);
    let agent = h
        .add_agent(CheckStrategy::Selector {
            selector: "div[[".to_string(),
            condition: Condition::Exists,
            expected_value: None,
        })
        .await;

    let report = h.checker.check_agent(&agent).await.unwrap();
    assert_eq!(report.result, CheckResult::Error);
    assert_eq!(report.http_status, 200);
    assert!(report.message.contains("div[["));
    assert_eq!(h.check_entries(&agent).await.len(), 1);
}

#[tokio::test]
async fn selector_equals_strategy() {
    let page = r#"<html><body><span id="stock"> In Stock </span></body></html>"#;
    let h = Harness::new(page);
    let agent = h
        .add_agent(CheckStrategy::Selector {
            selector: "#stock".to_string(),
            condition: Condition::Equals,
            expected_value: Some("In Stock".to_string()),
        })
        .await;

    let stored = h.cycle(&agent).await;
    assert_eq!(stored.last_result, Some(CheckResult::InStock));

    h.http
        .set(r#"<html><body><span id="stock">Backorder</span></body></html>"#);
    let stored = h.cycle(&agent).await;
    assert_eq!(stored.last_result, Some(CheckResult::OutOfStock));
}

#[tokio::test]
async fn thumbnail_is_cached_once() {
    let first = r#"<html><head><meta property="og:image" content="/img/oled.jpg"></head>
        <body>In Stock</body></html>"#;
    let second = r#"<html><head><meta property="og:image" content="https://cdn.example.com/new.jpg"></head>
        <body>In Stock</body></html>"#;

    let h = Harness::new(first);
    let agent = h.add_agent(CheckStrategy::default()).await;

    let stored = h.cycle(&agent).await;
    assert_eq!(
        stored.thumbnail.as_deref(),
        Some("https://shop.example.com/img/oled.jpg")
    );

    h.http.set(second);
    let stored = h.cycle(&agent).await;
    assert_eq!(
        stored.thumbnail.as_deref(),
        Some("https://shop.example.com/img/oled.jpg")
    );
}

#[tokio::test]
async fn auto_checkout_logs_attempt_alongside_check() {
    let h = Harness::new(IN_STOCK);
    let cipher = AesGcmCipher::from_hex(KEY).unwrap();
    let card = NewCard {
        card_number: "4242424242424242".to_string(),
        cvc: "999".to_string(),
        expiry: "01/31".to_string(),
        cardholder_name: "Ash".to_string(),
        is_prepaid: true,
        balance: Some(25.0),
    };
    let record: PaymentMethodRecord = encrypt_card(&cipher, "visa", &card).unwrap();
    h.store.add_payment_method("ash", &record).await.unwrap();

    let mut agent = Agent::new("ash", "https://shop.example.com/p", CheckStrategy::default());
    agent.auto_checkout = true;
    agent.auto_checkout_card_id = Some("visa".to_string());
    h.store.save_agent(&agent).await.unwrap();

    let stored = h.cycle(&agent).await;
    assert!(stored.last_checkout_attempt.is_some());

    let logs = h.store.logs("ash", &agent.id).await;
    let results: Vec<LogResult> = logs.iter().map(|e| e.result).collect();
    assert_eq!(
        results,
        vec![LogResult::CheckoutAttempted, LogResult::InStock]
    );
    assert_eq!(
        logs[0].message,
        "Auto-checkout attempted with card ending in 4242"
    );
}

#[tokio::test]
async fn auto_checkout_failure_does_not_abort_check() {
    let h = Harness::new(IN_STOCK);
    let mut agent = Agent::new("ash", "https://shop.example.com/p", CheckStrategy::default());
    agent.auto_checkout = true;
    agent.auto_checkout_card_id = Some("missing".to_string());
    h.store.save_agent(&agent).await.unwrap();

    let stored = h.cycle(&agent).await;
    assert_eq!(stored.last_result, Some(CheckResult::InStock));
    assert!(stored.last_checkout_attempt.is_none());

    let results: Vec<LogResult> = h
        .store
        .logs("ash", &agent.id)
        .await
        .iter()
        .map(|e| e.result)
        .collect();
    assert_eq!(results, vec![LogResult::CheckoutFailed, LogResult::InStock]);
}

#[tokio::test]
async fn scheduler_checks_only_due_enabled_agents() {
    let h = Harness::new(IN_STOCK);
    let now = Utc::now();

    let due = h.add_agent(CheckStrategy::default()).await;

    let mut fresh = Agent::new("misty", "https://shop.example.com/fresh", CheckStrategy::default());
    fresh.last_checked = Some(now - Duration::minutes(2));
    fresh.frequency_minutes = 5;
    h.store.save_agent(&fresh).await.unwrap();

    let mut disabled = Agent::new("brock", "https://shop.example.com/off", CheckStrategy::default());
    disabled.status = AgentStatus::Disabled;
    h.store.save_agent(&disabled).await.unwrap();

    let scheduler = Scheduler::new(h.checker.clone());
    let summary = scheduler.run_cycle(now).await.unwrap();

    assert_eq!(summary.enabled, 2);
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.in_stock, 1);
    assert_eq!(summary.notified, 1);
    assert_eq!(summary.failed, 0);

    assert_eq!(h.check_entries(&due).await.len(), 1);
    assert!(h.check_entries(&fresh).await.is_empty());
    assert!(h.check_entries(&disabled).await.is_empty());

    // Just checked, so nothing is due a minute later
    let summary = scheduler
        .run_cycle(Utc::now() + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(summary.checked, 0);
}

/// Store whose check-state writes fail for one agent.
#[derive(Clone)]
struct FlakyStore {
    inner: InMemoryStore,
    broken_agent: String,
}

#[async_trait]
impl AgentRepository for FlakyStore {
    async fn list_enabled_agents(&self) -> Result<Vec<Agent>, RepositoryError> {
        self.inner.list_enabled_agents().await
    }

    async fn get_agent(&self, user_id: &str, agent_id: &str) -> Result<Option<Agent>, RepositoryError> {
        self.inner.get_agent(user_id, agent_id).await
    }

    async fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>, RepositoryError> {
        self.inner.list_agents(user_id).await
    }

    async fn save_agent(&self, agent: &Agent) -> Result<(), RepositoryError> {
        self.inner.save_agent(agent).await
    }

    async fn set_agent_status(
        &self,
        user_id: &str,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<bool, RepositoryError> {
        self.inner.set_agent_status(user_id, agent_id, status).await
    }

    async fn delete_agent(&self, user_id: &str, agent_id: &str) -> Result<bool, RepositoryError> {
        self.inner.delete_agent(user_id, agent_id).await
    }

    async fn update_check_state(
        &self,
        user_id: &str,
        agent_id: &str,
        update: &CheckStateUpdate,
    ) -> Result<(), RepositoryError> {
        if agent_id == self.broken_agent {
            return Err(RepositoryError::Database("disk full".to_string()));
        }
        self.inner.update_check_state(user_id, agent_id, update).await
    }

    async fn append_log(
        &self,
        user_id: &str,
        agent_id: &str,
        entry: &CheckLogEntry,
    ) -> Result<(), RepositoryError> {
        self.inner.append_log(user_id, agent_id, entry).await
    }

    async fn list_logs(
        &self,
        user_id: &str,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<CheckLogEntry>, RepositoryError> {
        self.inner.list_logs(user_id, agent_id, limit).await
    }
}

#[async_trait]
impl UserRepository for FlakyStore {
    async fn get_notification_preference(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationPreference>, RepositoryError> {
        self.inner.get_notification_preference(user_id).await
    }

    async fn save_webhook(
        &self,
        user_id: &str,
        encrypted_url: Option<String>,
    ) -> Result<(), RepositoryError> {
        self.inner.save_webhook(user_id, encrypted_url).await
    }

    async fn connect_telegram(&self, user_id: &str, link: TelegramLink) -> Result<(), RepositoryError> {
        self.inner.connect_telegram(user_id, link).await
    }

    async fn disconnect_telegram(&self, user_id: &str) -> Result<(), RepositoryError> {
        self.inner.disconnect_telegram(user_id).await
    }
}

#[async_trait]
impl PaymentMethodRepository for FlakyStore {
    async fn get_payment_method(
        &self,
        user_id: &str,
        method_id: &str,
    ) -> Result<Option<PaymentMethodRecord>, RepositoryError> {
        self.inner.get_payment_method(user_id, method_id).await
    }

    async fn add_payment_method(
        &self,
        user_id: &str,
        record: &PaymentMethodRecord,
    ) -> Result<(), RepositoryError> {
        self.inner.add_payment_method(user_id, record).await
    }

    async fn update_payment_method(
        &self,
        user_id: &str,
        record: &PaymentMethodRecord,
    ) -> Result<bool, RepositoryError> {
        self.inner.update_payment_method(user_id, record).await
    }
}

#[tokio::test]
async fn one_failing_agent_does_not_affect_others() {
    let inner = InMemoryStore::new();
    let healthy = Agent::new("ash", "https://shop.example.com/a", CheckStrategy::default());
    let broken = Agent::new("ash", "https://shop.example.com/b", CheckStrategy::default());
    inner.save_agent(&healthy).await.unwrap();
    inner.save_agent(&broken).await.unwrap();

    let store = FlakyStore {
        inner: inner.clone(),
        broken_agent: broken.id.clone(),
    };
    let checker = StockChecker::new(
        Arc::new(store),
        PageRetriever::new(FakePage::new(IN_STOCK, FetchVia::Http), None),
        Arc::new(RecordingNotifier::default()),
        Arc::new(AesGcmCipher::from_hex(KEY).unwrap()),
    );

    let summary = Scheduler::new(checker).run_cycle(Utc::now()).await.unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.failed, 1);

    let healthy = inner.get_agent("ash", &healthy.id).await.unwrap().unwrap();
    assert_eq!(healthy.last_result, Some(CheckResult::InStock));
    let broken = inner.get_agent("ash", &broken.id).await.unwrap().unwrap();
    assert_eq!(broken.last_result, None);
}
