//! End-to-end lifecycle of a payment modal against a scripted invoice
//! service, on a paused tokio clock.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use torpay_core::clock::{Clock, TokioClock};
use torpay_core::countdown::CountdownDisplay;
use torpay_core::{
    CheckoutWidget, HostCallbacks, ModalHandle, ModalViewState, PaymentRequestParams,
};
use torpay_sdk::objects::{
    CryptoCode, Invoice, InvoiceId, InvoiceStatus, InvoiceStatusReport, PaymentRequestBody,
};
use torpay_sdk::{ConfigurationError, InvoiceService, ServiceError, WidgetConfig};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Scripted invoice service
// ---------------------------------------------------------------------------

/// One scripted status response. `None` is a failed request.
#[derive(Clone, Copy)]
struct Step {
    delay: Duration,
    status: Option<&'static str>,
}

fn status(status: &'static str) -> Step {
    Step {
        delay: Duration::ZERO,
        status: Some(status),
    }
}

fn status_after(delay: Duration, status: &'static str) -> Step {
    Step {
        delay,
        status: Some(status),
    }
}

fn failure() -> Step {
    Step {
        delay: Duration::ZERO,
        status: None,
    }
}

/// Issues invoices `{CRYPTO}-{n}` and answers status checks from a
/// per-invoice script, `PENDING` once the script runs out.
struct MockService {
    clock: TokioClock,
    ttl: Duration,
    default_delay: Duration,
    failures: HashMap<String, String>,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    created: Mutex<HashMap<String, usize>>,
    status_calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockService {
    fn new(clock: TokioClock, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            default_delay: Duration::ZERO,
            failures: HashMap::new(),
            scripts: Mutex::new(HashMap::new()),
            created: Mutex::new(HashMap::new()),
            status_calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn failing(mut self, crypto: &str, message: &str) -> Self {
        self.failures.insert(crypto.to_owned(), message.to_owned());
        self
    }

    fn script(self, invoice_id: &str, steps: &[Step]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(invoice_id.to_owned(), steps.iter().copied().collect());
        self
    }

    fn status_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    fn status_calls(&self) -> Vec<String> {
        self.status_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvoiceService for MockService {
    async fn create_payment_request(
        &self,
        crypto: &CryptoCode,
        body: &PaymentRequestBody,
    ) -> Result<Invoice, ServiceError> {
        if let Some(message) = self.failures.get(crypto.as_str()) {
            return Err(ServiceError::Rejected(message.clone()));
        }
        let n = {
            let mut created = self.created.lock().unwrap();
            let n = created.entry(crypto.to_string()).or_default();
            *n += 1;
            *n
        };
        Ok(Invoice {
            id: InvoiceId::new(format!("{crypto}-{n}")),
            crypto: crypto.clone(),
            address: format!("addr-{crypto}"),
            amount_crypto: "0.00102".parse().unwrap(),
            amount_fiat: body.amount,
            fiat: body.fiat.clone(),
            exchange_rate: None,
            expires_at: self.clock.now().unwrap() + self.ttl,
            status: InvoiceStatus::Pending,
        })
    }

    async fn invoice_status(&self, id: &InvoiceId) -> Result<InvoiceStatusReport, ServiceError> {
        self.status_calls.lock().unwrap().push(id.to_string());
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(id.as_str())
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step {
                delay: self.default_delay,
                status: Some("PENDING"),
            });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match step.status {
            Some(status) => Ok(InvoiceStatusReport::from_status(status)),
            None => Err(ServiceError::Api {
                status: 502,
                message: "Bad Gateway".to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Calls {
    success: AtomicUsize,
    error: AtomicUsize,
    complete: AtomicUsize,
    close: AtomicUsize,
    messages: Mutex<Vec<String>>,
    reports: Mutex<Vec<String>>,
}

impl Calls {
    fn callbacks(self: &Arc<Self>) -> HostCallbacks {
        let (on_success, on_error, on_complete, on_close) =
            (self.clone(), self.clone(), self.clone(), self.clone());
        HostCallbacks::default()
            .with_on_success(move |_| {
                on_success.success.fetch_add(1, Ordering::SeqCst);
            })
            .with_on_error(move |e| {
                on_error.error.fetch_add(1, Ordering::SeqCst);
                on_error.messages.lock().unwrap().push(e.message().to_owned());
            })
            .with_on_payment_complete(move |report| {
                on_complete.complete.fetch_add(1, Ordering::SeqCst);
                on_complete
                    .reports
                    .lock()
                    .unwrap()
                    .push(report.raw_status.clone());
            })
            .with_on_close(move || {
                on_close.close.fetch_add(1, Ordering::SeqCst);
            })
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

fn code(s: &str) -> CryptoCode {
    s.parse().unwrap()
}

fn widget(service: Arc<MockService>, clock: TokioClock) -> CheckoutWidget {
    CheckoutWidget::with_service(&WidgetConfig::default(), service)
        .unwrap()
        .with_clock(Arc::new(clock))
}

fn params(cryptos: &[&str], calls: &Arc<Calls>) -> PaymentRequestParams {
    PaymentRequestParams::new("99.99".parse().unwrap())
        .with_currency("USD")
        .with_cryptos(cryptos.iter().map(|c| code(c)))
        .with_callbacks(calls.callbacks())
}

fn transitions(handle: &mut ModalHandle) -> Vec<ModalViewState> {
    let mut seen = Vec::new();
    while let Ok(state) = handle.transitions().try_recv() {
        seen.push(state);
    }
    seen
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_paid_flow_completes_once_and_auto_closes() {
    init_tracing();
    let clock = TokioClock::new();
    let service = Arc::new(
        MockService::new(clock, FIFTEEN_MINUTES)
            .script("BTC-1", &[status("PENDING"), status("UNPAID"), status("PAID")]),
    );
    let calls = Arc::new(Calls::default());
    let mut handle = widget(service.clone(), clock)
        .open_payment_modal(params(&["BTC"], &calls))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let view = handle.view().borrow().clone();
    assert_eq!(view.state, ModalViewState::AwaitingPayment);
    let invoice = view.invoice.unwrap();
    assert_eq!(invoice.id.as_str(), "BTC-1");
    assert_eq!(invoice.amount_fiat.to_string(), "99.99");
    assert_eq!(view.countdown.map(|c| c.to_string()).as_deref(), Some("14:59"));
    assert_eq!(Calls::count(&calls.success), 1);

    // Polls at 5s, 10s, 15s.
    advance(15).await;
    assert_eq!(handle.state(), ModalViewState::Paid);
    assert_eq!(Calls::count(&calls.complete), 1);
    assert_eq!(*calls.reports.lock().unwrap(), vec!["PAID".to_owned()]);
    assert!(!handle.is_closed());

    let view = handle.view();
    assert_eq!(
        transitions(&mut handle),
        vec![
            ModalViewState::Loading,
            ModalViewState::AwaitingPayment,
            ModalViewState::Paid
        ]
    );
    handle.closed().await;

    assert!(view.borrow().closed);
    assert_eq!(view.borrow().state, ModalViewState::Paid);
    assert_eq!(Calls::count(&calls.complete), 1);
    assert_eq!(Calls::count(&calls.close), 1);
    assert_eq!(service.status_calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_partial_then_paid() {
    init_tracing();
    let clock = TokioClock::new();
    let service = Arc::new(
        MockService::new(clock, FIFTEEN_MINUTES)
            .script("BTC-1", &[status("PARTIAL"), failure(), status("OVERPAID")]),
    );
    let calls = Arc::new(Calls::default());
    let mut handle = widget(service, clock)
        .open_payment_modal(params(&["BTC"], &calls))
        .unwrap();

    advance(6).await;
    assert_eq!(handle.state(), ModalViewState::Partial);
    assert_eq!(
        handle.view().borrow().invoice.as_ref().map(|i| i.status),
        Some(InvoiceStatus::Partial)
    );

    // The failed check at 10s changes nothing.
    advance(5).await;
    assert_eq!(handle.state(), ModalViewState::Partial);

    advance(5).await;
    assert_eq!(handle.state(), ModalViewState::Paid);
    assert_eq!(Calls::count(&calls.complete), 1);
    assert_eq!(*calls.reports.lock().unwrap(), vec!["OVERPAID".to_owned()]);
    assert_eq!(
        transitions(&mut handle),
        vec![
            ModalViewState::Loading,
            ModalViewState::AwaitingPayment,
            ModalViewState::Partial,
            ModalViewState::Paid
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_expiry_stops_polling_without_completion() {
    init_tracing();
    let clock = TokioClock::new();
    let service = Arc::new(MockService::new(clock, Duration::from_secs(10)));
    let calls = Arc::new(Calls::default());
    let mut handle = widget(service.clone(), clock)
        .open_payment_modal(params(&["BTC"], &calls))
        .unwrap();

    advance(20).await;
    let view = handle.view().borrow().clone();
    assert_eq!(view.state, ModalViewState::Expired);
    assert_eq!(view.countdown, Some(CountdownDisplay::Expired));
    assert!(!view.closed);

    let polled = service.status_calls().len();
    advance(60).await;
    assert_eq!(service.status_calls().len(), polled);
    assert_eq!(handle.state(), ModalViewState::Expired);
    assert_eq!(Calls::count(&calls.complete), 0);
    assert_eq!(Calls::count(&calls.close), 0);
    assert_eq!(
        transitions(&mut handle),
        vec![
            ModalViewState::Loading,
            ModalViewState::AwaitingPayment,
            ModalViewState::Expired
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stalled_status_check_cannot_hold_off_expiry() {
    init_tracing();
    let clock = TokioClock::new();
    let service = Arc::new(
        MockService::new(clock, Duration::from_secs(10)).status_delay(Duration::from_secs(3600)),
    );
    let calls = Arc::new(Calls::default());
    let mut handle = widget(service.clone(), clock)
        .open_payment_modal(params(&["BTC"], &calls))
        .unwrap();

    // The check sent at 5s never answers. Expiry at 10s drains for one
    // poll interval, then latches.
    advance(16).await;
    let view = handle.view().borrow().clone();
    assert_eq!(view.state, ModalViewState::Expired);
    assert_eq!(view.countdown, Some(CountdownDisplay::Expired));

    advance(600).await;
    assert_eq!(handle.state(), ModalViewState::Expired);
    assert_eq!(service.status_calls().len(), 1);
    assert_eq!(Calls::count(&calls.complete), 0);
    assert_eq!(
        transitions(&mut handle),
        vec![
            ModalViewState::Loading,
            ModalViewState::AwaitingPayment,
            ModalViewState::Expired
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_waiting_on_an_expired_modal_returns_once_closed() {
    init_tracing();
    let clock = TokioClock::new();
    let service = Arc::new(MockService::new(clock, Duration::from_secs(10)));
    let calls = Arc::new(Calls::default());
    let handle = widget(service, clock)
        .open_payment_modal(params(&["BTC"], &calls))
        .unwrap();

    advance(20).await;
    assert_eq!(handle.state(), ModalViewState::Expired);
    let waited = tokio::time::timeout(Duration::from_secs(1), async {
        tokio::join!(handle.closed(), handle.close_modal())
    })
    .await;
    assert!(waited.is_ok());
    assert!(handle.is_closed());
    assert_eq!(Calls::count(&calls.close), 1);
}

#[tokio::test(start_paused = true)]
async fn test_payment_confirmed_at_expiry_wins() {
    init_tracing();
    let clock = TokioClock::new();
    let service = Arc::new(MockService::new(clock, Duration::from_secs(10)).script(
        "BTC-1",
        &[
            status("PENDING"),
            status_after(Duration::from_secs(2), "PAID"),
        ],
    ));
    let calls = Arc::new(Calls::default());
    let mut handle = widget(service, clock)
        .open_payment_modal(params(&["BTC"], &calls))
        .unwrap();

    advance(13).await;
    assert_eq!(handle.state(), ModalViewState::Paid);
    assert_eq!(Calls::count(&calls.complete), 1);

    advance(1).await;
    assert_eq!(handle.state(), ModalViewState::Paid);
    assert_eq!(
        transitions(&mut handle),
        vec![
            ModalViewState::Loading,
            ModalViewState::AwaitingPayment,
            ModalViewState::Paid
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_during_in_flight_poll() {
    init_tracing();
    let clock = TokioClock::new();
    let service = Arc::new(
        MockService::new(clock, FIFTEEN_MINUTES)
            .script("BTC-1", &[status_after(Duration::from_secs(4), "PAID")]),
    );
    let calls = Arc::new(Calls::default());
    let handle = widget(service.clone(), clock)
        .open_payment_modal(params(&["BTC"], &calls))
        .unwrap();
    let view = handle.view();

    advance(7).await;
    assert_eq!(service.status_calls().len(), 1);
    handle.close_modal().await;
    handle.close_modal().await;

    advance(20).await;
    let snapshot = view.borrow().clone();
    assert!(snapshot.closed);
    assert_eq!(snapshot.state, ModalViewState::AwaitingPayment);
    assert_eq!(Calls::count(&calls.complete), 0);
    assert_eq!(Calls::count(&calls.close), 1);
    assert_eq!(service.status_calls().len(), 1);
    handle.closed().await;
}

#[tokio::test(start_paused = true)]
async fn test_switch_mid_poll_ignores_the_old_invoice() {
    init_tracing();
    let clock = TokioClock::new();
    let service = Arc::new(
        MockService::new(clock, FIFTEEN_MINUTES)
            .script("BTC-1", &[status_after(Duration::from_secs(4), "PAID")]),
    );
    let calls = Arc::new(Calls::default());
    let mut handle = widget(service.clone(), clock)
        .open_payment_modal(params(&["BTC", "LTC"], &calls))
        .unwrap();

    advance(7).await;
    handle.switch_crypto(code("LTC")).await;

    advance(20).await;
    let view = handle.view().borrow().clone();
    assert_eq!(view.state, ModalViewState::AwaitingPayment);
    assert_eq!(view.crypto, Some(code("LTC")));
    assert_eq!(view.invoice.map(|i| i.id.to_string()).as_deref(), Some("LTC-1"));
    assert_eq!(view.offered.as_slice(), &[code("BTC"), code("LTC")]);
    assert_eq!(Calls::count(&calls.complete), 0);
    assert_eq!(Calls::count(&calls.close), 0);
    assert_eq!(Calls::count(&calls.success), 2);

    let calls_log = service.status_calls();
    assert_eq!(calls_log.iter().filter(|id| *id == "BTC-1").count(), 1);
    assert!(calls_log.iter().any(|id| id == "LTC-1"));
    assert_eq!(
        transitions(&mut handle),
        vec![
            ModalViewState::Loading,
            ModalViewState::AwaitingPayment,
            ModalViewState::Loading,
            ModalViewState::AwaitingPayment
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_single_crypto_cannot_switch() {
    init_tracing();
    let clock = TokioClock::new();
    let service = Arc::new(MockService::new(clock, FIFTEEN_MINUTES));
    let calls = Arc::new(Calls::default());
    let mut handle = widget(service, clock)
        .open_payment_modal(params(&["BTC"], &calls))
        .unwrap();

    advance(1).await;
    handle.switch_crypto(code("LTC")).await;
    advance(1).await;

    assert_eq!(handle.view().borrow().crypto, Some(code("BTC")));
    assert!(!handle.view().borrow().can_switch());
    assert_eq!(Calls::count(&calls.success), 1);
    assert_eq!(
        transitions(&mut handle),
        vec![ModalViewState::Loading, ModalViewState::AwaitingPayment]
    );
}

#[tokio::test(start_paused = true)]
async fn test_creation_error_then_switch() {
    init_tracing();
    let clock = TokioClock::new();
    let service =
        Arc::new(MockService::new(clock, FIFTEEN_MINUTES).failing("BTC", "Amount too small"));
    let calls = Arc::new(Calls::default());
    let mut handle = widget(service.clone(), clock)
        .open_payment_modal(params(&["BTC", "LTC"], &calls))
        .unwrap();

    advance(30).await;
    let view = handle.view().borrow().clone();
    assert_eq!(view.state, ModalViewState::Error);
    assert_eq!(view.error.as_deref(), Some("Amount too small"));
    assert!(view.invoice.is_none());
    assert_eq!(Calls::count(&calls.error), 1);
    assert_eq!(Calls::count(&calls.success), 0);
    assert_eq!(
        *calls.messages.lock().unwrap(),
        vec!["Amount too small".to_owned()]
    );
    assert!(service.status_calls().is_empty());

    handle.switch_crypto(code("LTC")).await;
    advance(1).await;
    let view = handle.view().borrow().clone();
    assert_eq!(view.state, ModalViewState::AwaitingPayment);
    assert!(view.error.is_none());
    assert_eq!(Calls::count(&calls.error), 1);
    assert_eq!(
        transitions(&mut handle),
        vec![
            ModalViewState::Loading,
            ModalViewState::Error,
            ModalViewState::Loading,
            ModalViewState::AwaitingPayment
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_status_checks_are_skipped_not_queued() {
    init_tracing();
    let clock = TokioClock::new();
    let service = Arc::new(
        MockService::new(clock, FIFTEEN_MINUTES).status_delay(Duration::from_secs(12)),
    );
    let calls = Arc::new(Calls::default());
    let handle = widget(service.clone(), clock)
        .open_payment_modal(params(&["BTC"], &calls))
        .unwrap();

    advance(40).await;
    assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(service.status_calls().len(), 3);
    assert_eq!(handle.state(), ModalViewState::AwaitingPayment);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_handle_closes_silently() {
    init_tracing();
    let clock = TokioClock::new();
    let service = Arc::new(MockService::new(clock, FIFTEEN_MINUTES));
    let calls = Arc::new(Calls::default());
    let handle = widget(service, clock)
        .open_payment_modal(params(&["BTC"], &calls))
        .unwrap();
    let mut view = handle.view();

    advance(1).await;
    drop(handle);
    view.wait_for(|v| v.closed).await.unwrap();
    assert_eq!(Calls::count(&calls.close), 0);
}

#[tokio::test(start_paused = true)]
async fn test_configuration_errors_fail_fast() {
    init_tracing();
    assert!(matches!(
        CheckoutWidget::init(WidgetConfig::default()),
        Err(ConfigurationError::MissingApiKey)
    ));

    let clock = TokioClock::new();
    let service = Arc::new(MockService::new(clock, FIFTEEN_MINUTES));
    let calls = Arc::new(Calls::default());
    let widget = widget(service.clone(), clock);

    let invalid = PaymentRequestParams::new("0".parse().unwrap());
    assert!(matches!(
        widget.open_payment_modal(invalid),
        Err(ConfigurationError::InvalidAmount(_))
    ));
    let not_offered = params(&["BTC", "LTC"], &calls).with_crypto(code("ETH"));
    assert!(matches!(
        widget.open_payment_modal(not_offered),
        Err(ConfigurationError::CryptoNotOffered(_))
    ));

    advance(10).await;
    assert!(service.created.lock().unwrap().is_empty());
    assert_eq!(Calls::count(&calls.error), 0);
}

#[tokio::test(start_paused = true)]
async fn test_demo_mode_serves_invoices_offline() {
    init_tracing();
    let widget = CheckoutWidget::init(WidgetConfig::demo())
        .unwrap()
        .with_clock(Arc::new(TokioClock::new()));
    let calls = Arc::new(Calls::default());
    let handle = widget
        .open_payment_modal(params(&["XMR", "BTC"], &calls))
        .unwrap();

    advance(30).await;
    let view = handle.view().borrow().clone();
    assert_eq!(view.state, ModalViewState::AwaitingPayment);
    assert_eq!(view.crypto, Some(code("XMR")));
    assert!(view.invoice.unwrap().id.as_str().starts_with("demo-"));
    assert_eq!(Calls::count(&calls.success), 1);

    handle.close_modal().await;
    handle.closed().await;
    assert_eq!(Calls::count(&calls.close), 1);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_invoice_ttl_fails_creation() {
    init_tracing();
    let config = WidgetConfig {
        invoice_ttl: Duration::from_millis(1_000_000_000_000_000),
        ..WidgetConfig::demo()
    };
    let widget = CheckoutWidget::init(config)
        .unwrap()
        .with_clock(Arc::new(TokioClock::new()));
    let calls = Arc::new(Calls::default());
    let mut handle = widget
        .open_payment_modal(params(&["BTC"], &calls))
        .unwrap();

    advance(1).await;
    let view = handle.view().borrow().clone();
    assert_eq!(view.state, ModalViewState::Error);
    assert!(view.invoice.is_none());
    assert_eq!(Calls::count(&calls.error), 1);
    assert_eq!(Calls::count(&calls.success), 0);
    assert_eq!(
        transitions(&mut handle),
        vec![ModalViewState::Loading, ModalViewState::Error]
    );
}
