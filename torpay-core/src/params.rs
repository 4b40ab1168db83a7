//! Host supplied payment parameters.

use crate::error::CreationError;
use compact_str::{CompactString, ToCompactString};
use rust_decimal::Decimal;
use smallvec::SmallVec;
use std::sync::Arc;
use torpay_sdk::ConfigurationError;
use torpay_sdk::objects::{CryptoCode, Invoice, InvoiceStatusReport, PaymentRequestBody};
use url::Url;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Optional host hooks. Each one is invoked from the controller task.
#[derive(Clone, Default)]
pub struct HostCallbacks {
    on_success: Option<Callback<Invoice>>,
    on_error: Option<Callback<CreationError>>,
    on_payment_complete: Option<Callback<InvoiceStatusReport>>,
    on_close: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl HostCallbacks {
    /// Called once per session when its invoice is created.
    pub fn with_on_success(mut self, f: impl Fn(&Invoice) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn with_on_error(mut self, f: impl Fn(&CreationError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called once when the invoice is paid or overpaid.
    pub fn with_on_payment_complete(
        mut self,
        f: impl Fn(&InvoiceStatusReport) + Send + Sync + 'static,
    ) -> Self {
        self.on_payment_complete = Some(Arc::new(f));
        self
    }

    /// Called when the modal closes on request or after payment. Not called
    /// on a currency switch.
    pub fn with_on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }

    pub(crate) fn success(&self, invoice: &Invoice) {
        if let Some(f) = &self.on_success {
            f(invoice);
        }
    }

    pub(crate) fn error(&self, error: &CreationError) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }

    pub(crate) fn payment_complete(&self, report: &InvoiceStatusReport) {
        if let Some(f) = &self.on_payment_complete {
            f(report);
        }
    }

    pub(crate) fn close(&self) {
        if let Some(f) = &self.on_close {
            f();
        }
    }
}

impl std::fmt::Debug for HostCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_payment_complete", &self.on_payment_complete.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

/// Parameters of one `open_payment_modal` call.
#[derive(Debug, Clone)]
pub struct PaymentRequestParams {
    /// Fiat amount.
    pub amount: Decimal,
    /// Fiat currency code.
    pub currency: CompactString,
    /// Crypto selected when the modal opens.
    pub crypto: Option<CryptoCode>,
    /// Merchant order id, sent as the external id.
    pub order_id: Option<String>,
    pub callback_url: Option<Url>,
    /// Cryptos the user may switch between.
    pub cryptos: SmallVec<[CryptoCode; 4]>,
    pub callbacks: HostCallbacks,
}

impl PaymentRequestParams {
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            currency: CompactString::new("USD"),
            crypto: None,
            order_id: None,
            callback_url: None,
            cryptos: SmallVec::new(),
            callbacks: HostCallbacks::default(),
        }
    }

    pub fn with_currency(mut self, currency: impl AsRef<str>) -> Self {
        self.currency = currency.as_ref().to_compact_string();
        self
    }

    pub fn with_crypto(mut self, crypto: CryptoCode) -> Self {
        self.crypto = Some(crypto);
        self
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_callback_url(mut self, url: Url) -> Self {
        self.callback_url = Some(url);
        self
    }

    pub fn with_cryptos(mut self, cryptos: impl IntoIterator<Item = CryptoCode>) -> Self {
        self.cryptos = cryptos.into_iter().collect();
        self
    }

    pub fn with_callbacks(mut self, callbacks: HostCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Resolve every default and reject invalid input.
    ///
    /// With no offered list the selected crypto is the only one offered.
    /// With no selection the first offered crypto is used, `BTC` if nothing
    /// is offered at all.
    pub fn validate(self) -> Result<ResolvedParams, ConfigurationError> {
        if self.amount <= Decimal::ZERO {
            return Err(ConfigurationError::InvalidAmount(self.amount));
        }

        let currency = self.currency.trim();
        if currency.is_empty() {
            return Err(ConfigurationError::EmptyCurrency);
        }
        let currency = currency.to_uppercase().to_compact_string();

        let mut offered: SmallVec<[CryptoCode; 4]> = SmallVec::new();
        for code in self.cryptos {
            if !offered.contains(&code) {
                offered.push(code);
            }
        }

        let crypto = match (self.crypto, offered.first()) {
            (Some(crypto), _) => crypto,
            (None, Some(first)) => first.clone(),
            (None, None) => CryptoCode::btc(),
        };
        if offered.is_empty() {
            offered.push(crypto.clone());
        } else if !offered.contains(&crypto) {
            return Err(ConfigurationError::CryptoNotOffered(crypto));
        }

        let order_id = self
            .order_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(PaymentRequestBody::generated_external_id);

        Ok(ResolvedParams {
            amount: self.amount,
            currency,
            crypto,
            offered,
            order_id,
            callback_url: self.callback_url,
            callbacks: self.callbacks,
        })
    }
}

/// Validated parameters with every default filled in.
#[derive(Debug, Clone)]
pub struct ResolvedParams {
    pub amount: Decimal,
    pub currency: CompactString,
    /// Crypto of the first session.
    pub crypto: CryptoCode,
    /// Never empty, no duplicates, contains `crypto`.
    pub offered: SmallVec<[CryptoCode; 4]>,
    pub order_id: String,
    pub callback_url: Option<Url>,
    pub callbacks: HostCallbacks,
}

impl ResolvedParams {
    /// Body of the creation request. Identical for every crypto.
    pub fn request_body(&self) -> PaymentRequestBody {
        PaymentRequestBody {
            external_id: self.order_id.clone(),
            fiat: self.currency.clone(),
            amount: self.amount,
            callback_url: self.callback_url.clone(),
        }
    }

    pub fn offers(&self, crypto: &CryptoCode) -> bool {
        self.offered.contains(crypto)
    }
}
