use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use url::Url;

/// Request payload for `POST /api/v1/{crypto}/payment_request`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequestBody {
    /// Merchant-side order identifier.
    pub external_id: String,
    /// Fiat currency code the amount is denominated in.
    pub fiat: CompactString,
    /// Fiat amount, sent as a decimal string.
    pub amount: rust_decimal::Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<Url>,
}

impl PaymentRequestBody {
    /// Generate an external id for orders the host did not name.
    pub fn generated_external_id() -> String {
        format!("order-{}", uuid::Uuid::now_v7())
    }
}
