//! Wire objects exchanged with the payment-processing API.

mod identifiers;
mod invoice;
mod payment_request;

pub use identifiers::{CryptoCode, InvoiceId};
pub use invoice::{Invoice, InvoiceStatus, InvoiceStatusReport, RawInvoice, RawStatusReport};
pub use payment_request::PaymentRequestBody;
