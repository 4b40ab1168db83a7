//! Host facing entry points.

use crate::clock::{Clock, SystemClock};
use crate::controller::{ModalController, Timings};
use crate::events::{ModalCommand, ModalCommandSender, modal_command_channel};
use crate::params::PaymentRequestParams;
use crate::view::{ModalView, ModalViewState};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use torpay_sdk::client::InvoiceClient;
use torpay_sdk::demo::DemoInvoiceService;
use torpay_sdk::objects::CryptoCode;
use torpay_sdk::{ConfigurationError, InvoiceService, WidgetConfig};
use tracing::{debug, info};

/// An initialized widget. Opens any number of independent payment modals.
#[derive(Clone)]
pub struct CheckoutWidget {
    service: Arc<dyn InvoiceService>,
    clock: Arc<dyn Clock>,
    timings: Timings,
}

impl CheckoutWidget {
    /// Validate `config` and build the invoice service it describes.
    pub fn init(config: WidgetConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let service: Arc<dyn InvoiceService> = if config.demo {
            info!("Demo mode, invoices are served offline");
            Arc::new(DemoInvoiceService::new().with_invoice_ttl(config.invoice_ttl))
        } else {
            Arc::new(InvoiceClient::from_config(&config)?)
        };
        Ok(Self {
            service,
            clock: Arc::new(SystemClock),
            timings: Timings::from_config(&config),
        })
    }

    /// Use a host provided invoice service. Only the timer options of
    /// `config` are read.
    pub fn with_service(
        config: &WidgetConfig,
        service: Arc<dyn InvoiceService>,
    ) -> Result<Self, ConfigurationError> {
        config.validate_timings()?;
        Ok(Self {
            service,
            clock: Arc::new(SystemClock),
            timings: Timings::from_config(config),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Open a payment modal and start its first session.
    ///
    /// Invalid parameters fail here, before any request is made. Must be
    /// called within a tokio runtime.
    pub fn open_payment_modal(
        &self,
        params: PaymentRequestParams,
    ) -> Result<ModalHandle, ConfigurationError> {
        let params = params.validate()?;
        let (commands, commands_rx) = modal_command_channel();
        let controller = ModalController::new(
            self.service.clone(),
            self.clock.clone(),
            self.timings,
            params,
            commands_rx,
        );
        let view = controller.subscribe_view();
        let transitions = controller.subscribe_transitions();
        tokio::spawn(controller.run());
        Ok(ModalHandle {
            commands,
            view,
            transitions,
        })
    }
}

/// Handle to one open payment modal.
///
/// Dropping the handle closes the modal without calling `on_close`.
pub struct ModalHandle {
    commands: ModalCommandSender,
    view: watch::Receiver<ModalView>,
    transitions: broadcast::Receiver<ModalViewState>,
}

impl ModalHandle {
    /// Close the modal. Does nothing if it already closed.
    pub async fn close_modal(&self) {
        if self.commands.send(ModalCommand::Close).await.is_err() {
            debug!("Close requested on a modal that already closed");
        }
    }

    /// Replace the current invoice with one for `crypto`.
    ///
    /// Ignored unless `crypto` is offered and differs from the current one,
    /// and once the invoice is paid.
    pub async fn switch_crypto(&self, crypto: CryptoCode) {
        if self
            .commands
            .send(ModalCommand::SwitchCrypto(crypto))
            .await
            .is_err()
        {
            debug!("Switch requested on a modal that already closed");
        }
    }

    pub fn view(&self) -> watch::Receiver<ModalView> {
        self.view.clone()
    }

    pub fn state(&self) -> ModalViewState {
        self.view.borrow().state
    }

    pub fn is_closed(&self) -> bool {
        self.view.borrow().closed
    }

    /// Every state the modal entered, starting with the first `Loading`.
    pub fn transitions(&mut self) -> &mut broadcast::Receiver<ModalViewState> {
        &mut self.transitions
    }

    /// Wait for the modal to close on its own or through [`close_modal`].
    ///
    /// Only a paid modal closes on its own. An expired or failed one stays
    /// open until [`close_modal`] is called, which may run concurrently with
    /// this future.
    ///
    /// [`close_modal`]: ModalHandle::close_modal
    pub async fn closed(&self) {
        let mut view = self.view.clone();
        if view.wait_for(|view| view.closed).await.is_err() {
            debug!("Modal controller exited without marking the view closed");
        }
    }
}
