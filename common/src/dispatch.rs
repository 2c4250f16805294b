// Notification dispatcher
// Runs on the firing task: push first, then record the delivery in the history log

use crate::history::HistoryLog;
use crate::models::{NotificationPayload, NotificationRecord, TriggerKind};
use crate::push::{PushDelivery, PushMessage};
use crate::telemetry;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Outcome of one fired trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// The push service accepted the notification
    Delivered { history_recorded: bool },
    /// The push service did not accept it; nothing was recorded
    DeliveryFailed(String),
}

impl DispatchResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchResult::Delivered { .. })
    }
}

/// Delivers fired notifications. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    push: Arc<dyn PushDelivery>,
    history: Arc<dyn HistoryLog>,
}

impl Dispatcher {
    pub fn new(push: Arc<dyn PushDelivery>, history: Arc<dyn HistoryLog>) -> Self {
        Self { push, history }
    }

    /// Deliver one notification. Failures are logged and counted, never retried.
    #[instrument(skip(self, payload), fields(
        kind = %kind,
        user_id = %payload.user_id,
        session_id = %payload.session_id
    ))]
    pub async fn dispatch(&self, kind: TriggerKind, payload: &NotificationPayload) -> DispatchResult {
        let message = PushMessage::from(payload);

        if let Err(e) = self.push.send(&message).await {
            error!(error = %e, "Push delivery failed");
            telemetry::record_delivery_failure(kind.as_str(), delivery_failure_reason(&e));
            return DispatchResult::DeliveryFailed(e.to_string());
        }
        telemetry::record_delivery_success(kind.as_str());

        let record = NotificationRecord::sent_now(payload);
        let history_recorded = match self.history.append(&payload.user_id, &record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Notification delivered but not recorded in history");
                telemetry::record_history_failure();
                false
            }
        };

        info!(history_recorded, "Notification delivered");
        DispatchResult::Delivered { history_recorded }
    }
}

fn delivery_failure_reason(err: &crate::errors::DeliveryError) -> &'static str {
    use crate::errors::DeliveryError;
    match err {
        DeliveryError::RequestFailed(_) => "request_failed",
        DeliveryError::Rejected { .. } => "rejected",
        DeliveryError::TicketError(_) => "ticket_error",
    }
}
