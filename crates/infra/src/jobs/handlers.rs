//! Built-in job handlers.
//!
//! Both handlers are dispatch stubs: they validate the payload and log what
//! they would do. Notification delivery and payment processing are wired in
//! elsewhere once those integrations exist.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use reliefq_core::{Job, JobType};

use super::dispatch::{DispatchError, Dispatcher, HandlerError, JobHandler, decode_payload};

const DEFAULT_DONATION_CATEGORY: &str = "general";

/// Payload of a `send_notification` job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationPayload {
    pub message: String,
}

/// Payload of a `process_donation` job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DonationPayload {
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl DonationPayload {
    pub fn category(&self) -> &str {
        self.category.as_deref().unwrap_or(DEFAULT_DONATION_CATEGORY)
    }
}

#[derive(Debug, Default)]
pub struct SendNotificationHandler;

#[async_trait]
impl JobHandler for SendNotificationHandler {
    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        let payload: NotificationPayload = decode_payload(job)?;
        info!(job_id = %job.id(), message = %payload.message, "would send notification");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ProcessDonationHandler;

#[async_trait]
impl JobHandler for ProcessDonationHandler {
    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        let payload: DonationPayload = decode_payload(job)?;

        if !payload.amount.is_finite() || payload.amount <= 0.0 {
            return Err(HandlerError::rejected(format!(
                "donation amount must be positive, got {}",
                payload.amount
            )));
        }
        if payload.currency.trim().is_empty() {
            return Err(HandlerError::rejected("donation currency is required"));
        }

        info!(
            job_id = %job.id(),
            amount = payload.amount,
            currency = %payload.currency,
            category = payload.category(),
            "would process donation"
        );
        Ok(())
    }
}

/// Register every built-in handler.
pub fn register_builtin(dispatcher: &mut Dispatcher) -> Result<(), DispatchError> {
    dispatcher.register(JobType::send_notification(), Arc::new(SendNotificationHandler))?;
    dispatcher.register(JobType::process_donation(), Arc::new(ProcessDonationHandler))?;
    Ok(())
}
