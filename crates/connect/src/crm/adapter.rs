use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use kirana_core::domain::quote::{B2bQuote, B2bQuoteId};
use kirana_core::domain::submission::SubmissionId;
use kirana_core::domain::sync::SyncOutcome;
use kirana_core::domain::user::{User, UserId};
use kirana_db::repositories::{QuoteRepository, SubmissionRepository, UserRepository};

use crate::crm::api::CrmApi;
use crate::error::AdapterError;

/// Maps storefront accounts, B2B quotes, and contact-us submissions onto CRM
/// contacts and leads. Every operation is a single attempt; a stored external
/// id makes repeats idempotent.
pub struct CrmSyncAdapter {
    api: Arc<dyn CrmApi>,
    users: Arc<dyn UserRepository>,
    quotes: Arc<dyn QuoteRepository>,
    submissions: Arc<dyn SubmissionRepository>,
}

impl CrmSyncAdapter {
    pub fn new(
        api: Arc<dyn CrmApi>,
        users: Arc<dyn UserRepository>,
        quotes: Arc<dyn QuoteRepository>,
        submissions: Arc<dyn SubmissionRepository>,
    ) -> Self {
        Self { api, users, quotes, submissions }
    }

    /// Upserts the CRM contact for a storefront account. A contact already
    /// linked (or found by email) is updated in place, never duplicated.
    pub async fn sync_user_to_contact(
        &self,
        user_id: &UserId,
    ) -> Result<SyncOutcome, AdapterError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AdapterError::MissingRecord { entity: "user", id: user_id.0.clone() })?;

        let record = contact_record(&user);

        if let Some(contact_id) = &user.crm_contact_id {
            self.api.update_contact(contact_id, &record).await?;
            info!(event_name = "crm.contact_updated", user_id = %user.id.0, contact_id = %contact_id);
            return Ok(SyncOutcome::Completed(
                json!({ "contact_id": contact_id, "action": "updated" }),
            ));
        }

        let (contact_id, action) = match self.api.search_contact_by_email(&user.email).await? {
            Some(existing) => {
                self.api.update_contact(&existing.id, &record).await?;
                (existing.id, "updated")
            }
            None => (self.api.create_contact(&record).await?, "created"),
        };

        self.users.set_crm_contact_id(&user.id, &contact_id).await?;
        info!(event_name = "crm.contact_synced", user_id = %user.id.0, contact_id = %contact_id, action);
        Ok(SyncOutcome::Completed(json!({ "contact_id": contact_id, "action": action })))
    }

    /// Raises a CRM lead for a submitted B2B quote so sales can follow up.
    pub async fn create_lead_from_quote(
        &self,
        quote_id: &B2bQuoteId,
    ) -> Result<SyncOutcome, AdapterError> {
        let quote = self.quotes.find_by_id(quote_id).await?.ok_or_else(|| {
            AdapterError::MissingRecord { entity: "b2b quote", id: quote_id.0.clone() }
        })?;
        let user = self.users.find_by_id(&quote.user_id).await?.ok_or_else(|| {
            AdapterError::MissingRecord { entity: "user", id: quote.user_id.0.clone() }
        })?;

        let record = json!({
            "Last_Name": user.display_name(),
            "Email": user.email,
            "Phone": user.phone,
            "Company": quote.company_name,
            "Lead_Source": "B2B Quote",
            "Description": quote_description(&quote),
        });

        let lead_id = self.api.create_lead(&record).await?;
        info!(event_name = "crm.lead_created", quote_id = %quote.id.0, lead_id = %lead_id);
        Ok(SyncOutcome::Completed(json!({ "lead_id": lead_id })))
    }

    /// Raises a CRM lead for a contact-us submission.
    pub async fn create_lead_from_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SyncOutcome, AdapterError> {
        let submission = self.submissions.find_by_id(submission_id).await?.ok_or_else(|| {
            AdapterError::MissingRecord { entity: "contact submission", id: submission_id.0.clone() }
        })?;

        let (first_name, last_name) = submission.split_name();
        let record = json!({
            "First_Name": first_name,
            "Last_Name": if last_name.is_empty() { submission.display_name.clone() } else { last_name },
            "Email": submission.email,
            "Phone": submission.phone,
            "Lead_Source": "Contact Form",
            "Description": submission.message,
        });

        let lead_id = self.api.create_lead(&record).await?;
        info!(event_name = "crm.lead_created", submission_id = %submission.id.0, lead_id = %lead_id);
        Ok(SyncOutcome::Completed(json!({ "lead_id": lead_id })))
    }
}

fn contact_record(user: &User) -> Value {
    json!({
        "First_Name": user.first_name,
        "Last_Name": user.last_name,
        "Email": user.email,
        "Phone": user.phone,
        "Account_Name": user.company,
        "GSTIN": user.gstin,
        "Customer_Segment": user.segment,
    })
}

fn quote_description(quote: &B2bQuote) -> String {
    let mut parts: Vec<String> = quote
        .lines
        .iter()
        .map(|line| format!("{} x {} @ {}", line.quantity, line.description, line.unit_price))
        .collect();
    match quote.notes.as_deref().filter(|value| !value.trim().is_empty()) {
        Some(notes) => parts.push(format!("Notes: {notes}")),
        None => parts.push(format!("B2B quote request from {}", quote.company_name)),
    }
    parts.join("\n")
}
