use std::sync::Arc;

use serde_json::Value;

use kirana_core::domain::sync::TargetService;

use crate::error::AdapterError;
use crate::token::TokenManager;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteContact {
    pub id: String,
}

/// Thin client over the CRM's REST API. The adapter above it owns all
/// mapping decisions; this layer only moves records.
#[async_trait::async_trait]
pub trait CrmApi: Send + Sync {
    async fn search_contact_by_email(
        &self,
        email: &str,
    ) -> Result<Option<RemoteContact>, AdapterError>;

    async fn create_contact(&self, record: &Value) -> Result<String, AdapterError>;

    async fn update_contact(&self, contact_id: &str, record: &Value)
        -> Result<(), AdapterError>;

    async fn create_lead(&self, record: &Value) -> Result<String, AdapterError>;
}

pub struct HttpCrmApi {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenManager>,
}

impl HttpCrmApi {
    pub fn new(client: reqwest::Client, base_url: String, tokens: Arc<TokenManager>) -> Self {
        Self { client, base_url, tokens }
    }

    async fn auth_header(&self) -> Result<String, AdapterError> {
        let token = self.tokens.get_valid_token(TargetService::Crm).await?;
        Ok(format!("Zoho-oauthtoken {token}"))
    }

    async fn post_record(&self, module: &str, record: &Value) -> Result<String, AdapterError> {
        let auth = self.auth_header().await?;
        let response = self
            .client
            .post(format!("{}/{module}", self.base_url))
            .header("Authorization", auth)
            .json(&serde_json::json!({ "data": [record] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Api {
                service: TargetService::Crm,
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<Value>().await?;
        created_record_id(&body).ok_or_else(|| AdapterError::UnexpectedResponse {
            service: TargetService::Crm,
            detail: format!("no record id in {module} create response"),
        })
    }
}

#[async_trait::async_trait]
impl CrmApi for HttpCrmApi {
    async fn search_contact_by_email(
        &self,
        email: &str,
    ) -> Result<Option<RemoteContact>, AdapterError> {
        let auth = self.auth_header().await?;
        let response = self
            .client
            .get(format!("{}/Contacts/search", self.base_url))
            .header("Authorization", auth)
            .query(&[("email", email)])
            .send()
            .await?;

        let status = response.status();
        // The search endpoint answers 204 when nothing matches.
        if status.as_u16() == 204 {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Api {
                service: TargetService::Crm,
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<Value>().await?;
        Ok(body["data"][0]["id"].as_str().map(|id| RemoteContact { id: id.to_string() }))
    }

    async fn create_contact(&self, record: &Value) -> Result<String, AdapterError> {
        self.post_record("Contacts", record).await
    }

    async fn update_contact(
        &self,
        contact_id: &str,
        record: &Value,
    ) -> Result<(), AdapterError> {
        let auth = self.auth_header().await?;
        let response = self
            .client
            .put(format!("{}/Contacts/{contact_id}", self.base_url))
            .header("Authorization", auth)
            .json(&serde_json::json!({ "data": [record] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Api {
                service: TargetService::Crm,
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    async fn create_lead(&self, record: &Value) -> Result<String, AdapterError> {
        self.post_record("Leads", record).await
    }
}

fn created_record_id(body: &Value) -> Option<String> {
    body["data"][0]["details"]["id"].as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::created_record_id;

    #[test]
    fn record_id_is_read_from_create_response_details() {
        let body = json!({
            "data": [{ "code": "SUCCESS", "details": { "id": "523000000123" } }]
        });
        assert_eq!(created_record_id(&body).as_deref(), Some("523000000123"));
    }

    #[test]
    fn malformed_create_response_yields_none() {
        assert_eq!(created_record_id(&json!({ "data": [] })), None);
        assert_eq!(created_record_id(&json!({})), None);
    }
}
