use std::sync::Arc;

use serde_json::Value;

use kirana_core::domain::sync::TargetService;

use crate::error::AdapterError;
use crate::token::TokenManager;

/// Inventory item as the accounting service reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteItem {
    pub id: String,
    pub stock_on_hand: Option<i64>,
}

#[async_trait::async_trait]
pub trait AccountingApi: Send + Sync {
    async fn search_contact_by_email(
        &self,
        email: &str,
    ) -> Result<Option<String>, AdapterError>;

    async fn create_contact(&self, record: &Value) -> Result<String, AdapterError>;

    async fn create_invoice(&self, record: &Value) -> Result<String, AdapterError>;

    async fn create_estimate(&self, record: &Value) -> Result<String, AdapterError>;

    async fn search_item_by_sku(&self, sku: &str) -> Result<Option<RemoteItem>, AdapterError>;

    async fn create_item(&self, record: &Value) -> Result<String, AdapterError>;

    async fn update_item(&self, item_id: &str, record: &Value) -> Result<(), AdapterError>;

    async fn fetch_item(&self, item_id: &str) -> Result<RemoteItem, AdapterError>;
}

pub struct HttpAccountingApi {
    client: reqwest::Client,
    base_url: String,
    organization_id: Option<String>,
    tokens: Arc<TokenManager>,
}

impl HttpAccountingApi {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        organization_id: Option<String>,
        tokens: Arc<TokenManager>,
    ) -> Self {
        Self { client, base_url, organization_id, tokens }
    }

    async fn auth_header(&self) -> Result<String, AdapterError> {
        let token = self.tokens.get_valid_token(TargetService::Accounting).await?;
        Ok(format!("Zoho-oauthtoken {token}"))
    }

    fn org_query(&self) -> Vec<(&'static str, String)> {
        self.organization_id
            .as_deref()
            .map(|org| vec![("organization_id", org.to_string())])
            .unwrap_or_default()
    }

    async fn post_record(
        &self,
        path: &str,
        id_key: &str,
        record: &Value,
    ) -> Result<String, AdapterError> {
        let auth = self.auth_header().await?;
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .header("Authorization", auth)
            .query(&self.org_query())
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Api {
                service: TargetService::Accounting,
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<Value>().await?;
        // Creates answer with the record nested under its singular name, e.g.
        // `{"invoice": {"invoice_id": "..."}}`.
        body[path.trim_end_matches('s')][id_key]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AdapterError::UnexpectedResponse {
                service: TargetService::Accounting,
                detail: format!("no `{id_key}` in {path} create response"),
            })
    }

    async fn get_json(
        &self,
        path: &str,
        extra_query: &[(&str, &str)],
    ) -> Result<Value, AdapterError> {
        let auth = self.auth_header().await?;
        let response = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .header("Authorization", auth)
            .query(&self.org_query())
            .query(extra_query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Api {
                service: TargetService::Accounting,
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait::async_trait]
impl AccountingApi for HttpAccountingApi {
    async fn search_contact_by_email(
        &self,
        email: &str,
    ) -> Result<Option<String>, AdapterError> {
        let body = self.get_json("contacts", &[("email", email)]).await?;
        Ok(body["contacts"][0]["contact_id"].as_str().map(str::to_string))
    }

    async fn create_contact(&self, record: &Value) -> Result<String, AdapterError> {
        self.post_record("contacts", "contact_id", record).await
    }

    async fn create_invoice(&self, record: &Value) -> Result<String, AdapterError> {
        self.post_record("invoices", "invoice_id", record).await
    }

    async fn create_estimate(&self, record: &Value) -> Result<String, AdapterError> {
        self.post_record("estimates", "estimate_id", record).await
    }

    async fn search_item_by_sku(&self, sku: &str) -> Result<Option<RemoteItem>, AdapterError> {
        let body = self.get_json("items", &[("sku", sku)]).await?;
        Ok(item_from_body(&body["items"][0]))
    }

    async fn create_item(&self, record: &Value) -> Result<String, AdapterError> {
        self.post_record("items", "item_id", record).await
    }

    async fn update_item(&self, item_id: &str, record: &Value) -> Result<(), AdapterError> {
        let auth = self.auth_header().await?;
        let response = self
            .client
            .put(format!("{}/items/{item_id}", self.base_url))
            .header("Authorization", auth)
            .query(&self.org_query())
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Api {
                service: TargetService::Accounting,
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    async fn fetch_item(&self, item_id: &str) -> Result<RemoteItem, AdapterError> {
        let body = self.get_json(&format!("items/{item_id}"), &[]).await?;
        item_from_body(&body["item"]).ok_or_else(|| AdapterError::UnexpectedResponse {
            service: TargetService::Accounting,
            detail: format!("no `item_id` in item {item_id} response"),
        })
    }
}

fn item_from_body(value: &Value) -> Option<RemoteItem> {
    let id = value["item_id"].as_str()?;
    let stock_on_hand = value["stock_on_hand"]
        .as_i64()
        .or_else(|| value["stock_on_hand"].as_f64().map(|stock| stock as i64));
    Some(RemoteItem { id: id.to_string(), stock_on_hand })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::item_from_body;

    #[test]
    fn item_stock_reads_integer_and_float_encodings() {
        let int_item = item_from_body(&json!({ "item_id": "it-1", "stock_on_hand": 42 }));
        assert_eq!(int_item.expect("item").stock_on_hand, Some(42));

        let float_item = item_from_body(&json!({ "item_id": "it-2", "stock_on_hand": 17.0 }));
        assert_eq!(float_item.expect("item").stock_on_hand, Some(17));

        let no_stock = item_from_body(&json!({ "item_id": "it-3" }));
        assert_eq!(no_stock.expect("item").stock_on_hand, None);
    }

    #[test]
    fn missing_item_id_yields_none() {
        assert!(item_from_body(&json!({ "stock_on_hand": 5 })).is_none());
        assert!(item_from_body(&json!(null)).is_none());
    }
}
