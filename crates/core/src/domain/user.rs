use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Storefront account as seen by the sync subsystem.
///
/// The external-id columns (`crm_contact_id`, `accounting_contact_id`) are the
/// only fields this subsystem writes; everything else is read-only input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub gstin: Option<String>,
    pub segment: Option<String>,
    pub crm_contact_id: Option<String>,
    pub accounting_contact_id: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}
