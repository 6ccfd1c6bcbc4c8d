use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

/// Contact-us form submission captured by the storefront.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSubmission {
    pub id: SubmissionId,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ContactSubmission {
    /// First whitespace-delimited token becomes the first name, the remainder
    /// (possibly empty) the last name.
    pub fn split_name(&self) -> (String, String) {
        let trimmed = self.display_name.trim();
        match trimmed.split_once(char::is_whitespace) {
            Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
            None => (trimmed.to_string(), String::new()),
        }
    }
}
