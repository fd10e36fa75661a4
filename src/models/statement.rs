use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Uploaded financial statement as stored in `financial_statements`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatement {
    pub id: String,
    #[serde(skip_serializing)]
    pub user_id: String,
    pub file_name: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub statement_type: String,
    pub upload_date: String,
    pub file_type: String,
    pub file_size: i64,
    pub parsed_data: Option<Value>,
    pub metadata: Option<Value>,
}

/// List view of a statement (no parsed payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementSummary {
    pub id: String,
    pub file_name: String,
    pub statement_type: String,
    pub upload_date: String,
    pub file_type: String,
    pub file_size: i64,
    pub metadata: Option<Value>,
}

impl From<&FinancialStatement> for StatementSummary {
    fn from(s: &FinancialStatement) -> Self {
        Self {
            id: s.id.clone(),
            file_name: s.file_name.clone(),
            statement_type: s.statement_type.clone(),
            upload_date: s.upload_date.clone(),
            file_type: s.file_type.clone(),
            file_size: s.file_size,
            metadata: s.metadata.clone(),
        }
    }
}

/// Local mirror of an identity-provider user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub is_active: bool,
}
