use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::job::TaskKind;

/// A row type stored in one of the backend's result tables.
///
/// Implemented by every per-task result record so the result awaiter can
/// fetch and count rows generically.
pub trait ResultRow: DeserializeOwned + Send + 'static {
    /// Table holding rows of this type.
    const TABLE: &'static str;

    /// Task kind whose jobs write to [`Self::TABLE`].
    const TASK: TaskKind;

    /// Identifier of the job this row belongs to.
    fn job_id(&self) -> i64;
}

/// A customer of the calling service, keyed by the service's own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub external_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub credits: f64,
}

/// A scoped API token issued to a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub id: Option<String>,
    pub key: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub ttl: u64,
    pub quota: u64,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Balance returned after crediting a customer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub current_balance: f64,
}

/// Authenticated user session returned by sign-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<SessionUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

// ── Result rows ─────────────────────────────────────────────────────

/// One generated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    #[serde(default)]
    pub id: Option<String>,
    pub job_id: i64,
    pub uri: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ResultRow for ImageResult {
    const TABLE: &'static str = "results";
    const TASK: TaskKind = TaskKind::Diffusion;

    fn job_id(&self) -> i64 {
        self.job_id
    }
}

/// One BLIP caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlipResult {
    #[serde(default)]
    pub id: Option<String>,
    pub job_id: i64,
    pub caption: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ResultRow for BlipResult {
    const TABLE: &'static str = "blip_results";
    const TASK: TaskKind = TaskKind::Blip;

    fn job_id(&self) -> i64 {
        self.job_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRank {
    pub text: String,
    pub confidence: f64,
}

/// Ranked descriptors produced by CLIP interrogation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipInterrogation {
    pub medium: Vec<TextRank>,
    pub artist: Vec<TextRank>,
    pub trending: Vec<TextRank>,
    pub movement: Vec<TextRank>,
    pub flavors: Vec<TextRank>,
    pub techniques: Vec<TextRank>,
    pub tags: Vec<TextRank>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipInterrogateResult {
    #[serde(default)]
    pub id: Option<String>,
    pub job_id: i64,
    pub interrogation: ClipInterrogation,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ResultRow for ClipInterrogateResult {
    const TABLE: &'static str = "clip_interrogate_results";
    const TASK: TaskKind = TaskKind::ClipInterrogate;

    fn job_id(&self) -> i64 {
        self.job_id
    }
}

/// A fine-tuned model registered by a dreambooth job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DreamboothResult {
    #[serde(default)]
    pub id: Option<String>,
    pub job_id: i64,
    #[serde(default)]
    pub user_id: Option<String>,
    pub diffusion_model_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ResultRow for DreamboothResult {
    const TABLE: &'static str = "dreambooth_results";
    const TASK: TaskKind = TaskKind::Dreambooth;

    fn job_id(&self) -> i64 {
        self.job_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_image_result() {
        let row: ImageResult = serde_json::from_value(json!({
            "id": "3eb82322-ea2e-457d-a778-f3360d2d8611",
            "job_id": 12,
            "uri": "https://storage.googleapis.com/selas-api/results/3eb8.avif",
            "created_at": "2022-10-28T12:00:00+00:00",
            "user_id": "u-1"
        }))
        .unwrap();
        assert_eq!(row.job_id(), 12);
        assert!(row.uri.ends_with(".avif"));
    }

    #[test]
    fn test_result_tables() {
        assert_eq!(ImageResult::TABLE, "results");
        assert_eq!(BlipResult::TABLE, "blip_results");
        assert_eq!(ClipInterrogateResult::TABLE, "clip_interrogate_results");
        assert_eq!(DreamboothResult::TABLE, "dreambooth_results");
    }

    #[test]
    fn test_customer_insert_shape() {
        let customer = Customer {
            id: None,
            external_id: "cus_42".into(),
            user_id: None,
            credits: 0.0,
        };
        let value = serde_json::to_value(&customer).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["external_id"], "cus_42");
    }

    #[test]
    fn test_parse_session() {
        let session: Session = serde_json::from_value(json!({
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "r",
            "user": {"id": "u-1", "email": "a@b.c"}
        }))
        .unwrap();
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.user.unwrap().email.as_deref(), Some("a@b.c"));
    }
}
