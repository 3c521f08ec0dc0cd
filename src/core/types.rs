use serde::{Deserialize, Serialize};

use crate::harvest::store::ContactRecord;

#[derive(Debug, Serialize, Deserialize)]
pub struct HarvestRequest {
    /// URL of the post whose comment thread is harvested.
    pub post_url: String,
    /// Caller-supplied run id; a v4 UUID is generated when absent.
    #[serde(default)]
    pub run_id: Option<String>,
    /// Optional sign-in credentials. Both fields must be present for the
    /// best-effort login to be attempted at all.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    // Per-run overrides of the env-var defaults.
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
    #[serde(default)]
    pub inactivity_secs: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub scroll_steps: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HarvestResponse {
    /// `"success"` when at least one record was found, `"no data found"` otherwise.
    pub status: String,
    pub run_id: String,
    pub post_url: String,
    pub identifiers_found: usize,
    pub elapsed_seconds: f64,
    /// Path of the flat per-run sink file (only created once a delta lands).
    pub result_location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub results: Vec<ContactRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub run_id: String,
    #[serde(default = "default_download_format")]
    pub format: String,
}

fn default_download_format() -> String {
    "csv".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harvest_request_minimal_json() {
        let req: HarvestRequest =
            serde_json::from_str(r#"{"post_url": "https://example.com/posts/1"}"#).unwrap();
        assert_eq!(req.post_url, "https://example.com/posts/1");
        assert!(req.run_id.is_none());
        assert!(req.email.is_none());
        assert!(req.headless.is_none());
    }

    #[test]
    fn download_query_defaults_to_csv() {
        let q: DownloadQuery = serde_json::from_str(r#"{"run_id": "abc"}"#).unwrap();
        assert_eq!(q.format, "csv");
    }

    #[test]
    fn error_field_omitted_when_none() {
        let resp = HarvestResponse {
            status: "no data found".into(),
            run_id: "r1".into(),
            post_url: "https://example.com/p".into(),
            identifiers_found: 0,
            elapsed_seconds: 0.0,
            result_location: "results/r1.txt".into(),
            error: None,
            results: vec![],
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("\"error\""));
    }
}
