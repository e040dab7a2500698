use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

use crate::awaiter::{self, AwaitOutcome, IntervalScheduler, ResultSource};
use crate::config::{Credential, SelasConfig};
use crate::error::{AwaitError, Result, SelasError, SubmissionError};
use crate::job::{Job, JobConfig};
use crate::request::{self, DreamboothRequest, StableDiffusionRequest};
use crate::types::*;

/// Async client for the Selas backend.
///
/// Wraps the backend's auth, row-store and RPC endpoints, and waits for job
/// results by polling the result tables. Cheap to clone; clones share the
/// connection pool.
///
/// # Example
/// ```no_run
/// use selas_rs::{SelasClient, SelasConfig};
///
/// # async fn example() -> selas_rs::Result<()> {
/// let client = SelasClient::new(SelasConfig::new("https://xyz.supabase.co", "anon-key"));
/// let customer = client.get_customer("cus_42").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SelasClient {
    http: Client,
    config: SelasConfig,
}

impl SelasClient {
    pub fn new(config: SelasConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    /// Build a client from `SELAS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(SelasConfig::from_env()?))
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// The same client authenticated with `credential` instead.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.config.credential = credential;
        self
    }

    pub fn config(&self) -> &SelasConfig {
        &self.config
    }

    // ── Auth ────────────────────────────────────────────────────────

    /// Sign in with email and password.
    ///
    /// The returned session is not installed on this client; pass it to
    /// [`with_credential`](Self::with_credential) to act as that user.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}/auth/v1/token", self.config.url);
        let req = self
            .http
            .post(&url)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "password": password }));

        let resp = self.send(req, "Failed to sign in").await?;
        let session: Session = parse_json(resp, "Failed to parse sign-in response").await?;
        tracing::info!(user_id = ?session.user.as_ref().map(|u| u.id.as_str()), "Signed in");
        Ok(session)
    }

    // ── Customers ───────────────────────────────────────────────────

    /// Look up a customer by the caller's own id. `None` if unknown.
    pub async fn get_customer(&self, external_id: &str) -> Result<Option<Customer>> {
        let customers: Vec<Customer> = self.select("customers", "external_id", external_id).await?;
        Ok(customers.into_iter().next())
    }

    pub async fn create_customer(&self, external_id: &str) -> Result<Customer> {
        let rows: Vec<Customer> = self
            .insert("customers", &json!({ "external_id": external_id }))
            .await?;
        let customer = rows.into_iter().next().ok_or_else(|| {
            SelasError::InvalidResponse(format!("Customer {} was not returned after insert", external_id))
        })?;
        tracing::info!(external_id, "Customer created");
        Ok(customer)
    }

    pub async fn delete_customer(&self, external_id: &str) -> Result<()> {
        self.delete("customers", "external_id", external_id).await?;
        tracing::info!(external_id, "Customer deleted");
        Ok(())
    }

    /// Add credits to a customer and return the new balance.
    pub async fn add_credits(&self, external_id: &str, credits: f64) -> Result<CreditBalance> {
        let balance: f64 = self
            .rpc(
                "provide_credits_to_customer",
                &json!({ "p_external_id": external_id, "p_nb_credits": credits }),
            )
            .await?;
        tracing::info!(external_id, credits, balance, "Credits added");
        Ok(CreditBalance {
            current_balance: balance,
        })
    }

    /// Issue a customer-scoped API token.
    ///
    /// The usual values are a quota of 1, a ttl of 60 and an empty
    /// description.
    pub async fn create_token(
        &self,
        external_id: &str,
        quota: u64,
        ttl: u64,
        description: &str,
    ) -> Result<Token> {
        let token: Token = self
            .rpc(
                "create_token",
                &json!({
                    "target_external_id": external_id,
                    "target_quota": quota,
                    "target_ttl": ttl,
                    "target_description": description,
                }),
            )
            .await?;
        tracing::info!(external_id, quota, ttl, "Token created");
        Ok(token)
    }

    // ── Jobs ────────────────────────────────────────────────────────

    /// Post a job to the backend.
    ///
    /// The backend debits the job's cost as soon as it accepts it, so this
    /// is never retried: submitting the same config twice creates two jobs.
    pub async fn submit(&self, config: JobConfig, token_key: Option<&str>) -> std::result::Result<Job, SubmissionError> {
        let mut args = json!({ "config": config });
        if let Some(key) = token_key {
            args["token_key"] = json!(key);
        }

        let job: Job = self.rpc("post_job", &args).await?;
        tracing::info!(job_id = ?job.id, cost = ?job.job_cost, kind = %job.config.kind(), "Job posted");
        Ok(job)
    }

    pub async fn run_stable_diffusion(
        &self,
        request: &StableDiffusionRequest,
        token_key: Option<&str>,
    ) -> std::result::Result<Job, SubmissionError> {
        self.submit(request.build(), token_key).await
    }

    pub async fn run_blip_caption(&self, url: &str, token_key: Option<&str>) -> std::result::Result<Job, SubmissionError> {
        self.submit(request::blip_caption(url), token_key).await
    }

    pub async fn run_clip_interrogate(
        &self,
        url: &str,
        token_key: Option<&str>,
    ) -> std::result::Result<Job, SubmissionError> {
        self.submit(request::clip_interrogate(url), token_key).await
    }

    pub async fn run_dreambooth(
        &self,
        request: &DreamboothRequest,
        token_key: Option<&str>,
    ) -> std::result::Result<Job, SubmissionError> {
        self.submit(request.build(), token_key).await
    }

    // ── Results ─────────────────────────────────────────────────────

    /// All rows of type `R` currently stored for `job_id`, in store order.
    pub async fn fetch_rows<R: ResultRow>(&self, job_id: i64) -> Result<Vec<R>> {
        self.select(R::TABLE, "job_id", &job_id.to_string()).await
    }

    pub async fn get_results(&self, job_id: i64) -> Result<Vec<ImageResult>> {
        self.fetch_rows(job_id).await
    }

    pub async fn get_blip_results(&self, job_id: i64) -> Result<Vec<BlipResult>> {
        self.fetch_rows(job_id).await
    }

    pub async fn get_clip_interrogate_results(&self, job_id: i64) -> Result<Vec<ClipInterrogateResult>> {
        self.fetch_rows(job_id).await
    }

    pub async fn get_dreambooth_results(&self, job_id: i64) -> Result<Vec<DreamboothResult>> {
        self.fetch_rows(job_id).await
    }

    // ── Completion waiting ──────────────────────────────────────────

    /// Poll the job's result table every `poll_interval` until all of its
    /// results are stored, a fetch fails, or `timeout` runs out.
    ///
    /// Partial results are dropped on timeout; use
    /// [`await_outcome`](Self::await_outcome) to keep them.
    pub async fn await_results<R: ResultRow>(
        &self,
        job: &Job,
        timeout: Duration,
    ) -> std::result::Result<Vec<R>, AwaitError> {
        let mut scheduler = IntervalScheduler::new(self.config.poll_interval);
        awaiter::await_results(self, &mut scheduler, job, timeout).await
    }

    /// Like [`await_results`](Self::await_results), returning partial
    /// results on timeout.
    pub async fn await_outcome<R: ResultRow>(
        &self,
        job: &Job,
        timeout: Duration,
    ) -> std::result::Result<AwaitOutcome<R>, AwaitError> {
        let mut scheduler = IntervalScheduler::new(self.config.poll_interval);
        awaiter::await_outcome(self, &mut scheduler, job, timeout).await
    }

    // ── Row store / RPC ─────────────────────────────────────────────

    /// Call a remote procedure and decode its return value.
    pub async fn rpc<T: DeserializeOwned>(&self, function: &str, args: &Value) -> Result<T> {
        let url = format!("{}/rest/v1/rpc/{}", self.config.url, function);
        let req = self.authed(Method::POST, &url).json(args);
        let resp = self.send(req, format!("Failed to call {}", function)).await?;
        parse_json(resp, &format!("Failed to parse {} response", function)).await
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, column: &str, value: &str) -> Result<Vec<T>> {
        let url = format!("{}/rest/v1/{}", self.config.url, table);
        let req = self
            .authed(Method::GET, &url)
            .query(&[("select", "*".to_string()), (column, format!("eq.{}", value))]);
        let resp = self.send(req, format!("Failed to query {}", table)).await?;
        parse_json(resp, &format!("Failed to parse {} rows", table)).await
    }

    async fn insert<T: DeserializeOwned>(&self, table: &str, row: &Value) -> Result<Vec<T>> {
        let url = format!("{}/rest/v1/{}", self.config.url, table);
        let req = self
            .authed(Method::POST, &url)
            .header("Prefer", "return=representation")
            .json(row);
        let resp = self.send(req, format!("Failed to insert into {}", table)).await?;
        parse_json(resp, &format!("Failed to parse inserted {} rows", table)).await
    }

    async fn delete(&self, table: &str, column: &str, value: &str) -> Result<()> {
        let url = format!("{}/rest/v1/{}", self.config.url, table);
        let req = self
            .authed(Method::DELETE, &url)
            .query(&[(column, format!("eq.{}", value))]);
        self.send(req, format!("Failed to delete from {}", table)).await?;
        Ok(())
    }

    fn authed(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.config.credential.bearer())
    }

    async fn send(&self, req: RequestBuilder, context: impl Into<String>) -> Result<Response> {
        let resp = req
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| SelasError::Network {
                context: format!("{} at {}", context.into(), self.config.url),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(backend_error(status, &body));
        }
        Ok(resp)
    }
}

#[async_trait]
impl<R: ResultRow> ResultSource<R> for SelasClient {
    async fn fetch_results(&self, job_id: i64) -> Result<Vec<R>> {
        self.fetch_rows(job_id).await
    }
}

async fn parse_json<T: DeserializeOwned>(resp: Response, context: &str) -> Result<T> {
    resp.json().await.map_err(|e| SelasError::Network {
        context: context.to_string(),
        source: e,
    })
}

/// Turn an error body from the row store, RPC or auth endpoints into a
/// [`SelasError::Backend`].
fn backend_error(status: u16, body: &str) -> SelasError {
    let json: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        json.as_ref()
            .and_then(|j| j.get(name))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let message = field("message")
        .or_else(|| field("error_description"))
        .or_else(|| field("msg"))
        .or_else(|| field("error"))
        .unwrap_or_else(|| body.to_string());

    SelasError::Backend {
        status,
        message,
        hint: field("hint"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_URL;

    #[test]
    fn test_client_builder() {
        let client = SelasClient::new(SelasConfig::new("https://example.supabase.co/", "anon"))
            .with_credential(Credential::StaticToken("service".into()));
        assert_eq!(client.config().url, "https://example.supabase.co");
        assert_eq!(client.config().credential.bearer(), "service");
        assert_eq!(client.config().anon_key, "anon");
    }

    #[test]
    fn test_authed_request_headers() {
        let client = SelasClient::new(SelasConfig::new(DEFAULT_URL, "anon"));
        let req = client
            .authed(Method::GET, "https://example.supabase.co/rest/v1/results")
            .build()
            .unwrap();
        assert_eq!(req.headers()["apikey"], "anon");
        assert_eq!(req.headers()["authorization"], "Bearer anon");
    }

    #[test]
    fn test_backend_error_postgrest_body() {
        let err = backend_error(
            400,
            r#"{"code":"P0001","details":null,"hint":"Top up first","message":"Not enough credits"}"#,
        );
        match err {
            SelasError::Backend { status, message, hint } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Not enough credits");
                assert_eq!(hint.as_deref(), Some("Top up first"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_backend_error_auth_body() {
        let err = backend_error(400, r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#);
        assert_eq!(err.backend_message(), Some("Invalid login credentials"));
    }

    #[test]
    fn test_backend_error_plain_body() {
        let err = backend_error(502, "Bad Gateway");
        assert_eq!(err.backend_message(), Some("Bad Gateway"));
        assert_eq!(err.to_string(), "Selas returned HTTP 502: Bad Gateway");
    }
}
