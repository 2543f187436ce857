//! BigQuery billing export source
//!
//! Queries the Cloud Billing export table through the BigQuery REST API
//! (`jobs.query` followed by `jobs.getQueryResults` while the job is still
//! running or more pages remain). Rows are pre-aggregated per day, project,
//! SKU and currency by the query and validated once here.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::{UsageSource, WarehouseError};
use crate::models::{LookbackWindow, UsageRow};

/// Public BigQuery API endpoint
pub const DEFAULT_BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com";

/// GCE/Cloud Run metadata server token endpoint
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Server-side wait per `getQueryResults` call
const QUERY_TIMEOUT_MS: u64 = 10_000;

/// Upper bound on `getQueryResults` calls for one run
const MAX_RESULT_CALLS: u32 = 100;

const PAGE_SIZE: u32 = 10_000;

const UNATTRIBUTED_PROJECT: &str = "(unattributed)";

/// Fully qualified `project.dataset.table` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    /// Parse `project.dataset.table`.
    ///
    /// Domain-scoped projects (`example.com:project`) are accepted. Only
    /// identifier characters are allowed since the id is spliced into SQL.
    pub fn parse(id: &str) -> Result<Self, WarehouseError> {
        let invalid = || WarehouseError::InvalidTableId(id.to_string());

        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':');
        if id.is_empty() || !id.chars().all(allowed) {
            return Err(invalid());
        }

        let mut parts = id.rsplitn(3, '.');
        let table = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let dataset = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let project = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// How the source authenticates against BigQuery
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Pre-issued OAuth access token
    AccessToken(String),
    /// Fetch a token from the metadata server at this URL
    MetadataServer(Url),
}

/// Configuration for [`BigQuerySource`]
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub table: TableRef,
    /// Project the query job runs in
    pub billing_project: String,
    pub endpoint: Url,
    pub credentials: Credentials,
    pub timeout: Duration,
}

impl BigQueryConfig {
    /// Defaults for a table: job runs in the table's project, metadata
    /// server credentials, public endpoint
    pub fn for_table(table: TableRef) -> Result<Self, WarehouseError> {
        let endpoint = Url::parse(DEFAULT_BIGQUERY_ENDPOINT)
            .map_err(|e| WarehouseError::Response(e.to_string()))?;
        let metadata = Url::parse(METADATA_TOKEN_URL)
            .map_err(|e| WarehouseError::Response(e.to_string()))?;

        Ok(Self {
            billing_project: table.project.clone(),
            table,
            endpoint,
            credentials: Credentials::MetadataServer(metadata),
            timeout: Duration::from_secs(30),
        })
    }
}

/// Fetches usage rows from a BigQuery billing export table
pub struct BigQuerySource {
    config: BigQueryConfig,
    client: Client,
}

impl BigQuerySource {
    pub fn new(config: BigQueryConfig) -> Result<Self, WarehouseError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| WarehouseError::Http {
                endpoint: config.endpoint.to_string(),
                source,
            })?;

        Ok(Self { config, client })
    }

    /// SQL for the lookback window, with `@start_day` / `@end_day` parameters
    pub fn query_sql(&self) -> String {
        format!(
            "SELECT \
               DATE(usage_start_time) AS day, \
               IFNULL(project.id, '{unattributed}') AS project_id, \
               sku.id AS sku_id, \
               sku.description AS sku_description, \
               CAST(SUM(cost) AS NUMERIC) AS cost, \
               currency \
             FROM `{table}` \
             WHERE DATE(usage_start_time) BETWEEN @start_day AND @end_day \
             GROUP BY day, project_id, sku_id, sku_description, currency",
            unattributed = UNATTRIBUTED_PROJECT,
            table = self.config.table,
        )
    }

    async fn access_token(&self) -> Result<String, WarehouseError> {
        match &self.config.credentials {
            Credentials::AccessToken(token) => Ok(token.clone()),
            Credentials::MetadataServer(url) => {
                let response = self
                    .client
                    .get(url.clone())
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| WarehouseError::Auth(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(WarehouseError::Auth(format!(
                        "metadata server returned {}",
                        response.status()
                    )));
                }

                let token: MetadataToken = response
                    .json()
                    .await
                    .map_err(|e| WarehouseError::Auth(e.to_string()))?;
                Ok(token.access_token)
            }
        }
    }

    fn api_url(&self, path: &str) -> Result<Url, WarehouseError> {
        self.config
            .endpoint
            .join(path)
            .map_err(|e| WarehouseError::Response(format!("invalid endpoint path {}: {}", path, e)))
    }

    async fn start_query(
        &self,
        token: &str,
        window: LookbackWindow,
    ) -> Result<QueryResponse, WarehouseError> {
        let url = self.api_url(&format!(
            "bigquery/v2/projects/{}/queries",
            self.config.billing_project
        ))?;

        let request = QueryRequest {
            query: self.query_sql(),
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: vec![
                QueryParameter::date("start_day", window.start),
                QueryParameter::date("end_day", window.end),
            ],
            timeout_ms: QUERY_TIMEOUT_MS,
            max_results: PAGE_SIZE,
        };

        let response = self
            .client
            .post(url.clone())
            .bearer_auth(token)
            .json(&request)
            .send()
            .await;

        read_json(url, response).await
    }

    async fn query_results(
        &self,
        token: &str,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, WarehouseError> {
        let mut url = self.api_url(&format!(
            "bigquery/v2/projects/{}/queries/{}",
            job.project_id, job.job_id
        ))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeoutMs", &QUERY_TIMEOUT_MS.to_string());
            query.append_pair("maxResults", &PAGE_SIZE.to_string());
            if let Some(location) = &job.location {
                query.append_pair("location", location);
            }
            if let Some(page_token) = page_token {
                query.append_pair("pageToken", page_token);
            }
        }

        let response = self.client.get(url.clone()).bearer_auth(token).send().await;
        read_json(url, response).await
    }
}

#[async_trait]
impl UsageSource for BigQuerySource {
    fn name(&self) -> &str {
        "bigquery"
    }

    async fn fetch(&self, window: LookbackWindow) -> Result<Vec<UsageRow>, WarehouseError> {
        let token = self.access_token().await?;

        info!(
            table = %self.config.table,
            start = %window.start,
            end = %window.end,
            "Querying billing export"
        );

        let mut response = self.start_query(&token, window).await?;
        let mut rows = Vec::new();
        let mut calls = 0;

        loop {
            if response.job_complete {
                let schema = response
                    .schema
                    .as_ref()
                    .ok_or_else(|| WarehouseError::Response("missing schema".to_string()))?;
                let columns = ColumnIndex::from_schema(schema)?;
                for raw in response.rows.as_deref().unwrap_or_default() {
                    rows.push(columns.parse_row(rows.len(), raw)?);
                }

                if response.page_token.is_none() {
                    break;
                }
            }

            calls += 1;
            if calls > MAX_RESULT_CALLS {
                return Err(WarehouseError::Incomplete(MAX_RESULT_CALLS));
            }

            let job = response
                .job_reference
                .clone()
                .ok_or_else(|| WarehouseError::Response("missing jobReference".to_string()))?;
            let page_token = if response.job_complete {
                response.page_token.clone()
            } else {
                None
            };
            debug!(job_id = %job.job_id, page_token = ?page_token, "Fetching query results");
            response = self
                .query_results(&token, &job, page_token.as_deref())
                .await?;
        }

        Ok(rows)
    }
}

async fn read_json(
    url: Url,
    response: reqwest::Result<reqwest::Response>,
) -> Result<QueryResponse, WarehouseError> {
    let endpoint = url.path().to_string();
    let response = response.map_err(|source| WarehouseError::Http {
        endpoint: endpoint.clone(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(WarehouseError::Status {
            endpoint,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|source| WarehouseError::Http { endpoint, source })
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    query: String,
    use_legacy_sql: bool,
    parameter_mode: &'static str,
    query_parameters: Vec<QueryParameter>,
    timeout_ms: u64,
    max_results: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryParameter {
    name: &'static str,
    parameter_type: ParameterType,
    parameter_value: ParameterValue,
}

impl QueryParameter {
    fn date(name: &'static str, day: NaiveDate) -> Self {
        Self {
            name,
            parameter_type: ParameterType { kind: "DATE" },
            parameter_value: ParameterValue {
                value: day.format("%Y-%m-%d").to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ParameterType {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ParameterValue {
    value: String,
}

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    rows: Option<Vec<TableRow>>,
    page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    v: Value,
}

/// Positions of the expected columns in a result schema
struct ColumnIndex {
    day: usize,
    project_id: usize,
    sku_id: usize,
    sku_description: usize,
    cost: usize,
    currency: usize,
    width: usize,
}

impl ColumnIndex {
    fn from_schema(schema: &TableSchema) -> Result<Self, WarehouseError> {
        let positions: HashMap<&str, usize> = schema
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| (field.name.as_str(), i))
            .collect();
        let position = |name: &str| {
            positions
                .get(name)
                .copied()
                .ok_or_else(|| WarehouseError::Response(format!("missing column '{}'", name)))
        };

        Ok(Self {
            day: position("day")?,
            project_id: position("project_id")?,
            sku_id: position("sku_id")?,
            sku_description: position("sku_description")?,
            cost: position("cost")?,
            currency: position("currency")?,
            width: schema.fields.len(),
        })
    }

    fn parse_row(&self, index: usize, row: &TableRow) -> Result<UsageRow, WarehouseError> {
        let malformed = |reason: String| WarehouseError::MalformedRow { index, reason };

        if row.f.len() != self.width {
            return Err(malformed(format!(
                "expected {} cells, got {}",
                self.width,
                row.f.len()
            )));
        }

        let text = |column: usize, name: &str| -> Result<&str, WarehouseError> {
            row.f[column]
                .v
                .as_str()
                .ok_or_else(|| malformed(format!("'{}' is null or not a string", name)))
        };

        let day = NaiveDate::parse_from_str(text(self.day, "day")?, "%Y-%m-%d")
            .map_err(|e| malformed(format!("invalid day: {}", e)))?;
        let cost = parse_decimal(text(self.cost, "cost")?)
            .ok_or_else(|| malformed("invalid cost".to_string()))?;

        Ok(UsageRow {
            day,
            project_id: text(self.project_id, "project_id")?.to_string(),
            sku_id: text(self.sku_id, "sku_id")?.to_string(),
            sku_description: text(self.sku_description, "sku_description")?.to_string(),
            cost,
            currency: text(self.currency, "currency")?.to_string(),
        })
    }
}

/// NUMERIC comes back as plain decimal text, FLOAT64 may use exponents
fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn window() -> LookbackWindow {
        LookbackWindow::ending(NaiveDate::from_ymd_opt(2024, 6, 4).unwrap(), 3).unwrap()
    }

    fn source(server: &mockito::Server, credentials: Credentials) -> BigQuerySource {
        let table = TableRef::parse("billing-proj.billing.gcp_billing_export").unwrap();
        let mut config = BigQueryConfig::for_table(table).unwrap();
        config.endpoint = Url::parse(&server.url()).unwrap();
        config.credentials = credentials;
        BigQuerySource::new(config).unwrap()
    }

    fn schema() -> Value {
        json!({"fields": [
            {"name": "day", "type": "DATE"},
            {"name": "project_id", "type": "STRING"},
            {"name": "sku_id", "type": "STRING"},
            {"name": "sku_description", "type": "STRING"},
            {"name": "cost", "type": "NUMERIC"},
            {"name": "currency", "type": "STRING"}
        ]})
    }

    fn row(day: &str, cost: &str) -> Value {
        json!({"f": [
            {"v": day}, {"v": "proj-a"}, {"v": "6F81-5844-456A"},
            {"v": "N1 Predefined Instance Core"}, {"v": cost}, {"v": "USD"}
        ]})
    }

    #[test]
    fn test_table_ref_parse() {
        let table = TableRef::parse("proj.dataset.table").unwrap();
        assert_eq!(table.project, "proj");
        assert_eq!(table.dataset, "dataset");
        assert_eq!(table.table, "table");

        let scoped = TableRef::parse("example.com:proj.dataset.table").unwrap();
        assert_eq!(scoped.project, "example.com:proj");
        assert_eq!(scoped.to_string(), "example.com:proj.dataset.table");
    }

    #[test]
    fn test_table_ref_rejects_invalid_ids() {
        for id in ["", "dataset.table", "proj..table", "proj.ds.t`; DROP", "proj.ds.t name"] {
            assert!(
                matches!(TableRef::parse(id), Err(WarehouseError::InvalidTableId(_))),
                "{} should be rejected",
                id
            );
        }
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("12.5"), Some(dec!(12.5)));
        assert_eq!(parse_decimal("1.5E-3"), Some(dec!(0.0015)));
        assert_eq!(parse_decimal("abc"), None);
    }

    #[tokio::test]
    async fn test_fetch_single_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bigquery/v2/projects/billing-proj/queries")
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::PartialJson(json!({
                "useLegacySql": false,
                "parameterMode": "NAMED",
                "queryParameters": [
                    {"name": "start_day", "parameterValue": {"value": "2024-06-01"}},
                    {"name": "end_day", "parameterValue": {"value": "2024-06-04"}}
                ]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "jobComplete": true,
                    "jobReference": {"projectId": "billing-proj", "jobId": "job_1", "location": "US"},
                    "schema": schema(),
                    "rows": [row("2024-06-01", "10.25"), row("2024-06-02", "3E+1")]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let source = source(&server, Credentials::AccessToken("test-token".to_string()));
        let rows = source.fetch(window()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].day, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(rows[0].project_id, "proj-a");
        assert_eq!(rows[0].sku_description, "N1 Predefined Instance Core");
        assert_eq!(rows[0].cost, dec!(10.25));
        assert_eq!(rows[1].cost, dec!(30));
        assert_eq!(rows[1].currency, "USD");
    }

    #[tokio::test]
    async fn test_fetch_polls_and_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let start = server
            .mock("POST", "/bigquery/v2/projects/billing-proj/queries")
            .with_status(200)
            .with_body(
                json!({
                    "jobComplete": false,
                    "jobReference": {"projectId": "billing-proj", "jobId": "job_2", "location": "EU"}
                })
                .to_string(),
            )
            .create_async()
            .await;
        let first_page = server
            .mock("GET", "/bigquery/v2/projects/billing-proj/queries/job_2")
            .match_query(Matcher::Regex(
                "^timeoutMs=10000&maxResults=10000&location=EU$".into(),
            ))
            .with_status(200)
            .with_body(
                json!({
                    "jobComplete": true,
                    "jobReference": {"projectId": "billing-proj", "jobId": "job_2", "location": "EU"},
                    "schema": schema(),
                    "rows": [row("2024-06-01", "1")],
                    "pageToken": "page-2"
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second_page = server
            .mock("GET", "/bigquery/v2/projects/billing-proj/queries/job_2")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "page-2".into()))
            .with_status(200)
            .with_body(
                json!({
                    "jobComplete": true,
                    "jobReference": {"projectId": "billing-proj", "jobId": "job_2", "location": "EU"},
                    "schema": schema(),
                    "rows": [row("2024-06-02", "2")]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let source = source(&server, Credentials::AccessToken("t".to_string()));
        let rows = source.fetch(window()).await.unwrap();

        start.assert_async().await;
        first_page.assert_async().await;
        second_page.assert_async().await;
        let costs: Vec<Decimal> = rows.iter().map(|r| r.cost).collect();
        assert_eq!(costs, vec![dec!(1), dec!(2)]);
    }

    #[tokio::test]
    async fn test_metadata_server_token() {
        let mut server = mockito::Server::new_async().await;
        let token = server
            .mock("GET", "/computeMetadata/v1/instance/service-accounts/default/token")
            .match_header("metadata-flavor", "Google")
            .with_status(200)
            .with_body(r#"{"access_token":"meta-token","expires_in":3599,"token_type":"Bearer"}"#)
            .create_async()
            .await;
        let query = server
            .mock("POST", "/bigquery/v2/projects/billing-proj/queries")
            .match_header("authorization", "Bearer meta-token")
            .with_status(200)
            .with_body(json!({"jobComplete": true, "schema": schema()}).to_string())
            .create_async()
            .await;

        let metadata = Url::parse(&server.url())
            .unwrap()
            .join("computeMetadata/v1/instance/service-accounts/default/token")
            .unwrap();
        let source = source(&server, Credentials::MetadataServer(metadata));
        let rows = source.fetch(window()).await.unwrap();

        token.assert_async().await;
        query.assert_async().await;
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bigquery/v2/projects/billing-proj/queries")
            .with_status(403)
            .with_body("access denied")
            .create_async()
            .await;

        let source = source(&server, Credentials::AccessToken("t".to_string()));
        let err = source.fetch(window()).await.unwrap_err();

        match err {
            WarehouseError::Status { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, "access denied");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_null_cell_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bigquery/v2/projects/billing-proj/queries")
            .with_status(200)
            .with_body(
                json!({
                    "jobComplete": true,
                    "schema": schema(),
                    "rows": [{"f": [
                        {"v": "2024-06-01"}, {"v": "p"}, {"v": "s"},
                        {"v": null}, {"v": "1"}, {"v": "USD"}
                    ]}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let source = source(&server, Credentials::AccessToken("t".to_string()));
        let err = source.fetch(window()).await.unwrap_err();

        assert!(matches!(err, WarehouseError::MalformedRow { index: 0, .. }));
    }

    #[test]
    fn test_query_sql_references_table() {
        let server_url = Url::parse("http://localhost").unwrap();
        let table = TableRef::parse("p.d.t").unwrap();
        let mut config = BigQueryConfig::for_table(table).unwrap();
        config.endpoint = server_url;
        let source = BigQuerySource::new(config).unwrap();

        let sql = source.query_sql();
        assert!(sql.contains("FROM `p.d.t`"));
        assert!(sql.contains("BETWEEN @start_day AND @end_day"));
        assert!(sql.contains("GROUP BY day, project_id, sku_id, sku_description, currency"));
    }
}
