use axum::{
    Json,
    extract::{Multipart, Path, Query, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::schema::SchemaDescription;
use crate::llm::AUTO_PREFERENCE;
use crate::query::{ExecuteSqlResponse, NlQueryResponse};
use crate::session::SessionRecord;
use crate::web::error::ApiError;
use crate::web::state::AppState;

const PROVIDER_TEST_PROMPT: &str =
    "Generate a simple SELECT query to get all records from a table named 'users'";

// Request / response types

/// Question body. Older clients send `question`, newer ones `query`; when
/// both are present `query` wins.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub model_preference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteSqlParams {
    pub sql_query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub success: bool,
    pub session_id: String,
    pub schema: SchemaDescription,
    pub session_info: SessionRecord,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_accessed: chrono::DateTime<chrono::Utc>,
    pub original_filename: String,
    pub table_count: usize,
    pub total_rows: u64,
}

#[derive(Debug, Serialize)]
pub struct ProviderTestOutcome {
    pub success: bool,
    pub response: String,
    pub error: Option<String>,
}

// Data intake

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("Uploaded file has no filename"))?;

        let contents = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;

        info!("Received upload '{}' ({} bytes)", filename, contents.len());
        let session_id = state.sessions.create_session(&contents, &filename).await?;

        return Ok(Json(UploadResponse {
            message: "File uploaded and processed successfully".to_string(),
            session_id,
        }));
    }

    Err(ApiError::bad_request("No file provided in field 'file'"))
}

// Natural-language querying

pub async fn generate_sql(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<NlQueryResponse>, ApiError> {
    let Json(payload) = payload?;
    let question = payload
        .query
        .as_deref()
        .or(payload.question.as_deref())
        .unwrap_or_default()
        .trim();
    if question.is_empty() {
        return Err(ApiError::bad_request("Query cannot be empty"));
    }

    let preference = payload
        .model_preference
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(AUTO_PREFERENCE);

    info!("Question for session {}: {}", payload.session_id, question);
    let response = state.pipeline.answer(question, &payload.session_id, preference).await?;
    Ok(Json(response))
}

pub async fn execute_sql(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<ExecuteSqlParams>,
) -> Result<Json<ExecuteSqlResponse>, ApiError> {
    let sql = params
        .sql_query
        .filter(|sql| !sql.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing 'sql_query' parameter"))?;

    let response = state.pipeline.execute_sql(&session_id, &sql).await?;
    Ok(Json(response))
}

// Sessions

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    let mut summaries = Vec::new();

    for record in state.sessions.list_sessions().await {
        // listing does not count as use; a session deleted mid-listing is skipped
        match state.pipeline.describe(&record).await {
            Ok(schema) => summaries.push(SessionSummary {
                table_count: schema.table_count(),
                total_rows: schema.total_rows(),
                session_id: record.session_id,
                created_at: record.created_at,
                last_accessed: record.last_accessed,
                original_filename: record.original_filename,
            }),
            Err(e) => warn!("Skipping session {} in listing: {}", record.session_id, e),
        }
    }

    Json(summaries)
}

pub async fn get_schema(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SchemaResponse>, ApiError> {
    let (session, schema) = state.pipeline.describe_session(&session_id).await?;

    Ok(Json(SchemaResponse {
        success: true,
        session_id,
        schema,
        session_info: session,
    }))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.sessions.delete_session(&session_id).await?;
    Ok(Json(json!({"message": format!("Session {session_id} deleted successfully")})))
}

// Providers and status

pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "available_providers": state.llm_manager.available_providers(),
        "fallback_order": state.llm_manager.fallback_order(),
    }))
}

pub async fn test_providers(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut results = Map::new();
    for (name, result) in state.llm_manager.test_providers(PROVIDER_TEST_PROMPT).await {
        let outcome = ProviderTestOutcome {
            success: result.success,
            response: result.sql,
            error: result.error,
        };
        results.insert(name, json!(outcome));
    }

    Json(json!({
        "test_prompt": PROVIDER_TEST_PROMPT,
        "results": results,
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut providers = Map::new();
    for name in state.llm_manager.fallback_order() {
        providers.insert(name.clone(), Value::Bool(state.llm_manager.is_available(name)));
    }

    let now = chrono::Utc::now();
    Json(json!({
        "status": "healthy",
        "timestamp": now.to_rfc3339(),
        "uptime_seconds": (now - state.startup_time).num_seconds(),
        "available_providers": state.llm_manager.available_providers(),
        "providers": providers,
        "active_sessions": state.sessions.len().await,
        "session_ttl_secs": state.config.sessions.ttl_secs,
    }))
}
