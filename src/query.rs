use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::db::executor::{self, ExecutionResult};
use crate::db::records::Record;
use crate::db::schema::SchemaDescription;
use crate::db::schema_extractor::{SchemaError, SchemaExtractor};
use crate::llm::LlmManager;
use crate::llm::prompt::build_prompt;
use crate::session::{SessionError, SessionRecord, SessionStore};
use crate::sql::{SqlValidator, ValidationResult};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Invalid SQL: {0}")]
    Validation(String),
    #[error("Query execution failed: {0}")]
    Execution(String),
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Answer to a natural-language question. Failures after the session lookup
/// are reported in `error` rather than as an error response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NlQueryResponse {
    pub sql: String,
    pub formatted_sql: Option<String>,
    pub results: Vec<Record>,
    pub error: Option<String>,
    pub model_used: Option<String>,
    pub provider_used: Option<String>,
    pub confidence_score: f64,
    pub explanation: Option<String>,
    /// Seconds spent answering.
    pub execution_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteSqlResponse {
    pub success: bool,
    pub sql: String,
    pub formatted_sql: Option<String>,
    pub columns: Vec<String>,
    pub results: Vec<Record>,
    pub row_count: usize,
}

/// Natural-language question → SQL → rows, for one session at a time.
pub struct QueryPipeline {
    sessions: Arc<SessionStore>,
    llm_manager: Arc<LlmManager>,
    validator: SqlValidator,
    extractor: SchemaExtractor,
}

impl QueryPipeline {
    pub fn new(sessions: Arc<SessionStore>, llm_manager: Arc<LlmManager>, sample_rows: usize) -> Self {
        Self {
            sessions,
            llm_manager,
            validator: SqlValidator::new(),
            extractor: SchemaExtractor::new(sample_rows),
        }
    }

    /// Runs the full pipeline. Only an unknown session is an `Err`; every later
    /// failure lands in the response body.
    pub async fn answer(&self, question: &str, session_id: &str, preference: &str) -> Result<NlQueryResponse, QueryError> {
        let started = Instant::now();
        let session = self.sessions.get_session(session_id).await?;

        let mut response = match self.generate_and_run(question, &session, preference).await {
            Ok(response) => response,
            Err(QueryError::Session(e)) => return Err(QueryError::Session(e)),
            Err(e) => NlQueryResponse {
                error: Some(e.to_string()),
                ..NlQueryResponse::default()
            },
        };
        response.execution_time = started.elapsed().as_secs_f64();

        tracing::info!(
            session_id,
            provider = response.provider_used.as_deref().unwrap_or("none"),
            rows = response.results.len(),
            "Answered question in {:.3}s",
            response.execution_time
        );
        Ok(response)
    }

    async fn generate_and_run(
        &self,
        question: &str,
        session: &SessionRecord,
        preference: &str,
    ) -> Result<NlQueryResponse, QueryError> {
        let schema = self.describe(session).await?;
        let prompt = build_prompt(question, &schema);

        let generation = self.llm_manager.generate_sql(&prompt, preference).await;
        let mut response = NlQueryResponse {
            sql: generation.sql.clone(),
            model_used: generation.model.clone(),
            provider_used: generation.provider.clone(),
            ..NlQueryResponse::default()
        };

        if !generation.success {
            response.error = generation.error;
            return Ok(response);
        }

        let validation = self.validator.validate(&generation.sql);
        if !validation.valid {
            response.error = validation.error.map(|e| format!("Invalid SQL generated: {e}"));
            return Ok(response);
        }
        response.formatted_sql = validation.formatted;

        let execution = self.execute(session.db_path.clone(), generation.sql).await?;
        if !execution.success {
            response.error = execution.error.map(|e| format!("Query execution failed: {e}"));
            return Ok(response);
        }

        response.confidence_score = confidence(execution.results.len());
        response.explanation = Some(format!(
            "Generated by {} using {}",
            response.provider_used.as_deref().unwrap_or("unknown provider"),
            response.model_used.as_deref().unwrap_or("unknown model"),
        ));
        response.results = execution.results;
        Ok(response)
    }

    /// Validates and runs caller-supplied SQL against a session.
    pub async fn execute_sql(&self, session_id: &str, sql: &str) -> Result<ExecuteSqlResponse, QueryError> {
        let session = self.sessions.get_session(session_id).await?;

        let ValidationResult { valid, error, formatted } = self.validator.validate(sql);
        if !valid {
            return Err(QueryError::Validation(error.unwrap_or_default()));
        }

        let execution = self.execute(session.db_path, sql.to_string()).await?;
        if !execution.success {
            return Err(QueryError::Execution(execution.error.unwrap_or_default()));
        }

        Ok(ExecuteSqlResponse {
            success: true,
            sql: sql.to_string(),
            formatted_sql: formatted,
            columns: execution.columns,
            row_count: execution.row_count,
            results: execution.results,
        })
    }

    /// Schema of a session's store.
    pub async fn describe_session(&self, session_id: &str) -> Result<(SessionRecord, SchemaDescription), QueryError> {
        let session = self.sessions.get_session(session_id).await?;
        let schema = self.describe(&session).await?;
        Ok((session, schema))
    }

    /// Schema of an already looked-up session; does not mark it as used.
    pub async fn describe(&self, session: &SessionRecord) -> Result<SchemaDescription, QueryError> {
        let extractor = self.extractor.clone();
        let db_path = session.db_path.clone();
        let schema = tokio::task::spawn_blocking(move || extractor.describe(&db_path))
            .await
            .map_err(|e| QueryError::Task(e.to_string()))??;
        Ok(schema)
    }

    async fn execute(&self, db_path: PathBuf, sql: String) -> Result<ExecutionResult, QueryError> {
        tokio::task::spawn_blocking(move || executor::execute(&db_path, &sql))
            .await
            .map_err(|e| QueryError::Task(e.to_string()))
    }
}

/// More rows → more confidence, capped at 1.0 from 100 rows on. An empty
/// result scores 0.5.
pub fn confidence(row_count: usize) -> f64 {
    if row_count == 0 {
        0.5
    } else {
        (row_count as f64 / 100.0).min(1.0)
    }
}
