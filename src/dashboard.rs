use crate::assistant::provider::GeminiProvider;
use crate::assistant::{Assistant, INCIDENTS_TABLE};
use crate::config::AppConfig;
use crate::credentials::CredentialService;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AssistantReply, ChatMessage, ChatRole, LoginPayload, LoginResponse, RegisterOutcome, RegisterPayload, Role,
    TableData,
};
use crate::policy::AccessGate;
use crate::records::RecordAccessor;
use crate::redaction::Redactor;
use crate::schema::SchemaIntrospector;
use crate::session::{Session, SessionManager};
use crate::summary::DashboardSummaries;
use crate::transfer::CsvTransfer;
use std::path::Path;
use std::sync::Arc;

const INVALID_LOGIN: &str = "Invalid username or password.";

/// Every dashboard service over one store, plus the live sessions.
pub struct DashboardCore {
    db: Database,
    credentials: CredentialService,
    introspector: SchemaIntrospector,
    records: RecordAccessor,
    gate: AccessGate,
    summaries: DashboardSummaries,
    transfer: CsvTransfer,
    assistant: Assistant,
    sessions: SessionManager,
}

impl DashboardCore {
    pub fn new(config: &AppConfig) -> AppResult<Arc<Self>> {
        let assistant = match config.genai_key() {
            Some(key) => {
                let provider = GeminiProvider::new(
                    key,
                    &config.genai_model,
                    &config.genai_endpoint,
                    config.genai_timeout(),
                )?;
                tracing::info!(model = %config.genai_model, "remote assistant enabled");
                Assistant::with_provider(Arc::new(provider), Redactor::new().with_secret(key))
            }
            None => {
                tracing::info!("GENAI_API_KEY not set; assistant runs offline");
                Assistant::offline()
            }
        };
        Self::build(
            &config.database_path(),
            assistant,
            SessionManager::with_ttl_minutes(config.session_ttl_minutes),
        )
    }

    pub fn with_assistant(db_path: &Path, assistant: Assistant) -> AppResult<Arc<Self>> {
        Self::build(db_path, assistant, SessionManager::new())
    }

    fn build(db_path: &Path, assistant: Assistant, sessions: SessionManager) -> AppResult<Arc<Self>> {
        let db = Database::new(db_path)?;
        let credentials = CredentialService::new(db.clone());
        let introspector = SchemaIntrospector::new(db.clone());
        let records = RecordAccessor::new(db.clone());

        tracing::info!(path = %db.path().display(), "dashboard store opened");
        Ok(Arc::new(Self {
            gate: AccessGate::new(records.clone(), credentials.clone()),
            summaries: DashboardSummaries::new(records.clone(), introspector.clone()),
            transfer: CsvTransfer::new(db.clone(), records.clone()),
            db,
            credentials,
            introspector,
            records,
            assistant,
            sessions,
        }))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }

    pub fn introspector(&self) -> &SchemaIntrospector {
        &self.introspector
    }

    pub fn records(&self) -> &RecordAccessor {
        &self.records
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn summaries(&self) -> &DashboardSummaries {
        &self.summaries
    }

    pub fn transfer(&self) -> &CsvTransfer {
        &self.transfer
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Runs store work on the blocking pool.
    pub async fn blocking<T, F>(self: &Arc<Self>, work: F) -> AppResult<T>
    where
        F: FnOnce(&DashboardCore) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let core = Arc::clone(self);
        tokio::task::spawn_blocking(move || work(&core))
            .await
            .map_err(|err| AppError::Internal(format!("store task failed: {}", err)))?
    }

    pub async fn register(&self, payload: RegisterPayload) -> AppResult<RegisterOutcome> {
        let credentials = self.credentials.clone();
        tokio::task::spawn_blocking(move || credentials.register_from_payload(&payload))
            .await
            .map_err(|err| AppError::Internal(format!("registration task failed: {}", err)))?
    }

    /// Verifies the password and opens a fresh session for the user.
    pub async fn login(&self, payload: LoginPayload) -> AppResult<LoginResponse> {
        let credentials = self.credentials.clone();
        let username = payload.username.trim().to_string();
        let lookup_name = username.clone();
        let role = tokio::task::spawn_blocking(move || credentials.login(&lookup_name, &payload.password))
            .await
            .map_err(|err| AppError::Internal(format!("login task failed: {}", err)))??;

        let Some(role) = role else {
            tracing::info!(username = %username, "login rejected");
            return Err(AppError::Unauthenticated(INVALID_LOGIN.to_string()));
        };

        let mut session = Session::new();
        session.login(&username, role);
        let view = session.view();
        let token = self.sessions.open_session(session).await;
        tracing::info!(username = %username, role = role.as_str(), "login succeeded");
        Ok(LoginResponse { token, session: view })
    }

    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.close_session(token).await
    }

    pub async fn session(&self, token: Option<&str>) -> Session {
        match token {
            Some(token) => self.sessions.get(token).await,
            None => Session::new(),
        }
    }

    /// Incident rows for the assistant; a store without the table reads as empty.
    fn incidents(&self) -> AppResult<TableData> {
        match self.records.read_all(INCIDENTS_TABLE) {
            Ok(data) => Ok(data),
            Err(AppError::NotFound(_)) => Ok(TableData {
                table: INCIDENTS_TABLE.to_string(),
                columns: Vec::new(),
                rows: Vec::new(),
            }),
            Err(error) => Err(error),
        }
    }

    /// Admin-gated role change. Live sessions of `username` pick up the new
    /// role at once, so a demoted admin loses write access without logging out.
    pub async fn set_role(self: &Arc<Self>, session: &Session, username: &str, role: Role) -> AppResult<()> {
        let actor = session.clone();
        let target = username.to_string();
        self.blocking(move |core| core.gate.set_role(&actor, &target, role))
            .await?;
        let refreshed = self.sessions.set_role_for(username, role).await;
        tracing::info!(username = %username, role = role.as_str(), sessions = refreshed, "role changed");
        Ok(())
    }

    pub async fn ask(self: &Arc<Self>, token: &str, question: &str) -> AppResult<AssistantReply> {
        let session = self.sessions.get(token).await;
        AccessGate::require_login(&session)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("question must not be empty".to_string()));
        }

        let incidents = self.blocking(|core| core.incidents()).await?;
        let reply = self.assistant.ask(question, &incidents).await;
        self.sessions
            .update(token, |session| {
                session.push_message(ChatRole::User, question);
                session.push_message(ChatRole::Assistant, reply.answer.clone());
            })
            .await?;
        Ok(reply)
    }

    pub async fn history(&self, token: &str) -> AppResult<Vec<ChatMessage>> {
        let session = self.sessions.get(token).await;
        AccessGate::require_login(&session)?;
        Ok(session.messages)
    }
}
