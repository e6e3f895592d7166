//! A run whose completion cannot be persisted ends Failed without final prompts.

mod common;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use gepa::domain::models::SessionPage;
use gepa::domain::ports::{SessionFilter, SessionRepository};
use gepa::infrastructure::memory::{InMemoryPromptParameterRepository, InMemorySessionRepository};
use gepa::{
    Generation, OptimizationError, OptimizationResult, OptimizationService, OptimizationSession,
    SessionStatus,
};

use common::{execution, register_parameters, registry_with, small_config, wait_for_terminal, ScriptedModule, MODULE_ID};

/// Rejects every write that would mark a session `Completed`.
#[derive(Default)]
struct CompletionRejectingRepository {
    inner: InMemorySessionRepository,
}

#[async_trait]
impl SessionRepository for CompletionRejectingRepository {
    async fn insert(&self, session: &OptimizationSession) -> OptimizationResult<()> {
        self.inner.insert(session).await
    }

    async fn get(&self, id: Uuid) -> OptimizationResult<Option<OptimizationSession>> {
        self.inner.get(id).await
    }

    async fn update(&self, session: &OptimizationSession) -> OptimizationResult<()> {
        if session.status == SessionStatus::Completed {
            return Err(OptimizationError::Persistence("database is locked".to_string()));
        }
        self.inner.update(session).await
    }

    async fn append_generation(
        &self,
        session_id: Uuid,
        generation: &Generation,
        consumed_budget: f64,
    ) -> OptimizationResult<()> {
        self.inner
            .append_generation(session_id, generation, consumed_budget)
            .await
    }

    async fn list_by_user(&self, user_id: &str, page: usize, page_size: usize) -> OptimizationResult<SessionPage> {
        self.inner.list_by_user(user_id, page, page_size).await
    }

    async fn list(&self, filter: SessionFilter) -> OptimizationResult<Vec<OptimizationSession>> {
        self.inner.list(filter).await
    }

    async fn delete(&self, id: Uuid) -> OptimizationResult<bool> {
        self.inner.delete(id).await
    }
}

#[tokio::test]
async fn test_unpersisted_completion_fails_session_without_final_prompts() {
    let module = Arc::new(ScriptedModule::new());
    let service = Arc::new(OptimizationService::new(
        Arc::new(CompletionRejectingRepository::default()),
        Arc::new(InMemoryPromptParameterRepository::new()),
        Arc::new(registry_with(module)),
        execution(),
    ));
    let ids = register_parameters(&service, &["Answer."]).await;

    let session = service
        .create_session("alice", MODULE_ID, small_config(), ids.clone())
        .await
        .unwrap();
    service.execute(session.id).await.unwrap().await.unwrap();

    let done = wait_for_terminal(&service, session.id).await;
    assert_eq!(done.status, SessionStatus::Failed);
    assert!(done.error.as_deref().is_some_and(|e| e.contains("database is locked")));

    let parameter = service.get_prompt_parameter(ids[0]).await.unwrap().unwrap();
    assert!(parameter.final_prompt.is_none());
}
