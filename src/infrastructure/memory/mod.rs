//! In-memory repositories.
//!
//! Implement the same ports as the `SQLite` adapters; used by tests and by
//! callers that embed the optimizer without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{OptimizationError, OptimizationResult};
use crate::domain::models::{Generation, OptimizationSession, PromptParameter, SessionPage};
use crate::domain::ports::{PromptParameterRepository, SessionFilter, SessionRepository};

fn newest_first(sessions: &mut [OptimizationSession]) {
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
}

#[derive(Default, Clone)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<HashMap<Uuid, OptimizationSession>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, session: &OptimizationSession) -> OptimizationResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(OptimizationError::Persistence(format!(
                "session {} already exists",
                session.id
            )));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OptimizationResult<Option<OptimizationSession>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn update(&self, session: &OptimizationSession) -> OptimizationResult<()> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&session.id)
            .ok_or(OptimizationError::SessionNotFound(session.id))?;

        let generations = std::mem::take(&mut stored.generations);
        *stored = session.clone();
        stored.generations = generations;
        Ok(())
    }

    async fn append_generation(
        &self,
        session_id: Uuid,
        generation: &Generation,
        consumed_budget: f64,
    ) -> OptimizationResult<()> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&session_id)
            .ok_or(OptimizationError::SessionNotFound(session_id))?;

        if stored.generations.iter().any(|g| g.index == generation.index) {
            return Err(OptimizationError::Persistence(format!(
                "generation {} already stored for session {session_id}",
                generation.index
            )));
        }
        stored.generations.push(generation.clone());
        stored.consumed_budget = consumed_budget;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        page: usize,
        page_size: usize,
    ) -> OptimizationResult<SessionPage> {
        let mut owned: Vec<OptimizationSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut owned);

        let total = owned.len();
        let items = owned
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Ok(SessionPage {
            items,
            total,
            page,
            page_size,
        })
    }

    async fn list(&self, filter: SessionFilter) -> OptimizationResult<Vec<OptimizationSession>> {
        let mut matching: Vec<OptimizationSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| filter.status.map_or(true, |status| s.status == status))
            .filter(|s| filter.module_id.as_ref().map_or(true, |m| &s.module_id == m))
            .cloned()
            .collect();
        newest_first(&mut matching);
        Ok(matching)
    }

    async fn delete(&self, id: Uuid) -> OptimizationResult<bool> {
        Ok(self.sessions.write().await.remove(&id).is_some())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPromptParameterRepository {
    parameters: Arc<RwLock<HashMap<Uuid, PromptParameter>>>,
}

impl InMemoryPromptParameterRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PromptParameterRepository for InMemoryPromptParameterRepository {
    async fn insert(&self, parameter: &PromptParameter) -> OptimizationResult<()> {
        self.parameters
            .write()
            .await
            .insert(parameter.id, parameter.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OptimizationResult<Option<PromptParameter>> {
        Ok(self.parameters.read().await.get(&id).cloned())
    }

    async fn list_by_module(&self, module_id: &str) -> OptimizationResult<Vec<PromptParameter>> {
        let mut owned: Vec<PromptParameter> = self
            .parameters
            .read()
            .await
            .values()
            .filter(|p| p.module_id == module_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_at.cmp(&b.created_at)));
        Ok(owned)
    }

    async fn set_final_prompt(&self, id: Uuid, prompt: &str) -> OptimizationResult<()> {
        let mut parameters = self.parameters.write().await;
        let parameter = parameters
            .get_mut(&id)
            .ok_or(OptimizationError::ParameterNotFound(id))?;
        parameter.set_final_prompt(prompt.to_string());
        Ok(())
    }

    async fn clear_final_prompt(&self, id: Uuid) -> OptimizationResult<()> {
        let mut parameters = self.parameters.write().await;
        let parameter = parameters
            .get_mut(&id)
            .ok_or(OptimizationError::ParameterNotFound(id))?;
        parameter.clear_final_prompt();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{OptimizationConfig, SessionStatus};

    fn session(user: &str) -> OptimizationSession {
        OptimizationSession::new(
            user.to_string(),
            "qa".to_string(),
            OptimizationConfig::default(),
            vec![],
            vec![],
        )
    }

    #[tokio::test]
    async fn test_update_keeps_generations() {
        let repo = InMemorySessionRepository::new();
        let mut s = session("alice");
        repo.insert(&s).await.unwrap();
        repo.append_generation(s.id, &Generation::new(0, vec![], 0), 2.5)
            .await
            .unwrap();

        s.status = SessionStatus::Running;
        repo.update(&s).await.unwrap();

        let stored = repo.get(s.id).await.unwrap().unwrap();
        assert_eq!(stored.generations.len(), 1);
        assert_eq!(stored.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn test_pagination_is_newest_first() {
        let repo = InMemorySessionRepository::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let s = session("bob");
            ids.push(s.id);
            repo.insert(&s).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        repo.insert(&session("carol")).await.unwrap();

        let first = repo.list_by_user("bob", 1, 2).await.unwrap();
        let last = repo.list_by_user("bob", 3, 2).await.unwrap();

        assert_eq!(first.total, 5);
        assert_eq!(first.items[0].id, ids[4]);
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_set_final_prompt_on_missing_parameter() {
        let repo = InMemoryPromptParameterRepository::new();
        let result = repo.set_final_prompt(Uuid::new_v4(), "text").await;
        assert!(matches!(result, Err(OptimizationError::ParameterNotFound(_))));
    }
}
