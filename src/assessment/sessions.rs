//! Registry of live assessment sessions.
//!
//! Every session owns its own `AssessmentFlow` and conversation thread. The
//! map lock is held only to look a session up; submissions lock the one
//! session they act on.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::conversation::ConversationGateway;
use crate::error::{ConfigError, SessionError};

use super::flow::{AssessmentFlow, FlowSettings};
use super::phase::PhaseDefinition;

/// A session's flow, locked per submission.
pub type SharedFlow = Arc<Mutex<AssessmentFlow>>;

/// Opens and tracks one `AssessmentFlow` per user session.
pub struct SessionRegistry {
    phases: Vec<PhaseDefinition>,
    gateway: Arc<dyn ConversationGateway>,
    settings: FlowSettings,
    /// Maximum concurrent sessions.
    max_sessions: usize,
    sessions: RwLock<HashMap<Uuid, SharedFlow>>,
}

impl SessionRegistry {
    pub fn new(
        phases: Vec<PhaseDefinition>,
        gateway: Arc<dyn ConversationGateway>,
        settings: FlowSettings,
        max_sessions: usize,
    ) -> Result<Self, ConfigError> {
        if phases.is_empty() {
            return Err(ConfigError::NoPhases);
        }
        Ok(Self {
            phases,
            gateway,
            settings,
            max_sessions,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Start a session on a fresh conversation thread.
    pub async fn open(&self) -> Result<(Uuid, SharedFlow), SessionError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(SessionError::LimitReached {
                max: self.max_sessions,
            });
        }

        let thread = self.gateway.create_or_resume(None).await?;
        let thread_id = thread.thread_id.clone();
        let flow = AssessmentFlow::new(
            self.phases.clone(),
            Arc::clone(&self.gateway),
            thread,
            self.settings.clone(),
        )?;

        let session_id = Uuid::new_v4();
        let flow = Arc::new(Mutex::new(flow));
        sessions.insert(session_id, Arc::clone(&flow));
        tracing::info!(session = %session_id, thread = %thread_id, active = sessions.len(), "Session opened");
        Ok((session_id, flow))
    }

    pub async fn get(&self, session_id: Uuid) -> Result<SharedFlow, SessionError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(SessionError::NotFound { id: session_id })
    }

    /// End a session and drop its state.
    pub async fn close(&self, session_id: Uuid) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(&session_id)
            .ok_or(SessionError::NotFound { id: session_id })?;
        tracing::info!(session = %session_id, active = sessions.len(), "Session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::flow::tests::{ScriptedGateway, grant_phases};

    fn registry(gateway: Arc<ScriptedGateway>, max_sessions: usize) -> SessionRegistry {
        SessionRegistry::new(grant_phases(), gateway, FlowSettings::default(), max_sessions).unwrap()
    }

    #[tokio::test]
    async fn sessions_have_separate_state() {
        let gateway = ScriptedGateway::new(&["Hi Alice's Org!"]);
        let sessions = registry(gateway, 10);
        let (alice_id, alice) = sessions.open().await.unwrap();
        let (bob_id, bob) = sessions.open().await.unwrap();
        assert_ne!(alice_id, bob_id);

        alice.lock().await.submit(0, "Alice's Org").await.unwrap();

        let bob = bob.lock().await;
        assert_eq!(bob.current_phase_index(), 0);
        assert!(bob.state().record("org_name").is_none());
        drop(bob);

        let alice = sessions.get(alice_id).await.unwrap();
        assert_eq!(alice.lock().await.current_phase_index(), 1);
    }

    #[tokio::test]
    async fn session_limit_is_enforced() {
        let sessions = registry(ScriptedGateway::new(&[]), 1);
        sessions.open().await.unwrap();
        let err = sessions.open().await.err().unwrap();
        assert!(matches!(err, SessionError::LimitReached { max: 1 }));
    }

    #[tokio::test]
    async fn closed_and_unknown_sessions_are_not_found() {
        let sessions = registry(ScriptedGateway::new(&[]), 1);
        let (id, _flow) = sessions.open().await.unwrap();
        sessions.close(id).await.unwrap();

        assert!(matches!(sessions.get(id).await, Err(SessionError::NotFound { .. })));
        assert!(matches!(sessions.close(id).await, Err(SessionError::NotFound { .. })));
        // Closing frees the slot.
        sessions.open().await.unwrap();
    }

    #[test]
    fn empty_phase_list_is_rejected() {
        let result = SessionRegistry::new(Vec::new(), ScriptedGateway::new(&[]), FlowSettings::default(), 1);
        assert!(matches!(result, Err(ConfigError::NoPhases)));
    }
}
