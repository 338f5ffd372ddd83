//! FlowRunner – loads a session, applies exactly **one** action through the workflow's reducer,
//! performs the resulting effect (if any) and persists the new state.
//!
//! The session is only written back when both the reducer and the effect succeed. A rejected
//! action or a failed effect leaves the stored session exactly as it was, so the caller can
//! simply retry the same action.
//!
//! Actions for the same session are applied one at a time: the per-session lock is held from
//! load to save, so a second action always sees the state the first one stored.
//!
//! ```rust,ignore
//! // At startup
//! let runner = FlowRunner::new(Arc::new(MyWorkflow), Arc::new(InMemorySessionStorage::new()));
//!
//! // Per request
//! let session = runner.start().await?;
//! let outcome = runner.dispatch(&session.id, action).await?;
//!
//! // Periodically
//! runner.discard_idle(chrono::Duration::minutes(30)).await?;
//! ```

use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use tracing::{debug, info, warn};

use crate::{
    error::FlowError,
    flow::Workflow,
    storage::{Session, SessionStorage},
};

/// Result of a successfully applied action.
#[derive(Debug, Clone)]
pub struct Outcome<S> {
    pub session: Session<S>,
    pub response: Option<String>,
    /// Whether an effect was performed as part of this action
    pub performed_effect: bool,
}

/// High-level helper that orchestrates the _load → reduce → perform → save_ pattern.
pub struct FlowRunner<W: Workflow> {
    workflow: Arc<W>,
    storage: Arc<dyn SessionStorage<W::State>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl<W: Workflow> Clone for FlowRunner<W> {
    fn clone(&self) -> Self {
        Self {
            workflow: self.workflow.clone(),
            storage: self.storage.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<W: Workflow> FlowRunner<W> {
    pub fn new(workflow: Arc<W>, storage: Arc<dyn SessionStorage<W::State>>) -> Self {
        Self {
            workflow,
            storage,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Create and persist a fresh session in the workflow's initial state.
    pub async fn start(&self) -> Result<Session<W::State>, FlowError<W::Error>> {
        let session: Session<W::State> = Session::new(self.workflow.id());
        self.storage.save(session.clone()).await?;
        info!(session_id = %session.id, workflow = %self.workflow.id(), "Session created");
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> Result<Session<W::State>, FlowError<W::Error>> {
        self.storage
            .get(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Apply **exactly one** action to the given session.
    pub async fn dispatch(
        &self,
        session_id: &str,
        action: W::Action,
    ) -> Result<Outcome<W::State>, FlowError<W::Error>> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        // 1. Load session
        let mut session = match self.storage.get(session_id).await? {
            Some(session) => session,
            None => {
                self.locks.remove(session_id);
                return Err(FlowError::SessionNotFound(session_id.to_string()));
            }
        };

        // 2. Reduce against a snapshot; the stored session is not touched on rejection
        let transition = self
            .workflow
            .reduce(&session.state, action)
            .map_err(|e| {
                debug!(session_id = %session_id, error = %e, "Action rejected");
                FlowError::Workflow(e)
            })?;

        // 3. Perform the effect, if any
        let performed_effect = transition.effect.is_some();
        let state = match transition.effect {
            Some(effect) => self
                .workflow
                .perform(transition.state, effect)
                .await
                .map_err(|e| {
                    warn!(session_id = %session_id, error = %e, "Effect failed, session left unchanged");
                    FlowError::Workflow(e)
                })?,
            None => transition.state,
        };

        // 4. Persist new state so the next call starts where we left off
        session.replace_state(state);
        self.storage.save(session.clone()).await?;

        Ok(Outcome {
            session,
            response: transition.response,
            performed_effect,
        })
    }

    pub async fn discard(&self, session_id: &str) -> Result<(), FlowError<W::Error>> {
        self.storage.delete(session_id).await?;
        self.locks.remove(session_id);
        Ok(())
    }

    /// Drop every session whose state has not changed for `max_idle`.
    ///
    /// Sessions with an action in flight are skipped and looked at again on the next sweep.
    pub async fn discard_idle(&self, max_idle: Duration) -> Result<usize, FlowError<W::Error>> {
        let cutoff = Utc::now() - max_idle;
        let mut discarded = 0;

        for session_id in self.storage.idle_since(cutoff).await? {
            let lock = self.session_lock(&session_id);
            let Ok(_guard) = lock.try_lock() else {
                continue;
            };
            // re-check under the lock, an action may have landed since the listing
            match self.storage.get(&session_id).await? {
                Some(session) if session.updated_at >= cutoff => continue,
                _ => {}
            }
            self.discard(&session_id).await?;
            discarded += 1;
        }

        if discarded > 0 {
            info!(discarded, "Idle sessions discarded");
        }
        Ok(discarded)
    }
}
