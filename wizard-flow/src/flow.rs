use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

/// Outcome of reducing one action against the current state.
#[derive(Debug, Clone)]
pub struct Transition<S, F> {
    /// State to persist if the transition (and its effect, if any) succeeds
    pub state: S,
    /// Side effect to perform before the state is persisted
    pub effect: Option<F>,
    /// Optional message for the user
    pub response: Option<String>,
}

impl<S, F> Transition<S, F> {
    /// Pure state change, nothing to perform.
    pub fn to(state: S) -> Self {
        Self {
            state,
            effect: None,
            response: None,
        }
    }

    /// State change that only becomes visible once `effect` has succeeded.
    pub fn with_effect(state: S, effect: F) -> Self {
        Self {
            state,
            effect: Some(effect),
            response: None,
        }
    }

    pub fn respond(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }
}

/// A workflow is a reducer over a per-session state plus an async hook
/// for the side effects the reducer asks for.
///
/// `reduce` must not touch the outside world: validation failures are
/// returned as errors and leave the stored state untouched. Anything that
/// talks to I/O belongs in `perform`.
#[async_trait]
pub trait Workflow: Send + Sync {
    type State: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Action: Send + 'static;
    type Effect: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Unique identifier for this workflow
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn reduce(
        &self,
        state: &Self::State,
        action: Self::Action,
    ) -> Result<Transition<Self::State, Self::Effect>, Self::Error>;

    /// Execute `effect`, returning the state to persist afterwards.
    async fn perform(
        &self,
        state: Self::State,
        effect: Self::Effect,
    ) -> Result<Self::State, Self::Error>;
}
