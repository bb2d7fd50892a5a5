//! Process engine contract and an embeddable in-memory engine.
//!
//! The engine is the only shared, mutable resource this crate talks to. Every
//! call is blocking and may fail independently of the crate's own state;
//! nothing here batches, retries, or reorders calls.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Client contract of an external process engine.
///
/// Both operations address process instances by business key, the
/// identifier of the aggregate the process belongs to.
pub trait ProcessEngine: Send + Sync {
    /// Start a new instance of the definition deployed under
    /// `definition_key`, tagged with `business_key`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DefinitionNotFound`] if nothing is deployed under
    /// the key, or another [`EngineError`] if the engine refuses the start.
    fn start_process_instance(
        &self,
        definition_key: &str,
        business_key: &str,
    ) -> Result<ProcessInstanceId, EngineError>;

    /// Deliver the message `message_name` to the running instance carrying
    /// `business_key`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoMatchingInstance`] if no running instance
    /// carries the key, [`EngineError::NotWaiting`] if it is not waiting for
    /// that message, or another [`EngineError`] on engine failure.
    fn correlate_message(&self, message_name: &str, business_key: &str)
    -> Result<(), EngineError>;
}

impl<E: ProcessEngine + ?Sized> ProcessEngine for Arc<E> {
    fn start_process_instance(
        &self,
        definition_key: &str,
        business_key: &str,
    ) -> Result<ProcessInstanceId, EngineError> {
        (**self).start_process_instance(definition_key, business_key)
    }

    fn correlate_message(
        &self,
        message_name: &str,
        business_key: &str,
    ) -> Result<(), EngineError> {
        (**self).correlate_message(message_name, business_key)
    }
}

/// Engine-assigned identifier of a process instance.
pub type ProcessInstanceId = String;

/// A deployable process template: named states connected by message events.
///
/// An instance starts in the initial state and waits for the messages that
/// leave its current state. Reaching an end state completes the instance.
///
/// # Examples
///
/// ```
/// use aggregate_process::ProcessDefinition;
///
/// let order = ProcessDefinition::builder("order", "payment-expected")
///     .on_message("order-paid", "payment-expected", "preparing")
///     .on_message("order-prepared", "preparing", "ready")
///     .on_message("order-taken", "ready", "completed")
///     .end_state("completed")
///     .build();
///
/// assert_eq!(order.key(), "order");
/// assert_eq!(order.target("preparing", "order-prepared"), Some("ready"));
/// assert_eq!(order.target("preparing", "order-paid"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    key: String,
    initial_state: String,
    /// `state -> (message -> target state)`
    transitions: BTreeMap<String, BTreeMap<String, String>>,
    end_states: BTreeSet<String>,
}

impl ProcessDefinition {
    /// Start describing a definition deployed under `key`.
    pub fn builder(
        key: impl Into<String>,
        initial_state: impl Into<String>,
    ) -> ProcessDefinitionBuilder {
        ProcessDefinitionBuilder {
            definition: ProcessDefinition {
                key: key.into(),
                initial_state: initial_state.into(),
                transitions: BTreeMap::new(),
                end_states: BTreeSet::new(),
            },
        }
    }

    /// Definition key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// State new instances start in.
    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    /// State reached when `message` arrives in `state`, if the state waits for it.
    pub fn target(&self, state: &str, message: &str) -> Option<&str> {
        self.transitions
            .get(state)
            .and_then(|messages| messages.get(message))
            .map(String::as_str)
    }

    /// Messages an instance in `state` waits for.
    pub fn awaited_messages(&self, state: &str) -> Vec<&str> {
        self.transitions
            .get(state)
            .map(|messages| messages.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns `true` if reaching `state` completes the instance.
    pub fn is_end_state(&self, state: &str) -> bool {
        self.end_states.contains(state)
    }
}

/// Builder for [`ProcessDefinition`].
#[derive(Debug, Clone)]
pub struct ProcessDefinitionBuilder {
    definition: ProcessDefinition,
}

impl ProcessDefinitionBuilder {
    /// Move from `from` to `to` when `message` arrives.
    pub fn on_message(
        mut self,
        message: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.definition
            .transitions
            .entry(from.into())
            .or_default()
            .insert(message.into(), to.into());
        self
    }

    /// Mark `state` as completing the instance.
    pub fn end_state(mut self, state: impl Into<String>) -> Self {
        self.definition.end_states.insert(state.into());
        self
    }

    /// Finish the definition.
    pub fn build(self) -> ProcessDefinition {
        self.definition
    }
}

/// Point-in-time view of a process instance held by the [`InMemoryEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInstanceSnapshot {
    /// Engine-assigned instance id.
    pub id: ProcessInstanceId,
    /// Key of the definition the instance runs.
    pub definition_key: String,
    /// Business key (aggregate identifier).
    pub business_key: String,
    /// Current state.
    pub state: String,
    /// Messages correlated so far, in delivery order.
    pub history: Vec<String>,
    /// `true` once the instance reached an end state.
    pub completed: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    definitions: HashMap<String, ProcessDefinition>,
    /// Instances by business key, oldest first.
    instances: HashMap<String, Vec<ProcessInstanceSnapshot>>,
}

/// Embeddable, process-local [`ProcessEngine`].
///
/// Holds deployed [`ProcessDefinition`]s and their running instances in
/// memory. Intended for applications that embed their engine and for tests.
/// `Clone` is cheap and clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    state: Arc<Mutex<EngineState>>,
}

impl InMemoryEngine {
    /// Create an engine without deployments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy `definition`, replacing any earlier one under the same key.
    ///
    /// Running instances of a replaced definition keep running against the
    /// new version.
    pub fn deploy(&self, definition: ProcessDefinition) {
        tracing::debug!(definition_key = %definition.key, "deploying process definition");
        let mut state = self.lock();
        state
            .definitions
            .insert(definition.key.clone(), definition);
    }

    /// Running (not completed) instance carrying `business_key`, if any.
    pub fn instance(&self, business_key: &str) -> Option<ProcessInstanceSnapshot> {
        let state = self.lock();
        state
            .instances
            .get(business_key)
            .and_then(|list| list.iter().rev().find(|i| !i.completed))
            .cloned()
    }

    /// All instances ever started for `business_key`, oldest first.
    pub fn history(&self, business_key: &str) -> Vec<ProcessInstanceSnapshot> {
        let state = self.lock();
        state
            .instances
            .get(business_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of instances that have not completed.
    pub fn running_instances(&self) -> usize {
        let state = self.lock();
        state
            .instances
            .values()
            .flatten()
            .filter(|i| !i.completed)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state mutex poisoned")
    }
}

impl ProcessEngine for InMemoryEngine {
    fn start_process_instance(
        &self,
        definition_key: &str,
        business_key: &str,
    ) -> Result<ProcessInstanceId, EngineError> {
        let mut state = self.lock();
        let definition = state
            .definitions
            .get(definition_key)
            .ok_or_else(|| EngineError::DefinitionNotFound(definition_key.to_owned()))?;
        let initial_state = definition.initial_state.clone();
        let completed = definition.is_end_state(&initial_state);

        let instances = state.instances.entry(business_key.to_owned()).or_default();
        if instances
            .iter()
            .any(|i| !i.completed && i.definition_key == definition_key)
        {
            return Err(EngineError::AlreadyRunning {
                business_key: business_key.to_owned(),
            });
        }

        let id = Uuid::new_v4().to_string();
        instances.push(ProcessInstanceSnapshot {
            id: id.clone(),
            definition_key: definition_key.to_owned(),
            business_key: business_key.to_owned(),
            state: initial_state,
            history: Vec::new(),
            completed,
        });
        Ok(id)
    }

    fn correlate_message(
        &self,
        message_name: &str,
        business_key: &str,
    ) -> Result<(), EngineError> {
        let mut guard = self.lock();
        let EngineState {
            definitions,
            instances,
        } = &mut *guard;

        let mut running = instances
            .get_mut(business_key)
            .into_iter()
            .flat_map(|list| list.iter_mut().rev())
            .filter(|i| !i.completed)
            .peekable();
        // Newest running instance, reported when nothing waits for the message.
        let Some(newest_state) = running.peek().map(|i| i.state.clone()) else {
            return Err(EngineError::NoMatchingInstance {
                business_key: business_key.to_owned(),
            });
        };

        // Several definitions may run under the same business key; deliver to
        // the one whose current state has a transition for the message.
        let waiting = running.find_map(|instance| {
            let definition = definitions.get(&instance.definition_key)?;
            let target = definition.target(&instance.state, message_name)?;
            Some((instance, definition, target))
        });
        let Some((instance, definition, target)) = waiting else {
            return Err(EngineError::NotWaiting {
                message: message_name.to_owned(),
                business_key: business_key.to_owned(),
                state: newest_state,
            });
        };

        instance.state = target.to_owned();
        instance.history.push(message_name.to_owned());
        instance.completed = definition.is_end_state(target);
        Ok(())
    }
}
