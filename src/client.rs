//! Correlation client: starts and advances process instances on behalf of
//! aggregates.
//!
//! [`ProcessCorrelationClient`] is the only place that talks to the
//! [`ProcessEngine`]. It derives the definition key from the aggregate type,
//! resolves the business key through an [`IdentityResolver`], and maps engine
//! failures into [`ProcessError`]s carrying both keys.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::aggregate::{Aggregate, AggregateType};
use crate::engine::{ProcessEngine, ProcessInstanceId};
use crate::error::ProcessError;
use crate::identity::IdentityResolver;

/// Receiver of transitions fired by intercepting [`Managed`](crate::Managed)
/// wrappers.
///
/// Implemented by [`ProcessCorrelationClient`]; the trait exists so the
/// dispatch path can be observed or replaced without an engine.
pub trait TransitionDispatcher: Send + Sync {
    /// Deliver `transition` for the aggregate `instance` of `aggregate_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::MissingIdentifier`] or
    /// [`ProcessError::TransitionDeliveryFailure`].
    fn dispatch(
        &self,
        aggregate_type: AggregateType,
        instance: &dyn Any,
        transition: &str,
    ) -> Result<(), ProcessError>;
}

/// Starts and correlates process instances keyed by aggregate identifiers.
///
/// Calls are synchronous and never retried. Whether a process was started
/// before a transition is delivered for the same aggregate is up to the
/// caller; delivering too early fails with
/// [`ProcessError::TransitionDeliveryFailure`].
///
/// `Clone` is cheap -- the engine and resolver are `Arc`-shared.
///
/// # Examples
///
/// ```
/// use aggregate_process::{
///     Aggregate, EntityMetadata, InMemoryEngine, ProcessCorrelationClient, ProcessDefinition,
/// };
///
/// struct Order {
///     id: u64,
/// }
/// impl Aggregate for Order {
///     const AGGREGATE_TYPE: &'static str = "Order";
/// }
///
/// let engine = InMemoryEngine::new();
/// engine.deploy(
///     ProcessDefinition::builder("order", "payment-expected")
///         .on_message("order-paid", "payment-expected", "preparing")
///         .build(),
/// );
/// let metadata = EntityMetadata::builder()
///     .entity::<Order, _>(|order| Some(order.id.to_string()))
///     .build();
/// let client = ProcessCorrelationClient::new(engine.clone(), metadata);
///
/// let order = Order { id: 7 };
/// client.start_process(&order).unwrap();
/// client.execute_transition(&order, "order-paid").unwrap();
/// assert_eq!(engine.instance("7").unwrap().state, "preparing");
/// ```
#[derive(Clone)]
pub struct ProcessCorrelationClient {
    engine: Arc<dyn ProcessEngine>,
    identities: Arc<dyn IdentityResolver>,
}

impl fmt::Debug for ProcessCorrelationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessCorrelationClient").finish_non_exhaustive()
    }
}

impl ProcessCorrelationClient {
    /// Create a client over `engine`, resolving identifiers with `identities`.
    pub fn new(
        engine: impl ProcessEngine + 'static,
        identities: impl IdentityResolver + 'static,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            identities: Arc::new(identities),
        }
    }

    /// Create a client from already shared collaborators.
    pub fn from_shared(
        engine: Arc<dyn ProcessEngine>,
        identities: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self { engine, identities }
    }

    /// Definition key the engine's deployments are expected under for `A`.
    pub fn definition_key_for<A: Aggregate>() -> String {
        AggregateType::of::<A>().definition_key()
    }

    /// Start the process instance for a freshly persisted aggregate.
    ///
    /// The definition key is the lowercase aggregate type name and the
    /// business key is the aggregate's identifier.
    ///
    /// # Returns
    ///
    /// The engine-assigned id of the new process instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::MissingIdentifier`] (engine not called) if the
    /// aggregate has no identifier, or [`ProcessError::ProcessStartFailure`]
    /// if the engine refuses the start.
    pub fn start_process<A: Aggregate>(
        &self,
        aggregate: &A,
    ) -> Result<ProcessInstanceId, ProcessError> {
        self.start_erased(AggregateType::of::<A>(), aggregate)
    }

    /// Deliver `transition` to the process instance of `aggregate`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::MissingIdentifier`] (engine not called) if the
    /// aggregate has no identifier, or
    /// [`ProcessError::TransitionDeliveryFailure`] if no running instance
    /// matches or the instance is not waiting for `transition`.
    pub fn execute_transition<A: Aggregate>(
        &self,
        aggregate: &A,
        transition: &str,
    ) -> Result<(), ProcessError> {
        self.correlate_erased(AggregateType::of::<A>(), aggregate, transition)
    }

    fn start_erased(
        &self,
        aggregate_type: AggregateType,
        instance: &dyn Any,
    ) -> Result<ProcessInstanceId, ProcessError> {
        let definition_key = aggregate_type.definition_key();
        let business_key = self.identities.identifier_of(aggregate_type, instance)?;

        match self
            .engine
            .start_process_instance(&definition_key, &business_key)
        {
            Ok(instance_id) => {
                tracing::info!(
                    definition_key = %definition_key,
                    business_key = %business_key,
                    instance_id = %instance_id,
                    "process started"
                );
                Ok(instance_id)
            }
            Err(source) => {
                tracing::error!(
                    definition_key = %definition_key,
                    business_key = %business_key,
                    error = %source,
                    "process start failed"
                );
                Err(ProcessError::ProcessStartFailure {
                    definition_key,
                    business_key,
                    source,
                })
            }
        }
    }

    fn correlate_erased(
        &self,
        aggregate_type: AggregateType,
        instance: &dyn Any,
        transition: &str,
    ) -> Result<(), ProcessError> {
        let business_key = self.identities.identifier_of(aggregate_type, instance)?;

        self.engine
            .correlate_message(transition, &business_key)
            .map_err(|source| {
                tracing::error!(
                    aggregate_type = aggregate_type.name(),
                    transition,
                    business_key = %business_key,
                    error = %source,
                    "transition delivery failed"
                );
                ProcessError::TransitionDeliveryFailure {
                    transition: transition.to_owned(),
                    business_key: business_key.clone(),
                    source,
                }
            })?;

        tracing::info!(
            aggregate_type = aggregate_type.name(),
            transition,
            business_key = %business_key,
            "transition delivered"
        );
        Ok(())
    }
}

impl TransitionDispatcher for ProcessCorrelationClient {
    fn dispatch(
        &self,
        aggregate_type: AggregateType,
        instance: &dyn Any,
        transition: &str,
    ) -> Result<(), ProcessError> {
        self.correlate_erased(aggregate_type, instance, transition)
    }
}
