//! Lifecycle hooks connecting the persistence collaborator to the process
//! engine.
//!
//! Two moments matter. When a new aggregate is first persisted, its process
//! is started ([`CreationListener::on_created`]). Whenever an aggregate is
//! handed back to application code, it is wrapped so that its bound methods
//! fire transitions ([`StateMachine::post_process`]). Process start never
//! happens from inside a [`Managed`] wrapper.

use std::sync::Arc;

use crate::aggregate::Aggregate;
use crate::client::{ProcessCorrelationClient, TransitionDispatcher};
use crate::engine::{ProcessEngine, ProcessInstanceId};
use crate::error::ProcessError;
use crate::identity::IdentityResolver;
use crate::proxy::{Managed, ProxyFactory};
use crate::registry::TransitionRegistry;

/// Notification that `aggregate` was persisted for the first time.
///
/// Raised exactly once per aggregate, after its identifier exists.
#[derive(Debug, Clone, Copy)]
pub struct AggregateCreated<'a, A: Aggregate> {
    /// The newly persisted aggregate.
    pub aggregate: &'a A,
}

impl<'a, A: Aggregate> AggregateCreated<'a, A> {
    /// Notification for `aggregate`.
    pub fn new(aggregate: &'a A) -> Self {
        Self { aggregate }
    }
}

/// Callback the persistence collaborator invokes synchronously after it
/// first persists a new aggregate.
pub trait CreationListener<A: Aggregate> {
    /// React to the creation of `aggregate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reaction (starting a process) fails; the
    /// persistence collaborator decides how to surface it.
    fn on_created(&self, aggregate: &A) -> Result<(), ProcessError>;
}

/// Entry point wiring registry, proxy factory, and correlation client.
///
/// `Clone` is cheap -- every collaborator is `Arc`-shared.
///
/// # Examples
///
/// ```
/// use aggregate_process::{
///     Aggregate, EntityMetadata, InMemoryEngine, ProcessDefinition, StateMachine,
///     TransitionRegistry,
/// };
///
/// #[derive(Debug)]
/// struct Order {
///     id: u64,
///     paid: bool,
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
///
/// let mut registry = TransitionRegistry::builder();
/// registry
///     .configuration_for::<Order>()
///     .bind("mark_paid", "order-paid");
///
/// let machine = StateMachine::new(
///     registry.seal(),
///     engine.clone(),
///     EntityMetadata::builder()
///         .entity::<Order, _>(|o| Some(o.id.to_string()))
///         .build(),
/// );
///
/// let order = Order { id: 42, paid: false };
/// machine.started(&order).unwrap();
///
/// let mut order = machine.post_process(order);
/// order.call_mut("mark_paid", |o| o.paid = true).unwrap();
///
/// assert!(order.paid);
/// assert_eq!(engine.instance("42").unwrap().state, "preparing");
/// ```
#[derive(Debug, Clone)]
pub struct StateMachine {
    client: ProcessCorrelationClient,
    factory: ProxyFactory,
}

impl StateMachine {
    /// Build a state machine over `engine`, resolving identifiers with
    /// `identities`.
    pub fn new(
        registry: TransitionRegistry,
        engine: impl ProcessEngine + 'static,
        identities: impl IdentityResolver + 'static,
    ) -> Self {
        Self::with_client(registry, ProcessCorrelationClient::new(engine, identities))
    }

    /// Build a state machine around an existing correlation client.
    pub fn with_client(registry: TransitionRegistry, client: ProcessCorrelationClient) -> Self {
        let dispatcher: Arc<dyn TransitionDispatcher> = Arc::new(client.clone());
        Self {
            client,
            factory: ProxyFactory::new(registry, dispatcher),
        }
    }

    /// The correlation client used for starts and transitions.
    pub fn client(&self) -> &ProcessCorrelationClient {
        &self.client
    }

    /// The proxy factory used on the retrieval path.
    pub fn factory(&self) -> &ProxyFactory {
        &self.factory
    }

    /// The sealed transition registry.
    pub fn registry(&self) -> &TransitionRegistry {
        self.factory.registry()
    }

    /// Start the process for a newly persisted aggregate.
    ///
    /// # Returns
    ///
    /// The engine-assigned id of the new process instance.
    ///
    /// # Errors
    ///
    /// See [`ProcessCorrelationClient::start_process`].
    pub fn started<A: Aggregate>(&self, aggregate: &A) -> Result<ProcessInstanceId, ProcessError> {
        self.client.start_process(aggregate)
    }

    /// Handle an [`AggregateCreated`] notification.
    ///
    /// # Errors
    ///
    /// See [`ProcessCorrelationClient::start_process`].
    pub fn on_aggregate_created<A: Aggregate>(
        &self,
        event: AggregateCreated<'_, A>,
    ) -> Result<ProcessInstanceId, ProcessError> {
        self.started(event.aggregate)
    }

    /// Wrap an aggregate on its way back to application code.
    pub fn post_process<A: Aggregate>(&self, aggregate: A) -> Managed<A> {
        self.factory.wrap(aggregate)
    }

    /// Wrap an optional lookup result.
    pub fn post_process_optional<A: Aggregate>(&self, aggregate: Option<A>) -> Option<Managed<A>> {
        aggregate.map(|a| self.post_process(a))
    }

    /// Wrap every aggregate of a collection result.
    pub fn post_process_all<A, I>(&self, aggregates: I) -> Vec<Managed<A>>
    where
        A: Aggregate,
        I: IntoIterator<Item = A>,
    {
        self.factory.wrap_all(aggregates)
    }
}

impl<A: Aggregate> CreationListener<A> for StateMachine {
    fn on_created(&self, aggregate: &A) -> Result<(), ProcessError> {
        self.started(aggregate).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::test_fixtures::{Order, Ticket};
    use crate::engine::test_fixtures::{EngineCall, RecordingEngine};
    use crate::identity::EntityMetadata;
    use crate::registry::TransitionRegistryBuilder;

    fn machine(engine: Arc<RecordingEngine>) -> StateMachine {
        let mut builder = TransitionRegistryBuilder::new();
        builder
            .configuration_for::<Order>()
            .bind("mark_paid", "order-paid");
        StateMachine::new(
            builder.seal(),
            engine,
            EntityMetadata::builder().identifiable::<Order>().build(),
        )
    }

    #[test]
    fn creation_starts_exactly_one_process() {
        let engine = Arc::new(RecordingEngine::default());
        let machine = machine(engine.clone());

        let order = Order::persisted(7);
        CreationListener::on_created(&machine, &order).expect("start should succeed");

        assert_eq!(
            engine.calls(),
            vec![EngineCall::Start {
                definition_key: "order".into(),
                business_key: "7".into(),
            }]
        );
    }

    #[test]
    fn created_event_returns_instance_id() {
        let engine = Arc::new(RecordingEngine::default());
        let machine = machine(engine);

        let order = Order::persisted(8);
        let id = machine
            .on_aggregate_created(AggregateCreated::new(&order))
            .unwrap();
        assert_eq!(id, "pi-8");
    }

    #[test]
    fn creation_of_unsaved_aggregate_is_missing_identifier() {
        let engine = Arc::new(RecordingEngine::default());
        let machine = machine(engine.clone());

        let err = CreationListener::on_created(&machine, &Order::unsaved())
            .expect_err("no identifier yet");
        assert!(matches!(err, ProcessError::MissingIdentifier { .. }));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn wrapping_never_starts_a_process() {
        let engine = Arc::new(RecordingEngine::default());
        let machine = machine(engine.clone());

        let mut order = machine.post_process(Order::persisted(42));
        order.try_call_mut("mark_paid", Order::mark_paid).unwrap();

        assert_eq!(
            engine.calls(),
            vec![EngineCall::Correlate {
                message: "order-paid".into(),
                business_key: "42".into(),
            }]
        );
    }

    #[test]
    fn post_process_leaves_unconfigured_types_alone() {
        let engine = Arc::new(RecordingEngine::default());
        let machine = machine(engine.clone());

        let tickets = machine.post_process_all(vec![Ticket {
            title: "milk frother".into(),
        }]);
        let none = machine.post_process_optional::<Ticket>(None);

        assert!(!tickets[0].is_intercepted());
        assert!(none.is_none());
        assert!(machine.registry().has_configuration_for::<Order>());
        assert!(engine.calls().is_empty());
    }
}
