//! End-to-end tests driving the Restbucks order process through managed
//! aggregates and the in-memory engine.

use aggregate_process::{
    Aggregate, AggregateType, BindingsConfig, CreationListener, EngineError, EntityMetadata,
    Identifiable, InMemoryEngine, InvocationError, Managed, ProcessDefinition, ProcessError,
    StateMachine, TransitionRegistry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    PaymentExpected,
    Paid,
    Preparing,
    Ready,
    Taken,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
enum OrderError {
    #[error("order is in status {0:?}")]
    InvalidStatus(Status),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Order {
    id: Option<u64>,
    status: Status,
}

impl Aggregate for Order {
    const AGGREGATE_TYPE: &'static str = "Order";
}

impl Identifiable for Order {
    fn identifier(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }
}

impl Order {
    fn new(id: u64) -> Self {
        Self {
            id: Some(id),
            status: Status::PaymentExpected,
        }
    }

    fn advance(&mut self, from: Status, to: Status) -> Result<(), OrderError> {
        if self.status != from {
            return Err(OrderError::InvalidStatus(self.status));
        }
        self.status = to;
        Ok(())
    }
}

/// Business operations as seen through the managed wrapper.
trait OrderOps {
    fn mark_paid(&mut self) -> Result<(), InvocationError<OrderError>>;
    fn mark_in_preparation(&mut self) -> Result<(), InvocationError<OrderError>>;
    fn mark_prepared(&mut self) -> Result<(), InvocationError<OrderError>>;
    fn mark_taken(&mut self) -> Result<(), InvocationError<OrderError>>;
}

impl OrderOps for Managed<Order> {
    fn mark_paid(&mut self) -> Result<(), InvocationError<OrderError>> {
        self.try_call_mut("mark_paid", |o| o.advance(Status::PaymentExpected, Status::Paid))
    }

    fn mark_in_preparation(&mut self) -> Result<(), InvocationError<OrderError>> {
        self.try_call_mut("mark_in_preparation", |o| {
            o.advance(Status::Paid, Status::Preparing)
        })
    }

    fn mark_prepared(&mut self) -> Result<(), InvocationError<OrderError>> {
        self.try_call_mut("mark_prepared", |o| o.advance(Status::Preparing, Status::Ready))
    }

    fn mark_taken(&mut self) -> Result<(), InvocationError<OrderError>> {
        self.try_call_mut("mark_taken", |o| o.advance(Status::Ready, Status::Taken))
    }
}

const BINDINGS: &str = r#"
[aggregates.Order]
mark_paid = "order-paid"
mark_prepared = "order-prepared"
mark_taken = "order-taken"
"#;

fn restbucks_process() -> ProcessDefinition {
    ProcessDefinition::builder("order", "payment-expected")
        .on_message("order-paid", "payment-expected", "preparing")
        .on_message("order-prepared", "preparing", "ready")
        .on_message("order-taken", "ready", "completed")
        .end_state("completed")
        .build()
}

fn setup() -> (InMemoryEngine, StateMachine) {
    let engine = InMemoryEngine::new();
    engine.deploy(restbucks_process());

    let config = BindingsConfig::from_toml_str(BINDINGS).expect("bindings parse");
    let mut builder = TransitionRegistry::builder();
    builder.apply_bindings::<Order>(&config);
    let registry = builder
        .seal_validated(&[AggregateType::of::<Order>()])
        .expect("Order is configured");

    let machine = StateMachine::new(
        registry,
        engine.clone(),
        EntityMetadata::builder().identifiable::<Order>().build(),
    );
    (engine, machine)
}

#[test]
fn creation_starts_order_process() {
    let (engine, machine) = setup();

    machine.on_created(&Order::new(7)).expect("start succeeds");

    let instance = engine.instance("7").expect("instance for order 7");
    assert_eq!(instance.definition_key, "order");
    assert_eq!(instance.state, "payment-expected");
    assert_eq!(engine.running_instances(), 1);
}

#[test]
fn paying_correlates_order_paid() {
    let (engine, machine) = setup();
    machine.on_created(&Order::new(42)).unwrap();

    let mut order = machine.post_process(Order::new(42));
    order.mark_paid().expect("payment accepted");

    assert_eq!(order.status, Status::Paid);
    let instance = engine.instance("42").unwrap();
    assert_eq!(instance.history, vec!["order-paid".to_string()]);
    assert_eq!(instance.state, "preparing");
}

#[test]
fn full_restbucks_flow_completes_process() {
    let (engine, machine) = setup();
    machine.on_created(&Order::new(1)).unwrap();

    let mut order = machine.post_process(Order::new(1));
    order.mark_paid().unwrap();
    // Unbound: no transition, local state only.
    order.mark_in_preparation().unwrap();
    order.mark_prepared().unwrap();
    order.mark_taken().unwrap();

    assert_eq!(order.status, Status::Taken);
    assert!(engine.instance("1").is_none(), "process completed");
    let history = engine.history("1");
    assert_eq!(history.len(), 1);
    assert!(history[0].completed);
    assert_eq!(
        history[0].history,
        vec!["order-paid", "order-prepared", "order-taken"]
    );
}

#[test]
fn transition_without_running_process_is_dispatch_error() {
    let (engine, machine) = setup();

    let mut order = machine.post_process(Order::new(5));
    let err = order.mark_paid().expect_err("no process started");

    match err {
        InvocationError::Dispatch(ProcessError::TransitionDeliveryFailure {
            transition,
            business_key,
            source,
        }) => {
            assert_eq!(transition, "order-paid");
            assert_eq!(business_key, "5");
            assert_eq!(
                source,
                EngineError::NoMatchingInstance {
                    business_key: "5".into()
                }
            );
        }
        other => panic!("expected dispatch failure, got: {other:?}"),
    }
    // Body skipped when dispatch fails.
    assert_eq!(order.status, Status::PaymentExpected);
    assert_eq!(engine.running_instances(), 0);
}

#[test]
fn out_of_order_transition_is_not_waiting() {
    let (_engine, machine) = setup();
    machine.on_created(&Order::new(9)).unwrap();

    let mut order = machine.post_process(Order {
        id: Some(9),
        status: Status::Preparing,
    });
    let err = order.mark_prepared().expect_err("process still expects payment");

    assert!(matches!(
        err,
        InvocationError::Dispatch(ProcessError::TransitionDeliveryFailure {
            source: EngineError::NotWaiting { .. },
            ..
        })
    ));
}

#[test]
fn method_failure_after_dispatch_is_method_error() {
    let (engine, machine) = setup();
    machine.on_created(&Order::new(3)).unwrap();

    // Stale local copy: already paid locally but the process still waits.
    let mut order = machine.post_process(Order {
        id: Some(3),
        status: Status::Paid,
    });
    let err = order.mark_paid().expect_err("already paid");

    assert_eq!(err.to_string(), "order is in status Paid");
    assert!(matches!(
        err,
        InvocationError::Method(OrderError::InvalidStatus(Status::Paid))
    ));
    assert_eq!(engine.instance("3").unwrap().state, "preparing");
}

#[test]
fn unsaved_order_has_missing_identifier() {
    let (engine, machine) = setup();
    let unsaved = Order {
        id: None,
        status: Status::PaymentExpected,
    };

    let start = machine.on_created(&unsaved);
    let mut order = machine.post_process(unsaved);
    let transition = order.mark_paid();

    assert!(matches!(start, Err(ProcessError::MissingIdentifier { .. })));
    assert!(matches!(
        transition,
        Err(InvocationError::Dispatch(ProcessError::MissingIdentifier { .. }))
    ));
    assert_eq!(engine.running_instances(), 0);
    assert!(engine.history("").is_empty());
}

#[test]
fn duplicate_creation_is_start_failure() {
    let (_engine, machine) = setup();
    machine.on_created(&Order::new(11)).unwrap();

    let err = machine.started(&Order::new(11)).expect_err("already running");
    assert!(matches!(
        err,
        ProcessError::ProcessStartFailure {
            source: EngineError::AlreadyRunning { .. },
            ..
        }
    ));
}

#[test]
fn managed_order_behaves_like_plain_order() {
    let (_engine, machine) = setup();
    let plain = Order::new(2);
    let managed = machine.post_process(plain.clone());

    assert!(managed.is_intercepted());
    assert_eq!(managed, plain);
    assert_eq!(format!("{managed:?}"), format!("{plain:?}"));
    assert_eq!(managed.into_inner(), plain);
}
