//! Self-contained walk through the Restbucks order process: bindings loaded
//! from a TOML file, an embedded in-memory engine, and an order whose
//! business methods drive the process.
//!
//! Run with: `RUST_LOG=aggregate_process=debug cargo run --example order_flow`

use std::io::Write;

use aggregate_process::{
    Aggregate, AggregateType, BindingsConfig, CreationListener, EntityMetadata, Identifiable,
    InMemoryEngine, InvocationError, Managed, ProcessDefinition, StateMachine, TransitionRegistry,
};

// ---------------------------------------------------------------------------
// Order aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    PaymentExpected,
    Preparing,
    Ready,
    Taken,
}

/// Errors raised by [`Order`]'s business methods.
#[derive(Debug, thiserror::Error)]
enum OrderError {
    #[error("cannot go from {from:?} to {to:?}")]
    IllegalTransition { from: Status, to: Status },
}

#[derive(Debug, Clone)]
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
    fn move_to(&mut self, from: Status, to: Status) -> Result<(), OrderError> {
        if self.status != from {
            return Err(OrderError::IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Business methods routed through the managed wrapper.
trait OrderOps {
    fn mark_paid(&mut self) -> Result<(), InvocationError<OrderError>>;
    fn mark_prepared(&mut self) -> Result<(), InvocationError<OrderError>>;
    fn mark_taken(&mut self) -> Result<(), InvocationError<OrderError>>;
}

impl OrderOps for Managed<Order> {
    fn mark_paid(&mut self) -> Result<(), InvocationError<OrderError>> {
        self.try_call_mut("mark_paid", |o| {
            o.move_to(Status::PaymentExpected, Status::Preparing)
        })
    }

    fn mark_prepared(&mut self) -> Result<(), InvocationError<OrderError>> {
        self.try_call_mut("mark_prepared", |o| o.move_to(Status::Preparing, Status::Ready))
    }

    fn mark_taken(&mut self) -> Result<(), InvocationError<OrderError>> {
        self.try_call_mut("mark_taken", |o| o.move_to(Status::Ready, Status::Taken))
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

const BINDINGS: &str = r#"
[aggregates.Order]
mark_paid = "order-paid"
mark_prepared = "order-prepared"
mark_taken = "order-taken"
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Write the bindings to disk the way an application would ship them.
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(BINDINGS.as_bytes())?;
    let config = BindingsConfig::load(file.path())?;

    let engine = InMemoryEngine::new();
    engine.deploy(
        ProcessDefinition::builder("order", "payment-expected")
            .on_message("order-paid", "payment-expected", "preparing")
            .on_message("order-prepared", "preparing", "ready")
            .on_message("order-taken", "ready", "completed")
            .end_state("completed")
            .build(),
    );

    let mut registry = TransitionRegistry::builder();
    registry.apply_bindings::<Order>(&config);
    let machine = StateMachine::new(
        registry.seal_validated(&[AggregateType::of::<Order>()])?,
        engine.clone(),
        EntityMetadata::builder().identifiable::<Order>().build(),
    );

    // The repository persisted a new order and reports its creation.
    let order = Order {
        id: Some(1),
        status: Status::PaymentExpected,
    };
    machine.on_created(&order)?;

    // Every later load hands out a managed order.
    let mut order = machine.post_process(order);
    order.mark_paid()?;
    order.mark_prepared()?;

    // Taking the order twice: the process has already completed, so the
    // second dispatch fails and the local state is left alone.
    order.mark_taken()?;
    match order.mark_taken() {
        Err(InvocationError::Dispatch(err)) => println!("rejected as expected: {err}"),
        other => return Err(format!("unexpected outcome: {other:?}").into()),
    }

    let history = engine.history("1");
    println!("order status = {:?}", order.status);
    println!("process history = {:?}", history[0].history);

    assert_eq!(order.status, Status::Taken);
    assert!(history[0].completed);
    println!("all assertions passed");

    Ok(())
}
