//! Bind aggregate method calls to business-process transitions.
//!
//! Aggregate types are registered with a [`TransitionRegistryBuilder`] that
//! maps business methods to transition names. Aggregates handed back to
//! application code are wrapped in [`Managed`] by a [`ProxyFactory`]; calling
//! a bound method through the wrapper first delivers the transition to the
//! aggregate's process instance via a [`ProcessCorrelationClient`], keyed by
//! the aggregate's identifier. When an aggregate is first persisted,
//! [`StateMachine::started`] starts that process instance.
//!
//! The engine itself sits behind [`ProcessEngine`]. [`InMemoryEngine`] runs
//! message-driven process definitions in process; the `rest` feature adds
//! `RestEngine` for a Camunda 7 compatible REST API.

mod aggregate;
pub use aggregate::{Aggregate, AggregateType, Identifiable};
mod auth;
mod client;
mod config;
mod engine;
mod error;
mod identity;
mod lifecycle;
mod proxy;
mod registry;
#[cfg(feature = "rest")]
mod rest;

pub use auth::BearerToken;
pub use client::{ProcessCorrelationClient, TransitionDispatcher};
pub use config::{BindingsConfig, EngineConfig, expand_env_vars};
pub use engine::{
    InMemoryEngine, ProcessDefinition, ProcessDefinitionBuilder, ProcessEngine, ProcessInstanceId,
    ProcessInstanceSnapshot,
};
pub use error::{EngineError, InvocationError, ProcessError};
pub use identity::{EntityMetadata, EntityMetadataBuilder, IdentityResolver};
pub use lifecycle::{AggregateCreated, CreationListener, StateMachine};
pub use proxy::{Managed, ProxyFactory};
pub use registry::{
    AggregateTypeConfig, STRUCTURAL_METHODS, TransitionBinding, TransitionRegistry,
    TransitionRegistryBuilder, is_structural_method,
};
#[cfg(feature = "rest")]
pub use rest::{RestEngine, message_failure, start_failure};
