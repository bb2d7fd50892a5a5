//! Aggregate trait and the canonical type tag used as registry key.

use std::any::TypeId;
use std::fmt;

/// A persisted business entity whose lifecycle may be bound to a process.
///
/// Aggregates know nothing about the process engine. The only thing this
/// crate needs from them is a canonical type name; identifiers are resolved
/// through an [`IdentityResolver`](crate::IdentityResolver).
///
/// # Contract
///
/// - [`AGGREGATE_TYPE`](Aggregate::AGGREGATE_TYPE) must be stable across
///   runs. Its lowercase form is the process definition key the engine's
///   deployments are keyed against.
pub trait Aggregate: Send + Sync + 'static {
    /// Canonical type name (e.g. "Order").
    const AGGREGATE_TYPE: &'static str;
}

/// An aggregate that can report its own identifier.
///
/// Implementors can be registered with
/// [`EntityMetadata::identifiable`](crate::EntityMetadata::identifiable)
/// instead of supplying an accessor closure.
pub trait Identifiable: Aggregate {
    /// The identifier, or `None` while the aggregate is not yet persisted.
    fn identifier(&self) -> Option<String>;
}

/// Runtime tag identifying an aggregate type.
///
/// Pairs the Rust [`TypeId`] (the lookup key) with the canonical name from
/// [`Aggregate::AGGREGATE_TYPE`] (used in errors, logs, and definition keys).
/// Equality and hashing consider only the `TypeId`.
#[derive(Clone, Copy)]
pub struct AggregateType {
    id: TypeId,
    name: &'static str,
}

impl AggregateType {
    /// Tag for the aggregate type `A`.
    pub fn of<A: Aggregate>() -> Self {
        Self {
            id: TypeId::of::<A>(),
            name: A::AGGREGATE_TYPE,
        }
    }

    /// Canonical type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type id backing this tag.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Process definition key for this type: the lowercase canonical name.
    ///
    /// # Examples
    ///
    /// ```
    /// use aggregate_process::{Aggregate, AggregateType};
    ///
    /// struct Order;
    /// impl Aggregate for Order {
    ///     const AGGREGATE_TYPE: &'static str = "Order";
    /// }
    ///
    /// assert_eq!(AggregateType::of::<Order>().definition_key(), "order");
    /// ```
    pub fn definition_key(&self) -> String {
        self.name.to_lowercase()
    }
}

impl PartialEq for AggregateType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AggregateType {}

impl std::hash::Hash for AggregateType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AggregateType").field(&self.name).finish()
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::{Aggregate, Identifiable};

    /// Lifecycle status of the [`Order`] fixture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) enum Status {
        PaymentExpected,
        Paid,
        Preparing,
    }

    /// A Restbucks-style order used as a test fixture.
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub(crate) struct Order {
        pub id: Option<u64>,
        pub status: Status,
    }

    /// Errors raised by [`Order`] business methods.
    #[derive(Debug, thiserror::Error)]
    pub(crate) enum OrderError {
        #[error("order is already paid")]
        AlreadyPaid,
    }

    impl Order {
        pub(crate) fn persisted(id: u64) -> Self {
            Self {
                id: Some(id),
                status: Status::PaymentExpected,
            }
        }

        pub(crate) fn unsaved() -> Self {
            Self {
                id: None,
                status: Status::PaymentExpected,
            }
        }

        pub(crate) fn mark_paid(&mut self) -> Result<(), OrderError> {
            if self.status != Status::PaymentExpected {
                return Err(OrderError::AlreadyPaid);
            }
            self.status = Status::Paid;
            Ok(())
        }

        pub(crate) fn mark_in_preparation(&mut self) {
            self.status = Status::Preparing;
        }

        pub(crate) fn is_paid(&self) -> bool {
            self.status != Status::PaymentExpected
        }
    }

    impl Aggregate for Order {
        const AGGREGATE_TYPE: &'static str = "Order";
    }

    impl Identifiable for Order {
        fn identifier(&self) -> Option<String> {
            self.id.map(|id| id.to_string())
        }
    }

    /// An aggregate type that is never registered anywhere.
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub(crate) struct Ticket {
        pub title: String,
    }

    impl Aggregate for Ticket {
        const AGGREGATE_TYPE: &'static str = "Ticket";
    }
}
