//! Identifier resolution for aggregate instances.
//!
//! The process engine locates a running instance by business key, which is the
//! aggregate's identifier rendered as a string. Finding that identifier is the
//! job of an [`IdentityResolver`]; [`EntityMetadata`] is the default one,
//! holding a per-type accessor registered at startup.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::aggregate::{Aggregate, AggregateType, Identifiable};
use crate::error::ProcessError;

/// Resolves the identifier of an aggregate instance.
///
/// Implementations receive the instance type-erased together with its
/// [`AggregateType`] so the trait stays object safe.
pub trait IdentityResolver: Send + Sync {
    /// Identifier of `instance`, an aggregate of type `aggregate_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::MissingIdentifier`] if the type has no identity
    /// metadata or the instance has no identifier yet.
    fn identifier_of(
        &self,
        aggregate_type: AggregateType,
        instance: &dyn Any,
    ) -> Result<String, ProcessError>;
}

/// Type-erased identifier accessor for one aggregate type.
type Accessor = Box<dyn Fn(&dyn Any) -> Option<String> + Send + Sync>;

/// Identity metadata for every aggregate type the application persists.
///
/// `Clone` is cheap -- the accessor table is shared behind an [`Arc`].
///
/// # Examples
///
/// ```
/// use aggregate_process::{Aggregate, AggregateType, EntityMetadata, IdentityResolver};
///
/// struct Order {
///     id: Option<u64>,
/// }
/// impl Aggregate for Order {
///     const AGGREGATE_TYPE: &'static str = "Order";
/// }
///
/// let metadata = EntityMetadata::builder()
///     .entity::<Order, _>(|order| order.id.map(|id| id.to_string()))
///     .build();
///
/// let order = Order { id: Some(7) };
/// let id = metadata
///     .identifier_of(AggregateType::of::<Order>(), &order)
///     .unwrap();
/// assert_eq!(id, "7");
/// ```
#[derive(Clone, Default)]
pub struct EntityMetadata {
    accessors: Arc<HashMap<TypeId, Accessor>>,
}

impl fmt::Debug for EntityMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMetadata")
            .field("entities", &self.accessors.len())
            .finish()
    }
}

impl EntityMetadata {
    /// Start registering identity metadata.
    pub fn builder() -> EntityMetadataBuilder {
        EntityMetadataBuilder::default()
    }

    /// Returns `true` if `A` has identity metadata.
    pub fn has_entity<A: Aggregate>(&self) -> bool {
        self.accessors.contains_key(&TypeId::of::<A>())
    }
}

impl IdentityResolver for EntityMetadata {
    fn identifier_of(
        &self,
        aggregate_type: AggregateType,
        instance: &dyn Any,
    ) -> Result<String, ProcessError> {
        let missing = || ProcessError::MissingIdentifier {
            aggregate_type: aggregate_type.name().to_owned(),
        };

        let Some(accessor) = self.accessors.get(&aggregate_type.id()) else {
            tracing::warn!(
                aggregate_type = aggregate_type.name(),
                "no identity metadata registered"
            );
            return Err(missing());
        };

        accessor(instance).ok_or_else(missing)
    }
}

/// Builder for [`EntityMetadata`].
#[derive(Default)]
pub struct EntityMetadataBuilder {
    accessors: HashMap<TypeId, Accessor>,
}

impl EntityMetadataBuilder {
    /// Register an identifier accessor for `A`.
    ///
    /// Registering the same type twice replaces the earlier accessor.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn entity<A, F>(mut self, accessor: F) -> Self
    where
        A: Aggregate,
        F: Fn(&A) -> Option<String> + Send + Sync + 'static,
    {
        let erased: Accessor =
            Box::new(move |instance: &dyn Any| instance.downcast_ref::<A>().and_then(&accessor));
        self.accessors.insert(TypeId::of::<A>(), erased);
        self
    }

    /// Register `A` using its [`Identifiable`] implementation.
    pub fn identifiable<A: Identifiable>(self) -> Self {
        self.entity::<A, _>(A::identifier)
    }

    /// Finish registration.
    pub fn build(self) -> EntityMetadata {
        EntityMetadata {
            accessors: Arc::new(self.accessors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::test_fixtures::{Order, Ticket};

    fn metadata() -> EntityMetadata {
        EntityMetadata::builder().identifiable::<Order>().build()
    }

    #[test]
    fn resolves_identifier_of_persisted_aggregate() {
        let id = metadata()
            .identifier_of(AggregateType::of::<Order>(), &Order::persisted(42))
            .expect("order 42 has an identifier");
        assert_eq!(id, "42");
    }

    #[test]
    fn absent_identifier_is_missing() {
        let err = metadata()
            .identifier_of(AggregateType::of::<Order>(), &Order::unsaved())
            .expect_err("unsaved order has no identifier");
        assert!(matches!(
            err,
            ProcessError::MissingIdentifier { ref aggregate_type } if aggregate_type == "Order"
        ));
    }

    #[test]
    fn unknown_type_is_missing() {
        let ticket = Ticket {
            title: "broken espresso machine".into(),
        };
        let err = metadata()
            .identifier_of(AggregateType::of::<Ticket>(), &ticket)
            .expect_err("Ticket has no identity metadata");
        assert!(matches!(err, ProcessError::MissingIdentifier { .. }));
    }

    #[test]
    fn mismatched_instance_type_is_missing() {
        let ticket = Ticket {
            title: "wrong type".into(),
        };
        let result = metadata().identifier_of(AggregateType::of::<Order>(), &ticket);
        assert!(result.is_err());
    }

    #[test]
    fn closure_accessor_overrides_identifiable() {
        let metadata = EntityMetadata::builder()
            .identifiable::<Order>()
            .entity::<Order, _>(|order| order.id.map(|id| format!("order-{id}")))
            .build();
        let id = metadata
            .identifier_of(AggregateType::of::<Order>(), &Order::persisted(3))
            .unwrap();
        assert_eq!(id, "order-3");
        assert!(metadata.has_entity::<Order>());
        assert!(!metadata.has_entity::<Ticket>());
    }
}
