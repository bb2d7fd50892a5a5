//! Per-aggregate-type tables mapping method names to transition names.
//!
//! The registry has two phases. [`TransitionRegistryBuilder`] is the
//! construction phase: it is owned mutably, so get-or-create of a type's
//! configuration cannot race. [`seal`](TransitionRegistryBuilder::seal)
//! freezes it into a [`TransitionRegistry`], which is read-only and cheap to
//! share between threads.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::aggregate::{Aggregate, AggregateType};
use crate::error::ProcessError;

/// Method names that name structural operations rather than business ones.
///
/// Calls routed through a [`Managed`](crate::Managed) wrapper under one of
/// these names never dispatch, even when bound.
pub const STRUCTURAL_METHODS: &[&str] = &["eq", "ne", "hash", "fmt", "clone", "to_string"];

/// Returns `true` if `method` names a structural operation.
pub fn is_structural_method(method: &str) -> bool {
    STRUCTURAL_METHODS.contains(&method)
}

/// A single method-to-transition binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionBinding<'a> {
    /// Name of the aggregate method.
    pub method_name: &'a str,
    /// Name of the transition (engine message) the method triggers.
    pub transition_name: &'a str,
}

/// State machine configuration for one aggregate type.
///
/// Created through [`TransitionRegistryBuilder::configuration_for`] and
/// filled with chained [`bind`](AggregateTypeConfig::bind) calls.
#[derive(Debug, Clone)]
pub struct AggregateTypeConfig {
    aggregate_type: AggregateType,
    bindings: BTreeMap<String, String>,
}

impl AggregateTypeConfig {
    fn new(aggregate_type: AggregateType) -> Self {
        Self {
            aggregate_type,
            bindings: BTreeMap::new(),
        }
    }

    /// The aggregate type this configuration belongs to.
    pub fn aggregate_type(&self) -> AggregateType {
        self.aggregate_type
    }

    /// Bind `method` to `transition`.
    ///
    /// Binding the same method twice keeps the last transition. Several
    /// methods may be bound to the same transition.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn bind(&mut self, method: impl Into<String>, transition: impl Into<String>) -> &mut Self {
        self.bindings.insert(method.into(), transition.into());
        self
    }

    /// Transition bound to `method`, or `None` if the method triggers none.
    pub fn transition_for(&self, method: &str) -> Option<&str> {
        self.bindings.get(method).map(String::as_str)
    }

    /// All bindings, ordered by method name.
    pub fn bindings(&self) -> impl Iterator<Item = TransitionBinding<'_>> {
        self.bindings
            .iter()
            .map(|(method, transition)| TransitionBinding {
                method_name: method,
                transition_name: transition,
            })
    }

    /// Number of bound methods.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if no method is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Construction phase of the [`TransitionRegistry`].
///
/// # Examples
///
/// ```
/// use aggregate_process::{Aggregate, TransitionRegistryBuilder};
///
/// struct Order;
/// impl Aggregate for Order {
///     const AGGREGATE_TYPE: &'static str = "Order";
/// }
///
/// let mut builder = TransitionRegistryBuilder::new();
/// builder
///     .configuration_for::<Order>()
///     .bind("mark_paid", "order-paid")
///     .bind("mark_in_preparation", "order-in-preparation");
///
/// let registry = builder.seal();
/// let config = registry.configuration_for_required::<Order>().unwrap();
/// assert_eq!(config.transition_for("mark_paid"), Some("order-paid"));
/// assert_eq!(config.transition_for("cancel"), None);
/// ```
#[derive(Debug, Default)]
pub struct TransitionRegistryBuilder {
    configs: HashMap<TypeId, AggregateTypeConfig>,
}

impl TransitionRegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the configuration for `A`.
    ///
    /// Repeated calls return the same configuration; a second one is never
    /// allocated.
    pub fn configuration_for<A: Aggregate>(&mut self) -> &mut AggregateTypeConfig {
        let aggregate_type = AggregateType::of::<A>();
        self.configs
            .entry(aggregate_type.id())
            .or_insert_with(|| AggregateTypeConfig::new(aggregate_type))
    }

    /// Returns `true` if a configuration for `A` was created. Never creates one.
    pub fn has_configuration_for<A: Aggregate>(&self) -> bool {
        self.configs.contains_key(&TypeId::of::<A>())
    }

    /// Configuration for `A`, which must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotConfigured`] if `A` was never configured.
    pub fn configuration_for_required<A: Aggregate>(
        &self,
    ) -> Result<&AggregateTypeConfig, ProcessError> {
        self.configs
            .get(&TypeId::of::<A>())
            .ok_or_else(|| ProcessError::NotConfigured {
                aggregate_type: A::AGGREGATE_TYPE.to_owned(),
            })
    }

    /// Freeze the builder into a read-only [`TransitionRegistry`].
    pub fn seal(self) -> TransitionRegistry {
        for config in self.configs.values() {
            for binding in config.bindings() {
                if is_structural_method(binding.method_name) {
                    tracing::warn!(
                        aggregate_type = config.aggregate_type().name(),
                        method = binding.method_name,
                        transition = binding.transition_name,
                        "structural method bound to a transition; calls will not dispatch"
                    );
                }
            }
        }

        tracing::debug!(
            aggregate_types = self.configs.len(),
            "transition registry sealed"
        );

        let configs = self
            .configs
            .into_iter()
            .map(|(id, config)| (id, Arc::new(config)))
            .collect();
        TransitionRegistry {
            configs: Arc::new(configs),
        }
    }

    /// Freeze the builder, failing if any of `required` has no configuration.
    ///
    /// Intended for startup validation so that misconfiguration surfaces
    /// before the first aggregate is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotConfigured`] naming the first missing type.
    pub fn seal_validated(
        self,
        required: &[AggregateType],
    ) -> Result<TransitionRegistry, ProcessError> {
        if let Some(missing) = required
            .iter()
            .find(|t| !self.configs.contains_key(&t.id()))
        {
            return Err(ProcessError::NotConfigured {
                aggregate_type: missing.name().to_owned(),
            });
        }
        Ok(self.seal())
    }
}

/// Sealed, read-only registry of [`AggregateTypeConfig`]s keyed by type.
///
/// `Clone` is cheap -- the table is `Arc`-wrapped and never mutated.
#[derive(Debug, Clone, Default)]
pub struct TransitionRegistry {
    configs: Arc<HashMap<TypeId, Arc<AggregateTypeConfig>>>,
}

impl TransitionRegistry {
    /// Start building a registry.
    pub fn builder() -> TransitionRegistryBuilder {
        TransitionRegistryBuilder::new()
    }

    /// Returns `true` if `A` has a configuration.
    pub fn has_configuration_for<A: Aggregate>(&self) -> bool {
        self.configs.contains_key(&TypeId::of::<A>())
    }

    /// Configuration for `A`.
    ///
    /// The returned `Arc` points at the one configuration instance held for
    /// `A`; repeated calls are pointer-equal.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotConfigured`] if `A` was never configured.
    pub fn configuration_for_required<A: Aggregate>(
        &self,
    ) -> Result<Arc<AggregateTypeConfig>, ProcessError> {
        self.lookup(AggregateType::of::<A>())
            .ok_or_else(|| ProcessError::NotConfigured {
                aggregate_type: A::AGGREGATE_TYPE.to_owned(),
            })
    }

    /// Configuration for `aggregate_type`, if any.
    pub(crate) fn lookup(&self, aggregate_type: AggregateType) -> Option<Arc<AggregateTypeConfig>> {
        self.configs.get(&aggregate_type.id()).cloned()
    }

    /// Canonical names of all configured aggregate types, sorted.
    pub fn aggregate_types(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .configs
            .values()
            .map(|c| c.aggregate_type().name())
            .collect();
        names.sort_unstable();
        names
    }
}
