//! Intercepting decorator for aggregates under state machine control.
//!
//! [`ProxyFactory::wrap`] turns an aggregate into a [`Managed`] wrapper. For
//! types without a configuration the wrapper is inert. For configured types,
//! every business call routed through [`Managed::call`],
//! [`Managed::call_mut`], or [`Managed::try_call_mut`] first looks up the
//! transition bound to the method name and, if there is one, dispatches it
//! before the method body runs.
//!
//! Structural operations (equality, hashing, formatting, cloning) are plain
//! trait impls that delegate to the target and never dispatch.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::aggregate::{Aggregate, AggregateType};
use crate::client::TransitionDispatcher;
use crate::error::{InvocationError, ProcessError};
use crate::registry::{AggregateTypeConfig, TransitionRegistry, is_structural_method};

/// Configuration and dispatcher resolved for a wrapped instance at wrap time.
#[derive(Clone)]
struct Interception {
    config: Arc<AggregateTypeConfig>,
    dispatcher: Arc<dyn TransitionDispatcher>,
}

/// An aggregate as handed to application code by the retrieval path.
///
/// Derefs to the aggregate for read-only access. Mutation goes through the
/// call methods so that bound methods fire their transition first. Aggregates
/// typically expose their business operations on `Managed<Self>` through a
/// capability trait built on these methods.
///
/// Only [`call`](Self::call), [`call_mut`](Self::call_mut) and
/// [`try_call_mut`](Self::try_call_mut) dispatch. A bound `&self` method
/// reached through `Deref` (`managed.method()` without the capability trait
/// in scope) runs without dispatching, so bound operations must not be
/// public inherent `&self` methods of the aggregate.
///
/// ```
/// use aggregate_process::{Aggregate, InvocationError, Managed};
///
/// struct Order {
///     paid: bool,
/// }
/// impl Aggregate for Order {
///     const AGGREGATE_TYPE: &'static str = "Order";
/// }
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("already paid")]
/// struct AlreadyPaid;
///
/// trait OrderOps {
///     fn mark_paid(&mut self) -> Result<(), InvocationError<AlreadyPaid>>;
/// }
///
/// impl OrderOps for Managed<Order> {
///     fn mark_paid(&mut self) -> Result<(), InvocationError<AlreadyPaid>> {
///         self.try_call_mut("mark_paid", |order| {
///             if order.paid {
///                 return Err(AlreadyPaid);
///             }
///             order.paid = true;
///             Ok(())
///         })
///     }
/// }
///
/// // Not intercepted: no registry involved, the call just runs.
/// let mut order = Managed::plain(Order { paid: false });
/// order.mark_paid().unwrap();
/// assert!(order.paid);
/// assert!(matches!(order.mark_paid(), Err(InvocationError::Method(AlreadyPaid))));
/// ```
pub struct Managed<A: Aggregate> {
    target: A,
    interception: Option<Interception>,
}

impl<A: Aggregate> Managed<A> {
    /// Wrap `target` without interception.
    pub fn plain(target: A) -> Self {
        Self {
            target,
            interception: None,
        }
    }

    /// Returns `true` if calls on this wrapper may dispatch transitions.
    pub fn is_intercepted(&self) -> bool {
        self.interception.is_some()
    }

    /// Aggregate type tag of the target.
    pub fn aggregate_type(&self) -> AggregateType {
        AggregateType::of::<A>()
    }

    /// Configuration resolved at wrap time, if intercepted.
    pub fn configuration(&self) -> Option<&AggregateTypeConfig> {
        self.interception.as_ref().map(|i| i.config.as_ref())
    }

    /// Unwrap the target, dropping interception.
    pub fn into_inner(self) -> A {
        self.target
    }

    /// Call a `&self` business method named `method`.
    ///
    /// # Errors
    ///
    /// Returns the dispatch error if `method` is bound and dispatch fails; `f`
    /// is not called in that case.
    pub fn call<R>(&self, method: &str, f: impl FnOnce(&A) -> R) -> Result<R, ProcessError> {
        self.fire(method)?;
        Ok(f(&self.target))
    }

    /// Call a `&mut self` business method named `method`.
    ///
    /// # Errors
    ///
    /// Returns the dispatch error if `method` is bound and dispatch fails; `f`
    /// is not called in that case.
    pub fn call_mut<R>(
        &mut self,
        method: &str,
        f: impl FnOnce(&mut A) -> R,
    ) -> Result<R, ProcessError> {
        self.fire(method)?;
        Ok(f(&mut self.target))
    }

    /// Call a fallible `&mut self` business method named `method`.
    ///
    /// The transition is dispatched before `f` runs, whether `f` then
    /// succeeds or fails.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::Dispatch`] if dispatch fails (and `f` is not
    /// called), or [`InvocationError::Method`] with the error `f` returned.
    pub fn try_call_mut<T, E>(
        &mut self,
        method: &str,
        f: impl FnOnce(&mut A) -> Result<T, E>,
    ) -> Result<T, InvocationError<E>>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.fire(method).map_err(InvocationError::Dispatch)?;
        f(&mut self.target).map_err(InvocationError::Method)
    }

    /// Dispatch the transition bound to `method`, if any.
    fn fire(&self, method: &str) -> Result<(), ProcessError> {
        let Some(interception) = &self.interception else {
            return Ok(());
        };
        if is_structural_method(method) {
            return Ok(());
        }
        let Some(transition) = interception.config.transition_for(method) else {
            tracing::trace!(
                aggregate_type = A::AGGREGATE_TYPE,
                method,
                "no transition bound"
            );
            return Ok(());
        };

        let _span = tracing::debug_span!(
            "dispatch",
            aggregate_type = A::AGGREGATE_TYPE,
            method,
            transition
        )
        .entered();
        interception
            .dispatcher
            .dispatch(AggregateType::of::<A>(), &self.target, transition)
    }
}

impl<A: Aggregate> From<A> for Managed<A> {
    fn from(target: A) -> Self {
        Self::plain(target)
    }
}

impl<A: Aggregate> Deref for Managed<A> {
    type Target = A;

    fn deref(&self) -> &A {
        &self.target
    }
}

impl<A: Aggregate> AsRef<A> for Managed<A> {
    fn as_ref(&self) -> &A {
        &self.target
    }
}

impl<A: Aggregate + Clone> Clone for Managed<A> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            interception: self.interception.clone(),
        }
    }
}

impl<A: Aggregate + PartialEq> PartialEq for Managed<A> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl<A: Aggregate + PartialEq> PartialEq<A> for Managed<A> {
    fn eq(&self, other: &A) -> bool {
        self.target == *other
    }
}

impl<A: Aggregate + Eq> Eq for Managed<A> {}

impl<A: Aggregate + Hash> Hash for Managed<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.hash(state);
    }
}

impl<A: Aggregate + fmt::Debug> fmt::Debug for Managed<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.target, f)
    }
}

impl<A: Aggregate + fmt::Display> fmt::Display for Managed<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.target, f)
    }
}

/// Wraps aggregates returned by the retrieval path.
///
/// Wrapping is opt-in per type: only types with a configuration in the
/// [`TransitionRegistry`] are intercepted. `Clone` is cheap.
#[derive(Clone)]
pub struct ProxyFactory {
    registry: TransitionRegistry,
    dispatcher: Arc<dyn TransitionDispatcher>,
}

impl fmt::Debug for ProxyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ProxyFactory {
    /// Create a factory dispatching through `dispatcher`.
    pub fn new(registry: TransitionRegistry, dispatcher: Arc<dyn TransitionDispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    /// The registry consulted at wrap time.
    pub fn registry(&self) -> &TransitionRegistry {
        &self.registry
    }

    /// Wrap an aggregate returned by the retrieval path.
    ///
    /// Returns the instance without interception if its type has no
    /// configuration; this is the common case and not an error.
    pub fn wrap<A: Aggregate>(&self, instance: A) -> Managed<A> {
        self.rewrap(Managed::plain(instance))
    }

    /// Wrap an already [`Managed`] aggregate.
    ///
    /// An intercepting wrapper is returned unchanged, so passing an aggregate
    /// through the retrieval path twice never dispatches twice. A plain
    /// wrapper gains interception if its type is configured.
    pub fn rewrap<A: Aggregate>(&self, managed: Managed<A>) -> Managed<A> {
        if managed.is_intercepted() {
            return managed;
        }

        match self.registry.lookup(AggregateType::of::<A>()) {
            Some(config) => Managed {
                target: managed.target,
                interception: Some(Interception {
                    config,
                    dispatcher: Arc::clone(&self.dispatcher),
                }),
            },
            None => managed,
        }
    }

    /// Wrap every aggregate of a retrieved collection.
    pub fn wrap_all<A, I>(&self, instances: I) -> Vec<Managed<A>>
    where
        A: Aggregate,
        I: IntoIterator<Item = A>,
    {
        instances.into_iter().map(|a| self.wrap(a)).collect()
    }
}
