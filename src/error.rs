//! Crate-level error types for configuration lookup, process dispatch, and
//! intercepted method invocation.

/// Failure reported by a [`ProcessEngine`](crate::ProcessEngine) adapter.
///
/// Engine errors never escape the crate on their own: the correlation client
/// wraps them into [`ProcessError::ProcessStartFailure`] or
/// [`ProcessError::TransitionDeliveryFailure`] together with the keys involved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// No process definition is deployed under the requested key.
    #[error("no process definition deployed under key '{0}'")]
    DefinitionNotFound(String),

    /// A running instance of the definition already carries this business key.
    #[error("a process instance with business key '{business_key}' is already running")]
    AlreadyRunning {
        /// Business key of the running instance.
        business_key: String,
    },

    /// No running process instance carries the business key.
    #[error("no running process instance matches business key '{business_key}'")]
    NoMatchingInstance {
        /// Business key that was correlated against.
        business_key: String,
    },

    /// The instance exists but is not waiting on the named message.
    #[error("process instance '{business_key}' is in state '{state}' and not waiting for '{message}'")]
    NotWaiting {
        /// Message that was delivered.
        message: String,
        /// Business key of the instance.
        business_key: String,
        /// State the instance is currently in.
        state: String,
    },

    /// The engine refused the request for a reason this crate does not model.
    #[error("engine rejected request: {0}")]
    Rejected(String),

    /// The engine could not be reached or failed internally.
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

/// Error returned by registry lookups and by process dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Required configuration was requested for a type that has none.
    ///
    /// A programmer error: the type was never registered with the
    /// [`TransitionRegistryBuilder`](crate::TransitionRegistryBuilder).
    #[error("no state machine configured for aggregate type '{aggregate_type}'")]
    NotConfigured {
        /// Canonical name of the unconfigured aggregate type.
        aggregate_type: String,
    },

    /// The aggregate has no resolvable identifier.
    ///
    /// Either its type has no identity metadata or the instance has not been
    /// persisted yet. The engine is never called in this case.
    #[error("aggregate of type '{aggregate_type}' has no identifier")]
    MissingIdentifier {
        /// Canonical name of the aggregate type.
        aggregate_type: String,
    },

    /// The engine refused to start a process instance.
    #[error("failed to start process '{definition_key}' for business key '{business_key}'")]
    ProcessStartFailure {
        /// Definition key derived from the aggregate type.
        definition_key: String,
        /// Identifier of the aggregate.
        business_key: String,
        /// Underlying engine failure.
        #[source]
        source: EngineError,
    },

    /// The engine could not deliver a transition to a running instance.
    ///
    /// Means the aggregate's state and its process state have diverged.
    #[error("failed to deliver transition '{transition}' for business key '{business_key}'")]
    TransitionDeliveryFailure {
        /// Transition (message) name.
        transition: String,
        /// Identifier of the aggregate.
        business_key: String,
        /// Underlying engine failure.
        #[source]
        source: EngineError,
    },

    /// A bindings file could not be read or parsed.
    #[error("invalid state machine configuration: {0}")]
    Config(String),
}

/// Error returned when calling a business method through an intercepting
/// [`Managed`](crate::Managed) wrapper.
///
/// Keeps dispatch failures apart from failures of the wrapped method itself.
///
/// # Type Parameters
///
/// * `E` - Error type returned by the business method.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError<E: std::error::Error + Send + Sync + 'static> {
    /// Dispatching the bound transition failed; the method body did not run.
    #[error("transition dispatch failed: {0}")]
    Dispatch(#[source] ProcessError),

    /// The method body ran and returned an error.
    #[error(transparent)]
    Method(E),
}

impl<E: std::error::Error + Send + Sync + 'static> From<ProcessError> for InvocationError<E> {
    fn from(err: ProcessError) -> Self {
        Self::Dispatch(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("order already paid")]
    struct AlreadyPaid;

    #[test]
    fn not_configured_names_the_type() {
        let err = ProcessError::NotConfigured {
            aggregate_type: "Order".into(),
        };
        assert_eq!(
            err.to_string(),
            "no state machine configured for aggregate type 'Order'"
        );
    }

    #[test]
    fn delivery_failure_exposes_engine_source() {
        use std::error::Error;

        let err = ProcessError::TransitionDeliveryFailure {
            transition: "order-paid".into(),
            business_key: "42".into(),
            source: EngineError::NoMatchingInstance {
                business_key: "42".into(),
            },
        };
        assert!(err.to_string().contains("order-paid"));
        let source = err.source().expect("engine error should be the source");
        assert!(source.to_string().contains("no running process instance"));
    }

    #[test]
    fn method_error_is_transparent() {
        let err: InvocationError<AlreadyPaid> = InvocationError::Method(AlreadyPaid);
        assert_eq!(err.to_string(), "order already paid");
    }

    #[test]
    fn dispatch_error_converts_from_process_error() {
        let err: InvocationError<AlreadyPaid> = ProcessError::MissingIdentifier {
            aggregate_type: "Order".into(),
        }
        .into();
        assert!(matches!(
            err,
            InvocationError::Dispatch(ProcessError::MissingIdentifier { .. })
        ));
    }

    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<EngineError>();
            assert_send_sync::<ProcessError>();
            assert_send_sync::<InvocationError<AlreadyPaid>>();
        }
    };
}
