//! Definition of the crate's error and result.

use thiserror::Error;

use crate::aggregation::AggregationError;

/// Phase name attached to failures of the global aggregation pass.
pub const GLOBAL_AGGREGATION_PHASE: &str = "global aggregation phase";

/// The library's error enum.
///
/// Every error is local to one request: none of them leaves shared state (the bucket counter,
/// accumulators) of another request in an inconsistent state.
#[derive(Debug, Error)]
pub enum AggPhaseError {
    /// The accumulator trees of a request could not be built.
    #[error("Could not initialize aggregators: {cause}")]
    AggregationInitialization {
        /// The originating error.
        #[source]
        cause: Box<AggPhaseError>,
    },
    /// An accumulator failed while being finalized or while its result was extracted.
    #[error("Failed to build aggregation [{name}]: {cause}")]
    AggregationExecution {
        /// The name of the failing aggregation.
        name: String,
        /// The originating error.
        #[source]
        cause: Box<AggPhaseError>,
    },
    /// A query could not be executed.
    #[error("Failed to execute {phase}: {cause}")]
    QueryExecution {
        /// The phase in which the query was executed.
        phase: &'static str,
        /// The originating error.
        #[source]
        cause: Box<AggPhaseError>,
    },
    /// An error specific to aggregations, for instance the bucket limit being exceeded.
    #[error("An aggregation error occurred: '{0}'")]
    AggregationError(#[from] AggregationError),
    /// Invalid argument was passed by the user.
    #[error("An invalid argument was passed: '{0}'")]
    InvalidArgument(String),
    /// A field referenced by a query or an aggregation does not exist.
    #[error("Field not found: '{0}'")]
    FieldNotFound(String),
    /// An Error appeared related to the schema.
    #[error("Schema error: '{0}'")]
    SchemaError(String),
    /// An Error happened in one of the threads.
    #[error("An error occurred in a thread: '{0}'")]
    ErrorInThread(String),
    /// System error. (e.g.: We failed spawning a new thread)
    #[error("System error.'{0}'")]
    SystemError(String),
    /// Internal error
    #[error("Internal error: '{0}'")]
    InternalError(String),
}

impl AggPhaseError {
    pub(crate) fn aggregation_initialization(cause: AggPhaseError) -> AggPhaseError {
        AggPhaseError::AggregationInitialization {
            cause: Box::new(cause),
        }
    }

    pub(crate) fn aggregation_execution(name: &str, cause: AggPhaseError) -> AggPhaseError {
        AggPhaseError::AggregationExecution {
            name: name.to_string(),
            cause: Box::new(cause),
        }
    }

    pub(crate) fn query_execution(phase: &'static str, cause: AggPhaseError) -> AggPhaseError {
        AggPhaseError::QueryExecution {
            phase,
            cause: Box::new(cause),
        }
    }

    /// Returns true if the error, or one of the errors it wraps, is a bucket limit breach.
    pub fn is_too_many_buckets(&self) -> bool {
        match self {
            AggPhaseError::AggregationError(AggregationError::BucketLimitExceeded { .. }) => true,
            AggPhaseError::AggregationInitialization { cause }
            | AggPhaseError::AggregationExecution { cause, .. }
            | AggPhaseError::QueryExecution { cause, .. } => cause.is_too_many_buckets(),
            _ => false,
        }
    }

    /// Returns the name of the aggregation that failed, if the error names one.
    pub fn aggregation_name(&self) -> Option<&str> {
        match self {
            AggPhaseError::AggregationExecution { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AggPhaseError {
    fn from(error: serde_json::Error) -> AggPhaseError {
        AggPhaseError::InvalidArgument(error.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for AggPhaseError {
    fn from(error: rayon::ThreadPoolBuildError) -> AggPhaseError {
        AggPhaseError::SystemError(error.to_string())
    }
}
