//! Error types for the mock compute control plane.

use thiserror::Error;

/// Errors raised while configuring, resolving, or instantiating creation
/// behaviors.
///
/// These surface synchronously to the caller of the originating operation;
/// nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BehaviorError {
    /// A behavior creator was invoked without a parameter it requires.
    #[error("behavior creator `{creator}` requires parameter `{parameter}`")]
    MissingParameter {
        /// Name of the behavior creator.
        creator: String,
        /// Name of the missing parameter.
        parameter: String,
    },

    /// A behavior creator was invoked with parameters it cannot use.
    #[error("invalid parameters for behavior creator `{creator}`: {detail}")]
    InvalidParameters {
        /// Name of the behavior creator.
        creator: String,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// No behavior creator is registered under the requested name.
    #[error("unknown behavior creator `{0}`")]
    UnknownCreator(String),

    /// No criterion factory is registered under the requested name.
    #[error("unknown criterion `{0}`")]
    UnknownCriterion(String),

    /// A criterion was configured with a pattern that does not compile.
    #[error("invalid pattern for criterion `{criterion}`: {detail}")]
    InvalidPattern {
        /// Name of the criterion being configured.
        criterion: String,
        /// Regex compilation error text.
        detail: String,
    },

    /// The event description has no default behavior registered.
    #[error("no default behavior registered for event `{0}`")]
    NoDefaultBehavior(String),
}

/// Errors raised while validating a creation request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The request carried an `OS-DCF:diskConfig` value other than the two
    /// accepted ones.
    #[error("OS-DCF:diskConfig must be either AUTO or MANUAL, got `{0}`")]
    InvalidDiskConfig(String),
}
