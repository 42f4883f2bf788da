// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while turning human-readable resource quantities into numbers
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum QuantityError {
    /// The string is neither a plain number nor `<value><Ki|Mi|Gi>`
    #[error("Invalid memory string format: '{input}'")]
    #[diagnostic(
        code(tierwise::quantity::invalid_format),
        help("Expected a format like '1024Ki', '100Mi', '2Gi', '1.5Gi', or a plain number for bytes")
    )]
    InvalidFormat {
        #[allow(unused)]
        input: String,
    },

    /// The string is not a valid CPU quantity
    #[error("Invalid CPU format: '{input}'")]
    #[diagnostic(
        code(tierwise::quantity::invalid_cpu),
        help("Expected whole or fractional cores ('2', '0.5') or millicores ('500m')")
    )]
    InvalidCpu {
        #[allow(unused)]
        input: String,
    },

    /// The value is neither a string nor a number
    #[error("Quantity must be a string or number, got {found}")]
    #[diagnostic(
        code(tierwise::quantity::invalid_type),
        help("Write quantities as strings (\"2Gi\") or plain numbers")
    )]
    InvalidType {
        #[allow(unused)]
        found: String,
    },
}

impl QuantityError {
    /// Create an InvalidFormat error
    pub fn invalid_format(input: impl Into<String>) -> Self {
        Self::InvalidFormat {
            input: input.into(),
        }
    }

    /// Create an InvalidCpu error
    pub fn invalid_cpu(input: impl Into<String>) -> Self {
        Self::InvalidCpu {
            input: input.into(),
        }
    }

    /// Create an InvalidType error
    pub fn invalid_type(found: impl Into<String>) -> Self {
        Self::InvalidType {
            found: found.into(),
        }
    }
}

/// Core error type for Tierwise operations
#[derive(Error, Debug, Diagnostic)]
pub enum TierwiseError {
    /// A resource quantity could not be parsed
    #[error("Invalid quantity in {field}: {source}")]
    #[diagnostic(
        code(tierwise::invalid_quantity),
        help("Fix the quantity in the referenced field")
    )]
    InvalidQuantity {
        #[allow(unused)]
        field: String,
        #[source]
        source: QuantityError,
    },

    /// Invalid resource
    #[error("Invalid resource: {reason}")]
    #[diagnostic(
        code(tierwise::invalid_resource),
        help("{suggestion}")
    )]
    InvalidResource {
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },
}

/// Result type alias for Tierwise operations
pub type Result<T> = std::result::Result<T, TierwiseError>;

impl TierwiseError {
    /// Create an InvalidQuantity error
    pub fn invalid_quantity(field: impl Into<String>, source: QuantityError) -> Self {
        Self::InvalidQuantity {
            field: field.into(),
            source,
        }
    }

    /// Create an InvalidResource error
    pub fn invalid_resource(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidResource {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }
}
