use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_MULTIPLE_SCOPES: &str = "Q-ERR-SCOPE-001";
pub const ERR_INVALID_SCOPE_KEY: &str = "Q-ERR-SCOPE-002";
pub const ERR_INVALID_SCOPE_SHAPE: &str = "Q-ERR-SCOPE-003";
pub const ERR_MISSING_DIRECTIVE: &str = "Q-ERR-DIRECTIVE-001";
pub const ERR_NOT_ITERABLE: &str = "Q-ERR-DIRECTIVE-002";
pub const ERR_EXPRESSION: &str = "Q-ERR-EXPR-001";
pub const ERR_UNKNOWN_COMPONENT: &str = "Q-ERR-COMPONENT-001";
pub const ERR_DUPLICATE_COMPONENT: &str = "Q-ERR-COMPONENT-002";
pub const ERR_PARSE: &str = "Q-ERR-PARSE-001";
pub const ERR_CONFIG: &str = "Q-ERR-CONFIG-001";
pub const ERR_SERIALIZATION: &str = "Q-ERR-JSON-001";
pub const ERR_IO: &str = "Q-ERR-IO-001";

/// Failure raised while evaluating a single `{{ … }}` expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("{name} is not defined")]
    UnboundIdentifier { name: String },

    #[error("invalid expression syntax: {message}")]
    Syntax { message: String },

    #[error("type error: {message}")]
    Type { message: String },

    #[error("unsupported expression: {construct}")]
    Unsupported { construct: String },
}

impl ExpressionError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        ExpressionError::Type {
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(construct: impl Into<String>) -> Self {
        ExpressionError::Unsupported {
            construct: construct.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum QuakeError {
    #[error("only one scope can be declared ({component} declares {count})")]
    MultipleScopesDeclared { component: String, count: usize },

    #[error("<{tag}> requires the {directive} directive")]
    MissingDirective {
        tag: String,
        directive: &'static str,
    },

    #[error("{expression} is not iterable (evaluated to {found})")]
    NotIterable {
        expression: String,
        found: &'static str,
    },

    #[error("scope cannot be extended with key '{key}'")]
    InvalidScopeKey { key: String },

    #[error("scope state must be a flat object, got {found}")]
    InvalidScopeShape { found: &'static str },

    #[error("failed to evaluate '{expression}': {source}")]
    Expression {
        expression: String,
        #[source]
        source: ExpressionError,
    },

    #[error("<{tag}> is not declared as a component")]
    UnknownComponent { tag: String },

    #[error("<{tag}> is already declared as a component")]
    DuplicateComponent { tag: String },

    #[error("failed to parse template: {message}")]
    Parse { message: String },

    #[error("invalid options: {0}")]
    Config(#[source] serde_json::Error),

    #[error("invalid JSON data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QuakeError {
    /// Stable code identifying the error category.
    pub fn code(&self) -> &'static str {
        match self {
            QuakeError::MultipleScopesDeclared { .. } => ERR_MULTIPLE_SCOPES,
            QuakeError::MissingDirective { .. } => ERR_MISSING_DIRECTIVE,
            QuakeError::NotIterable { .. } => ERR_NOT_ITERABLE,
            QuakeError::InvalidScopeKey { .. } => ERR_INVALID_SCOPE_KEY,
            QuakeError::InvalidScopeShape { .. } => ERR_INVALID_SCOPE_SHAPE,
            QuakeError::Expression { .. } => ERR_EXPRESSION,
            QuakeError::UnknownComponent { .. } => ERR_UNKNOWN_COMPONENT,
            QuakeError::DuplicateComponent { .. } => ERR_DUPLICATE_COMPONENT,
            QuakeError::Parse { .. } => ERR_PARSE,
            QuakeError::Config(_) => ERR_CONFIG,
            QuakeError::Serialization(_) => ERR_SERIALIZATION,
            QuakeError::Io(_) => ERR_IO,
        }
    }

    pub(crate) fn expression(expression: &str, source: ExpressionError) -> Self {
        QuakeError::Expression {
            expression: expression.to_string(),
            source,
        }
    }
}

pub type Result<T, E = QuakeError> = std::result::Result<T, E>;
