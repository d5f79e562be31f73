use std::error::Error as StdError;

use thiserror::Error;

/// Boxed error raised by a provider or a name mutation
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors that can occur during secret resolution
#[derive(Debug, Error)]
pub enum SecretError {
    /// Blank secret name or malformed registration
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No provider produced the secret
    #[error("Secret not found: {name}")]
    NotFound { name: String },

    /// The call shape (sync, caching, versioning) is not available on the provider that would answer it
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A name mutation rejected the secret name
    ///
    /// Belongs to the same class as [`SecretError::NotSupported`]: the name was not
    /// valid input for the configured mutation.
    #[error("Secret name '{name}' is not supported by the configured name mutation: {reason}")]
    MutationFailed { name: String, reason: String },

    /// Provider lookup by name is ambiguous or yields the wrong type
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// No provider was registered under this name
    #[error("No secret provider registered with name '{name}'")]
    ProviderNotFound { name: String },

    /// A lazily registered provider could not be created, or the store configuration is unusable
    #[error("Secret provider configuration error: {0}")]
    Configuration(String),

    /// Backend feature not compiled in
    #[error("Secret backend '{backend}' not available (feature not enabled)")]
    BackendDisabled { backend: String },

    /// Backend runtime error
    #[error("{backend} error: {message}")]
    BackendError { backend: String, message: String },

    /// Permission/access denied
    #[error("Access denied to secret: {0}")]
    AccessDenied(String),

    /// Failure raised by a user-supplied provider
    #[error("{0}")]
    Provider(#[source] BoxError),

    /// Several critical failures raised during one resolution, in registration order
    #[error("{} critical failures while resolving secret: [{}]", .0.len(), join_messages(.0))]
    Aggregate(Vec<SecretError>),
}

fn join_messages(errors: &[SecretError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl SecretError {
    /// Create a not found error for a secret name
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a backend error
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendError {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a backend disabled error
    pub fn disabled(backend: impl Into<String>) -> Self {
        Self::BackendDisabled {
            backend: backend.into(),
        }
    }

    /// Wrap an arbitrary provider failure so that critical rules can match on its type
    pub fn provider(error: impl Into<BoxError>) -> Self {
        Self::Provider(error.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for [`SecretError::NotSupported`] and for rejected name mutations
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported(_) | Self::MutationFailed { .. })
    }

    /// Find the first error of type `E` in this error's source chain, starting with itself
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(error) = current {
            if let Some(found) = error.downcast_ref::<E>() {
                return Some(found);
            }
            current = error.source();
        }
        None
    }

    /// The failures collected in an aggregate, or this error alone
    pub fn failures(&self) -> &[SecretError] {
        match self {
            Self::Aggregate(errors) => errors,
            other => std::slice::from_ref(other),
        }
    }
}
