//! Critical failure policy
//!
//! By default a provider failure is logged and treated as "this provider does
//! not have the secret". A [`CriticalExceptionRule`] elevates failures of a given
//! error type (optionally filtered by a predicate) so that they abort the
//! lookup instead.

use std::any::type_name;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::SecretError;

type Predicate = dyn Fn(&(dyn StdError + 'static)) -> Option<bool> + Send + Sync;

/// An error type paired with a predicate deciding whether a failure is critical
#[derive(Clone)]
pub struct CriticalExceptionRule {
    error_type: &'static str,
    predicate: Arc<Predicate>,
}

impl CriticalExceptionRule {
    /// Failures of type `E` for which `predicate` holds are critical
    pub fn new<E, F>(predicate: F) -> Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let predicate: Arc<Predicate> = Arc::new(move |error: &(dyn StdError + 'static)| {
            error.downcast_ref::<E>().map(&predicate)
        });
        Self {
            error_type: type_name::<E>(),
            predicate,
        }
    }

    /// Every failure of type `E` is critical
    pub fn of_type<E: StdError + 'static>() -> Self {
        Self::new::<E, _>(|_| true)
    }

    pub fn error_type(&self) -> &'static str {
        self.error_type
    }

    /// Whether the rule matches a failure
    ///
    /// The source chain is searched for the first error of the rule's type.
    /// A panicking predicate counts as no match.
    pub fn matches(&self, error: &SecretError) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = Some(error);
        while let Some(candidate) = current {
            match catch_unwind(AssertUnwindSafe(|| (self.predicate)(candidate))) {
                Ok(Some(matched)) => return matched,
                Ok(None) => {}
                Err(_) => {
                    tracing::warn!(
                        error_type = self.error_type,
                        "Critical exception predicate panicked, treating failure as non-critical"
                    );
                    return false;
                }
            }
            current = candidate.source();
        }
        false
    }
}

impl fmt::Debug for CriticalExceptionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriticalExceptionRule")
            .field("error_type", &self.error_type)
            .finish()
    }
}

/// The set of critical rules of a store
#[derive(Debug, Clone, Default)]
pub struct CriticalExceptionPolicy {
    rules: Vec<CriticalExceptionRule>,
}

impl CriticalExceptionPolicy {
    pub fn new(rules: Vec<CriticalExceptionRule>) -> Self {
        Self { rules }
    }

    pub fn add(&mut self, rule: CriticalExceptionRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[CriticalExceptionRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a failure must abort resolution
    pub fn is_critical(&self, error: &SecretError) -> bool {
        self.rules.iter().any(|rule| rule.matches(error))
    }
}
