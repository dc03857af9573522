//! Bounded-attempts combinator.
//!
//! Runs an async attempt up to `max_attempts` times and stops at the first
//! candidate accepted by the validity predicate. Errors returned by the
//! attempt itself are not retried here: they propagate to the caller, so
//! only "answered, but unusable" outcomes consume attempts.

use std::future::Future;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempts<T> {
    Accepted { value: T, attempts: usize },
    Exhausted { attempts: usize },
}

impl<T> Attempts<T> {
    pub fn accepted(self) -> Option<T> {
        match self {
            Attempts::Accepted { value, .. } => Some(value),
            Attempts::Exhausted { .. } => None,
        }
    }

    pub fn attempts(&self) -> usize {
        match self {
            Attempts::Accepted { attempts, .. } | Attempts::Exhausted { attempts } => *attempts,
        }
    }
}

pub async fn bounded_attempts<T, E, F, Fut, P>(
    max_attempts: usize,
    mut attempt: F,
    is_valid: P,
) -> Result<Attempts<T>, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    P: Fn(&T) -> bool,
{
    for n in 1..=max_attempts {
        match attempt(n).await? {
            Some(candidate) if is_valid(&candidate) => {
                return Ok(Attempts::Accepted {
                    value: candidate,
                    attempts: n,
                });
            }
            _ => tracing::debug!(attempt = n, max_attempts, "Attempt rejected"),
        }
    }

    Ok(Attempts::Exhausted {
        attempts: max_attempts,
    })
}
