//! # Chunk Failure Classification
//!
//! Decides whether a failed invocation is retried. Worker failures arrive
//! already tagged transient or permanent; the classifier refines that with
//! the failure kind and the attempt budget, and also classifies errors raised
//! while trying to invoke at all (unknown revision, storage outage).

use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::fleet::{FailureKind, WorkerFailure};

/// Context information for error classification
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub job_id: String,
    pub chunk_index: u32,
    /// Current attempt number (1-based)
    pub attempt_number: u32,
    /// First attempt plus allowed retries
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Will never succeed if retried
    Permanent,
    Timeout,
    RateLimit,
    Infrastructure,
    /// Conservative: treated as retry-eligible
    Unknown,
}

impl ErrorCategory {
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Permanent => write!(f, "Permanent"),
            ErrorCategory::Timeout => write!(f, "Timeout"),
            ErrorCategory::RateLimit => write!(f, "Rate Limit"),
            ErrorCategory::Infrastructure => write!(f, "Infrastructure"),
            ErrorCategory::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub error_category: ErrorCategory,
    /// Transient and the attempt budget is not spent
    pub is_retryable: bool,
    pub is_final_attempt: bool,
    pub error_code: String,
    pub error_message: String,
}

pub trait ErrorClassifier: Send + Sync {
    /// Classify a failure reported by a worker
    fn classify_failure(
        &self,
        failure: &WorkerFailure,
        reported_permanent: bool,
        context: &ErrorContext,
    ) -> ErrorClassification;

    /// Classify an error raised before a worker produced an outcome
    fn classify_error(&self, error: &RenderError, context: &ErrorContext) -> ErrorClassification;

    fn classifier_name(&self) -> &'static str;
}

#[derive(Debug, Clone, Default)]
pub struct StandardErrorClassifier;

impl StandardErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    fn category_for_kind(kind: FailureKind) -> ErrorCategory {
        match kind {
            FailureKind::Timeout => ErrorCategory::Timeout,
            FailureKind::Throttled => ErrorCategory::RateLimit,
            FailureKind::Infrastructure => ErrorCategory::Infrastructure,
            FailureKind::MalformedInput | FailureKind::UnsupportedCodec => {
                ErrorCategory::Permanent
            }
            FailureKind::Unknown => ErrorCategory::Unknown,
        }
    }

    fn build(
        category: ErrorCategory,
        error_code: String,
        error_message: String,
        context: &ErrorContext,
    ) -> ErrorClassification {
        let is_final_attempt = context.attempt_number >= context.max_attempts;
        ErrorClassification {
            error_category: category,
            is_retryable: category.is_transient() && !is_final_attempt,
            is_final_attempt,
            error_code,
            error_message,
        }
    }
}

impl ErrorClassifier for StandardErrorClassifier {
    fn classify_failure(
        &self,
        failure: &WorkerFailure,
        reported_permanent: bool,
        context: &ErrorContext,
    ) -> ErrorClassification {
        let category = if reported_permanent {
            ErrorCategory::Permanent
        } else {
            Self::category_for_kind(failure.kind)
        };

        Self::build(
            category,
            format!("WORKER_{}", failure.kind.to_string().to_uppercase()),
            format!(
                "chunk {} of job {} failed on attempt {}: {}",
                context.chunk_index, context.job_id, context.attempt_number, failure
            ),
            context,
        )
    }

    fn classify_error(&self, error: &RenderError, context: &ErrorContext) -> ErrorClassification {
        let category = match error {
            RenderError::Transient(_) | RenderError::StorageUnavailable(_) => {
                ErrorCategory::Infrastructure
            }
            RenderError::Internal(_) => ErrorCategory::Unknown,
            _ => ErrorCategory::Permanent,
        };

        Self::build(
            category,
            error.code().to_uppercase(),
            format!(
                "chunk {} of job {} could not be invoked: {error}",
                context.chunk_index, context.job_id
            ),
            context,
        )
    }

    fn classifier_name(&self) -> &'static str {
        "standard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(attempt_number: u32) -> ErrorContext {
        ErrorContext {
            job_id: "job-1".into(),
            chunk_index: 1,
            attempt_number,
            max_attempts: 4,
        }
    }

    #[test]
    fn test_timeout_is_retryable_until_budget_spent() {
        let classifier = StandardErrorClassifier::new();
        let failure = WorkerFailure::new(FailureKind::Timeout, "slow");

        let early = classifier.classify_failure(&failure, false, &context(2));
        assert_eq!(early.error_category, ErrorCategory::Timeout);
        assert!(early.is_retryable);
        assert_eq!(early.error_code, "WORKER_TIMEOUT");

        let last = classifier.classify_failure(&failure, false, &context(4));
        assert!(!last.is_retryable);
        assert!(last.is_final_attempt);
    }

    #[test]
    fn test_permanent_kinds_never_retry() {
        let classifier = StandardErrorClassifier::new();
        let failure = WorkerFailure::new(FailureKind::UnsupportedCodec, "av1");
        let result = classifier.classify_failure(&failure, false, &context(1));
        assert_eq!(result.error_category, ErrorCategory::Permanent);
        assert!(!result.is_retryable);
    }

    #[test]
    fn test_worker_permanent_tag_wins() {
        let classifier = StandardErrorClassifier::new();
        let failure = WorkerFailure::new(FailureKind::Throttled, "quota revoked");
        let result = classifier.classify_failure(&failure, true, &context(1));
        assert!(!result.is_retryable);
    }

    #[test]
    fn test_unknown_failures_are_transient() {
        let classifier = StandardErrorClassifier::new();
        let failure = WorkerFailure::new(FailureKind::Unknown, "???");
        assert!(classifier
            .classify_failure(&failure, false, &context(1))
            .is_retryable);
    }

    #[test]
    fn test_invoke_errors() {
        let classifier = StandardErrorClassifier::new();
        let missing = RenderError::not_found("revision r1");
        assert!(!classifier.classify_error(&missing, &context(1)).is_retryable);

        let outage = RenderError::StorageUnavailable("503".into());
        let result = classifier.classify_error(&outage, &context(1));
        assert!(result.is_retryable);
        assert_eq!(result.error_code, "STORAGE_UNAVAILABLE");
    }
}
