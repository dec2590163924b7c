//! Logging conventions
//!
//! All crates in the workspace log through `tracing` with structured
//! fields. Call sites tag themselves with an `operation` field drawn from
//! the [`operations`] vocabulary below, so output stays greppable across
//! the engine, the HTTP surface and the client.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | cycle-wide failures, round-trip failures, storage errors |
//! | WARN  | retries, queue capacity hits, dropped pairs |
//! | INFO  | cycle begin/complete, state writes, rectification outcomes |
//! | DEBUG | pair classification, queue movements, status snapshots |

/// Standard operation names, used as the `operation` field value.
pub mod operations {
    /// One resolution cycle starting
    pub const RESOLVE_BEGIN: &str = "resolve_begin";
    /// One resolution cycle finished
    pub const RESOLVE_COMPLETE: &str = "resolve_complete";
    /// State read
    pub const STATE_READ: &str = "state_read";
    /// State write
    pub const STATE_WRITE: &str = "state_write";
    /// Rectification enqueued
    pub const QUEUE_PUSH: &str = "queue_push";
    /// Rectification executed
    pub const RECTIFY: &str = "rectify";
    /// Artifact lookup
    pub const RESOLVE_NAME: &str = "resolve_name";
    /// Client-side deployment update
    pub const UPDATE: &str = "update";
}

#[cfg(test)]
mod tests {
    use super::operations;

    #[test]
    fn test_operation_names_are_distinct_and_lowercase() {
        let names = [
            operations::RESOLVE_BEGIN,
            operations::RESOLVE_COMPLETE,
            operations::STATE_READ,
            operations::STATE_WRITE,
            operations::QUEUE_PUSH,
            operations::RECTIFY,
            operations::RESOLVE_NAME,
            operations::UPDATE,
        ];
        let unique: std::collections::BTreeSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert!(names
            .iter()
            .all(|n| n.chars().all(|c| c.is_ascii_lowercase() || c == '_')));
    }
}
