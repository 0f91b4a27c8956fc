//! Statement completion events

use std::time::Duration;

/// Published after every statement, whether it succeeded or not
#[derive(Debug, Clone, PartialEq)]
pub struct OperationCompleted {
    pub query_text: String,
    /// Rows returned (zero on failure)
    pub resources_returned: usize,
    pub time_taken: Duration,
    /// Rendered error, if the statement failed
    pub error: Option<String>,
}

impl OperationCompleted {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl std::fmt::Display for OperationCompleted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Query returned {} resource(s) in {} ms: {}",
            self.resources_returned,
            self.time_taken.as_millis(),
            self.query_text
        )?;
        if let Some(error) = &self.error {
            write!(f, " (failed: {})", error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let event = OperationCompleted {
            query_text: "MATCH (n) RETURN n".to_string(),
            resources_returned: 3,
            time_taken: Duration::from_millis(12),
            error: None,
        };
        assert!(event.is_success());
        assert_eq!(
            event.to_string(),
            "Query returned 3 resource(s) in 12 ms: MATCH (n) RETURN n"
        );
    }
}
