//! Environment flags read by the batch jobs.

use crate::config::{
    CEASE_OPERATION_ENV_VAR, DATA_CHANGES_TOPIC_ENV_VAR, SEARCH_INDEXING_TOPIC_ENV_VAR,
    WEBHOOK_EXECUTION_TOPIC_ENV_VAR,
};

/// True when the value is `"true"`, ignoring case and surrounding whitespace.
pub fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Whether `CEASE_OPERATION` asks the job to exit without work.
pub fn cease_operation() -> bool {
    std::env::var(CEASE_OPERATION_ENV_VAR)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

/// Topic for index requests: `SEARCH_INDEXING_TOPIC_NAME`, else `fallback`.
pub fn search_indexing_topic(fallback: &str) -> String {
    env_or(SEARCH_INDEXING_TOPIC_ENV_VAR, fallback)
}

/// Topic for data change messages: `DATA_CHANGES_TOPIC_NAME`, else `fallback`.
pub fn data_changes_topic(fallback: &str) -> String {
    env_or(DATA_CHANGES_TOPIC_ENV_VAR, fallback)
}

/// Topic for webhook execution requests:
/// `WEBHOOK_EXECUTION_REQUESTS_TOPIC_NAME`, else `fallback`. Empty means
/// webhooks are not fanned out.
pub fn webhook_execution_topic(fallback: &str) -> String {
    env_or(WEBHOOK_EXECUTION_TOPIC_ENV_VAR, fallback)
}

fn env_or(key: &str, fallback: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("  TRUE \n"));
        assert!(parse_flag("True"));
        assert!(!parse_flag("1"));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("truthy"));
    }

    #[test]
    #[serial]
    fn test_cease_operation_reads_env() {
        std::env::remove_var(CEASE_OPERATION_ENV_VAR);
        assert!(!cease_operation());

        std::env::set_var(CEASE_OPERATION_ENV_VAR, " True ");
        assert!(cease_operation());

        std::env::set_var(CEASE_OPERATION_ENV_VAR, "false");
        assert!(!cease_operation());

        std::env::remove_var(CEASE_OPERATION_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_search_indexing_topic_falls_back() {
        std::env::remove_var(SEARCH_INDEXING_TOPIC_ENV_VAR);
        assert_eq!(search_indexing_topic("from_config"), "from_config");

        std::env::set_var(SEARCH_INDEXING_TOPIC_ENV_VAR, "  ");
        assert_eq!(search_indexing_topic("from_config"), "from_config");

        std::env::set_var(SEARCH_INDEXING_TOPIC_ENV_VAR, "search_index_requests");
        assert_eq!(search_indexing_topic("from_config"), "search_index_requests");

        std::env::remove_var(SEARCH_INDEXING_TOPIC_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_data_changes_topic_falls_back() {
        std::env::remove_var(DATA_CHANGES_TOPIC_ENV_VAR);
        assert_eq!(data_changes_topic("data_changes"), "data_changes");

        std::env::set_var(DATA_CHANGES_TOPIC_ENV_VAR, "dc");
        assert_eq!(data_changes_topic("data_changes"), "dc");

        std::env::remove_var(DATA_CHANGES_TOPIC_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_webhook_execution_topic_defaults_to_disabled() {
        std::env::remove_var(WEBHOOK_EXECUTION_TOPIC_ENV_VAR);
        assert_eq!(webhook_execution_topic(""), "");

        std::env::set_var(WEBHOOK_EXECUTION_TOPIC_ENV_VAR, "webhook_execution_requests");
        assert_eq!(webhook_execution_topic(""), "webhook_execution_requests");

        std::env::remove_var(WEBHOOK_EXECUTION_TOPIC_ENV_VAR);
    }
}
