use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregation::DEFAULT_BUCKET_LIMIT;
use crate::searcher::ExecutionLimits;

/// Request-scoped search settings.
///
/// The settings are handed to a [`SearchContext`](crate::SearchContext) when it is created and
/// never change afterwards.
///
/// # JSON Format
/// ```json
/// {
///     "concurrent_segment_search": true,
///     "max_slice_count": 4,
///     "bucket_limit": 10000,
///     "timeout_millis": 500,
///     "terminate_after": 1000
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Enables the partitioned (concurrent segment search) execution path.
    pub concurrent_segment_search: bool,
    /// Maximum number of partitions the segments are grouped into.
    ///
    /// `None` creates one partition per segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_slice_count: Option<usize>,
    /// Maximum number of buckets a request may create. A negative value disables the check.
    pub bucket_limit: i64,
    /// Time budget of one partition of the matching pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<u64>,
    /// Maximum number of documents collected by one partition of the matching pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminate_after: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            concurrent_segment_search: false,
            max_slice_count: None,
            bucket_limit: DEFAULT_BUCKET_LIMIT,
            timeout_millis: None,
            terminate_after: None,
        }
    }
}

impl SearchConfig {
    /// Parses a `SearchConfig` from its JSON representation.
    pub fn from_json_str(json: &str) -> crate::Result<SearchConfig> {
        let config: SearchConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the consistency of the settings.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_slice_count == Some(0) {
            return Err(crate::AggPhaseError::InvalidArgument(
                "max_slice_count must be strictly positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The time budget of one partition.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_millis.map(Duration::from_millis)
    }

    pub(crate) fn execution_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            terminate_after: self.terminate_after,
            timeout: self.timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_config_defaults() -> crate::Result<()> {
        let config = SearchConfig::from_json_str("{}")?;
        assert_eq!(config, SearchConfig::default());
        assert!(!config.concurrent_segment_search);
        assert_eq!(config.bucket_limit, DEFAULT_BUCKET_LIMIT);
        assert_eq!(config.timeout(), None);
        Ok(())
    }

    #[test]
    fn test_search_config_from_json() -> crate::Result<()> {
        let config = SearchConfig::from_json_str(
            r#"{"concurrent_segment_search": true, "max_slice_count": 3, "bucket_limit": -1,
                "timeout_millis": 20}"#,
        )?;
        assert!(config.concurrent_segment_search);
        assert_eq!(config.max_slice_count, Some(3));
        assert_eq!(config.bucket_limit, -1);
        assert_eq!(config.timeout(), Some(Duration::from_millis(20)));
        let limits = config.execution_limits();
        assert_eq!(limits.terminate_after, None);
        assert_eq!(limits.timeout, Some(Duration::from_millis(20)));
        Ok(())
    }

    #[test]
    fn test_search_config_rejects_invalid() {
        assert!(SearchConfig::from_json_str(r#"{"max_slice_count": 0}"#).is_err());
        assert!(SearchConfig::from_json_str(r#"{"unknown_setting": 0}"#).is_err());
    }
}
