use crate::ServiceState;

/// Rejected configuration, raised before anything is sampled.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{option} must not be 100, such a threshold can never fire")]
    FullPercentage { option: &'static str },
    #[error("{option} must not be empty")]
    EmptyTarget { option: &'static str },
}

/// A single field of a single process could not be read.
///
/// Never fails a run: the sampler logs it and treats the field as absent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleReadError {
    #[error("process {pid} has no {field}")]
    Missing { pid: u32, field: &'static str },
    /// The process exited between listing and reading.
    #[error("process {pid} is gone")]
    Gone { pid: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to query metrics from {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("metric {metric} has non-numeric value {value:?}")]
    NotNumeric { metric: String, value: String },
}

impl CheckError {
    /// The state the host agent should see for this error.
    ///
    /// A broken configuration is a Warning so it is not mistaken for a failing service.
    pub fn service_state(&self) -> ServiceState {
        match self {
            CheckError::Config(_) => ServiceState::Warning,
            CheckError::Transport { .. } | CheckError::NotNumeric { .. } => ServiceState::Unknown,
        }
    }
}
