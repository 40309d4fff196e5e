//! Command line surface shared by the check binaries.
//!
//! Every option can also come from the environment, so agents that pass configuration as
//! environment variables need no wrapper script.

use std::time::Duration;

use clap::{Args, Parser};

use crate::check_definition::print_check_definition_if_env_and_exit;
use crate::metrics::{MetricCheckConfig, DEFAULT_URL};
use crate::process_check::ProcessCheckConfig;
use crate::ServiceState;

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log more to stderr (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Args, Debug)]
pub struct MetricArgs {
    /// URL to the Prometheus metrics
    #[clap(long, env = "CHECK_METRIC_URL", default_value = DEFAULT_URL)]
    pub url: String,
    /// Metric to check
    #[clap(long, env = "CHECK_METRIC_METRIC")]
    pub metric: Option<String>,
    /// Minimum value of metric
    #[clap(long, env = "CHECK_METRIC_MIN", allow_negative_numbers = true)]
    pub min: Option<f64>,
    /// Maximum value of metric
    #[clap(long, env = "CHECK_METRIC_MAX", allow_negative_numbers = true)]
    pub max: Option<f64>,
    /// Specific numeric value of metric
    #[clap(long, env = "CHECK_METRIC_VALUE", allow_negative_numbers = true)]
    pub value: Option<f64>,
    /// Specific string of metric
    #[clap(long, env = "CHECK_METRIC_STRING")]
    pub string: Option<String>,
    /// Request timeout in seconds
    #[clap(long, env = "CHECK_METRIC_TIMEOUT", default_value_t = 10)]
    pub timeout: u64,
}

impl MetricArgs {
    pub fn into_config(self) -> MetricCheckConfig {
        MetricCheckConfig {
            url: self.url,
            metric: self.metric.unwrap_or_default(),
            min: self.min,
            max: self.max,
            value: self.value,
            string: self.string,
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Process name to check
    #[clap(long, env = "CHECK_PROCESS_PROCESS")]
    pub process: Option<String>,
    /// Match the full command line instead of the process name
    #[clap(
        long,
        env = "CHECK_PROCESS_CMDLINE",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub cmdline: bool,
    /// CPU usage in percent that raises a warning
    #[clap(long, env = "CHECK_PROCESS_CPU_WARN")]
    pub cpu_warn: Option<f64>,
    /// CPU usage in percent that raises a critical
    #[clap(long, env = "CHECK_PROCESS_CPU_CRIT")]
    pub cpu_crit: Option<f64>,
    /// Memory usage in percent that raises a warning
    #[clap(long, env = "CHECK_PROCESS_MEMORY_WARN")]
    pub memory_warn: Option<f64>,
    /// Memory usage in percent that raises a critical
    #[clap(long, env = "CHECK_PROCESS_MEMORY_CRIT")]
    pub memory_crit: Option<f64>,
}

impl ProcessArgs {
    pub fn into_config(self) -> ProcessCheckConfig {
        ProcessCheckConfig {
            process: self.process.unwrap_or_default(),
            cmdline: self.cmdline,
            cpu_warn: self.cpu_warn,
            cpu_crit: self.cpu_crit,
            memory_warn: self.memory_warn,
            memory_crit: self.memory_crit,
            time_warn: None,
            time_crit: None,
        }
    }
}

#[derive(Args, Debug)]
pub struct RuntimeArgs {
    /// Seconds since process start that raise a warning
    #[clap(long, env = "CHECK_PROCESS_TIME_WARN")]
    pub time_warn: Option<f64>,
    /// Seconds since process start that raise a critical
    #[clap(long, env = "CHECK_PROCESS_TIME_CRIT")]
    pub time_crit: Option<f64>,
}

impl RuntimeArgs {
    pub fn apply(self, config: ProcessCheckConfig) -> ProcessCheckConfig {
        ProcessCheckConfig {
            time_warn: self.time_warn,
            time_crit: self.time_crit,
            ..config
        }
    }
}

/// Parses the command line of a check binary.
///
/// Prints the check definition instead when asked to. Unparseable arguments are a
/// configuration error and exit with Warning, like any other invalid configuration.
pub fn parse<P: Parser>(name: &str) -> P {
    if let Err(err) = print_check_definition_if_env_and_exit(name, &P::command()) {
        println!("{}: {}", ServiceState::Unknown, err);
        std::process::exit(ServiceState::Unknown.exit_code());
    }

    P::try_parse().unwrap_or_else(|err| {
        if !err.use_stderr() {
            // --help and --version
            err.exit()
        }

        eprintln!("{err}");
        let rendered = err.to_string();
        let summary = rendered.lines().next().unwrap_or_default();
        println!(
            "{}: invalid arguments: {}",
            ServiceState::Warning,
            summary.trim_start_matches("error: ")
        );
        std::process::exit(ServiceState::Warning.exit_code())
    })
}
