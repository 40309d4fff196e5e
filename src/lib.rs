//! The threshold-checks crate implements monitoring checks for Sensu/Nagios style agents.
//!
//! Every check follows the same single pass: validate the configuration, take one sample
//! (a Prometheus-style metrics endpoint or the local process table), pick the entity named in
//! the configuration and run an ordered [rules::RuleSet] over it. The outcome is a [Resource]
//! which prints the one line the host agent parses and exits with the matching code.

use std::fmt;
use std::process;

#[macro_use]
mod macros;

#[cfg(feature = "clap")]
pub mod check_definition;
#[cfg(feature = "clap")]
pub mod cli;
pub mod error;
mod helper;
pub mod logging;
pub mod metrics;
pub mod process_check;
pub mod rules;
mod runner;

pub use crate::error::{CheckError, ConfigError, SampleReadError};
pub use crate::helper::{display_number, round_tenths};
pub use crate::runner::{Runner, RunnerResult};

/// A Resource is the result of one check run, as the host agent sees it.
///
/// ```rust
/// # use threshold_checks::{PerfData, Resource, ServiceState, Unit};
/// let resource = Resource::new("check-process-resources")
///     .with_state(ServiceState::Warning)
///     .with_description("process worker: memory 55% is at or above memory-warn 50%")
///     .with_perf_data(PerfData::new("worker_memory", 55.0).with_unit(Unit::Percentage));
///
/// assert_eq!(
///     &resource.to_nagios_string(),
///     "check-process-resources WARNING: process worker: memory 55% is at or above memory-warn 50% | worker_memory=55%"
/// );
/// ```
#[derive(Clone, Debug)]
pub struct Resource {
    name: String,
    state: ServiceState,
    description: Option<String>,
    perf_data: Vec<PerfData>,
}

impl Resource {
    /// Creates a resource in the Unknown state. The state is expected to be set by the check.
    pub fn new(name: &str) -> Resource {
        Resource {
            name: name.to_owned(),
            state: ServiceState::Unknown,
            description: None,
            perf_data: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: ServiceState) -> Self {
        self.state = state;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_perf_data(mut self, perf_data: PerfData) -> Self {
        self.perf_data.push(perf_data);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn perf_data(&self) -> &[PerfData] {
        &self.perf_data
    }

    /// Returns the single line the host agent parses: `<name> <STATE>[: <description>][ | <perf>]`.
    pub fn to_nagios_string(&self) -> String {
        let mut s = format!("{} {}", self.name, self.state);

        if let Some(ref description) = self.description {
            s.push_str(&format!(": {}", description));
        }

        if !self.perf_data.is_empty() {
            s.push_str(" |");

            for perf in self.perf_data.iter() {
                s.push_str(&format!(" {}", perf.to_perf_string()));
            }
        }

        s
    }

    pub fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }

    /// Prints Self::to_nagios_string and exits with the exit code from Self::exit_code.
    pub fn print_and_exit(&self) -> ! {
        println!("{}", self.to_nagios_string());
        process::exit(self.exit_code());
    }
}

/// Represents a service state as the host agent understands it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl ServiceState {
    /// Returns the exit code the host agent maps back to this state.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServiceState::Ok => 0,
            ServiceState::Warning => 1,
            ServiceState::Critical => 2,
            ServiceState::Unknown => 3,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Ok => "OK",
            ServiceState::Warning => "WARNING",
            ServiceState::Critical => "CRITICAL",
            ServiceState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Only used to render performance data, so it doesn't interfere with Display.
pub trait ToPerfString {
    fn to_perf_string(&self) -> String;
}

impl ToPerfString for f64 {
    fn to_perf_string(&self) -> String {
        display_number(*self)
    }
}

impl ToPerfString for String {
    fn to_perf_string(&self) -> String {
        self.clone()
    }
}

impl<T> ToPerfString for Option<T>
where
    T: ToPerfString,
{
    fn to_perf_string(&self) -> String {
        match self {
            Some(ref s) => s.to_perf_string(),
            None => String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unit {
    None,
    Seconds,
    Percentage,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Unit::None => "",
            Unit::Seconds => "s",
            Unit::Percentage => "%",
        };
        f.write_str(s)
    }
}

/// One performance data entry: `label=value[unit];[warn];[crit];[min];[max]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PerfData {
    label: String,
    value: f64,
    unit: Unit,
    warning: Option<f64>,
    critical: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

impl PerfData {
    pub fn new(label: &str, value: f64) -> Self {
        PerfData {
            label: label.to_owned(),
            value,
            unit: Unit::None,
            warning: None,
            critical: None,
            min: None,
            max: None,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_thresholds(mut self, warning: Option<f64>, critical: Option<f64>) -> Self {
        self.warning = warning;
        self.critical = critical;
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl ToPerfString for PerfData {
    fn to_perf_string(&self) -> String {
        // `=` separates label and value
        let label = self.label.replace('=', "_");

        // quote `'`
        let label = label.replace('\'', "''");

        // quote if contains spaces
        let label = if label.contains(' ') {
            format!("'{}'", label)
        } else {
            label
        };

        perf_string!(
            label,
            format!("{}{}", self.value.to_perf_string(), self.unit),
            self.warning,
            self.critical,
            self.min,
            self.max
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::{PerfData, Resource, ServiceState, ToPerfString, Unit};

    #[test]
    fn test_perf_data() {
        let perf = PerfData::new("foo", 12.0);
        assert_eq!(&perf.to_perf_string(), "foo=12");

        let perf = PerfData::new("foo", 12.0).with_unit(Unit::Seconds);
        assert_eq!(&perf.to_perf_string(), "foo=12s");

        let perf = PerfData::new("foo", 42.35)
            .with_unit(Unit::Percentage)
            .with_thresholds(Some(50.0), Some(70.0));
        assert_eq!(&perf.to_perf_string(), "foo=42.4%;50;70");

        let perf = PerfData::new("foo", 42.0).with_range(Some(0.0), None);
        assert_eq!(&perf.to_perf_string(), "foo=42;;;0");
    }

    #[test]
    fn test_perf_data_label_quoting() {
        let test_data = [
            ("test", "test=0"),
            ("test=a", "test_a=0"),
            ("te'st", "te''st=0"),
            ("te st", "'te st'=0"),
        ];
        for (label, expected_string) in &test_data {
            let perf = PerfData::new(label, 0.0);
            assert_eq!(&perf.to_perf_string(), expected_string);
        }
    }

    #[test]
    fn test_resource() {
        let resource = Resource::new("foo");
        assert_eq!(&resource.to_nagios_string(), "foo UNKNOWN");
        assert_eq!(resource.exit_code(), 3);

        let resource = Resource::new("foo")
            .with_state(ServiceState::Ok)
            .with_description("metric bar not found");
        assert_eq!(
            &resource.to_nagios_string(),
            "foo OK: metric bar not found"
        );

        let resource = Resource::new("foo")
            .with_state(ServiceState::Critical)
            .with_description("too high")
            .with_perf_data(PerfData::new("a", 1.0))
            .with_perf_data(PerfData::new("b", 2.5));
        assert_eq!(
            &resource.to_nagios_string(),
            "foo CRITICAL: too high | a=1 b=2.5"
        );
        assert_eq!(resource.exit_code(), 2);
    }

    #[test]
    fn test_state() {
        assert_eq!(ServiceState::Ok.exit_code(), 0);
        assert_eq!(ServiceState::Warning.exit_code(), 1);
        assert_eq!(ServiceState::Critical.exit_code(), 2);
        assert_eq!(ServiceState::Unknown.exit_code(), 3);

        assert_eq!(&ServiceState::Ok.to_string(), "OK");
        assert_eq!(&ServiceState::Warning.to_string(), "WARNING");
        assert_eq!(&ServiceState::Critical.to_string(), "CRITICAL");
        assert_eq!(&ServiceState::Unknown.to_string(), "UNKNOWN");
    }
}
