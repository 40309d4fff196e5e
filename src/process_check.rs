//! Check the cpu, memory and runtime of local processes matched by name.
//!
//! The rule order is historical and kept as is: every warn rule on cpu and memory is tried
//! before the crit rules, so a process above both memory limits reports Warning.

use std::path::Path;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use sysinfo::{ProcessStatus, System};
use tracing::{debug, info};

use crate::rules::{Comparator, Field, Observed, RuleSet, ThresholdRule};
use crate::{CheckError, ConfigError, PerfData, Resource, SampleReadError, ServiceState, Unit};

pub const RESOURCES_CHECK_NAME: &str = "check-process-resources";
pub const RUNTIME_CHECK_NAME: &str = "check-process-runtime";

/// Thresholds for one process check. Unset or zero limits are inactive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessCheckConfig {
    pub process: String,
    /// Match against the full command line instead of the process name.
    pub cmdline: bool,
    pub cpu_warn: Option<f64>,
    pub cpu_crit: Option<f64>,
    pub memory_warn: Option<f64>,
    pub memory_crit: Option<f64>,
    /// Seconds since the process was started.
    pub time_warn: Option<f64>,
    pub time_crit: Option<f64>,
}

impl ProcessCheckConfig {
    pub fn new(process: &str) -> Self {
        ProcessCheckConfig {
            process: process.to_owned(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.process.is_empty() {
            return Err(ConfigError::EmptyTarget { option: "process" });
        }

        let percentages = [
            ("cpu-warn", self.cpu_warn),
            ("cpu-crit", self.cpu_crit),
            ("memory-warn", self.memory_warn),
            ("memory-crit", self.memory_crit),
        ];
        for (option, limit) in percentages {
            if limit == Some(100.0) {
                return Err(ConfigError::FullPercentage { option });
            }
        }

        Ok(())
    }

    /// memory-warn, cpu-warn, memory-crit, cpu-crit, time-warn, time-crit.
    pub fn rules(&self) -> RuleSet {
        let set = |limit: Option<f64>| limit.filter(|limit| *limit > 0.0);
        let at_least = |name: &'static str, field: Field, status: ServiceState| {
            move |limit| {
                ThresholdRule::numeric(name, field, Comparator::GreaterOrEqual, limit, status)
            }
        };

        RuleSet::new()
            .with_rule_if(
                set(self.memory_warn),
                at_least("memory-warn", Field::Memory, ServiceState::Warning),
            )
            .with_rule_if(
                set(self.cpu_warn),
                at_least("cpu-warn", Field::Cpu, ServiceState::Warning),
            )
            .with_rule_if(
                set(self.memory_crit),
                at_least("memory-crit", Field::Memory, ServiceState::Critical),
            )
            .with_rule_if(
                set(self.cpu_crit),
                at_least("cpu-crit", Field::Cpu, ServiceState::Critical),
            )
            .with_rule_if(
                set(self.time_warn),
                at_least("time-warn", Field::Age, ServiceState::Warning),
            )
            .with_rule_if(
                set(self.time_crit),
                at_least("time-crit", Field::Age, ServiceState::Critical),
            )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    /// Process name, or the full command line when matching on it.
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub created_at_epoch_seconds: f64,
}

impl ProcessSample {
    pub fn age_seconds(&self, now: f64) -> f64 {
        now - self.created_at_epoch_seconds
    }
}

/// Converts a creation time in epoch milliseconds to whole epoch seconds.
pub fn created_at_seconds(create_time_millis: u64) -> f64 {
    (create_time_millis as f64 / 1000.0).round()
}

pub fn now_epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as f64)
        .unwrap_or_default()
}

/// Read access to one entry of the process table. Every read may fail on its own.
pub trait ProcessHandle {
    fn pid(&self) -> u32;
    fn name(&self) -> Result<String, SampleReadError>;
    fn cmdline(&self) -> Result<String, SampleReadError>;
    fn cpu_percent(&self) -> Result<f64, SampleReadError>;
    fn memory_percent(&self) -> Result<f64, SampleReadError>;
    fn create_time_millis(&self) -> Result<u64, SampleReadError>;
}

pub trait ProcessTable {
    /// Enumerates the running processes once.
    fn processes(&mut self) -> Vec<Box<dyn ProcessHandle + '_>>;
}

fn best_effort<T>(pid: u32, read: Result<T, SampleReadError>, absent: T) -> T {
    read.unwrap_or_else(|err| {
        debug!(pid, error = %err, "ignoring unreadable process field");
        absent
    })
}

/// Takes one snapshot of the process table.
///
/// Unreadable fields never abort the scan: a missing name or cpu/memory reading becomes
/// empty or zero, and a missing creation time becomes `now` so the process has no age.
pub fn sample_processes(
    table: &mut impl ProcessTable,
    cmdline: bool,
    now: f64,
) -> Vec<ProcessSample> {
    table
        .processes()
        .iter()
        .map(|handle| {
            let pid = handle.pid();
            let name = if cmdline { handle.cmdline() } else { handle.name() };
            let created_at_epoch_seconds = handle
                .create_time_millis()
                .map(created_at_seconds)
                .unwrap_or_else(|err| {
                    debug!(pid, error = %err, "ignoring unreadable process field");
                    now
                });

            ProcessSample {
                pid,
                name: best_effort(pid, name, String::new()),
                cpu_percent: best_effort(pid, handle.cpu_percent(), 0.0),
                memory_percent: best_effort(pid, handle.memory_percent(), 0.0),
                created_at_epoch_seconds,
            }
        })
        .collect()
}

/// A sample seen at a fixed point in time.
struct ProcessView<'a> {
    sample: &'a ProcessSample,
    now: f64,
}

impl Observed for ProcessView<'_> {
    fn subject(&self) -> String {
        format!("process {} (pid {})", self.sample.name, self.sample.pid)
    }

    fn number(&self, field: Field) -> Result<f64, CheckError> {
        match field {
            Field::Cpu => Ok(self.sample.cpu_percent),
            Field::Memory => Ok(self.sample.memory_percent),
            Field::Age => Ok(self.sample.age_seconds(self.now)),
            Field::Value | Field::Text => Err(CheckError::NotNumeric {
                metric: self.subject(),
                value: self.sample.name.clone(),
            }),
        }
    }

    fn text(&self, _field: Field) -> &str {
        &self.sample.name
    }
}

/// Runs a process check: validate, sample the table once, evaluate every process whose name
/// equals `config.process` in enumeration order.
///
/// The first process that trips a rule decides the result. No matching process is OK.
pub fn check_processes(
    check_name: &str,
    config: &ProcessCheckConfig,
    table: &mut impl ProcessTable,
    now: f64,
) -> Result<Resource, CheckError> {
    config.validate()?;
    let rules = config.rules();
    let resource = Resource::new(check_name);

    let samples = sample_processes(table, config.cmdline, now);
    debug!(processes = samples.len(), "sampled process table");

    let mut matched = samples.iter().filter(|sample| sample.name == config.process);
    let Some(first) = matched.next() else {
        return Ok(resource
            .with_state(ServiceState::Ok)
            .with_description(format!("process {} not found", config.process)));
    };

    let mut count = 0;
    for sample in std::iter::once(first).chain(matched) {
        count += 1;
        let view = ProcessView { sample, now };
        if let Some(verdict) = rules.evaluate(&view)? {
            info!(pid = sample.pid, rule = verdict.rule, "process out of bounds");
            let resource = resource
                .with_state(verdict.status)
                .with_description(verdict.message);
            return Ok(with_process_perf_data(resource, &view, config));
        }
    }

    let resource = resource.with_state(ServiceState::Ok).with_description(format!(
        "{} process{} named {} within thresholds",
        count,
        if count == 1 { "" } else { "es" },
        config.process
    ));
    Ok(with_process_perf_data(
        resource,
        &ProcessView { sample: first, now },
        config,
    ))
}

fn with_process_perf_data(
    resource: Resource,
    view: &ProcessView<'_>,
    config: &ProcessCheckConfig,
) -> Resource {
    resource
        .with_perf_data(
            PerfData::new("cpu", view.sample.cpu_percent)
                .with_unit(Unit::Percentage)
                .with_thresholds(config.cpu_warn, config.cpu_crit),
        )
        .with_perf_data(
            PerfData::new("memory", view.sample.memory_percent)
                .with_unit(Unit::Percentage)
                .with_thresholds(config.memory_warn, config.memory_crit)
                .with_range(Some(0.0), Some(100.0)),
        )
        .with_perf_data(
            PerfData::new("age", view.sample.age_seconds(view.now))
                .with_unit(Unit::Seconds)
                .with_thresholds(config.time_warn, config.time_crit),
        )
}

/// The live process table, read through sysinfo.
pub struct SysinfoProcessTable {
    system: System,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        SysinfoProcessTable {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn processes(&mut self) -> Vec<Box<dyn ProcessHandle + '_>> {
        self.system.refresh_memory();
        // cpu usage is the delta between two refreshes
        self.system.refresh_processes();
        thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.system.refresh_processes();

        let total_memory = self.system.total_memory();
        self.system
            .processes()
            .values()
            .map(|process| {
                Box::new(SysinfoProcess {
                    process,
                    total_memory,
                }) as Box<dyn ProcessHandle + '_>
            })
            .collect()
    }
}

/// Linux keeps at most this many bytes of a process name.
const TRUNCATED_NAME_LEN: usize = 15;

/// Recovers the full name of a process whose kernel name was cut short, from the file name of
/// its first argument or its executable.
fn untruncated_name(name: &str, cmd: &[String], exe: Option<&Path>) -> String {
    if name.len() < TRUNCATED_NAME_LEN {
        return name.to_owned();
    }

    cmd.first()
        .map(Path::new)
        .into_iter()
        .chain(exe)
        .filter_map(|path| path.file_name()?.to_str())
        .find(|full| full.starts_with(name))
        .unwrap_or(name)
        .to_owned()
}

fn ensure_alive(pid: u32, status: ProcessStatus) -> Result<(), SampleReadError> {
    match status {
        ProcessStatus::Zombie | ProcessStatus::Dead => Err(SampleReadError::Gone { pid }),
        _ => Ok(()),
    }
}

struct SysinfoProcess<'a> {
    process: &'a sysinfo::Process,
    total_memory: u64,
}

impl SysinfoProcess<'_> {
    fn missing(&self, field: &'static str) -> SampleReadError {
        SampleReadError::Missing {
            pid: self.pid(),
            field,
        }
    }
}

impl ProcessHandle for SysinfoProcess<'_> {
    fn pid(&self) -> u32 {
        self.process.pid().as_u32()
    }

    fn name(&self) -> Result<String, SampleReadError> {
        match self.process.name() {
            "" => Err(self.missing("name")),
            name => Ok(untruncated_name(
                name,
                self.process.cmd(),
                self.process.exe(),
            )),
        }
    }

    fn cmdline(&self) -> Result<String, SampleReadError> {
        match self.process.cmd() {
            [] => Err(self.missing("command line")),
            args => Ok(args.join(" ")),
        }
    }

    fn cpu_percent(&self) -> Result<f64, SampleReadError> {
        ensure_alive(self.pid(), self.process.status())?;
        Ok(f64::from(self.process.cpu_usage()))
    }

    fn memory_percent(&self) -> Result<f64, SampleReadError> {
        ensure_alive(self.pid(), self.process.status())?;
        if self.total_memory == 0 {
            return Err(self.missing("total memory"));
        }
        Ok(self.process.memory() as f64 / self.total_memory as f64 * 100.0)
    }

    fn create_time_millis(&self) -> Result<u64, SampleReadError> {
        match self.process.start_time() {
            0 => Err(self.missing("start time")),
            seconds => Ok(seconds * 1000),
        }
    }
}
