use std::fmt::Display;

use tracing::warn;

use crate::{Resource, ServiceState};

/// Turns the outcome of a check closure into something the host agent understands.
///
/// Errors are reported as Unknown unless an `on_error` handler picks another state.
pub struct Runner<E> {
    on_error: Option<Box<dyn FnOnce(&E) -> ServiceState>>,
}

impl<E: Display> Runner<E> {
    pub fn new() -> Self {
        Self { on_error: None }
    }

    pub fn on_error(mut self, f: impl FnOnce(&E) -> ServiceState + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn safe_run(self, f: impl FnOnce() -> Result<Resource, E>) -> RunnerResult<E> {
        match f() {
            Ok(resource) => RunnerResult::Ok(resource),
            Err(err) => {
                let state = self
                    .on_error
                    .map(|f| f(&err))
                    .unwrap_or(ServiceState::Unknown);
                warn!(%state, error = %err, "check failed");

                RunnerResult::Err(state, err)
            }
        }
    }
}

impl<E: Display> Default for Runner<E> {
    fn default() -> Self {
        Self::new()
    }
}

pub enum RunnerResult<E> {
    Ok(Resource),
    Err(ServiceState, E),
}

impl<E: Display> RunnerResult<E> {
    pub fn state(&self) -> ServiceState {
        match self {
            RunnerResult::Ok(resource) => resource.state(),
            RunnerResult::Err(state, _) => *state,
        }
    }

    pub fn to_nagios_string(&self) -> String {
        match self {
            RunnerResult::Ok(resource) => resource.to_nagios_string(),
            RunnerResult::Err(state, err) => format!("{}: {}", state, err),
        }
    }

    pub fn print_and_exit(self) -> ! {
        println!("{}", self.to_nagios_string());
        std::process::exit(self.state().exit_code());
    }
}
