use clap::Parser;

use threshold_checks::cli::{self, LogArgs, ProcessArgs, RuntimeArgs};
use threshold_checks::process_check::{
    check_processes, now_epoch_seconds, SysinfoProcessTable, RUNTIME_CHECK_NAME,
};
use threshold_checks::{logging, CheckError, Runner};

/// Check if a process is using too much resources (CPU/memory) or has been running too long.
#[derive(Parser)]
#[clap(name = RUNTIME_CHECK_NAME, version)]
struct Cli {
    #[clap(flatten)]
    process: ProcessArgs,
    #[clap(flatten)]
    runtime: RuntimeArgs,
    #[clap(flatten)]
    log: LogArgs,
}

fn main() {
    let cli: Cli = cli::parse(RUNTIME_CHECK_NAME);
    logging::init(cli.log.verbose);
    let config = cli.runtime.apply(cli.process.into_config());

    Runner::new()
        .on_error(CheckError::service_state)
        .safe_run(|| {
            let mut table = SysinfoProcessTable::new();
            check_processes(RUNTIME_CHECK_NAME, &config, &mut table, now_epoch_seconds())
        })
        .print_and_exit()
}
