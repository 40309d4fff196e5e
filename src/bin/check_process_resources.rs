use clap::Parser;

use threshold_checks::cli::{self, LogArgs, ProcessArgs};
use threshold_checks::process_check::{
    check_processes, now_epoch_seconds, SysinfoProcessTable, RESOURCES_CHECK_NAME,
};
use threshold_checks::{logging, CheckError, Runner};

/// Check if a process is using too much resources (CPU/memory).
#[derive(Parser)]
#[clap(name = RESOURCES_CHECK_NAME, version)]
struct Cli {
    #[clap(flatten)]
    process: ProcessArgs,
    #[clap(flatten)]
    log: LogArgs,
}

fn main() {
    let cli: Cli = cli::parse(RESOURCES_CHECK_NAME);
    logging::init(cli.log.verbose);
    let config = cli.process.into_config();

    Runner::new()
        .on_error(CheckError::service_state)
        .safe_run(|| {
            let mut table = SysinfoProcessTable::new();
            check_processes(RESOURCES_CHECK_NAME, &config, &mut table, now_epoch_seconds())
        })
        .print_and_exit()
}
