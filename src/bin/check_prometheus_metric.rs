use clap::Parser;

use threshold_checks::cli::{self, LogArgs, MetricArgs};
use threshold_checks::metrics::{check_metric, HttpMetricsSource, CHECK_NAME};
use threshold_checks::{logging, CheckError, Runner};

/// Check a single metric of a Prometheus-style metrics endpoint.
#[derive(Parser)]
#[clap(name = CHECK_NAME, version)]
struct Cli {
    #[clap(flatten)]
    metric: MetricArgs,
    #[clap(flatten)]
    log: LogArgs,
}

fn main() {
    let cli: Cli = cli::parse(CHECK_NAME);
    logging::init(cli.log.verbose);
    let config = cli.metric.into_config();

    Runner::new()
        .on_error(CheckError::service_state)
        .safe_run(|| {
            config.validate()?;
            let source = HttpMetricsSource::new(&config.url, config.timeout)?;
            check_metric(&config, &source)
        })
        .print_and_exit()
}
