//! Check a single metric of a Prometheus-style metrics endpoint.
//!
//! The body is read as newline-delimited records of whitespace-separated fields. Only the first
//! field (the name, labels included) and the second (the value) are used.

use std::time::Duration;

use tracing::{debug, info};

use crate::rules::{Comparator, Field, Observed, RuleSet, ThresholdRule};
use crate::{CheckError, ConfigError, PerfData, Resource, ServiceState};

pub const CHECK_NAME: &str = "check-prometheus-metric";
pub const DEFAULT_URL: &str = "http://localhost:9182/metrics";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq)]
pub struct MetricCheckConfig {
    pub url: String,
    pub metric: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub value: Option<f64>,
    pub string: Option<String>,
    pub timeout: Duration,
}

impl MetricCheckConfig {
    /// A configuration for `metric` against the default endpoint, with no rules active.
    pub fn new(metric: &str) -> Self {
        MetricCheckConfig {
            url: DEFAULT_URL.to_owned(),
            metric: metric.to_owned(),
            min: None,
            max: None,
            value: None,
            string: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metric.is_empty() {
            return Err(ConfigError::EmptyTarget { option: "metric" });
        }
        if self.url.is_empty() {
            return Err(ConfigError::EmptyTarget { option: "url" });
        }
        Ok(())
    }

    /// Builds the ordered rules: string, max, min, exact value. Zero and empty limits are unset.
    pub fn rules(&self) -> RuleSet {
        let set = |limit: Option<f64>| limit.filter(|limit| *limit != 0.0);

        RuleSet::new()
            .with_rule_if(self.string.as_deref().filter(|s| !s.is_empty()), |limit| {
                ThresholdRule::text("string", Comparator::NotEquals, limit, ServiceState::Critical)
            })
            .with_rule_if(set(self.max), |limit| {
                ThresholdRule::numeric(
                    "max",
                    Field::Value,
                    Comparator::Greater,
                    limit,
                    ServiceState::Critical,
                )
            })
            .with_rule_if(set(self.min), |limit| {
                ThresholdRule::numeric(
                    "min",
                    Field::Value,
                    Comparator::Less,
                    limit,
                    ServiceState::Critical,
                )
            })
            .with_rule_if(set(self.value), |limit| {
                ThresholdRule::numeric(
                    "value",
                    Field::Value,
                    Comparator::NotEquals,
                    limit,
                    ServiceState::Critical,
                )
            })
    }
}

/// One `name value` record of the metrics body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricSample<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> MetricSample<'a> {
    /// Splits a line on whitespace. Lines with fewer than two fields yield None.
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let name = fields.next()?;
        let value = fields.next()?;
        Some(MetricSample { name, value })
    }
}

impl Observed for MetricSample<'_> {
    fn subject(&self) -> String {
        format!("metric {}", self.name)
    }

    fn number(&self, _field: Field) -> Result<f64, CheckError> {
        self.value.parse().map_err(|_| CheckError::NotNumeric {
            metric: self.name.to_owned(),
            value: self.value.to_owned(),
        })
    }

    fn text(&self, _field: Field) -> &str {
        self.value
    }
}

/// A fetched metrics body. Iterating [MetricsBody::samples] again restarts the scan.
#[derive(Clone, Debug)]
pub struct MetricsBody {
    body: String,
}

impl MetricsBody {
    pub fn new(body: String) -> Self {
        MetricsBody { body }
    }

    pub fn samples(&self) -> impl Iterator<Item = MetricSample<'_>> {
        self.body.lines().filter_map(MetricSample::parse)
    }
}

/// Where the metrics body comes from.
pub trait MetricsSource {
    fn fetch(&self) -> Result<MetricsBody, CheckError>;
}

/// Fetches the body with a single blocking GET. No retries.
pub struct HttpMetricsSource {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpMetricsSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CheckError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| CheckError::Transport {
                url: url.to_owned(),
                source,
            })?;

        Ok(HttpMetricsSource {
            url: url.to_owned(),
            client,
        })
    }
}

impl MetricsSource for HttpMetricsSource {
    fn fetch(&self) -> Result<MetricsBody, CheckError> {
        let transport = |source| CheckError::Transport {
            url: self.url.clone(),
            source,
        };

        debug!(url = %self.url, "querying metrics");
        let body = self
            .client
            .get(&self.url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(transport)?;

        Ok(MetricsBody::new(body))
    }
}

/// Runs the metrics check: validate, fetch once, evaluate every line named `config.metric`.
///
/// The first line that trips a rule decides the result. A body without the metric is OK.
pub fn check_metric(
    config: &MetricCheckConfig,
    source: &impl MetricsSource,
) -> Result<Resource, CheckError> {
    config.validate()?;
    let rules = config.rules();
    let resource = Resource::new(CHECK_NAME);

    let body = source.fetch()?;
    let mut first_match = None;

    for sample in body.samples().filter(|sample| sample.name == config.metric) {
        debug!(metric = sample.name, value = sample.value, "checking metric");

        if let Some(verdict) = rules.evaluate(&sample)? {
            info!(rule = verdict.rule, "metric out of bounds");
            let resource = resource
                .with_state(verdict.status)
                .with_description(verdict.message);
            return Ok(with_sample_perf_data(resource, &sample, config));
        }

        first_match.get_or_insert(sample);
    }

    let resource = resource.with_state(ServiceState::Ok);
    Ok(match first_match {
        Some(sample) => {
            let resource = resource.with_description(format!(
                "metric {} is within thresholds: {}",
                sample.name, sample.value
            ));
            with_sample_perf_data(resource, &sample, config)
        }
        None => resource.with_description(format!("metric {} not found", config.metric)),
    })
}

fn with_sample_perf_data(
    resource: Resource,
    sample: &MetricSample<'_>,
    config: &MetricCheckConfig,
) -> Resource {
    let max = config.max.filter(|max| *max != 0.0);
    match sample.value.parse::<f64>() {
        Ok(value) if value.is_finite() => resource.with_perf_data(
            PerfData::new(sample.name, value).with_thresholds(None, max),
        ),
        _ => resource,
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    struct StaticSource(&'static str);

    impl MetricsSource for StaticSource {
        fn fetch(&self) -> Result<MetricsBody, CheckError> {
            Ok(MetricsBody::new(self.0.to_owned()))
        }
    }

    struct NeverSampled;

    impl MetricsSource for NeverSampled {
        fn fetch(&self) -> Result<MetricsBody, CheckError> {
            panic!("the endpoint must not be queried");
        }
    }

    /// Answers exactly one request with the raw `response` and returns the URL to query.
    fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{}/metrics", addr)
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            MetricSample::parse("foo 42"),
            Some(MetricSample {
                name: "foo",
                value: "42"
            })
        );
        assert_eq!(
            MetricSample::parse("  foo\t42   1700000000000"),
            Some(MetricSample {
                name: "foo",
                value: "42"
            })
        );
        assert_eq!(
            MetricSample::parse("http_requests_total{code=\"200\"} 1027"),
            Some(MetricSample {
                name: "http_requests_total{code=\"200\"}",
                value: "1027"
            })
        );
        assert_eq!(MetricSample::parse(""), None);
        assert_eq!(MetricSample::parse("lonely"), None);
    }

    #[test]
    fn test_samples_restart() {
        let body = MetricsBody::new("foo 42\n\n# TYPE foo gauge\nbar 7\n".to_owned());
        let names: Vec<_> = body.samples().map(|s| s.name).collect();
        assert_eq!(names, vec!["foo", "#", "bar"]);
        assert_eq!(body.samples().count(), 3);
    }

    #[test]
    fn test_max_exceeded_is_critical() {
        let mut config = MetricCheckConfig::new("foo");
        config.max = Some(40.0);

        let resource = check_metric(&config, &StaticSource("foo 42\nbar 7\n")).unwrap();
        assert_eq!(resource.state(), ServiceState::Critical);
        assert_eq!(
            resource.description(),
            Some("metric foo: value 42 exceeds max 40")
        );
        assert_eq!(
            resource.to_nagios_string(),
            "check-prometheus-metric CRITICAL: metric foo: value 42 exceeds max 40 | foo=42;;40"
        );
    }

    #[test]
    fn test_within_max_is_ok() {
        let mut config = MetricCheckConfig::new("bar");
        config.max = Some(40.0);

        let resource = check_metric(&config, &StaticSource("foo 42\nbar 7\n")).unwrap();
        assert_eq!(resource.state(), ServiceState::Ok);
        assert_eq!(
            resource.description(),
            Some("metric bar is within thresholds: 7")
        );
    }

    #[test]
    fn test_missing_metric_is_ok() {
        let mut config = MetricCheckConfig::new("baz");
        config.max = Some(40.0);

        let resource = check_metric(&config, &StaticSource("foo 42\nbar 7\n")).unwrap();
        assert_eq!(resource.state(), ServiceState::Ok);
        assert_eq!(resource.description(), Some("metric baz not found"));
        assert!(resource.perf_data().is_empty());
    }

    #[test]
    fn test_match_is_exact() {
        let mut config = MetricCheckConfig::new("Foo");
        config.max = Some(1.0);

        let resource = check_metric(&config, &StaticSource("foo 42\nfoo_total 42\n")).unwrap();
        assert_eq!(resource.state(), ServiceState::Ok);
    }

    #[test]
    fn test_rule_order() {
        let mut config = MetricCheckConfig::new("foo");
        config.string = Some("42".to_owned());
        config.max = Some(10.0);
        config.min = Some(50.0);
        config.value = Some(7.0);

        let rules: Vec<_> = config.rules().rules().iter().map(|r| r.name).collect();
        assert_eq!(rules, vec!["string", "max", "min", "value"]);

        // string passes, so max decides
        let verdict = config
            .rules()
            .evaluate(&MetricSample::parse("foo 42").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(verdict.rule, "max");
    }

    #[test]
    fn test_unset_rules_are_skipped() {
        let mut config = MetricCheckConfig::new("foo");
        config.max = Some(0.0);
        config.min = Some(0.0);
        config.value = Some(0.0);
        config.string = Some(String::new());
        assert!(config.rules().is_empty());

        let resource = check_metric(&config, &StaticSource("foo 42\n")).unwrap();
        assert_eq!(resource.state(), ServiceState::Ok);
    }

    #[test]
    fn test_min_string_and_value_rules() {
        let source = StaticSource("foo 42\nstatus up\n");

        let mut config = MetricCheckConfig::new("foo");
        config.min = Some(50.0);
        let resource = check_metric(&config, &source).unwrap();
        assert_eq!(resource.state(), ServiceState::Critical);
        assert_eq!(
            resource.description(),
            Some("metric foo: value 42 is below min 50")
        );

        let mut config = MetricCheckConfig::new("foo");
        config.value = Some(41.0);
        let resource = check_metric(&config, &source).unwrap();
        assert_eq!(resource.state(), ServiceState::Critical);
        assert_eq!(
            resource.description(),
            Some("metric foo: value 42 does not match value 41")
        );

        let mut config = MetricCheckConfig::new("foo");
        config.value = Some(42.0);
        let resource = check_metric(&config, &source).unwrap();
        assert_eq!(resource.state(), ServiceState::Ok);

        let mut config = MetricCheckConfig::new("status");
        config.string = Some("down".to_owned());
        let resource = check_metric(&config, &source).unwrap();
        assert_eq!(resource.state(), ServiceState::Critical);
        assert_eq!(
            resource.description(),
            Some("metric status: value \"up\" does not match string \"down\"")
        );
        assert!(resource.perf_data().is_empty());
    }

    #[test]
    fn test_first_tripping_line_decides() {
        let mut config = MetricCheckConfig::new("foo");
        config.max = Some(40.0);

        let resource = check_metric(&config, &StaticSource("foo 1\nfoo 50\nfoo 60\n")).unwrap();
        assert_eq!(
            resource.description(),
            Some("metric foo: value 50 exceeds max 40")
        );
    }

    #[test]
    fn test_non_numeric_value_is_unknown() {
        let mut config = MetricCheckConfig::new("status");
        config.max = Some(1.0);

        let err = check_metric(&config, &StaticSource("status up\n")).unwrap_err();
        assert_eq!(err.service_state(), ServiceState::Unknown);
    }

    #[test]
    fn test_empty_metric_is_rejected_before_sampling() {
        let config = MetricCheckConfig::new("");
        let err = check_metric(&config, &NeverSampled).unwrap_err();
        assert!(matches!(
            err,
            CheckError::Config(ConfigError::EmptyTarget { option: "metric" })
        ));
        assert_eq!(err.service_state(), ServiceState::Warning);
    }

    #[test]
    fn test_http_source() {
        let url = serve_once(http_response("200 OK", "foo 42\nbar 7\n"));
        let source = HttpMetricsSource::new(&url, Duration::from_secs(5)).unwrap();

        let mut config = MetricCheckConfig::new("foo");
        config.url = url;
        config.max = Some(40.0);

        let resource = check_metric(&config, &source).unwrap();
        assert_eq!(resource.state(), ServiceState::Critical);
    }

    #[test]
    fn test_http_error_status_is_transport_error() {
        let url = serve_once(http_response("500 Internal Server Error", ""));
        let source = HttpMetricsSource::new(&url, Duration::from_secs(5)).unwrap();

        let err = source.fetch().unwrap_err();
        assert!(matches!(err, CheckError::Transport { .. }));
        assert_eq!(err.service_state(), ServiceState::Unknown);
    }

    #[test]
    fn test_unreachable_endpoint_is_unknown() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let url = format!("http://{}/metrics", addr);
        let source = HttpMetricsSource::new(&url, Duration::from_secs(5)).unwrap();

        let mut config = MetricCheckConfig::new("foo");
        config.url = url;

        let err = check_metric(&config, &source).unwrap_err();
        assert!(matches!(err, CheckError::Transport { .. }));
        assert_eq!(err.service_state(), ServiceState::Unknown);
    }
}
