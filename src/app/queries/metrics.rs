//! Metric retrieval from the Prometheus range query API.

use crate::core::poller::{Poller, QueryVariant};
use crate::domain::model::{MetricSeries, QueryOutcome, Sample};
use crate::utils::error::{Result, StackError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

pub const QUERY_STEP: &str = "10s";

#[derive(Debug, Deserialize)]
pub struct PrometheusResponse {
    #[serde(default)]
    pub status: String,
    pub data: PrometheusData,
}

#[derive(Debug, Deserialize)]
pub struct PrometheusData {
    #[serde(rename = "resultType", default)]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<PrometheusSeries>,
}

#[derive(Debug, Deserialize)]
pub struct PrometheusSeries {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    /// `[unix seconds, "value"]` pairs.
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

/// `GET /api/v1/query_range` over a window that grows with every attempt.
#[derive(Debug, Clone)]
pub struct MetricQuery {
    pub base_url: String,
    pub metric: String,
    pub service: String,
    pub lookback: Duration,
}

impl MetricQuery {
    /// PromQL selector for the metric emitted by the service.
    pub fn selector(&self) -> String {
        format!(
            "{}{{service_name=\"{}\"}}",
            self.metric,
            escape_label_value(&self.service)
        )
    }

    /// Window `[now - lookback - elapsed, now]`.
    pub fn window(
        &self,
        now: DateTime<Utc>,
        elapsed: Duration,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let span = chrono::Duration::from_std(self.lookback + elapsed).map_err(|e| {
            StackError::InvalidConfigValueError {
                field: "lookback".to_string(),
                value: format!("{:?}", self.lookback),
                reason: e.to_string(),
            }
        })?;
        Ok((now - span, now))
    }

    fn endpoint_at(&self, now: DateTime<Utc>, elapsed: Duration) -> Result<String> {
        let (start, end) = self.window(now, elapsed)?;
        let mut url = Url::parse(&self.base_url)
            .and_then(|base| base.join("/api/v1/query_range"))
            .map_err(|e| StackError::InvalidConfigValueError {
                field: "base_url".to_string(),
                value: self.base_url.clone(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut()
            .append_pair("query", &self.selector())
            .append_pair("start", &start.to_rfc3339_opts(SecondsFormat::Millis, true))
            .append_pair("end", &end.to_rfc3339_opts(SecondsFormat::Millis, true))
            .append_pair("step", QUERY_STEP);
        Ok(url.to_string())
    }
}

impl QueryVariant for MetricQuery {
    type Response = PrometheusResponse;
    type Output = Vec<MetricSeries>;

    fn endpoint(&self, elapsed: Duration) -> Result<String> {
        self.endpoint_at(Utc::now(), elapsed)
    }

    fn normalize(&self, response: Self::Response) -> std::result::Result<Self::Output, String> {
        if !response.status.is_empty() && response.status != "success" {
            return Err(format!("query status {}", response.status));
        }
        response
            .data
            .result
            .into_iter()
            .map(normalize_series)
            .collect()
    }

    /// Samples in the first series, the one the selector matched.
    fn record_count(output: &Self::Output) -> usize {
        output.first().map(|s| s.samples.len()).unwrap_or(0)
    }
}

/// PromQL string literal escaping for `\` and `"`.
fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn normalize_series(series: PrometheusSeries) -> std::result::Result<MetricSeries, String> {
    let samples = series
        .values
        .into_iter()
        .map(|(ts, value)| -> std::result::Result<Sample, String> {
            let millis = (ts * 1000.0).round() as i64;
            let timestamp = DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| format!("sample timestamp {} out of range", ts))?;
            let value = value
                .parse::<f64>()
                .map_err(|e| format!("sample value {:?}: {}", value, e))?;
            Ok(Sample { timestamp, value })
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;

    let mut labels = series.metric;
    let name = labels.remove("__name__");

    Ok(MetricSeries {
        name,
        labels,
        samples,
    })
}

/// Polls the metric backend for one metric of one service.
#[derive(Debug, Clone)]
pub struct MetricClient {
    base_url: String,
    poller: Poller,
}

impl MetricClient {
    pub fn new(base_url: impl Into<String>, poller: Poller) -> Self {
        Self {
            base_url: base_url.into(),
            poller,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Wait until the first matching series holds at least `expected` samples.
    pub async fn series(
        &self,
        metric: &str,
        service: &str,
        lookback: Duration,
        expected: usize,
        max_attempts: u32,
    ) -> Result<QueryOutcome<Vec<MetricSeries>>> {
        let query = MetricQuery {
            base_url: self.base_url.clone(),
            metric: metric.to_string(),
            service: service.to_string(),
            lookback,
        };
        self.poller.poll(&query, expected, max_attempts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::poller::PollSettings;
    use crate::test_support::ScriptedTransport;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn query() -> MetricQuery {
        MetricQuery {
            base_url: "http://localhost:9090".to_string(),
            metric: "http_server_duration_count".to_string(),
            service: "checkout".to_string(),
            lookback: Duration::from_secs(60),
        }
    }

    fn params(endpoint: &str) -> HashMap<String, String> {
        Url::parse(endpoint)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_endpoint_carries_selector_window_and_step() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let endpoint = query().endpoint_at(now, Duration::ZERO).unwrap();

        assert!(endpoint.starts_with("http://localhost:9090/api/v1/query_range?"));
        let params = params(&endpoint);
        assert_eq!(params["query"], "http_server_duration_count{service_name=\"checkout\"}");
        assert_eq!(params["start"], "2025-03-01T09:59:00.000Z");
        assert_eq!(params["end"], "2025-03-01T10:00:00.000Z");
        assert_eq!(params["step"], "10s");
    }

    #[test]
    fn test_selector_escapes_quotes_and_backslashes() {
        let mut q = query();
        q.service = r#"check"out\v2"#.to_string();

        assert_eq!(
            q.selector(),
            r#"http_server_duration_count{service_name="check\"out\\v2"}"#
        );
    }

    #[tokio::test]
    async fn test_retries_keep_start_anchored_and_move_end_forward() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_fallback_json(
            200,
            serde_json::json!({"status": "success", "data": {"resultType": "matrix", "result": []}}),
        );
        let poller = Poller::new(
            transport.clone(),
            PollSettings {
                interval: Duration::from_millis(30),
            },
        );
        let client = MetricClient::new("http://localhost:9090", poller);

        let err = client
            .series("requests_total", "checkout", Duration::from_secs(60), 1, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::InsufficientResultsError { attempts: 4, .. }));

        let windows: Vec<(DateTime<Utc>, DateTime<Utc>)> = transport
            .requests()
            .iter()
            .map(|endpoint| {
                let params = params(endpoint);
                let start = DateTime::parse_from_rfc3339(&params["start"]).unwrap();
                let end = DateTime::parse_from_rfc3339(&params["end"]).unwrap();
                (start.with_timezone(&Utc), end.with_timezone(&Utc))
            })
            .collect();
        assert_eq!(windows.len(), 4);

        let first_start = windows[0].0;
        for pair in windows.windows(2) {
            assert!(pair[1].1 > pair[0].1, "window end did not advance: {:?}", pair);
        }
        for (start, _) in &windows {
            // wall clock and monotonic clock may disagree by a millisecond
            let drift = (*start - first_start).num_milliseconds().abs();
            assert!(drift <= 2, "window start moved by {}ms", drift);
        }
    }

    #[test]
    fn test_window_grows_with_elapsed_time() {
        let first = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let later = first + chrono::Duration::seconds(4);

        let (start_1, end_1) = query().window(first, Duration::ZERO).unwrap();
        let (start_2, end_2) = query().window(later, Duration::from_secs(4)).unwrap();

        assert_eq!(start_1, start_2);
        assert!(end_2 > end_1);
        assert_eq!(end_2 - start_2, chrono::Duration::seconds(64));
    }

    #[test]
    fn test_live_endpoint_end_strictly_increases() {
        let q = query();
        let first = params(&q.endpoint(Duration::ZERO).unwrap());
        std::thread::sleep(Duration::from_millis(5));
        let second = params(&q.endpoint(Duration::from_millis(5)).unwrap());

        let end_1 = DateTime::parse_from_rfc3339(&first["end"]).unwrap();
        let end_2 = DateTime::parse_from_rfc3339(&second["end"]).unwrap();
        assert!(end_2 > end_1);
    }

    #[test]
    fn test_matrix_is_normalized_and_first_series_counted() {
        let body = serde_json::json!({
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [
                    {
                        "metric": {"__name__": "http_server_duration_count", "service_name": "checkout", "job": "otel"},
                        "values": [[1740823200.5, "3"], [1740823210.5, "7"], [1740823220.5, "NaN"]]
                    },
                    {
                        "metric": {"__name__": "http_server_duration_count", "service_name": "checkout", "job": "other"},
                        "values": [[1740823200, "1"]]
                    }
                ]
            }
        });
        let response: PrometheusResponse = serde_json::from_value(body).unwrap();
        let series = query().normalize(response).unwrap();

        assert_eq!(MetricQuery::record_count(&series), 3);
        let first = &series[0];
        assert_eq!(first.name.as_deref(), Some("http_server_duration_count"));
        assert_eq!(first.labels.get("job").map(String::as_str), Some("otel"));
        assert!(!first.labels.contains_key("__name__"));
        assert_eq!(first.samples[1].value, 7.0);
        assert_eq!(first.samples[0].timestamp.timestamp_millis(), 1_740_823_200_500);
        assert!(first.samples[2].value.is_nan());
    }

    #[test]
    fn test_empty_result_counts_zero() {
        let response: PrometheusResponse = serde_json::from_value(serde_json::json!({
            "status": "success",
            "data": {"resultType": "matrix", "result": []}
        }))
        .unwrap();
        let series = query().normalize(response).unwrap();
        assert_eq!(MetricQuery::record_count(&series), 0);
    }

    #[test]
    fn test_unparseable_sample_is_a_decode_failure() {
        let response: PrometheusResponse = serde_json::from_value(serde_json::json!({
            "status": "success",
            "data": {"resultType": "matrix", "result": [{"metric": {}, "values": [[1740823200, "many"]]}]}
        }))
        .unwrap();
        assert!(query().normalize(response).is_err());
    }
}
