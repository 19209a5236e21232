//! Prometheus `query_range` response decoding

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::models::{Sample, Series};

/// Top-level `query_range` envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRangeResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<QueryRangeData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRangeData {
    #[serde(default)]
    pub result_type: String,
    pub result: Vec<RangeSeries>,
}

/// One labelled series of `[timestamp, "value"]` pairs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeSeries {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    pub values: Vec<(f64, String)>,
}

impl QueryRangeResponse {
    /// Decode a response body
    pub fn from_slice(body: &[u8]) -> Result<Self, FetchError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Check the status and convert the first result series
    ///
    /// Timestamps are truncated to whole seconds. `NaN` and `±Inf` samples
    /// are dropped because they cannot be scored.
    pub fn into_series(self) -> Result<Series, FetchError> {
        if self.status != "success" {
            return Err(FetchError::BackendStatus {
                status: self.status,
                error_type: self.error_type.unwrap_or_default(),
                error: self.error.unwrap_or_default(),
            });
        }

        for warning in &self.warnings {
            warn!(warning = %warning, "Monitoring backend returned a warning");
        }

        let data = self
            .data
            .ok_or_else(|| FetchError::MalformedPayload("missing 'data' field".to_string()))?;

        let series_count = data.result.len();
        let Some(first) = data.result.into_iter().next() else {
            return Ok(Series::empty());
        };

        if series_count > 1 {
            warn!(
                series_count = series_count,
                metric = ?first.metric,
                "Query returned several series, using the first one"
            );
        }

        let mut samples = Vec::with_capacity(first.values.len());
        let mut dropped = 0usize;
        for (ts, raw) in first.values {
            if !ts.is_finite() {
                return Err(FetchError::MalformedPayload(format!(
                    "invalid timestamp {}",
                    ts
                )));
            }
            let value: f64 = raw.trim().parse().map_err(|_| {
                FetchError::MalformedPayload(format!("invalid sample value '{}' at {}", raw, ts))
            })?;
            if !value.is_finite() {
                dropped += 1;
                continue;
            }
            samples.push(Sample::new(ts.trunc() as i64, value));
        }

        if dropped > 0 {
            debug!(dropped = dropped, "Dropped non-finite samples");
        }

        Ok(Series::new(samples)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &str) -> Result<Series, FetchError> {
        QueryRangeResponse::from_slice(body.as_bytes())?.into_series()
    }

    #[test]
    fn test_decode_first_series() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [
                    {"metric": {"job": "a"}, "values": [[1700000000, "1.5"], [1700000060.9, "2"]]},
                    {"metric": {"job": "b"}, "values": [[1700000000, "99"]]}
                ]
            }
        }"#;

        let series = decode(body).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.samples()[0], Sample::new(1_700_000_000, 1.5));
        assert_eq!(series.samples()[1], Sample::new(1_700_000_060, 2.0));
    }

    #[test]
    fn test_decode_empty_result() {
        let body = r#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#;
        let series = decode(body).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn test_decode_error_status() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"parse error at char 4"}"#;
        match decode(body) {
            Err(FetchError::BackendStatus {
                status,
                error_type,
                error,
            }) => {
                assert_eq!(status, "error");
                assert_eq!(error_type, "bad_data");
                assert_eq!(error, "parse error at char 4");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_decode_drops_non_finite() {
        let body = r#"{"status":"success","data":{"resultType":"matrix","result":[
            {"metric":{},"values":[[0,"1"],[60,"NaN"],[120,"+Inf"],[180,"-Inf"],[240,"2"]]}
        ]}}"#;
        let series = decode(body).unwrap();
        let timestamps: Vec<i64> = series.timestamps().collect();
        assert_eq!(timestamps, vec![0, 240]);
    }

    #[test]
    fn test_decode_rejects_bad_value() {
        let body = r#"{"status":"success","data":{"resultType":"matrix","result":[
            {"metric":{},"values":[[0,"abc"]]}
        ]}}"#;
        assert!(matches!(decode(body), Err(FetchError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_rejects_vector_result() {
        // Instant vectors carry "value", not "values"
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[
            {"metric":{},"value":[0,"1"]}
        ]}}"#;
        assert!(matches!(decode(body), Err(FetchError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_rejects_unordered() {
        let body = r#"{"status":"success","data":{"resultType":"matrix","result":[
            {"metric":{},"values":[[120,"1"],[60,"1"]]}
        ]}}"#;
        assert!(matches!(decode(body), Err(FetchError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_missing_data() {
        assert!(matches!(
            decode(r#"{"status":"success"}"#),
            Err(FetchError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode("not json"),
            Err(FetchError::MalformedPayload(_))
        ));
    }
}
