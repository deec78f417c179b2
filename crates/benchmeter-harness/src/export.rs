//! Result exporters.
//!
//! Exporter specific settings travel with each benchmark as
//! [`ExportConfigurations`]: a JSON object keyed by exporter tag. Tags are
//! resolved through [`DECODERS`]; an unknown tag is skipped with a warning so
//! that configurations written for newer exporters still load.

use crate::baseline::EnvironmentInfo;
use crate::report::SuiteReport;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Influx annotated CSV data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InfluxDataType {
    Boolean,
    /// Unsigned 64-bit integer
    UnsignedLong,
    /// Signed 64-bit integer
    Long,
    /// IEEE-754 64-bit float
    Double,
    String,
    Base64Binary,
    DateTime,
    /// Nanoseconds as an unsigned 64-bit integer
    Duration,
}

impl InfluxDataType {
    pub fn annotation(self) -> &'static str {
        match self {
            InfluxDataType::Boolean => "boolean",
            InfluxDataType::UnsignedLong => "unsignedLong",
            InfluxDataType::Long => "long",
            InfluxDataType::Double => "double",
            InfluxDataType::String => "string",
            InfluxDataType::Base64Binary => "base64Binary",
            InfluxDataType::DateTime => "dateTime",
            InfluxDataType::Duration => "duration",
        }
    }
}

/// Influx exporter settings: benchmark tags listed in `fields` are exported
/// as typed fields instead of Influx tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InfluxExportConfiguration {
    #[serde(default)]
    pub fields: BTreeMap<String, InfluxDataType>,
}

/// Settings of one exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportConfiguration {
    Influx(InfluxExportConfiguration),
}

impl ExportConfiguration {
    pub fn tag(&self) -> &'static str {
        match self {
            ExportConfiguration::Influx(_) => "influx",
        }
    }
}

type Decoder = fn(serde_json::Value) -> Result<ExportConfiguration, serde_json::Error>;

fn decode_influx(value: serde_json::Value) -> Result<ExportConfiguration, serde_json::Error> {
    serde_json::from_value(value).map(ExportConfiguration::Influx)
}

/// Exporter tag to decoder. New exporters register here.
pub const DECODERS: &[(&str, Decoder)] = &[("influx", decode_influx)];

/// Per-benchmark exporter settings, at most one per exporter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportConfigurations {
    configs: BTreeMap<&'static str, ExportConfiguration>,
}

impl ExportConfigurations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, config: ExportConfiguration) -> Self {
        self.configs.insert(config.tag(), config);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn influx(&self) -> Option<&InfluxExportConfiguration> {
        match self.configs.get("influx") {
            Some(ExportConfiguration::Influx(config)) => Some(config),
            None => None,
        }
    }

    /// Decode a tag-keyed JSON object.
    pub fn decode(
        raw: BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, serde_json::Error> {
        let mut configs = Self::new();
        for (tag, value) in raw {
            match DECODERS.iter().find(|(known, _)| *known == tag) {
                Some((_, decode)) => configs = configs.with(decode(value)?),
                None => warn!(tag = %tag, "Ignoring unknown export configuration"),
            }
        }
        Ok(configs)
    }
}

impl Serialize for ExportConfigurations {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.configs.len()))?;
        for (tag, config) in &self.configs {
            match config {
                ExportConfiguration::Influx(influx) => map.serialize_entry(tag, influx)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExportConfigurations {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Self::decode(raw).map_err(D::Error::custom)
    }
}

/// Renders a suite report as Influx annotated CSV.
///
/// One row per benchmark, metric and percentile. Machine details and
/// benchmark tags become Influx tags; tags mapped by a benchmark's
/// [`InfluxExportConfiguration`] become typed fields.
#[derive(Debug, Clone)]
pub struct InfluxExporter {
    environment: EnvironmentInfo,
    header: bool,
}

impl InfluxExporter {
    pub fn new(environment: EnvironmentInfo) -> Self {
        Self {
            environment,
            header: true,
        }
    }

    /// Omit the annotation and header rows, for appending to a file.
    pub fn without_header(mut self) -> Self {
        self.header = false;
        self
    }

    pub fn render(&self, report: &SuiteReport) -> String {
        let fields: BTreeMap<String, InfluxDataType> = report
            .benchmarks
            .iter()
            .filter_map(|b| b.export.influx())
            .flat_map(|config| config.fields.clone())
            .collect();
        let tags: BTreeSet<&str> = report
            .benchmarks
            .iter()
            .flat_map(|b| b.tags.keys().map(String::as_str))
            .filter(|tag| !fields.contains_key(*tag))
            .collect();

        let time = format_time(report.generated_at);
        let mut out = String::new();

        if self.header {
            let mut types = vec!["measurement"];
            types.extend(std::iter::repeat_n("tag", 8 + tags.len()));
            types.extend(fields.values().map(|t| t.annotation()));
            types.extend(["long", "double", "long", "long", "dateTime:RFC3339"]);
            out.push_str(&format!("#datatype {}\n", types.join(",")));

            let mut columns = vec![
                "measurement",
                "hostName",
                "os",
                "processorType",
                "processors",
                "memory",
                "test",
                "metric",
                "percentile",
            ];
            columns.extend(tags.iter().copied());
            columns.extend(fields.keys().map(String::as_str));
            columns.extend(["value", "average", "iterations", "warmup_iterations", "time"]);
            out.push_str(&columns.join(","));
            out.push('\n');
        }

        let env = &self.environment;
        let machine = [
            csv_field(&env.hostname.replace(' ', "-")),
            csv_field(&env.os),
            csv_field(&env.cpu_info.replace(' ', "-")),
            env.processors.to_string(),
            env.total_memory_mb.to_string(),
        ]
        .join(",");

        for benchmark in &report.benchmarks {
            let tag_values: Vec<String> = tags
                .iter()
                .map(|tag| csv_field(benchmark.tags.get(*tag).map_or("", String::as_str)))
                .collect();
            let field_values: Vec<String> = fields
                .keys()
                .map(|field| csv_field(benchmark.tags.get(field).map_or("", String::as_str)))
                .collect();

            for (metric, metric_report) in &benchmark.metrics {
                let average = metric_report.mean.unwrap_or(0.0);
                for (percentile, value) in metric_report.percentiles.iter() {
                    let mut row = vec![
                        csv_field(&benchmark.module),
                        machine.clone(),
                        csv_field(&benchmark.benchmark),
                        metric.name().to_string(),
                        percentile.to_string(),
                    ];
                    row.extend(tag_values.iter().cloned());
                    row.extend(field_values.iter().cloned());
                    row.push(value.to_string());
                    row.push(average.to_string());
                    row.push(benchmark.summary.total_iterations.to_string());
                    row.push(benchmark.summary.warmup_batches.to_string());
                    row.push(time.clone());
                    out.push_str(&row.join(","));
                    out.push('\n');
                }
            }
        }

        out
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Quote a CSV value when it contains a separator, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
