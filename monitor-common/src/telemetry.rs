// This file is part of xrpl-nft-monitor.
// Copyright (C) 2025 xrpl-nft-monitor contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use fastrace_opentelemetry::OpenTelemetryReporter;
use log::info;
use logforth::{
    append::{FastraceEvent, Stderr},
    diagnostic::FastraceDiagnostic,
    filter::env_filter::EnvFilterBuilder,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use serde::Deserialize;
use std::{borrow::Cow, net::SocketAddr};

const SERVICE_NAME: &str = "xrpl-nft-monitor";

/// Telemetry configuration: optional tracing export and optional Prometheus
/// metrics listener.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "tracing")]
    pub tracing_config: Option<TracingConfig>,

    #[serde(rename = "metrics")]
    pub metrics_config: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    /// OTLP/gRPC endpoint, e.g. `http://localhost:4317`.
    pub otlp_exporter_endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Listen address for the Prometheus scrape endpoint.
    pub listen_address: SocketAddr,
}

/// Initialize logging with logforth: structured key-values to stderr, log
/// levels from `RUST_LOG`, correlation with fastrace spans.
pub fn init_logging() {
    logforth::starter_log::builder()
        .dispatch(|dispatch| {
            dispatch
                .filter(EnvFilterBuilder::from_default_env().build())
                .diagnostic(FastraceDiagnostic::default())
                .append(Stderr::default())
                .append(FastraceEvent::default())
        })
        .apply();
}

/// Initialize tracing: report fastrace spans over OTLP if configured,
/// otherwise spans are dropped.
pub fn init_tracing(config: Option<TracingConfig>) {
    let Some(TracingConfig {
        otlp_exporter_endpoint,
    }) = config
    else {
        return;
    };

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(otlp_exporter_endpoint.clone())
        .build()
        .expect("OTLP span exporter can be built");

    let reporter = OpenTelemetryReporter::new(
        exporter,
        Cow::Owned(
            Resource::builder()
                .with_attribute(KeyValue::new("service.name", SERVICE_NAME))
                .build(),
        ),
        InstrumentationScope::builder(SERVICE_NAME)
            .with_version(env!("CARGO_PKG_VERSION"))
            .build(),
    );

    fastrace::set_reporter(reporter, fastrace::collector::Config::default());

    info!(otlp_exporter_endpoint; "tracing initialized");
}

/// Initialize metrics: install the Prometheus recorder with an HTTP listener
/// if configured, otherwise metrics are dropped.
pub fn init_metrics(config: Option<MetricsConfig>) {
    let Some(MetricsConfig { listen_address }) = config else {
        return;
    };

    PrometheusBuilder::new()
        .with_http_listener(listen_address)
        .install()
        .expect("Prometheus recorder can be installed");

    info!(listen_address:%; "metrics initialized");
}
