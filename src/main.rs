// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::io::Write;

use clap::Parser;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_proxy_deployer::{Configuration, Deployer, KubeProxyConfigLookup};
use kube::{Api, Client};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    Layer, Registry, filter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const TARGET: &str = "gateway_proxy_deployer";

pub enum Guard {
    Appender(WorkerGuard),
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CommandArgs {
    #[arg(long)]
    with_config_file: String,
    #[arg(long)]
    gateway: String,
    #[arg(long, default_value = "default")]
    namespace: String,
}

fn init_tracing_logging(configuration: &Configuration) -> gateway_proxy_deployer::Result<Guard> {
    let registry = Registry::default();
    let controller_name = configuration.controller_name.clone();
    let file_appender = tracing_appender::rolling::never(".", "gateway-proxy-deployer.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
    let file_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_FILE_LOG").unwrap_or_else(|_| "debug".to_owned()));
    let console_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned()));
    let tracing_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_TRACE_LOG").unwrap_or_else(|_| "info".to_owned()));

    // stdout carries the generated objects
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(fmt::format().compact())
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|meta| !meta.is_span()))
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_span_events(FmtSpan::NONE)
        .with_target(true)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|meta| !meta.is_span()))
        .with_filter(file_filter);

    if let Some(true) = configuration.enable_open_telemetry {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint("http://127.0.0.1:4317")
            .with_timeout(std::time::Duration::from_secs(3))
            .build()?;
        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_id_generator(RandomIdGenerator::default())
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(
                opentelemetry_sdk::Resource::builder()
                    .with_attributes(vec![opentelemetry::KeyValue::new("service.name", controller_name.clone())])
                    .build(),
            )
            .build();

        let tracer = tracer_provider.tracer(controller_name);
        let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

        registry.with(console_layer).with(file_layer).with(telemetry.with_filter(tracing_filter)).init();
    } else {
        registry.with(console_layer).with(file_layer).init();
    }
    Ok(Guard::Appender(guard))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> gateway_proxy_deployer::Result<()> {
    let args = CommandArgs::parse();
    let configuration: Configuration = serde_yaml::from_str(&std::fs::read_to_string(args.with_config_file)?)?;
    let _guard = init_tracing_logging(&configuration)?;

    configuration.validate()?;

    let client = Client::try_default().await?;
    let gateway = Api::<Gateway>::namespaced(client.clone(), &args.namespace).get(&args.gateway).await?;
    info!(target: TARGET, "Computing proxy objects for gateway {}.{}", args.namespace, args.gateway);

    let deployer = Deployer::builder().lookup(KubeProxyConfigLookup::new(client)).build();
    let objects = deployer.compute_objects(&gateway, Some(&configuration.deployer)).await?;

    let mut stdout = std::io::stdout().lock();
    for object in &objects {
        writeln!(stdout, "---")?;
        write!(stdout, "{}", serde_yaml::to_string(object)?)?;
    }
    info!(target: TARGET, "Generated {} objects", objects.len());
    Ok(())
}
