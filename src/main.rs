//! obscore demo
//!
//! Drives a sample workload through the observability core and prints the
//! resulting reporting snapshots as one JSON document.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │   Workload   │───▶│   Metrics /  │───▶│   Snapshot   │
//! │  (traced)    │    │  Span store  │    │   (stdout)   │
//! └──────────────┘    └──────────────┘    └──────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use obscore::health::{self, HealthCheck};
use obscore::metrics::{self, ServiceMetrics};
use obscore::trace::{self, Span};
use obscore::ObservabilityConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// obscore - in-process metrics, tracing and health checks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service name used for the sample workload
    #[arg(long, env = "OBSCORE_SERVICE", default_value = "demo")]
    service: String,

    /// Number of traced iterations to run
    #[arg(long, env = "OBSCORE_ITERATIONS", default_value = "25")]
    iterations: usize,

    /// Optional YAML file with retention overrides
    #[arg(long, env = "OBSCORE_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = match &args.config {
        Some(path) => ObservabilityConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => ObservabilityConfig::default(),
    };

    trace::init_store(&config);
    metrics::global().register(Arc::new(ServiceMetrics::with_config(
        args.service.as_str(),
        config.clone(),
    )));

    info!("Starting obscore demo");
    info!("  Service: {}", args.service);
    info!("  Iterations: {}", args.iterations);
    info!("  Span store capacity: {}", trace::store().capacity());
    info!("  Histogram trim: {} -> {}", config.histogram_max_samples, config.histogram_retain_samples);

    register_probes();
    run_workload(&args.service, args.iterations);

    let snapshot = json!({
        "metrics": metrics::global().get_all_stats(),
        "health": health::registry().check_all().to_report(),
        "recent_spans": trace::store().recent(),
    });
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // logs go to stderr so stdout carries only the snapshot
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

// =============================================================================
// Sample Workload
// =============================================================================

fn register_probes() {
    health::registry()
        .register("span-store", || {
            let store = trace::store();
            let span_capacity = store.capacity();
            let used = store.len();
            let check = if used * 10 >= span_capacity * 9 {
                HealthCheck::degraded("span-store", "span store nearly full")
            } else {
                HealthCheck::healthy("span-store")
            };
            Ok(check
                .with_detail("spans", used)
                .with_detail("capacity", span_capacity))
        })
        .register("metrics", || {
            let services = metrics::global().service_names().len();
            Ok(HealthCheck::healthy("metrics").with_detail("services", services))
        });
}

fn run_workload(service: &str, iterations: usize) {
    let service_metrics = metrics::get_service(service);

    for i in 0..iterations {
        let result: Result<(), String> = trace::in_span(service, "Workload.iteration", |span| {
            span.set_attribute("iteration", i);
            let _timer = service_metrics.timer("iteration");

            let child = Span::start(service, "Workload.step");
            std::thread::sleep(Duration::from_millis(1));
            drop(child);

            service_metrics.increment("iterations");
            service_metrics.gauge("last_iteration", i as f64);
            if i % 10 == 9 {
                return Err(format!("iteration {} rejected", i));
            }
            Ok(())
        });

        if result.is_err() {
            service_metrics.increment_by("errors", 1.0, &[("stage", "iteration")]);
        }
    }
}
