use anyhow::{anyhow, Context, Result};
use method_metrics::{
    CallSite, ExecutionRecorder, MetricDescriptor, MetricsSettings, PrometheusBackend,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal demo error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let settings = match std::env::var("METHOD_METRICS_CONFIG") {
        Ok(path) => MetricsSettings::load_with_file(&path)
            .with_context(|| format!("load settings from {path}"))?,
        Err(_) => MetricsSettings::load().context("load settings from environment")?,
    };
    info!(
        enabled = settings.enabled,
        prefix = %settings.prefix,
        histogram = settings.histogram,
        percentiles = ?settings.percentiles,
        "method metrics settings"
    );

    let backend = Arc::new(PrometheusBackend::new());
    let recorder = Arc::new(ExecutionRecorder::with_backend(backend.clone(), settings));

    let app = App { recorder, backend };
    app.run().await
}

struct InvoiceService;
struct ReportRenderer;

struct App {
    recorder: Arc<ExecutionRecorder>,
    backend: Arc<PrometheusBackend>,
}

impl App {
    async fn run(self) -> Result<()> {
        // Async path: invoices created on the runtime
        let recorder = self.recorder.clone();
        let invoice_task = tokio::spawn(async move {
            let descriptor = MetricDescriptor::new()
                .with_description("Creates an invoice")
                .with_extra_tags(&["service=billing", "env=demo"])
                .with_parameter_types(&["u64"]);
            let mut n: u64 = 0;
            loop {
                n += 1;
                let site = CallSite::new("create").owned_by::<InvoiceService>();
                let delay = Duration::from_millis(5 + n % 20);
                recorder
                    .time_async(&site, &descriptor, tokio::time::sleep(delay))
                    .await;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });

        // Blocking path: a renderer that fails every fifth call
        let stop = Arc::new(AtomicBool::new(false));
        let recorder = self.recorder.clone();
        let render_stop = stop.clone();
        let render_task = tokio::task::spawn_blocking(move || {
            let descriptor = MetricDescriptor::new().with_tag("service", "reports");
            let mut n: u64 = 0;
            while !render_stop.load(Ordering::Relaxed) {
                n += 1;
                let site = CallSite::new("render")
                    .declared_in("Renderer")
                    .owned_by::<ReportRenderer>()
                    .named("reports.render");
                let result: Result<(), String> = recorder.time(&site, &descriptor, || {
                    std::thread::sleep(Duration::from_millis(10 + n % 7));
                    if n % 5 == 0 {
                        Err(format!("render {n} failed"))
                    } else {
                        Ok(())
                    }
                });
                if let Err(err) = result {
                    debug!(error = %err, "render failed");
                }
                std::thread::sleep(Duration::from_millis(80));
            }
        });

        info!("method metrics demo running; Ctrl-C to stop");

        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for snapshot in self.recorder.snapshot_all() {
                        info!(
                            key = %snapshot.key,
                            calls = snapshot.calls,
                            avg_ms = snapshot.average_time_nanos / 1e6,
                            max_ms = snapshot.max_time_nanos as f64 / 1e6,
                            "method telemetry"
                        );
                    }
                }
                res = tokio::signal::ctrl_c() => {
                    if let Err(err) = res {
                        warn!(error = %err, "ctrl_c listener error");
                    }
                    info!("Shutdown signal received, exiting");
                    break;
                }
            }
        }

        invoice_task.abort();
        stop.store(true, Ordering::Relaxed);
        if let Err(err) = render_task.await {
            warn!(error = %err, "render worker did not stop cleanly");
        }

        let snapshots = serde_json::to_string_pretty(&self.recorder.snapshot_all())
            .context("serialize snapshots")?;
        println!("{snapshots}");

        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.backend.registry().gather(), &mut buf)
            .context("encode prometheus exposition")?;
        println!("{}", String::from_utf8(buf).context("exposition is not utf-8")?);
        Ok(())
    }
}

fn init_tracing() -> Result<()> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
