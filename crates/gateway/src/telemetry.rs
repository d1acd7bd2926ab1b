//! Tracing setup.
//!
//! Default: JSON logs to stdout with env-filter. Set `OTEL_EXPORTER=otlp`
//! to also ship spans to an OTLP collector (endpoint from the standard
//! `OTEL_EXPORTER_OTLP_ENDPOINT` variable).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "voco-engine";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,voco_gateway=debug"));

    let otlp_requested = std::env::var("OTEL_EXPORTER")
        .map(|v| v.eq_ignore_ascii_case("otlp"))
        .unwrap_or(false);

    if otlp_requested {
        match opentelemetry_otlp::SpanExporter::builder().with_tonic().build() {
            Ok(exporter) => {
                let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                    .with_batch_exporter(exporter)
                    .with_resource(
                        opentelemetry_sdk::Resource::builder()
                            .with_service_name(SERVICE_NAME)
                            .build(),
                    )
                    .build();
                use opentelemetry::trace::TracerProvider as _;
                let tracer = provider.tracer(SERVICE_NAME);
                opentelemetry::global::set_tracer_provider(provider);

                tracing_subscriber::registry()
                    .with(filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .with(tracing_opentelemetry::layer().with_tracer(tracer))
                    .init();
                tracing::info!("OTLP span export enabled");
                return;
            }
            Err(e) => {
                eprintln!("OTLP exporter init failed ({e}); falling back to log-only tracing");
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();
}
