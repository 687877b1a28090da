use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use doctor::heal::{AutoscalingHost, AwsAutoscalingClient, SystemdServiceManager};
use doctor::{
    build_collectors, imds, Autohealer, ConsoleRenderer, Dispatcher, DoctorConfig, HttpNodeClient,
    MetricStore, NodeProbe, NodeStatusProbe, SampleStreams, SAMPLE_STREAM_CAPACITY,
};

fn init_tracing(config: &DoctorConfig) -> Result<()> {
    let default_directive = if config.debug {
        "doctor=debug"
    } else {
        "doctor=info"
    };

    let env_filter = EnvFilter::from_default_env()
        .add_directive(default_directive.parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    Ok(())
}

/// Bind the autoscaling capability to this host; any failure downgrades
/// standby healing to a logging no-op without stopping startup.
async fn probe_autoscaling_capability(config: &DoctorConfig) -> Option<AutoscalingHost> {
    if !config.autoheal {
        return None;
    }

    match imds::discover_instance_id().await {
        Ok(instance_id) => {
            info!("autoheal capability bound to instance {}", instance_id);
            Some(AutoscalingHost {
                client: Arc::new(AwsAutoscalingClient::new(&config.aws_region).await),
                instance_id,
            })
        }
        Err(e) => {
            warn!(
                "healer init failed with error {}, standby healing downgraded to logging",
                e
            );
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = DoctorConfig::parse();

    init_tracing(&config)?;

    info!("starting doctor for {}", config.kava_api_address);

    config.validate()?;

    let collectors = build_collectors(&config).await?;
    info!("{} metric collectors initialized", collectors.len());

    let probe: Arc<dyn NodeStatusProbe> = Arc::new(HttpNodeClient::new(
        &config.kava_api_address,
        config.health_check_timeout(),
    )?);

    let cancel = CancellationToken::new();

    let autoscaling = probe_autoscaling_capability(&config).await;

    let healer = Autohealer::new(
        config.healer_config(),
        Arc::clone(&probe),
        Arc::new(SystemdServiceManager),
        autoscaling,
        cancel.clone(),
    );

    let streams = SampleStreams::new(SAMPLE_STREAM_CAPACITY);

    let store = MetricStore::new(
        config.max_metric_samples_to_retain_per_node,
        config.metric_samples_to_use_for_synthetic_metrics,
    );

    // the dispatcher subscribes here, before the probe starts publishing
    let dispatcher = Dispatcher::new(store, collectors, healer, streams.clone());

    if !config.interactive {
        let renderer = ConsoleRenderer::new(
            config.kava_api_address.clone(),
            streams.subscribe_display(),
        );
        tokio::spawn(renderer.run(cancel.clone()));
    }

    let node_probe = NodeProbe::new(
        Arc::clone(&probe),
        config.kava_api_address.clone(),
        config.monitoring_interval(),
        streams,
    );
    tokio::spawn(node_probe.run(cancel.clone()));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    dispatcher.run(cancel).await
}
