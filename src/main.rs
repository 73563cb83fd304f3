use clap::Parser;
use nightingale_rust::live::LiveUpdate;
use nightingale_rust::model::RangeMode;
use nightingale_rust::pipeline::{SensorPipeline, SensorView};
use nightingale_rust::settings::Settings;
use nightingale_rust::source::{CommunityClient, HttpSource, MockSource, NoiseSource};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML or YAML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sensor to open
    #[arg(short, long)]
    sensor: Option<String>,

    /// History range: alltime, week, month or day
    #[arg(short, long, default_value = "day")]
    range: RangeMode,

    /// Print every known sensor and exit
    #[arg(long, default_value_t = false)]
    list_sensors: bool,

    /// Write the effective settings to this path (.toml or .yaml) and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Serve a synthetic demo sensor instead of the backend
    #[arg(long, default_value_t = false)]
    mock: bool,

    /// Read sensor.community directly instead of the backend
    #[arg(long, default_value_t = false)]
    community: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let settings = Settings::new(args.config.clone())?;

    if let Some(path) = &args.dump_config {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => "yaml",
            _ => "toml",
        };
        std::fs::write(path, settings.dump(format)?)?;
        tracing::info!("Settings written to {:?}", path);
        return Ok(());
    }

    let source: Arc<dyn NoiseSource> = if args.mock {
        tracing::info!("Using synthetic demo source");
        Arc::new(MockSource::demo())
    } else if args.community {
        Arc::new(CommunityClient::new(&settings.api, &settings.community)?)
    } else {
        let http = HttpSource::new(&settings.api)?;
        tracing::info!("Using backend at {}", http.base_url());
        Arc::new(http)
    };
    let pipeline = SensorPipeline::new(source, &settings);

    if args.list_sensors {
        for sensor in pipeline.sensors().await? {
            println!(
                "{}\t{}\t{}\t{}\t{}",
                sensor.id,
                sensor.latitude.map(|v| v.to_string()).unwrap_or_default(),
                sensor.longitude.map(|v| v.to_string()).unwrap_or_default(),
                sensor.country.unwrap_or_default(),
                sensor.source.map(|s| s.as_str()).unwrap_or("-"),
            );
        }
        return Ok(());
    }

    let sensor_id = match (&args.sensor, args.mock) {
        (Some(id), _) => id.clone(),
        (None, true) => "demo".to_string(),
        (None, false) => return Err("no sensor given; pass --sensor ID or --list-sensors".into()),
    };

    let view = match pipeline.open(&sensor_id, args.range).await {
        Ok(view) => view,
        Err(e) => {
            tracing::warn!("Could not load {} history for sensor {}: {}", args.range.as_str(), sensor_id, e);
            SensorView::empty(&sensor_id, args.range)
        }
    };
    for point in &view.history {
        println!(
            "{}\tLAeq={:.1}\tLAmax={:.1}\tLAmin={:.1}",
            point.timestamp, point.laeq, point.lamax, point.lamin
        );
    }

    match pipeline.recent(&sensor_id, view.sensor.as_ref()).await {
        Ok(recent) => tracing::info!(
            "Latest: {} {:.1} dB(A) -> {} ({})",
            recent.point.timestamp, recent.point.laeq, recent.verdict.label(), recent.verdict.advisory()
        ),
        Err(e) => tracing::warn!("Could not fetch latest reading: {}", e),
    }

    let mut subscription = pipeline.start_live(&view);
    if !subscription.is_active() {
        tracing::info!("No live polling for sensor {}", subscription.sensor_id());
        return Ok(());
    }
    let thresholds = pipeline.thresholds();
    tracing::info!(
        "Following sensor {} ({:?}); limits {:.0}/{:.0} dB(A) day/night",
        subscription.sensor_id(),
        subscription.policy(),
        thresholds.day_limit,
        thresholds.night_limit
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            update = subscription.next() => match update {
                Some(LiveUpdate::Latest { seq, reading }) => {
                    let live = pipeline.describe(&reading, view.sensor.as_ref());
                    tracing::info!(
                        "#{} {} {:.1} dB(A) [{}{}]",
                        seq,
                        live.point.timestamp,
                        live.point.laeq,
                        live.verdict.label(),
                        if live.night { ", night" } else { "" }
                    );
                }
                Some(LiveUpdate::Sample(point)) => {
                    tracing::debug!("Chart sample t={} dba={:.1}", point.t, point.dba);
                }
                None => break,
            },
        }
    }

    subscription.stop().await;
    tracing::info!("Live window held {} samples at shutdown", subscription.window().len());
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping live polling...");
}
