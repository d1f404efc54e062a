use anyhow::Result;
use eksboard::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let store = Arc::new(
        session_repo::SqliteSessionStore::connect(
            &app_config.session.database_path,
            &app_config.session.table_name,
            app_config.session.ttl_days,
        )
        .await?,
    );
    store.init().await?;
    let sessions: Arc<dyn session_repo::SessionStore> = store;
    let sweeper = session_worker::spawn(
        sessions.clone(),
        session_worker::SweepConfig::from(&app_config.session),
    );

    let timeout = Duration::from_secs(app_config.bedrock.request_timeout_secs);
    let cli = cluster_repo::AwsCli::from_config(&app_config.aws, timeout);
    let inventory: Arc<dyn cluster_repo::ClusterApi> = if app_config.clusters.is_empty() {
        tracing::info!(
            region = %app_config.aws.region,
            "no [[clusters]] configured, discovering via aws eks"
        );
        Arc::new(cluster_repo::EksCliClusters::new(cli.clone()))
    } else {
        tracing::info!(
            clusters = app_config.clusters.len(),
            "cluster inventory loaded from config"
        );
        Arc::new(cluster_repo::ConfiguredClusters::new(
            app_config.aws.region.clone(),
            app_config.clusters.clone(),
        ))
    };
    let clusters = Arc::new(cluster_repo::ClusterRepo::new(
        inventory,
        Arc::new(cluster_repo::KubeHttpConnector::new(
            cli,
            &app_config.clusters,
            timeout,
        )),
    ));

    let transport = Arc::new(bedrock::BedrockHttpClient::from_config(&app_config)?);
    let artifact = app_config
        .bedrock
        .trace_artifact_path
        .as_ref()
        .map(trace::TraceArtifact::new);
    let assistant = Arc::new(bedrock::Assistant::new(
        transport,
        bedrock::AssistantDefaults::from_config(&app_config),
        artifact,
    ));

    let app = routes::app(clusters, assistant, sessions, app_config.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let in_container = std::path::Path::new("/.dockerenv").exists()
        || std::env::var("CONTAINER").as_deref() == Ok("1");

    if in_container {
        // In Docker: run server until error or SIGTERM (no signal handler; avoids immediate exit)
        axum::serve(listener, app).await?;
    } else {
        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = async {
                #[cfg(unix)]
                {
                    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(_) => {
                            let _ = tokio::signal::ctrl_c().await;
                            return;
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = tokio::signal::ctrl_c().await;
                }
            } => {
                tracing::info!("Received shutdown signal");
                sweeper.abort();
            }
        }
    }

    Ok(())
}
