use std::{net::SocketAddr, sync::Arc};

use hexwatch::{
    csv_source_from_location, dashboard_config_from_env, dashboard_router, init_logging,
    log_app_bind, log_app_start, log_config_loaded, log_sources_selected, DashboardApp,
    HttpTransport, LoggingConfig, ReqwestBlockingTransport, SubgraphClient,
};

// The blocking HTTP client must be built and dropped outside the async runtime.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = LoggingConfig::from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let cfg = dashboard_config_from_env()?;
    log_config_loaded(&cfg);
    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestBlockingTransport::new(cfg.http_timeout_ms)?);
    let client = SubgraphClient::new(
        cfg.subgraph_url.clone(),
        Arc::clone(&transport),
        cfg.retry_policy(),
    );
    let csv_source = csv_source_from_location(&cfg.csv_source, transport, cfg.retry_policy());
    log_sources_selected(cfg.chain.as_str(), client.endpoint(), &csv_source.describe());

    let app = Arc::new(DashboardApp::new(
        cfg.chain,
        client,
        csv_source,
        cfg.flush_targets.clone(),
    ));
    app.prime();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(cfg.bind_addr, Arc::clone(&app)))
}

async fn serve(addr: SocketAddr, app: Arc<DashboardApp>) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, dashboard_router(app)).await?;

    Ok(())
}
