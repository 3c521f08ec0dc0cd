use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use threadscout::{harvest, types::*, AppState, Credentials};

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(v) = args.next() {
                if let Ok(p) = v.parse::<u16>() {
                    return Some(p);
                }
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

fn port_from_env() -> Option<u16> {
    for k in ["THREADSCOUT_PORT", "PORT"] {
        if let Ok(v) = std::env::var(k) {
            if let Ok(p) = v.trim().parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting threadscout");

    let state = Arc::new(AppState::new());
    info!(
        "Result sinks under {} — browser sessions are launched per run",
        state.results_dir.display()
    );

    // Build router
    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/harvest", post(harvest_handler))
        .route("/download", get(download_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    // Start server
    let port: u16 = parse_port_from_args().or_else(port_from_env).unwrap_or(5000);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT/THREADSCOUT_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("threadscout listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();
        let mut sigint = signal(SignalKind::interrupt()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
            _ = async {
                if let Some(ref mut s) = sigint {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "threadscout",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn harvest_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HarvestRequest>,
) -> Result<Json<HarvestResponse>, (StatusCode, Json<ErrorResponse>)> {
    if url::Url::parse(&request.post_url).is_err() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("invalid post_url: {}", request.post_url),
            }),
        ));
    }

    let _permit = state.run_limit.clone().acquire_owned().await.map_err(|_| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "service is shutting down".to_string(),
            }),
        )
    })?;

    let run_id = request
        .run_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let config = state.config_for(&request);
    let credentials = match (request.email.clone(), request.password.clone()) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        _ => None,
    };

    let cancel = CancellationToken::new();
    let report = harvest(
        &run_id,
        &request.post_url,
        &config,
        credentials.as_ref(),
        &state.results_dir,
        &cancel,
    )
    .await;

    if let Some(err) = report.error.as_deref() {
        error!(run_id = %run_id, "harvest run failed: {}", err);
    }
    state.register(report.clone()).await;

    let status = if report.identifiers_found > 0 {
        "success"
    } else {
        "no data found"
    };
    Ok(Json(HarvestResponse {
        status: status.to_string(),
        run_id: report.run_id,
        post_url: request.post_url,
        identifiers_found: report.identifiers_found,
        elapsed_seconds: report.elapsed_seconds,
        result_location: report.result_location,
        error: report.error,
        results: report.records,
    }))
}

async fn download_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let Some(report) = state.get_run(&query.run_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown run id: {}", query.run_id),
            }),
        )
            .into_response();
    };

    if report.records.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "No data to download".to_string(),
            }),
        )
            .into_response();
    }

    match query.format.as_str() {
        "csv" => match render_csv(&report.records) {
            Ok(body) => (
                [
                    (header::CONTENT_TYPE, "text/csv"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=contacts.csv",
                    ),
                ],
                body,
            )
                .into_response(),
            Err(e) => {
                error!("csv render failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "failed to render csv".to_string(),
                    }),
                )
                    .into_response()
            }
        },
        "txt" => {
            let body = report
                .records
                .iter()
                .map(|r| r.sink_line())
                .collect::<Vec<_>>()
                .join("\n");
            (
                [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=contacts.txt",
                    ),
                ],
                body,
            )
                .into_response()
        }
        other => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("unsupported format: {} (use csv or txt)", other),
            }),
        )
            .into_response(),
    }
}

fn render_csv(records: &[threadscout::ContactRecord]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Name", "Email"])?;
    for record in records {
        writer.write_record([record.name.as_str(), record.identifier.as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("csv writer: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}
