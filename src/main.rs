//! response-bridge server.
//!
//! ```text
//!   config (TOML + CLI overrides)
//!       → logging, runtime (request workers), pid file
//!       → task pool (task workers)
//!       → HttpServer → EventBridge → DemoApp
//! ```
//!
//! `DemoApp` is a small dispatcher showing the response API; real deployments
//! supply their own [`Dispatcher`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use clap::Parser;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use response_bridge::config::{load_config, validate_config, BridgeConfig, ConfigError};
use response_bridge::http::{Cookie, Dispatcher, HttpServer, RequestView, ResponseState};
use response_bridge::lifecycle::{build_runtime, LoggingHooks, PidFile, ServerHooks, Shutdown};
use response_bridge::observability::{logging, metrics};
use response_bridge::tasks::{TaskPool, TaskSender};

#[derive(Parser)]
#[command(name = "response-bridge")]
#[command(about = "Serve a dispatcher through the request/response bridge", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.host`.
    #[arg(long)]
    host: Option<String>,

    /// Override `server.port`.
    #[arg(short, long)]
    port: Option<u16>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init_logging(&config.observability, &config.files)?;
    tracing::info!("response-bridge v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.server.bind_address(),
        worker_num = config.server.worker_num,
        task_worker_num = config.server.task_worker_num,
        "Configuration loaded"
    );

    let hooks: Arc<dyn ServerHooks> = Arc::new(LoggingHooks);
    let runtime = build_runtime(&config.server, hooks.clone())?;
    let task_pool = runtime.block_on(serve(config, hooks))?;
    // Dropping the runtime releases the last task senders; workers drain and stop.
    drop(runtime);
    task_pool.join();

    tracing::info!("Shutdown complete");
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<BridgeConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

async fn serve(config: BridgeConfig, hooks: Arc<dyn ServerHooks>) -> Result<TaskPool, Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        // Validated at load time.
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let _pid_file = match &config.files.pid_file {
        Some(path) => Some(PidFile::create(path)?),
        None => None,
    };

    let (task_pool, tasks) = TaskPool::start(&config.server, hooks.clone())?;

    let listener = TcpListener::bind(config.server.bind_address()).await?;
    let shutdown = Shutdown::new();
    tokio::spawn(shutdown.clone().trigger_on_ctrl_c());

    let server = HttpServer::new(config, Arc::new(DemoApp { tasks }), hooks);
    server.run(listener, shutdown.subscribe()).await?;
    Ok(task_pool)
}

/// Example application.
struct DemoApp {
    tasks: TaskSender,
}

impl DemoApp {
    fn handle(&self, req: &RequestView, res: &mut ResponseState) -> Result<(), response_bridge::http::ResponseError> {
        match req.path() {
            "/" => {
                res.set_header("Content-Type", "text/plain;charset=utf-8")?;
                res.write("Hello from response-bridge\n")?;
            }
            "/json" => {
                let query: serde_json::Map<String, Value> = req
                    .query_params()
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                res.write_json(
                    StatusCode::OK,
                    json!({ "path": req.path(), "query": query }),
                    "ok",
                )?;
            }
            "/login" => {
                let user = req.param("user").unwrap_or("guest");
                res.set_cookie(&Cookie::new("sid", user).path("/").http_only(true))?;
                res.redirect("/admin")?;
            }
            "/admin" => {
                if req.cookie("sid").is_none() {
                    res.redirect("/login")?;
                    res.end();
                    return Ok(());
                }
                res.write("Welcome back\n")?;
            }
            "/task" => match self.tasks.dispatch(json!({ "path": req.path(), "query": req.query_string() })) {
                Ok(id) => res.write_json(StatusCode::ACCEPTED, json!({ "task_id": id.0 }), Value::Null)?,
                Err(e) => res.write_json(StatusCode::SERVICE_UNAVAILABLE, Value::Null, e.to_string())?,
            },
            _ => res.write_json(StatusCode::NOT_FOUND, Value::Null, "not found")?,
        }
        Ok(())
    }
}

impl Dispatcher for DemoApp {
    fn dispatch<'a>(&'a self, req: &'a RequestView, res: &'a mut ResponseState) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Err(e) = self.handle(req, res) {
                tracing::warn!(path = %req.path(), error = %e, "Dispatcher write rejected");
            }
        })
    }
}
