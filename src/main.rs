use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use shopassist::auth::TokenCodec;
use shopassist::config::{self, Config};
use shopassist::models::user::{Role, User, UserPatch};
use shopassist::pipeline::gemini::GeminiClient;
use shopassist::pipeline::ModelPipeline;
use shopassist::session::{AuthState, FileTokenStore, HttpAuthApi, SessionManager};
use shopassist::store::memory::MemoryUserStore;
use shopassist::store::postgres::PgUserStore;
use shopassist::store::UserStore;
use shopassist::{api, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "shopassist"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let fmt_layer = if std::env::var("SHOPASSIST_LOG_JSON").is_ok_and(|v| v == "1") {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "shopassist=debug,tower_http=debug".into()),
        ))
        .with(fmt_layer)
        .with(telemetry_layer)
        .init();

    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let cfg = config::load()?;
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::User { command }) => {
            let cfg = config::load()?;
            handle_user_command(&cfg, command).await
        }
        Some(cli::Commands::Client {
            server,
            token_file,
            command,
        }) => {
            let api = Arc::new(HttpAuthApi::new(&server)?);
            let tokens = Arc::new(FileTokenStore::new(token_file));
            let session = SessionManager::new(api, tokens);
            handle_client_command(&session, command).await
        }
        None => {
            let cfg = config::load()?;
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn open_store(cfg: &Config) -> anyhow::Result<Arc<dyn UserStore>> {
    match &cfg.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let db = PgUserStore::connect(url).await?;
            tracing::info!("Running migrations...");
            db.migrate().await?;
            Ok(Arc::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, accounts are kept in memory and lost on restart");
            Ok(Arc::new(MemoryUserStore::new()))
        }
    }
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let users = open_store(&cfg).await?;

    let client = GeminiClient::new(
        &cfg.generation_url,
        cfg.google_api_key.clone(),
        cfg.generation_timeout,
    )?;
    let pipeline = ModelPipeline::new(cfg.models.clone(), Arc::new(client));
    tracing::info!(models = ?pipeline.models(), "model fallback order");

    let state = Arc::new(AppState {
        users,
        tokens: TokenCodec::new(cfg.jwt_secret.as_bytes(), cfg.token_ttl),
        pipeline,
        expose_details: cfg.is_development(),
    });

    let dashboard_origin = cfg.dashboard_origin.clone();
    let app = api::router(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer({
            use axum::http::{HeaderName, Method};
            use tower_http::cors::AllowOrigin;
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                    HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true)
        })
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("ShopAssist listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Middleware: tags every response with a unique X-Request-Id for log correlation.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    // Token-bearing responses must not be cached.
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}

async fn handle_user_command(cfg: &Config, cmd: cli::UserCommands) -> anyhow::Result<()> {
    let url = cfg
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to manage users")?;
    let db = PgUserStore::connect(url).await?;

    match cmd {
        cli::UserCommands::List => {
            let users = db.list_users().await?;
            println!("{:<38} {:<20} {:<30} {:<8} CREATED", "ID", "USERNAME", "EMAIL", "ROLE");
            for u in users {
                println!(
                    "{:<38} {:<20} {:<30} {:<8} {}",
                    u.id,
                    u.username,
                    u.email,
                    u.role,
                    u.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        cli::UserCommands::SetRole { email, role } => {
            let role: Role = role.parse().map_err(anyhow::Error::msg)?;
            let record = db
                .find_by_email(&email.trim().to_lowercase())
                .await?
                .with_context(|| format!("no user with email {}", email))?;
            let patch = UserPatch {
                role: Some(role),
                ..Default::default()
            };
            db.update_user(record.id, patch).await?;
            println!("✅ {} is now {}", record.email, role);
        }
        cli::UserCommands::Delete { email } => {
            let record = db
                .find_by_email(&email.trim().to_lowercase())
                .await?
                .with_context(|| format!("no user with email {}", email))?;
            db.delete_user(record.id).await?;
            println!("🗑️  Deleted {}", record.email);
        }
    }
    Ok(())
}

fn print_user(user: &User) {
    println!("  Username: {}", user.username);
    println!("  Email:    {}", user.email);
    println!("  Role:     {}", user.role);
}

async fn handle_client_command(
    session: &SessionManager,
    cmd: cli::ClientCommands,
) -> anyhow::Result<()> {
    match cmd {
        cli::ClientCommands::Register {
            username,
            email,
            password,
            confirm,
        } => {
            let user = session
                .register_confirmed(&username, &email, &password, &confirm)
                .await?;
            println!("✅ Registered and logged in");
            print_user(&user);
        }
        cli::ClientCommands::Login { email, password } => {
            let user = session.login(&email, &password).await?;
            println!("✅ Logged in");
            print_user(&user);
        }
        cli::ClientCommands::Logout => {
            session.logout().await;
            println!("Logged out");
        }
        cli::ClientCommands::Whoami => match session.start().await {
            AuthState::Authenticated(user) => print_user(&user),
            _ => println!("Not logged in"),
        },
        cli::ClientCommands::Ask { query } => {
            let query = query.join(" ");
            if !matches!(session.start().await, AuthState::Authenticated(_)) {
                anyhow::bail!("not logged in; run `shopassist client login` first");
            }
            let answer = session.assist(&query).await?;
            println!("{}", answer);
        }
    }
    Ok(())
}
