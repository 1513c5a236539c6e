//! route-dispatcher demo server.
//!
//! Serves a small notes API over the in-memory store:
//!
//! ```text
//! GET    /notes        list notes              (response schema)
//! POST   /notes        create a note           (request schema, role "editor")
//! GET    /notes/{id}   fetch one note
//! DELETE /notes/{id}   delete one note         (role "admin")
//! ```
//!
//! Roles are only enforced when a JWT secret is configured.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use route_dispatcher::config::{load_config, load_from_env};
use route_dispatcher::lifecycle::{shutdown_signal, Shutdown};
use route_dispatcher::observability::init_tracing;
use route_dispatcher::routing::{ensure_field, ensure_resource, normalize_id};
use route_dispatcher::security::JwtVerifier;
use route_dispatcher::store::{Document, MemoryStore, ID_FIELD};
use route_dispatcher::{
    action, AppState, Application, HttpMethod, Payload, Reply, RequestContext, Resource,
    Route, RouteError, RouteHandler, Routes,
};

#[derive(Parser)]
#[command(name = "route-dispatcher")]
#[command(about = "Notes API served through the route dispatcher", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults and APP_* variables are used without one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force debug mode (error bodies carry headers, payload and trace)
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };
    if cli.debug {
        config.server.debug_mode = true;
    }

    init_tracing(config.server.log_level);
    tracing::info!(
        env = %config.server.env,
        debug_mode = config.server.debug_mode,
        "route-dispatcher v0.1.0 starting"
    );

    let store = Arc::new(MemoryStore::new(&config.store));
    let verifier = JwtVerifier::from_config(&config.auth);
    let secured = verifier.is_some();
    if !secured {
        tracing::warn!("No JWT secret configured, role checks are disabled");
    }

    let bind_address = config.server.bind_address();
    let mut state = AppState::new(config).with_resources(store);
    if let Some(verifier) = verifier {
        state = state.with_verifier(Arc::new(verifier));
    }

    let app = Application::new(&notes_routes(secured), state)?;
    let listener = TcpListener::bind(&bind_address).await?;

    let shutdown = Arc::new(Shutdown::new());
    let receiver = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.trigger();
        }
    });

    app.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn notes_routes(secured: bool) -> Routes {
    let note_request = json!({
        "type": "object",
        "required": ["title"],
        "properties": {
            "title": { "type": "string", "minLength": 1 },
            "body": { "type": "string" }
        }
    });
    let note_list = json!({
        "type": "object",
        "required": ["notes"],
        "properties": { "notes": { "type": "array" } }
    });

    let mut notes = Route::new(
        "/notes",
        RouteHandler::new()
            .get(action(list_notes))
            .post(action(create_note)),
    )
    .collection("notes")
    .cors(true)
    .request_schema(HashMap::from([(HttpMethod::Post, note_request)]))
    .response_schema(HashMap::from([(HttpMethod::Get, note_list)]));

    let mut note = Route::new(
        "/notes/{id}",
        RouteHandler::new()
            .get(action(get_note))
            .delete(action(delete_note)),
    )
    .collection("notes")
    .cors(true);

    if secured {
        notes = notes.require(HttpMethod::Post, ["editor", "admin"]);
        note = note.require(HttpMethod::Delete, ["admin"]);
    }

    Routes::new().add(notes).add(note)
}

async fn list_notes(
    ctx: RequestContext,
    _payload: Payload,
    resource: Option<Resource>,
) -> Result<Value, RouteError> {
    let notes = ensure_resource(&ctx.url, resource.as_ref())?
        .find(&Document::new())
        .await?;
    Ok(json!({ "notes": notes }))
}

async fn create_note(
    ctx: RequestContext,
    payload: Payload,
    resource: Option<Resource>,
) -> Result<Reply, RouteError> {
    let notes = ensure_resource(&ctx.url, resource.as_ref())?;
    let title = ensure_field(&ctx.url, ctx.method, "title", &payload)?.clone();

    let mut document = Document::new();
    document.insert("title".into(), title);
    document.insert(
        "body".into(),
        payload.get("body").cloned().unwrap_or_else(|| json!("")),
    );
    if let Some(identity) = &ctx.identity {
        document.insert("author".into(), json!(identity.subject));
    }

    let id = notes.insert(document).await?;
    Ok(Reply::with_status(StatusCode::CREATED, json!({ "id": id })))
}

async fn get_note(
    ctx: RequestContext,
    _payload: Payload,
    resource: Option<Resource>,
) -> Result<Value, RouteError> {
    let notes = ensure_resource(&ctx.url, resource.as_ref())?;
    let filter = id_filter(&ctx);

    match notes.find_one(&filter).await? {
        Some(note) => Ok(Value::Object(note)),
        None => Err(RouteError::action(
            StatusCode::NOT_FOUND,
            format!("No note with id [{}]", ctx.path_param("id").unwrap_or_default()),
        )),
    }
}

async fn delete_note(
    ctx: RequestContext,
    _payload: Payload,
    resource: Option<Resource>,
) -> Result<Value, RouteError> {
    let notes = ensure_resource(&ctx.url, resource.as_ref())?;
    let deleted = notes.delete(&id_filter(&ctx)).await?;
    Ok(json!({ "deleted": deleted }))
}

fn id_filter(ctx: &RequestContext) -> Document {
    let mut filter = Document::new();
    filter.insert(
        ID_FIELD.into(),
        json!(ctx.path_param("id").unwrap_or_default()),
    );
    normalize_id(&mut filter);
    filter
}
