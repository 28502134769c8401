use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    serve, Form, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::Serialize;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::constants::SESSION_COOKIE;
use crate::profile::{self, Bounds};
use crate::submission::{Outcome, SubmissionPipeline};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    pipeline: Arc<SubmissionPipeline>,
}

impl AppState {
    pub fn new(templates_dir: impl Into<PathBuf>, pipeline: SubmissionPipeline) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir.into())),
            pipeline: Arc::new(pipeline),
        }
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        // Watch the templates directory for changes
        notifier.watch_path(templates_dir.as_path(), true);
        Ok(env)
    })
}

/// Widget bounds and option labels the form is drawn from.
#[derive(Serialize)]
struct FormSpec {
    age: Bounds,
    annual_income: Bounds,
    monthly_expenses: Bounds,
    savings: Bounds,
    investments: Bounds,
    current_debts: Bounds,
    employment_statuses: Vec<&'static str>,
    risk_tolerances: Vec<&'static str>,
    investment_goals: Vec<&'static str>,
    investment_horizons: Vec<&'static str>,
    investment_types: Vec<&'static str>,
    countries: Vec<&'static str>,
}

impl FormSpec {
    fn new() -> Self {
        Self {
            age: profile::AGE,
            annual_income: profile::ANNUAL_INCOME,
            monthly_expenses: profile::MONTHLY_EXPENSES,
            savings: profile::SAVINGS,
            investments: profile::INVESTMENTS,
            current_debts: profile::CURRENT_DEBTS,
            employment_statuses: profile::EmploymentStatus::labels(),
            risk_tolerances: profile::RiskTolerance::labels(),
            investment_goals: profile::InvestmentGoal::labels(),
            investment_horizons: profile::InvestmentHorizon::labels(),
            investment_types: profile::InvestmentType::labels(),
            countries: profile::Country::labels(),
        }
    }
}

/// The right-hand result panel.
#[derive(Serialize, Default)]
struct ResultView {
    kind: &'static str,
    message: Option<String>,
    profile_json: Option<String>,
    advice: Option<String>,
    status: Option<u16>,
    body: Option<String>,
}

impl From<&Outcome> for ResultView {
    fn from(outcome: &Outcome) -> Self {
        let profile_json = outcome
            .profile()
            .and_then(|profile| serde_json::to_string_pretty(profile).ok());
        match outcome {
            Outcome::ChallengeFailed(failure) => ResultView {
                kind: "challenge_failed",
                message: Some(failure.to_string()),
                ..Default::default()
            },
            Outcome::InvalidForm(e) => ResultView {
                kind: "invalid_form",
                message: Some(e.to_string()),
                ..Default::default()
            },
            Outcome::Advice { advice, .. } => ResultView {
                kind: "advice",
                profile_json,
                advice: Some(advice.clone()),
                ..Default::default()
            },
            Outcome::UpstreamError { status, body, .. } => ResultView {
                kind: "upstream_error",
                profile_json,
                status: Some(*status),
                body: Some(body.clone()),
                ..Default::default()
            },
            Outcome::RequestFailed { message, .. } => ResultView {
                kind: "request_failed",
                profile_json,
                message: Some(message.clone()),
                ..Default::default()
            },
        }
    }
}

/// Session id from the request cookie, and whether it was just minted.
fn session_id(headers: &HeaderMap) -> (Uuid, bool) {
    let existing = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok());
    match existing {
        Some(id) => (id, false),
        None => (Uuid::new_v4(), true),
    }
}

fn with_session_cookie(mut response: Response, session: Uuid, is_new: bool) -> Response {
    if is_new {
        let cookie = format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(SET_COOKIE, value);
        }
    }
    response
}

fn render_page(state: &AppState, session: Uuid, result: Option<ResultView>) -> Response {
    let widget = state.pipeline.verifier().widget(session);
    // Acquire env, get template, and render within the same block
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                tmpl.render(minijinja::context! {
                    title => "AI-Powered Virtual Financial Assistant",
                    form => FormSpec::new(),
                    challenge => widget,
                    result => result,
                })
            })
        })
        .map(|html| Html(html).into_response())
        .unwrap_or_else(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
                .into_response()
        })
}

async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session, is_new) = session_id(&headers);
    with_session_cookie(render_page(&state, session, None), session, is_new)
}

async fn submit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let (session, is_new) = session_id(&headers);
    info!(%session, "Profile form submitted");
    let outcome = state.pipeline.submit(session, &fields).await;
    let view = ResultView::from(&outcome);
    with_session_cookie(render_page(&state, session, Some(view)), session, is_new)
}

async fn captcha_image_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session, is_new) = session_id(&headers);
    if is_new {
        // Only the form page issues challenges.
        return StatusCode::NOT_FOUND.into_response();
    }
    match state.pipeline.verifier().image_png(session) {
        Some(png) => (
            [(CONTENT_TYPE, "image/png"), (CACHE_CONTROL, "no-store")],
            png,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn captcha_refresh_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session, is_new) = session_id(&headers);
    state.pipeline.verifier().refresh(session);
    with_session_cookie(Redirect::to("/").into_response(), session, is_new)
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Builds the application router.
pub fn build_router(state: AppState, static_dir: impl Into<PathBuf>) -> Router {
    // Serve static files from the configured directory
    let static_files_service = ServeDir::new(static_dir.into()).not_found_service(tower::service_fn(|_| async {
        Ok::<_, std::convert::Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
    }));

    Router::new()
        .route("/", get(index_handler))
        .route("/submit", post(submit_handler))
        .route("/captcha/image.png", get(captcha_image_handler))
        .route("/captcha/refresh", post(captcha_refresh_handler))
        .route("/health", get(health_handler))
        // Route for static files must be nested under a path like /static
        // or it will conflict with other routes.
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(host: [u8; 4], port: u16, router: Router) -> Result<()> {
    let addr = SocketAddr::from((host, port));
    info!("Web server listening on http://{}", addr);

    // Bind using tokio::net::TcpListener
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, router.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, initiating shutdown...");
            }
        })
        .await
        .context("Web server failed")?;

    Ok(())
}
