//! REST API for knnclass.
//!
//! Wraps one [`SessionController`] behind a mutex so frames and commands are
//! applied strictly one after another. Every response carries the events the
//! request produced.
//!
//! ## Endpoints
//!
//! - `POST /frame` - Feed one embedding (trains if a label is active, then classifies)
//! - `POST /train` - Start training a label
//! - `POST /stop` - Stop training
//! - `POST /clear` - Forget a label
//! - `POST /save` - Write the model to `<models_dir>/<name>`
//! - `POST /load` - Read the model from `<models_dir>/<name>`
//! - `GET /status` - Labels, counts, confidences and top choice
//!
//! ## Usage
//!
//! ```rust,no_run
//! use actix_web::{App, HttpServer};
//! use knnclass::ClassifierConfig;
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = ClassifierConfig::default();
//!     let state = knnclass::server::app_state(&config);
//!     HttpServer::new(move || App::new().app_data(state.clone()).configure(knnclass::server::config))
//!         .bind(config.listen_addr())?
//!         .run()
//!         .await
//! }
//! ```

use actix_web::{web, HttpResponse, Responder};
use serde::{Serialize, Deserialize};
use crate::{ClassifierConfig, ClassifierError, ModelPayload, SessionController, SessionEvent};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::error;

/// Shared state of the HTTP driver.
pub struct AppState {
    session: Mutex<SessionController>,
    models_dir: PathBuf,
}

/// Builds a ready session from `config`.
pub fn app_state(config: &ClassifierConfig) -> web::Data<AppState> {
    let mut session = SessionController::new(config);
    let mut events: Vec<SessionEvent> = Vec::new();
    session.mark_ready(config.dimension, &mut events);

    web::Data::new(AppState {
        session: Mutex::new(session),
        models_dir: config.models_dir.clone(),
    })
}

// --- Request structs ---

#[derive(Deserialize)]
struct FrameRequest {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct LabelRequest {
    label: String,
}

#[derive(Deserialize)]
struct ModelRequest {
    name: String,
}

// --- Response structs ---

#[derive(Serialize)]
struct EventsResponse {
    events: Vec<SessionEvent>,
}

#[derive(Serialize)]
struct ErrorResponse {
    code: String,
    error: String,
}

impl ErrorResponse {
    fn from_error(err: &ClassifierError) -> ErrorResponse {
        ErrorResponse { code: err.code().to_string(), error: err.to_string() }
    }
}

fn lock(state: &AppState) -> Result<MutexGuard<'_, SessionController>, HttpResponse> {
    state.session.lock().map_err(|_| {
        error!("session lock poisoned");
        HttpResponse::InternalServerError().json(ErrorResponse {
            code: "internal".to_string(),
            error: "session unavailable".to_string(),
        })
    })
}

/// Resolves a model name inside the models directory; only plain file names
/// are accepted.
fn model_path(dir: &Path, name: &str) -> Result<PathBuf, ClassifierError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) => Ok(dir.join(file)),
        _ => Err(ClassifierError::Io(format!("invalid model name '{}'", name))),
    }
}

/// Commands that fail still answer 200: the failure is one of the events.
fn events_response(events: Vec<SessionEvent>) -> HttpResponse {
    HttpResponse::Ok().json(EventsResponse { events })
}

// --- Handlers ---

async fn frame_handler(state: web::Data<AppState>, body: web::Json<FrameRequest>) -> impl Responder {
    let mut session = match lock(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let mut events = Vec::new();
    session.on_frame(&body.embedding, &mut events);
    events_response(events)
}

async fn train_handler(state: web::Data<AppState>, body: web::Json<LabelRequest>) -> impl Responder {
    let mut session = match lock(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let mut events = Vec::new();
    // failures are already reported as events
    let _ = session.train(&body.label, &mut events);
    events_response(events)
}

async fn stop_handler(state: web::Data<AppState>) -> impl Responder {
    let mut session = match lock(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    session.stop_training();
    events_response(Vec::new())
}

async fn clear_handler(state: web::Data<AppState>, body: web::Json<LabelRequest>) -> impl Responder {
    let mut session = match lock(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let mut events = Vec::new();
    let _ = session.clear(&body.label, &mut events);
    events_response(events)
}

async fn save_handler(state: web::Data<AppState>, body: web::Json<ModelRequest>) -> impl Responder {
    let path = match model_path(&state.models_dir, &body.name) {
        Ok(p) => p,
        Err(e) => return HttpResponse::BadRequest().json(ErrorResponse::from_error(&e)),
    };

    let (payload, events) = {
        let session = match lock(&state) {
            Ok(s) => s,
            Err(resp) => return resp,
        };
        let mut events = Vec::new();
        match session.save_model(&body.name, &mut events) {
            Ok(payload) => (payload, events),
            Err(_) => return events_response(events),
        }
    };

    let written = std::fs::create_dir_all(&state.models_dir)
        .map_err(ClassifierError::from)
        .and_then(|_| payload.save(&path));
    if let Err(e) = written {
        error!(error = %e, path = %path.display(), "cannot write model");
        return HttpResponse::InternalServerError().json(ErrorResponse::from_error(&e));
    }

    events_response(events)
}

async fn load_handler(state: web::Data<AppState>, body: web::Json<ModelRequest>) -> impl Responder {
    let payload = match model_path(&state.models_dir, &body.name).and_then(ModelPayload::load) {
        Ok(p) => p,
        Err(e) => {
            return events_response(vec![SessionEvent::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            }]);
        }
    };

    let mut session = match lock(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let mut events = Vec::new();
    let _ = session.load_model(&body.name, &payload, &mut events);
    events_response(events)
}

async fn status_handler(state: web::Data<AppState>) -> impl Responder {
    let session = match lock(&state) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    HttpResponse::Ok().json(session.status())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/frame").route(web::post().to(frame_handler)))
       .service(web::resource("/train").route(web::post().to(train_handler)))
       .service(web::resource("/stop").route(web::post().to(stop_handler)))
       .service(web::resource("/clear").route(web::post().to(clear_handler)))
       .service(web::resource("/save").route(web::post().to(save_handler)))
       .service(web::resource("/load").route(web::post().to(load_handler)))
       .service(web::resource("/status").route(web::get().to(status_handler)));
}
