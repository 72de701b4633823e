use std::fmt;
use std::io::ErrorKind;
use std::net::TcpListener;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use actix_files::NamedFile;
use actix_web::{
    HttpRequest, HttpResponse, Result as ActixResult,
    dev::Server,
    error::{ErrorInternalServerError, ErrorNotFound},
    web,
};
use anyhow::Context;
use notify::{
    RecommendedWatcher, RecursiveMode, Watcher,
    event::{EventKind, ModifyKind, RenameMode},
    recommended_watcher,
};
use tokio::fs;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Duration, sleep};

use crate::config::{DEFAULT_HOSTNAME, StartOptions};
use crate::hot_reload;

const REBUILD_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub broadcaster: broadcast::Sender<HotReloadMessage>,
    pub dev_mode: bool,
}

/// Messages pushed to connected browsers over the reload socket.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum HotReloadMessage {
    Building,
    ReloadPage,
}

/// Startup failures, split by kind so callers can pattern-match the one
/// case they know how to explain (the port being taken) without poking at
/// OS error codes.
#[derive(Debug)]
pub enum StartServerError {
    AddrInUse { port: u16 },
    Other(anyhow::Error),
}

impl fmt::Display for StartServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddrInUse { port } => write!(f, "address already in use on port {port}"),
            Self::Other(error) => write!(f, "{error:#}"),
        }
    }
}

impl std::error::Error for StartServerError {}

impl From<anyhow::Error> for StartServerError {
    fn from(error: anyhow::Error) -> Self {
        Self::Other(error)
    }
}

/// Handle returned by [`start_server`]; [`DevServer::prepare`] drives the
/// server and only resolves once it shuts down.
pub struct DevServer {
    server: Server,
    port: u16,
    _watcher: Option<RecommendedWatcher>,
}

impl DevServer {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn prepare(self) -> Result<(), StartServerError> {
        let port = self.port;
        self.server.await.map_err(|error| match error.kind() {
            ErrorKind::AddrInUse => StartServerError::AddrInUse { port },
            _ => StartServerError::Other(error.into()),
        })
    }
}

pub async fn start_server(
    options: StartOptions,
    port: u16,
    hostname: Option<String>,
) -> Result<DevServer, StartServerError> {
    let host = hostname.as_deref().unwrap_or(DEFAULT_HOSTNAME);
    let listener = bind_listener(host, port)?;
    let port = listener
        .local_addr()
        .context("failed to read the bound address")
        .map_err(StartServerError::Other)?
        .port();

    let root = canonical_root(&options.directory)?;

    let (broadcaster, _) = broadcast::channel(64);
    let state = AppState {
        root: root.clone(),
        broadcaster,
        dev_mode: options.dev_mode,
    };

    let watcher = if options.dev_mode {
        let (watcher, events) = watch_project(&state)?;
        spawn_reload_loop(state.clone(), events);
        Some(watcher)
    } else {
        None
    };

    if options.is_dev_command {
        println!("watching for file changes in {}", root.display());
    }

    let server = run(listener, state)?;

    Ok(DevServer {
        server,
        port,
        _watcher: watcher,
    })
}

fn bind_listener(host: &str, port: u16) -> Result<TcpListener, StartServerError> {
    match TcpListener::bind((host, port)) {
        Ok(listener) => Ok(listener),
        Err(error) if error.kind() == ErrorKind::AddrInUse => {
            Err(StartServerError::AddrInUse { port })
        }
        Err(error) => Err(StartServerError::Other(
            anyhow::Error::new(error).context(format!("failed to bind to {host}:{port}")),
        )),
    }
}

fn canonical_root(directory: &Path) -> Result<PathBuf, StartServerError> {
    let canonical = directory
        .canonicalize()
        .with_context(|| format!("failed to resolve project root {}", directory.display()))?;
    if !canonical.is_dir() {
        return Err(StartServerError::Other(anyhow::anyhow!(
            "project root must be a directory"
        )));
    }
    Ok(canonical)
}

fn run(listener: TcpListener, state: AppState) -> Result<Server, StartServerError> {
    let shared_state = web::Data::new(state);

    let server = actix_web::HttpServer::new(move || {
        actix_web::App::new()
            .app_data(shared_state.clone())
            .service(hot_reload::dev_scope())
            .service(web::resource("/{tail:.*}").route(web::to(serve_file)))
    })
    .listen(listener)
    .map_err(|error| StartServerError::Other(error.into()))?
    .run();

    Ok(server)
}

fn watch_project(
    state: &AppState,
) -> Result<
    (
        RecommendedWatcher,
        mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    ),
    StartServerError,
> {
    let (tx, rx) = mpsc::unbounded_channel();
    let root = state.root.clone();

    let mut watcher = recommended_watcher(move |result| {
        let _ = tx.send(result);
    })
    .context("failed to create the file watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", root.display()))?;

    Ok((watcher, rx))
}

fn spawn_reload_loop(
    state: AppState,
    mut events: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
) {
    // Collapses bursts of events (editors write several times per save)
    // into a single building/reload-page pair per debounce window.
    let rebuild_pending = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                Ok(event) => {
                    if !triggers_reload(&event.kind) {
                        continue;
                    }
                    if event.paths.iter().all(|path| is_ignored_path(path)) && !event.paths.is_empty()
                    {
                        continue;
                    }
                    if rebuild_pending.swap(true, Ordering::SeqCst) {
                        continue;
                    }

                    let _ = state.broadcaster.send(HotReloadMessage::Building);

                    let state = state.clone();
                    let rebuild_pending = Arc::clone(&rebuild_pending);
                    tokio::spawn(async move {
                        sleep(REBUILD_DEBOUNCE).await;
                        rebuild_pending.store(false, Ordering::SeqCst);
                        let _ = state.broadcaster.send(HotReloadMessage::ReloadPage);
                    });
                }
                Err(error) => {
                    eprintln!("[next dev] watcher error: {error}");
                    let _ = state.broadcaster.send(HotReloadMessage::ReloadPage);
                }
            }
        }
    });
}

fn triggers_reload(kind: &EventKind) -> bool {
    !matches!(
        kind,
        EventKind::Access(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From))
    )
}

fn is_ignored_path(path: &Path) -> bool {
    path.components().any(|component| {
        matches!(
            component,
            Component::Normal(part)
                if part == "node_modules" || part == ".git" || part == ".next" || part == "target"
        )
    })
}

async fn serve_file(
    req: HttpRequest,
    tail: web::Path<String>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let target = resolve_request_path(&state.root, tail.as_str())
        .map_err(|_| ErrorNotFound("Not Found"))?;

    let target = match fs::metadata(&target).await {
        Ok(metadata) if metadata.is_dir() => {
            let index = target.join("index.html");
            if fs::metadata(&index).await.is_err() {
                return Err(ErrorNotFound("Not Found"));
            }
            index
        }
        Ok(_) => target,
        Err(_) => return Err(ErrorNotFound("Not Found")),
    };

    if state.dev_mode && is_html(&target) {
        let raw = fs::read_to_string(&target)
            .await
            .map_err(ErrorInternalServerError)?;

        Ok(HttpResponse::Ok()
            .append_header(("Cache-Control", "no-cache, no-store, must-revalidate"))
            .content_type("text/html; charset=utf-8")
            .body(inject_reload_client(&raw)))
    } else {
        let file = NamedFile::open_async(&target)
            .await
            .map_err(|_| ErrorNotFound("Not Found"))?;

        Ok(file.into_response(&req))
    }
}

/// Maps a request tail onto a file below the project root. Only plain path
/// components are accepted; `..` and friends never escape the root.
fn resolve_request_path(root: &Path, tail: &str) -> anyhow::Result<PathBuf> {
    let trimmed = tail.trim_start_matches('/');
    let mut target = root.to_path_buf();

    if trimmed.is_empty() {
        target.push("index.html");
        return Ok(target);
    }

    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            _ => anyhow::bail!("invalid request path"),
        }
    }

    Ok(target)
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "html" | "htm"))
        .unwrap_or(false)
}

fn inject_reload_client(original: &str) -> String {
    if original.contains(hot_reload::CLIENT_MARKER) {
        return original.to_owned();
    }

    let snippet = hot_reload::client_snippet();

    match original.rfind("</head>") {
        Some(idx) => {
            let mut result = String::with_capacity(original.len() + snippet.len() + 2);
            result.push_str(&original[..idx]);
            result.push_str(&snippet);
            result.push('\n');
            result.push_str(&original[idx..]);
            result
        }
        None => {
            let mut result = original.to_owned();
            if !result.ends_with('\n') {
                result.push('\n');
            }
            result.push_str(&snippet);
            result.push('\n');
            result
        }
    }
}
