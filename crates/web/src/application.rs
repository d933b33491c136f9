//! The application: routing table, settings and transcoders, plus the
//! accept loop that serves them.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderValue, Request, Response, StatusCode, header};
use http_body_util::{BodyExt, Full};
use mime::Mime;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use troika_http::connection::HttpConnection;
use troika_http::handler::Handler;
use troika_http::protocol::body::ReqBody;

use crate::context::RequestContext;
use crate::handler::{self, DefaultHandler, RequestHandler};
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::route::{self, Route, RouteError};
use crate::settings::Settings;
use crate::transcoder::{Transcoder, Transcoders};

/// Replaces the built-in access log line.
pub type LogFunction = Box<dyn Fn(&RequestContext<'_>) + Send + Sync>;

/// Pattern of the catch-all route appended after the declared routes.
const DEFAULT_ROUTE: &str = r"/.*$";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid default_content_type {value:?}: {reason}")]
    InvalidContentType { value: String, reason: String },

    #[error("invalid server header: {0}")]
    InvalidServerHeader(#[from] http::header::InvalidHeaderValue),

    #[error("invalid transcoder content type {content_type:?}: {source}")]
    InvalidTranscoderType {
        content_type: String,
        #[source]
        source: mime::FromStrError,
    },

    #[error(transparent)]
    Route(#[from] RouteError),
}

pub struct ApplicationBuilder {
    routes: Vec<Route>,
    settings: Settings,
    default_handler: Arc<dyn RequestHandler>,
    transcoders: Vec<(Arc<dyn Transcoder>, Option<String>)>,
    log_function: Option<LogFunction>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            routes: Vec::new(),
            settings: Settings::default(),
            default_handler: Arc::new(DefaultHandler),
            transcoders: Vec::new(),
            log_function: None,
        }
    }

    #[must_use]
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    #[must_use]
    pub fn routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// The handler of the catch-all route, [`DefaultHandler`] unless set.
    #[must_use]
    pub fn default_handler(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.default_handler = Arc::new(handler);
        self
    }

    /// Registers a transcoder in addition to the defaults, see
    /// [`Application::add_transcoder`].
    #[must_use]
    pub fn transcoder(mut self, transcoder: impl Transcoder + 'static, content_type: Option<&str>) -> Self {
        self.transcoders.push((Arc::new(transcoder), content_type.map(str::to_string)));
        self
    }

    #[must_use]
    pub fn log_function(mut self, log_function: impl Fn(&RequestContext<'_>) + Send + Sync + 'static) -> Self {
        self.log_function = Some(Box::new(log_function));
        self
    }

    pub fn build(self) -> Result<Application, BuildError> {
        let Self { mut routes, settings, default_handler, transcoders, log_function } = self;

        let invalid_content_type = |reason: String| BuildError::InvalidContentType {
            value: settings.default_content_type.clone(),
            reason,
        };
        let default_content_type = settings
            .default_content_type
            .parse::<Mime>()
            .map_err(|e| invalid_content_type(e.to_string()))?;
        let default_content_type_header =
            HeaderValue::from_str(&settings.default_content_type).map_err(|e| invalid_content_type(e.to_string()))?;
        let server_header = HeaderValue::from_str(&settings.server_header())?;

        routes.push(
            Route::with_handler(DEFAULT_ROUTE, default_handler)?
                .name(settings.default_handler_name.clone())
                .suppress_logging(settings.default_handler_suppress_logs),
        );

        let mut application = Application {
            settings,
            routes,
            transcoders: Transcoders::with_defaults(),
            default_content_type,
            default_content_type_header,
            server_header,
            log_function,
        };
        for (transcoder, content_type) in transcoders {
            application.add_transcoder(transcoder, content_type.as_deref())?;
        }
        Ok(application)
    }
}

/// Routes requests to [`RequestHandler`]s.
///
/// The application is the [`Handler`] a connection calls: it collects the
/// request body, finds the first route matching the decoded path, runs the
/// handler lifecycle and turns the buffered response into an
/// `http::Response`.
pub struct Application {
    settings: Settings,
    routes: Vec<Route>,
    transcoders: Transcoders,
    default_content_type: Mime,
    default_content_type_header: HeaderValue,
    server_header: HeaderValue,
    log_function: Option<LogFunction>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The declared routes followed by the catch-all route.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn transcoders(&self) -> &Transcoders {
        &self.transcoders
    }

    pub(crate) fn default_content_type(&self) -> &Mime {
        &self.default_content_type
    }

    pub(crate) fn new_response(&self) -> HttpResponse {
        HttpResponse::new(self.server_header.clone(), self.default_content_type_header.clone())
    }

    /// Registers `transcoder` under `content_type`, or its own content type.
    pub fn add_transcoder(&mut self, transcoder: Arc<dyn Transcoder>, content_type: Option<&str>) -> Result<(), BuildError> {
        let registered_as = content_type.unwrap_or_else(|| transcoder.content_type()).to_string();
        self.transcoders
            .add(transcoder, content_type)
            .map_err(|source| BuildError::InvalidTranscoderType { content_type: registered_as, source })
    }

    /// Serves one request whose body has been collected.
    pub async fn dispatch(&self, request: HttpRequest) -> Response<Full<Bytes>> {
        let Some(matched) = route::match_routes(&self.routes, request.path()) else {
            debug!(path = request.path(), "no route for request target");
            return bare_response(StatusCode::NOT_FOUND);
        };

        let handler = matched.route.handler();
        let mut ctx = RequestContext::new(self, matched, request);
        handler::execute(handler, &mut ctx).await;
        ctx.into_response()
    }

    /// Writes the access log line for a finished request.
    ///
    /// Logged on target `troika::access` at info for statuses below 400,
    /// warn below 500 and error otherwise, unless a log function was set.
    pub fn log_request(&self, ctx: &RequestContext<'_>) {
        if let Some(log_function) = &self.log_function {
            log_function(ctx);
            return;
        }

        let status = ctx.get_status().as_u16();
        let summary = ctx.request_summary();
        let millis = ctx.request().request_time().as_secs_f64() * 1000.0;
        if status < 400 {
            info!(target: "troika::access", "{status} {summary} {millis:.2}ms");
        } else if status < 500 {
            warn!(target: "troika::access", "{status} {summary} {millis:.2}ms");
        } else {
            error!(target: "troika::access", "{status} {summary} {millis:.2}ms");
        }
    }

    /// Binds `host:port` from the settings and serves until ctrl-c.
    pub async fn run(self) -> io::Result<()> {
        let address = format!("{}:{}", self.settings.host, self.settings.port);
        let listener = TcpListener::bind(&address).await.inspect_err(|e| error!(cause = %e, "bind server error"))?;
        info!(%address, "start listening");

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(cause = %e, "failed to listen for ctrl-c");
            }
        };
        Arc::new(self).serve(listener, shutdown).await;
        Ok(())
    }

    /// Accepts connections until `shutdown` resolves, serving each one on its
    /// own task. Connections already accepted run to completion.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            let (tcp_stream, remote_addr) = tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested, stop accepting connections");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };

            let application = Arc::clone(&self);
            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection = HttpConnection::new(reader, writer).with_peer_addr(remote_addr);
                match connection.process(application).await {
                    Ok(()) => debug!(%remote_addr, "finished process, connection shutdown"),
                    Err(e) => warn!(%remote_addr, cause = %e, "service has error, connection shutdown"),
                }
            });
        }
    }
}

impl fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("routes", &self.routes)
            .field("settings", &self.settings)
            .field("transcoders", &self.transcoders.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("settings", &self.settings)
            .field("routes", &self.routes)
            .field("transcoders", &self.transcoders)
            .finish_non_exhaustive()
    }
}

fn bare_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::default());
    *response.status_mut() = status;
    response.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

#[async_trait]
impl Handler<ReqBody> for Application {
    type RespBody = Full<Bytes>;
    type Error = Box<dyn Error + Send + Sync>;

    async fn call(&self, req: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(cause = %e, "failed to read request body");
                return Ok(bare_response(StatusCode::BAD_REQUEST));
            }
        };

        Ok(self.dispatch(HttpRequest::new(parts, body)).await)
    }
}
