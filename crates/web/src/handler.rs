//! Request handlers and the lifecycle that drives them.

use std::error::Error;

use async_trait::async_trait;
use http::{Method, StatusCode};
use tracing::{debug, error};

use crate::context::RequestContext;
use crate::error::{HandlerError, HandlerResult, HttpError};

fn method_not_allowed() -> HandlerResult {
    Err(HttpError::new(StatusCode::METHOD_NOT_ALLOWED).into())
}

/// Serves the requests of the routes it is attached to.
///
/// One value serves every request of its route, so per-request state lives in
/// the [`RequestContext`]; configuration a route needs goes into the fields
/// of the implementing type.
///
/// For each request the lifecycle is:
///
/// 1. [`prepare`](Self::prepare)
/// 2. the method named after the HTTP verb, unless `prepare` finished the
///    response. Verbs that are not overridden answer 405.
/// 3. on error: [`HandlerError::Finish`] finishes the response,
///    [`HandlerError::Http`] goes to [`write_error`](Self::write_error) and
///    anything else is logged and answered with a 500.
/// 4. the access log, unless the route suppresses it
/// 5. [`on_finished`](Self::on_finished)
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Used in logs for routes without a name.
    fn name(&self) -> &str {
        let name = std::any::type_name::<Self>();
        name.rsplit("::").next().unwrap_or(name)
    }

    async fn prepare(&self, _ctx: &mut RequestContext<'_>) -> HandlerResult {
        Ok(())
    }

    async fn get(&self, _ctx: &mut RequestContext<'_>) -> HandlerResult {
        method_not_allowed()
    }

    async fn head(&self, _ctx: &mut RequestContext<'_>) -> HandlerResult {
        method_not_allowed()
    }

    async fn post(&self, _ctx: &mut RequestContext<'_>) -> HandlerResult {
        method_not_allowed()
    }

    async fn put(&self, _ctx: &mut RequestContext<'_>) -> HandlerResult {
        method_not_allowed()
    }

    async fn patch(&self, _ctx: &mut RequestContext<'_>) -> HandlerResult {
        method_not_allowed()
    }

    async fn delete(&self, _ctx: &mut RequestContext<'_>) -> HandlerResult {
        method_not_allowed()
    }

    async fn options(&self, _ctx: &mut RequestContext<'_>) -> HandlerResult {
        method_not_allowed()
    }

    /// Runs after the response is complete and the request logged.
    async fn on_finished(&self, _ctx: &mut RequestContext<'_>) {}

    /// Renders an error response. `traceback` holds the error chain of an
    /// uncaught error and is empty otherwise.
    async fn write_error(&self, ctx: &mut RequestContext<'_>, error: &HttpError, traceback: &[String]) -> HandlerResult {
        ctx.write_default_error(error, traceback)?;
        Ok(())
    }
}

/// Runs the whole lifecycle of `handler` for the request in `ctx`.
pub(crate) async fn execute(handler: &dyn RequestHandler, ctx: &mut RequestContext<'_>) {
    debug!(request = %ctx.request_summary(), handler = ctx.name(), "executing request");

    match run(handler, ctx).await {
        Ok(()) => {}
        Err(HandlerError::Finish) => {}
        Err(HandlerError::Http(e)) => write_error(handler, ctx, &e, &[]).await,
        Err(HandlerError::Internal(e)) => {
            error!(handler = ctx.name(), cause = %e, "uncaught error while handling request");
            let traceback = error_chain(e.as_ref());
            write_error(handler, ctx, &HttpError::new(StatusCode::INTERNAL_SERVER_ERROR), &traceback).await;
        }
    }

    ctx.mark_finished();
    if !ctx.route().is_logging_suppressed() {
        ctx.application().log_request(ctx);
    }
    handler.on_finished(ctx).await;
}

async fn run(handler: &dyn RequestHandler, ctx: &mut RequestContext<'_>) -> HandlerResult {
    handler.prepare(ctx).await?;
    if ctx.is_finished() {
        return Ok(());
    }

    let method = ctx.request().method().clone();
    match method {
        Method::GET => handler.get(ctx).await,
        Method::HEAD => handler.head(ctx).await,
        Method::POST => handler.post(ctx).await,
        Method::PUT => handler.put(ctx).await,
        Method::PATCH => handler.patch(ctx).await,
        Method::DELETE => handler.delete(ctx).await,
        Method::OPTIONS => handler.options(ctx).await,
        _ => method_not_allowed(),
    }
}

async fn write_error(handler: &dyn RequestHandler, ctx: &mut RequestContext<'_>, error: &HttpError, traceback: &[String]) {
    if ctx.is_finished() {
        error!(handler = ctx.name(), status = error.status().as_u16(), "cannot write error, response already finished");
        return;
    }
    if let Err(e) = handler.write_error(ctx, error, traceback).await {
        error!(handler = ctx.name(), cause = %e, "failed to write error response");
    }
}

/// The error and its sources, outermost first.
fn error_chain(error: &(dyn Error + 'static)) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    chain
}

/// Answers every request with a 404. Bound to the catch-all route.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

#[async_trait]
impl RequestHandler for DefaultHandler {
    async fn prepare(&self, _ctx: &mut RequestContext<'_>) -> HandlerResult {
        Err(HttpError::new(StatusCode::NOT_FOUND).into())
    }
}

/// Redirects `GET` requests to a fixed URL.
#[derive(Debug, Clone)]
pub struct RedirectHandler {
    url: String,
    permanent: bool,
}

impl RedirectHandler {
    /// A 302 redirect to `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), permanent: false }
    }

    /// A 301 redirect to `url`.
    pub fn permanent(url: impl Into<String>) -> Self {
        Self { url: url.into(), permanent: true }
    }
}

#[async_trait]
impl RequestHandler for RedirectHandler {
    async fn get(&self, ctx: &mut RequestContext<'_>) -> HandlerResult {
        ctx.redirect(&self.url, self.permanent, None)?;
        Ok(())
    }
}
