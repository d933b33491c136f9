//! troika-web: Tornado-style request handlers on top of `troika-http`.
//!
//! An [`Application`] owns an ordered table of [`Route`]s. Each request path is
//! matched against the table, the first route wins, and its [`RequestHandler`]
//! runs through a fixed lifecycle: `prepare`, the verb method, error handling,
//! access logging and `on_finished`. Handlers talk to the request and the
//! buffered response through a [`RequestContext`].
//!
//! Response bodies written as structured values are serialized with the
//! [`Transcoder`] negotiated from the `Accept` header, and request bodies are
//! decoded with the one matching `Content-Type`.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use serde_json::json;
//! use troika_web::{Application, HandlerResult, RequestContext, RequestHandler, Route};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl RequestHandler for Hello {
//!     async fn get(&self, ctx: &mut RequestContext<'_>) -> HandlerResult {
//!         let name = ctx.path_kwarg("name").unwrap_or("world").to_string();
//!         ctx.finish_with(json!({ "hello": name }))?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let application = Application::builder()
//!         .route(Route::new(r"/hello/(?P<name>\w+)", Hello)?)
//!         .build()?;
//!     application.run().await?;
//!     Ok(())
//! }
//! ```

mod application;
mod compress;
mod context;
mod date;
mod error;
mod handler;
mod request;
mod response;
mod route;
mod settings;

pub mod negotiation;
pub mod transcoder;

pub use application::{Application, ApplicationBuilder, BuildError, LogFunction};
pub use context::RequestContext;
pub use error::{HandlerError, HandlerResult, HttpError, ResponseError};
pub use handler::{DefaultHandler, RedirectHandler, RequestHandler};
pub use request::HttpRequest;
pub use response::HttpResponse;
pub use route::{Route, RouteError, RouteMatch};
pub use settings::Settings;
pub use transcoder::{Chunk, TranscodeError, Transcoder, Transcoders};
