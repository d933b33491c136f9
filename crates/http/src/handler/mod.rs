//! The seam between the wire layer and whatever produces responses.

use std::error::Error;

use async_trait::async_trait;
use http::{Request, Response};
use http_body::Body;

/// Turns a request into a response.
///
/// An `Err` is logged by the connection and answered with a bare 500.
#[async_trait]
pub trait Handler<ReqBody>: Send + Sync {
    type RespBody: Body;
    type Error: Into<Box<dyn Error + Send + Sync>>;

    async fn call(&self, req: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error>;
}

/// A [`Handler`] backed by an async function, see [`make_handler`].
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<ReqBody, RespBody, Err, F, Fut> Handler<ReqBody> for HandlerFn<F>
where
    RespBody: Body,
    ReqBody: Send + 'static,
    F: Fn(Request<ReqBody>) -> Fut + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send,
{
    type RespBody = RespBody;
    type Error = Err;

    async fn call(&self, req: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        (self.f)(req).await
    }
}

/// Wraps an `async fn(Request<B>) -> Result<Response<_>, _>` as a [`Handler`].
pub fn make_handler<F, ReqBody, RespBody, Err, Ret>(f: F) -> HandlerFn<F>
where
    RespBody: Body,
    Err: Into<Box<dyn Error + Send + Sync>>,
    Ret: Future<Output = Result<Response<RespBody>, Err>>,
    F: Fn(Request<ReqBody>) -> Ret,
{
    HandlerFn { f }
}
