use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::{HeaderValue, Method, Response, StatusCode, Version, header};
use http_body::Body;
use http_body_util::{BodyExt, Empty};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::handler::Handler;
use crate::protocol::body::ReqBody;
use crate::protocol::{
    HttpError, Message, OmitBody, ParseError, PayloadItem, PayloadSize, PeerAddr, RequestHeader, ResponseHead, SendError,
};

const READ_BUFFER_CAPACITY: usize = 8 * 1024;

type OutgoingMessage<D> = Message<(ResponseHead, PayloadSize), D>;

/// One client connection, serving requests one after another until the client
/// closes it or asks for it to be closed.
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    peer_addr: Option<SocketAddr>,
}

impl<R, W> fmt::Debug for HttpConnection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection").field("peer_addr", &self.peer_addr).finish_non_exhaustive()
    }
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), READ_BUFFER_CAPACITY),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            peer_addr: None,
        }
    }

    /// Records the client address; every request then carries it as a [`PeerAddr`] extension.
    pub fn with_peer_addr(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    /// Serves requests until the connection ends.
    ///
    /// Returns `Ok` when the client closes the connection or a response is sent
    /// with `Connection: close`. A malformed request is answered with a 4xx
    /// response before the error is returned.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler<ReqBody>,
        H::RespBody: Body + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Header((header, payload_size)))) => {
                    if !self.do_process(header, payload_size, handler.as_ref()).await? {
                        self.shutdown().await;
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("receive payload while waiting for a request head");
                    self.send_error_response(StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("need header while receive body").into());
                }

                Some(Err(e)) => {
                    warn!(cause = %e, "can't decode the next request");
                    if let Some(status_code) = e.status_code() {
                        self.send_error_response(status_code).await?;
                    }
                    return Err(e.into());
                }

                None => {
                    debug!("peer closed the connection");
                    return Ok(());
                }
            }
        }
    }

    /// Serves a single request; returns whether the connection may be reused.
    async fn do_process<H>(&mut self, header: RequestHeader, payload_size: PayloadSize, handler: &H) -> Result<bool, HttpError>
    where
        H: Handler<ReqBody>,
        H::RespBody: Body + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        let version = header.version();
        let keep_alive = header.keep_alive();
        let head_request = header.method() == Method::HEAD;

        if !header.need_body() && !payload_size.is_empty() {
            debug!(method = %header.method(), "request carries a body its method does not use, it will be drained");
        }

        if header.expect_continue() && !payload_size.is_empty() {
            let mut continue_head = ResponseHead::new(());
            *continue_head.status_mut() = StatusCode::CONTINUE;
            self.framed_write.send(Message::<_, Bytes>::Header((continue_head, PayloadSize::Empty))).await?;
            debug!("receive expect request header, sent continue response");
        }

        let (mut body_sender, req_body) = ReqBody::body_channel(&mut self.framed_read, payload_size);

        let mut request = header.body(req_body);
        if let Some(peer_addr) = self.peer_addr {
            request.extensions_mut().insert(PeerAddr(peer_addr));
        }

        // The handler and the body sender have to run side by side: the handler
        // may wait on body chunks that only the sender can read off the wire.
        let (response_result, body_result) = {
            let handler_future = handler.call(request);
            let body_future = body_sender.start();
            tokio::pin!(handler_future, body_future);

            let mut body_result = None;
            let response_result = loop {
                select! {
                    biased;
                    response = &mut handler_future => break response,
                    result = &mut body_future, if body_result.is_none() => {
                        body_result = Some(result);
                    }
                }
            };
            (response_result, body_result)
        };

        let drained = match body_result {
            Some(Err(e)) => Err(e),
            _ => body_sender.skip_data().await,
        };

        let keep_alive = keep_alive && drained.is_ok();
        match response_result {
            Ok(response) => self.do_send_response(response, version, keep_alive, head_request).await?,
            Err(e) => {
                let e: Box<dyn Error + Send + Sync> = e.into();
                error!(cause = %e, "handler failed to respond");
                let response = empty_response(StatusCode::INTERNAL_SERVER_ERROR);
                self.do_send_response(response, version, keep_alive, head_request).await?;
            }
        }

        drained?;
        Ok(keep_alive)
    }

    async fn send_error_response(&mut self, status_code: StatusCode) -> Result<(), HttpError> {
        self.do_send_response(empty_response(status_code), Version::HTTP_11, false, false).await
    }

    /// Writes the response head and body.
    ///
    /// Responses to `HEAD` keep the framing headers of their body but send no
    /// body bytes; 1xx, 204 and 304 responses drop their body altogether.
    async fn do_send_response<T>(
        &mut self,
        response: Response<T>,
        version: Version,
        keep_alive: bool,
        head_request: bool,
    ) -> Result<(), HttpError>
    where
        T: Body + Unpin,
        T::Error: Display,
    {
        let (mut parts, mut body) = response.into_parts();

        parts.version = version;
        match (version, keep_alive) {
            (Version::HTTP_10, true) => {
                parts.headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
            }
            (_, false) => {
                parts.headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
            }
            _ => {}
        }

        let status = parts.status;
        let bodyless_status =
            status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED;
        let payload_size = if bodyless_status { PayloadSize::Empty } else { PayloadSize::from(body.size_hint()) };
        if head_request {
            parts.extensions.insert(OmitBody);
        }

        let head = ResponseHead::from_parts(parts, ());
        if status.is_informational() {
            // no payload item follows an interim head
            self.framed_write.send(OutgoingMessage::<T::Data>::Header((head, payload_size))).await?;
            return Ok(());
        }
        self.framed_write.feed(OutgoingMessage::<T::Data>::Header((head, payload_size))).await?;
        if head_request || bodyless_status {
            self.framed_write.send(OutgoingMessage::<T::Data>::Payload(PayloadItem::Eof)).await?;
            return Ok(());
        }

        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    // trailers are not written
                    let Ok(data) = frame.into_data() else { continue };
                    self.framed_write.feed(OutgoingMessage::Payload(PayloadItem::Chunk(data))).await?;
                }
                Some(Err(e)) => return Err(SendError::invalid_body(format!("resolve response body error: {e}")).into()),
                None => {
                    // send rather than feed so the whole response is flushed
                    self.framed_write.send(OutgoingMessage::<T::Data>::Payload(PayloadItem::Eof)).await?;
                    return Ok(());
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.framed_write.get_mut().shutdown().await {
            debug!(cause = %e, "failed to shutdown the connection");
        }
    }
}

fn empty_response(status_code: StatusCode) -> Response<Empty<Bytes>> {
    let mut response = Response::new(Empty::new());
    *response.status_mut() = status_code;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::make_handler;
    use http::Request;
    use http_body_util::Full;
    use indoc::indoc;
    use tokio::io::{AsyncReadExt, DuplexStream, duplex};

    type BoxError = Box<dyn Error + Send + Sync>;

    async fn echo(request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
        let path = request.uri().path().to_string();
        let peer = request.extensions().get::<PeerAddr>().map(|p| p.0.to_string()).unwrap_or_default();
        let body = request.into_body().collect().await?.to_bytes();
        let text = format!("{path} {peer} {}", String::from_utf8_lossy(&body));
        Ok(Response::new(Full::new(Bytes::from(text))))
    }

    async fn failing(_request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
        Err("boom".into())
    }

    async fn ignores_body(_request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
        Ok(Response::new(Full::new(Bytes::from_static(b"ignored"))))
    }

    /// Writes `input` to a connection driven by `handler`, half-closes, and
    /// returns everything written back.
    async fn exchange<H>(handler: H, input: &str) -> (String, Result<(), HttpError>)
    where
        H: Handler<ReqBody> + 'static,
        H::RespBody: Body + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        let (client, server): (DuplexStream, DuplexStream) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let connection =
            HttpConnection::new(server_read, server_write).with_peer_addr("10.0.0.7:4321".parse().unwrap());

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(input.as_bytes()).await.unwrap();
        client_write.shutdown().await.unwrap();

        let result = connection.process(Arc::new(handler)).await;

        let mut output = String::new();
        client_read.read_to_string(&mut output).await.unwrap();
        (output, result)
    }

    #[tokio::test]
    async fn keep_alive_serves_several_requests() {
        let input = indoc! {"
            POST /first HTTP/1.1\r
            Content-Length: 5\r
            \r
            helloGET /second HTTP/1.1\r
            \r
        "};
        let (output, result) = exchange(make_handler(echo), input).await;

        assert!(result.is_ok());
        assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 2);
        assert!(output.contains("/first 10.0.0.7:4321 hello"));
        assert!(output.contains("/second 10.0.0.7:4321 "));
    }

    #[tokio::test]
    async fn connection_close_stops_after_one_response() {
        let input = "GET /a HTTP/1.1\r\nConnection: close\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        let (output, result) = exchange(make_handler(echo), input).await;

        assert!(result.is_ok());
        assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 1);
        assert!(output.contains("connection: close\r\n"));
        assert!(!output.contains("/b"));
    }

    #[tokio::test]
    async fn http10_closes_by_default() {
        let (output, result) = exchange(make_handler(echo), "GET /old HTTP/1.0\r\n\r\nGET /b HTTP/1.0\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(output.starts_with("HTTP/1.0 200 OK\r\n"));
        assert_eq!(output.matches("HTTP/1.0").count(), 1);
    }

    #[tokio::test]
    async fn unread_body_is_skipped() {
        let input = "POST /a HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        let (output, result) = exchange(make_handler(ignores_body), input).await;

        assert!(result.is_ok());
        assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 2);
    }

    #[tokio::test]
    async fn expect_continue_is_answered() {
        let input = "PUT /up HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\nok";
        let (output, _) = exchange(make_handler(echo), input).await;

        assert!(output.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
        assert!(output.ends_with("/up 10.0.0.7:4321 ok"));
    }

    async fn hello(_request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
        Ok(Response::new(Full::new(Bytes::from_static(b"hello"))))
    }

    async fn not_modified(_request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
        let mut response = Response::new(Full::new(Bytes::from_static(b"stale")));
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        Ok(response)
    }

    #[tokio::test]
    async fn head_response_has_no_body() {
        let (output, result) = exchange(make_handler(hello), "HEAD / HTTP/1.1\r\n\r\nGET / HTTP/1.1\r\n\r\n").await;

        assert!(result.is_ok());
        let (head_response, get_response) = output.split_once("\r\n\r\n").unwrap();
        assert!(head_response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head_response.contains("content-length: 5"));
        assert!(get_response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(get_response.ends_with("\r\n\r\nhello"));
        assert_eq!(output.matches("hello").count(), 1);
    }

    #[tokio::test]
    async fn not_modified_drops_the_body() {
        let (output, result) = exchange(make_handler(not_modified), "GET / HTTP/1.1\r\n\r\nGET / HTTP/1.1\r\n\r\n").await;

        assert!(result.is_ok());
        assert_eq!(output.matches("HTTP/1.1 304 Not Modified\r\n").count(), 2);
        assert!(!output.contains("stale"));
        assert!(!output.contains("content-length"));
    }

    #[tokio::test]
    async fn handler_error_becomes_500() {
        let (output, result) = exchange(make_handler(failing), "GET / HTTP/1.1\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(output.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let (output, result) = exchange(make_handler(echo), "GET / HTTP/1.1\r\nContent-Length: x\r\n\r\n").await;

        assert!(result.is_err());
        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(output.contains("connection: close\r\n"));
    }
}
