use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use http_body::{Body, Frame, SizeHint};
use tracing::{error, trace};

use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};

const CHANNEL_CAPACITY: usize = 8;

/// The body of a request as seen by a handler.
#[derive(Debug)]
pub struct ReqBody {
    signal_sender: mpsc::Sender<()>,
    data_receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
    payload_size: PayloadSize,
    in_flight: bool,
    finished: bool,
}

/// The connection side of a [`ReqBody`].
#[derive(Debug)]
pub struct ReqBodySender<'conn, S> {
    payload_stream: &'conn mut S,
    signal_receiver: mpsc::Receiver<()>,
    data_sender: mpsc::Sender<Result<PayloadItem, ParseError>>,
    eof: bool,
}

impl ReqBody {
    /// Creates the two halves of a body reading from `payload_stream`.
    pub fn body_channel<S>(payload_stream: &mut S, payload_size: PayloadSize) -> (ReqBodySender<'_, S>, ReqBody)
    where
        S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
    {
        let (signal_sender, signal_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (data_sender, data_receiver) = mpsc::channel(CHANNEL_CAPACITY);

        let sender = ReqBodySender { payload_stream, signal_receiver, data_sender, eof: false };
        let body = ReqBody { signal_sender, data_receiver, payload_size, in_flight: false, finished: payload_size.is_empty() };
        (sender, body)
    }

    pub fn payload_size(&self) -> PayloadSize {
        self.payload_size
    }
}

impl<S> ReqBodySender<'_, S>
where
    S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
{
    /// Serves the body to its [`ReqBody`] until the body is fully read or the
    /// receiving half is dropped, then drains anything left unread.
    pub async fn start(&mut self) -> Result<(), ParseError> {
        while !self.eof {
            if self.signal_receiver.next().await.is_none() {
                trace!("request body dropped before eof");
                break;
            }

            let result = self.read_data().await;
            let failed = result.is_err();
            if let Ok(item) = &result {
                self.eof = item.is_eof();
            }

            if self.data_sender.send(result).await.is_err() {
                trace!("request body dropped while a chunk was in flight");
                break;
            }

            if failed {
                return Err(ParseError::invalid_body("failed to read request body"));
            }
        }

        self.skip_data().await
    }

    /// Reads the next payload item from the decoder stream.
    pub async fn read_data(&mut self) -> Result<PayloadItem, ParseError> {
        match self.payload_stream.next().await {
            Some(Ok(Message::Payload(payload_item))) => Ok(payload_item),
            Some(Ok(Message::Header(_))) => {
                error!("received a request head while reading a body");
                Err(ParseError::invalid_body("received a request head while reading a body"))
            }
            Some(Err(e)) => Err(e),
            None => Err(ParseError::invalid_body("connection closed before the body ended")),
        }
    }

    /// Discards the rest of the body up to and including its `Eof`.
    pub async fn skip_data(&mut self) -> Result<(), ParseError> {
        while !self.eof {
            self.eof = self.read_data().await?.is_eof();
        }
        Ok(())
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        if !this.in_flight {
            match Pin::new(&mut this.signal_sender).poll_ready(cx) {
                Poll::Ready(Ok(())) => {
                    if Pin::new(&mut this.signal_sender).start_send(()).is_err() {
                        this.finished = true;
                        return Poll::Ready(Some(Err(ParseError::invalid_body("request body sender is gone"))));
                    }
                    this.in_flight = true;
                }
                Poll::Ready(Err(_)) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(ParseError::invalid_body("request body sender is gone"))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        let polled = match this.data_receiver.poll_next_unpin(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(polled) => polled,
        };

        this.in_flight = false;
        match polled {
            Some(Ok(PayloadItem::Chunk(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Some(Ok(PayloadItem::Eof)) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Some(Err(e)) => {
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.finished = true;
                Poll::Ready(Some(Err(ParseError::invalid_body("request body sender is gone"))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished
    }

    fn size_hint(&self) -> SizeHint {
        self.payload_size.into()
    }
}
