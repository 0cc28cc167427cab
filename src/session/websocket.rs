//! WebSocket transport adapter
//!
//! Turns an upgraded `tokio-tungstenite` stream into a [`Transport`]:
//! outbound [`Frame`]s become WebSocket messages and inbound messages
//! become frames. Raw protocol frames never surface on the read side.

use bytes::Bytes;
use futures_util::{future, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use super::connection::{Frame, Transport, TransportError};

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Closed
            }
            tungstenite::Error::Io(e) => TransportError::Io(e),
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(data) => Message::Text(String::from_utf8_lossy(&data).into_owned()),
        Frame::Binary(data) => Message::Binary(data.to_vec()),
        Frame::Ping(data) => Message::Ping(data.to_vec()),
        Frame::Pong(data) => Message::Pong(data.to_vec()),
        Frame::Close => Message::Close(None),
    }
}

fn from_message(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(Bytes::from(text))),
        Message::Binary(data) => Some(Frame::Binary(Bytes::from(data))),
        Message::Ping(data) => Some(Frame::Ping(Bytes::from(data))),
        Message::Pong(data) => Some(Frame::Pong(Bytes::from(data))),
        Message::Close(_) => Some(Frame::Close),
        Message::Frame(_) => None,
    }
}

/// Wrap an upgraded WebSocket stream
pub fn websocket_transport<S>(ws: WebSocketStream<S>) -> Transport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();

    let sink = sink
        .sink_map_err(TransportError::from)
        .with(|frame: Frame| future::ready(Ok::<_, TransportError>(to_message(frame))));

    let stream = stream.filter_map(|item| {
        future::ready(match item {
            Ok(message) => from_message(message).map(Ok),
            Err(e) => Some(Err(TransportError::from(e))),
        })
    });

    Transport::new(sink, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ws_pair() -> (Transport, WebSocketStream<tokio::io::DuplexStream>) {
        let (server_io, client_io) = tokio::io::duplex(16 * 1024);

        let server = tokio::spawn(async move {
            tokio_tungstenite::accept_async(server_io).await.unwrap()
        });
        let (client, _response) = tokio_tungstenite::client_async("ws://localhost/ws", client_io)
            .await
            .unwrap();
        let server = server.await.unwrap();

        (websocket_transport(server), client)
    }

    #[test]
    fn test_message_mapping() {
        assert_eq!(
            to_message(Frame::Text(Bytes::from_static(b"hi"))),
            Message::Text("hi".to_string())
        );
        assert_eq!(to_message(Frame::Close), Message::Close(None));
        assert_eq!(
            from_message(Message::Binary(vec![1, 2])),
            Some(Frame::Binary(Bytes::from_static(&[1, 2])))
        );
        assert_eq!(from_message(Message::Close(None)), Some(Frame::Close));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            TransportError::from(tungstenite::Error::ConnectionClosed),
            TransportError::Closed
        ));
        assert!(matches!(
            TransportError::from(tungstenite::Error::Utf8),
            TransportError::Protocol(_)
        ));
    }

    #[tokio::test]
    async fn test_payload_reaches_client() {
        let (transport, mut client) = ws_pair().await;
        let (conn, _stream) = transport.into_connection();

        conn.send_payload(Bytes::from_static(b"{\"type\":\"room_total\"}"))
            .await
            .unwrap();

        let message = client.next().await.unwrap().unwrap();
        assert_eq!(message, Message::Text("{\"type\":\"room_total\"}".to_string()));
    }

    #[tokio::test]
    async fn test_client_frames_reach_stream() {
        let (transport, mut client) = ws_pair().await;
        let (_conn, mut stream) = transport.into_connection();

        client.send(Message::Text("hello".to_string())).await.unwrap();
        client.send(Message::Pong(Vec::new())).await.unwrap();
        client.close(None).await.unwrap();

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Frame::Text(Bytes::from_static(b"hello"))
        );
        assert_eq!(stream.next().await.unwrap().unwrap(), Frame::Pong(Bytes::new()));
        assert_eq!(stream.next().await.unwrap().unwrap(), Frame::Close);
    }
}
