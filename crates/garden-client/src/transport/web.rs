//! HTTPS authentication and secure websocket transport.

use super::{Authentication, Connector, FrameSink, FrameSource, Transport};
use crate::config::SessionSettings;
use crate::cookies::CookieJar;
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use garden_core::{JsonValue, PlayerId, RoomId};
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, ORIGIN, REFERER, SET_COOKIE, USER_AGENT};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Browser user agent presented to the server.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for the live game server.
#[derive(Debug, Clone)]
pub struct WebConnector {
    http: reqwest::Client,
    host: String,
    game_version: String,
}

impl WebConnector {
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            host: settings.host.clone(),
            game_version: settings.game_version.clone(),
        }
    }

    fn origin(&self) -> String {
        format!("https://{}", self.host)
    }

    /// Authentication endpoint for `room`.
    pub fn auth_url(&self, room: &RoomId) -> String {
        format!(
            "https://{}/version/{}/api/rooms/{}/user/authenticate-web",
            self.host, self.game_version, room
        )
    }

    /// Socket endpoint for `room`. Query values are JSON strings.
    pub fn socket_url(&self, room: &RoomId, player_id: &PlayerId) -> String {
        format!(
            "wss://{host}/version/{v}/api/rooms/{room}/connect\
             ?surface=%22web%22&platform=%22desktop%22&playerId=%22{player_id}%22\
             &version=%22{v}%22&source=%22manualUrl%22\
             &capabilities=%22fbo_mipmap_unsupported%22",
            host = self.host,
            v = self.game_version,
        )
    }
}

#[async_trait]
impl Connector for WebConnector {
    async fn authenticate(
        &self,
        room: &RoomId,
        cookies: &CookieJar,
    ) -> TransportResult<Authentication> {
        let response = self
            .http
            .post(self.auth_url(room))
            .header(ACCEPT, "*/*")
            .header(CONTENT_TYPE, "application/json")
            .header(ORIGIN, self.origin())
            .header(REFERER, format!("{}/r/{}", self.origin(), room))
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(COOKIE, cookies.to_header())
            .json(&json!({"provider": "maybe-existing-jwt"}))
            .send()
            .await
            .map_err(|err| TransportError::ConnectionFailed {
                reason: err.to_string(),
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_owned)
            .collect();

        let body: JsonValue = response
            .json()
            .await
            .map_err(|err| TransportError::Http {
                status: status.as_u16(),
                message: format!("invalid authentication response: {err}"),
            })?;
        let authenticated = body
            .pointer("/data/isAuthenticated")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);

        Ok(Authentication {
            authenticated,
            set_cookies,
        })
    }

    async fn open(
        &self,
        room: &RoomId,
        player_id: &PlayerId,
        cookies: &CookieJar,
    ) -> TransportResult<Transport> {
        let url = self.socket_url(room, player_id);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::ConnectionFailed {
                reason: err.to_string(),
            })?;
        let headers = request.headers_mut();
        headers.insert("Origin", header_value(&self.origin())?);
        headers.insert("User-Agent", HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert("Cookie", header_value(&cookies.to_header())?);

        tracing::debug!(%room, "opening socket");
        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|err| TransportError::ConnectionFailed {
                reason: err.to_string(),
            })?;

        let (writer, reader) = stream.split();
        Ok(Transport::new(WebSink { writer }, WebSource { reader }))
    }
}

fn header_value(value: &str) -> TransportResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|err| TransportError::ConnectionFailed {
        reason: format!("invalid header value: {err}"),
    })
}

fn is_closed(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
    )
}

struct WebSink {
    writer: SplitSink<Socket, Message>,
}

#[async_trait]
impl FrameSink for WebSink {
    async fn send_text(&mut self, text: String) -> TransportResult<()> {
        self.writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| {
                if is_closed(&err) {
                    TransportError::Closed
                } else {
                    TransportError::WebSocket {
                        reason: err.to_string(),
                    }
                }
            })
    }

    async fn close(&mut self) -> TransportResult<()> {
        match self.writer.close().await {
            Ok(()) => Ok(()),
            Err(err) if is_closed(&err) => Ok(()),
            Err(err) => Err(TransportError::WebSocket {
                reason: err.to_string(),
            }),
        }
    }
}

struct WebSource {
    reader: SplitStream<Socket>,
}

#[async_trait]
impl FrameSource for WebSource {
    async fn next_text(&mut self) -> Option<TransportResult<String>> {
        loop {
            match self.reader.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::debug!(len = bytes.len(), "skipping binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "server closed the socket");
                    return None;
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(err) if is_closed(&err) => return None,
                Err(err) => {
                    return Some(Err(TransportError::WebSocket {
                        reason: err.to_string(),
                    }));
                }
            }
        }
    }
}
