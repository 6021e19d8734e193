// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin adapter over the WebSocket transport.
//!
//! The split halves serialize reads against reads and writes against writes;
//! the read half enforces the idle deadline by re-arming a timeout before each
//! attempt, so any inbound traffic (frames or pongs) renews it.

use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

/// Split a freshly-upgraded socket into pump-ready halves.
pub(crate) fn split(
    socket: WebSocket,
    idle_period: Duration,
    write_timeout: Option<Duration>,
) -> (ReadHalf, WriteHalf) {
    let (sink, stream) = socket.split();
    (ReadHalf { stream, idle_period }, WriteHalf { sink, write_timeout })
}

/// One read attempt's outcome.
#[derive(Debug)]
pub(crate) enum ReadEvent {
    /// A binary frame.
    Frame(Bytes),
    /// A non-binary data frame, skipped.
    Skipped,
    /// A pong control frame; receipt renewed the idle deadline.
    Pong(Bytes),
}

#[derive(Debug)]
pub(crate) enum ReadError {
    /// No frame arrived within the idle period.
    IdleDeadline,
    /// The peer closed the connection, possibly with a reason.
    PeerClosed(Option<String>),
    /// The transport failed.
    Transport(String),
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdleDeadline => f.write_str("read idle deadline expired"),
            Self::PeerClosed(Some(reason)) => write!(f, "peer closed: {reason}"),
            Self::PeerClosed(None) => f.write_str("peer closed"),
            Self::Transport(err) => write!(f, "transport error: {err}"),
        }
    }
}

pub(crate) struct ReadHalf {
    stream: SplitStream<WebSocket>,
    idle_period: Duration,
}

impl ReadHalf {
    /// Read the next frame, arming the idle deadline first.
    pub(crate) async fn next(&mut self) -> Result<ReadEvent, ReadError> {
        match tokio::time::timeout(self.idle_period, self.stream.next()).await {
            Err(_) => Err(ReadError::IdleDeadline),
            Ok(None) => Err(ReadError::PeerClosed(None)),
            Ok(Some(Err(e))) => Err(ReadError::Transport(e.to_string())),
            Ok(Some(Ok(message))) => match message {
                WsMessage::Binary(frame) => Ok(ReadEvent::Frame(frame)),
                WsMessage::Pong(payload) => Ok(ReadEvent::Pong(payload)),
                WsMessage::Close(frame) => {
                    Err(ReadError::PeerClosed(frame.map(|f| f.reason.to_string())))
                }
                // Pings are answered by the transport layer.
                WsMessage::Ping(_) | WsMessage::Text(_) => Ok(ReadEvent::Skipped),
            },
        }
    }
}

pub(crate) struct WriteHalf {
    sink: SplitSink<WebSocket, WsMessage>,
    write_timeout: Option<Duration>,
}

impl WriteHalf {
    /// Write one binary frame, honoring the write deadline when configured.
    pub(crate) async fn write(&mut self, frame: Bytes) -> Result<(), String> {
        let send = self.sink.send(WsMessage::Binary(frame));
        match self.write_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, send).await {
                Err(_) => Err("write deadline expired".to_owned()),
                Ok(outcome) => outcome.map_err(|e| e.to_string()),
            },
            None => send.await.map_err(|e| e.to_string()),
        }
    }

    /// Send a ping control frame.
    pub(crate) async fn ping(&mut self, payload: Bytes) -> Result<(), String> {
        self.sink.send(WsMessage::Ping(payload)).await.map_err(|e| e.to_string())
    }

    /// Best-effort normal-closure close frame.
    pub(crate) async fn send_close(&mut self, reason: &str) {
        let frame = CloseFrame { code: close_code::NORMAL, reason: reason.to_owned().into() };
        if let Err(e) = self.sink.send(WsMessage::Close(Some(frame))).await {
            tracing::trace!(err = %e, "close frame not delivered");
        }
    }

    /// Tear down the transport.
    pub(crate) async fn shutdown(mut self) {
        let _ = self.sink.close().await;
    }
}
