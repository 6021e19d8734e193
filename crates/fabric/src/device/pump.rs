// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session read and write pumps.
//!
//! Each session owns exactly two long-lived tasks. The first pump to observe
//! termination requests the session close; teardown (registry removal,
//! disconnect event, metrics) runs exactly once behind the session's one-shot
//! guard, and the write pump always gets the chance to emit a close frame
//! before the transport goes down.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tokio::sync::mpsc;

use super::connection::{ReadError, ReadEvent, ReadHalf, WriteHalf};
use super::events::Event;
use super::manager::Manager;
use super::session::Session;
use super::{CloseReason, Envelope, Response};
use crate::config::SourceCheck;
use crate::error::DeviceError;
use crate::id::DeviceId;
use crate::metrics as names;

pub(crate) fn spawn(
    manager: Arc<Manager>,
    session: Arc<Session>,
    reader: ReadHalf,
    writer: WriteHalf,
    queue: mpsc::Receiver<Envelope>,
) {
    tokio::spawn(read_pump(Arc::clone(&manager), Arc::clone(&session), reader));
    tokio::spawn(write_pump(manager, session, writer, queue));
}

// -- Read pump -----------------------------------------------------------------

async fn read_pump(manager: Arc<Manager>, session: Arc<Session>, mut reader: ReadHalf) {
    let reason = loop {
        let event = tokio::select! {
            _ = session.shutdown_token().cancelled() => break None,
            event = reader.next() => event,
        };

        match event {
            Ok(ReadEvent::Frame(frame)) => handle_frame(&manager, &session, frame),
            Ok(ReadEvent::Pong(payload)) => {
                counter!(names::PONG_COUNT).increment(1);
                manager.dispatch(&Event::Pong { device: Arc::clone(&session), payload });
            }
            Ok(ReadEvent::Skipped) => {
                tracing::debug!(device = %session.id(), "skipped non-binary frame");
            }
            Err(ReadError::PeerClosed(peer_reason)) => {
                tracing::debug!(device = %session.id(), reason = ?peer_reason, "peer closed");
                break Some(CloseReason::normal());
            }
            Err(e) => break Some(CloseReason::internal_error(e.to_string())),
        }
    };

    if let Some(reason) = reason {
        session.request_close(reason);
    }
    manager.finish_pump(&session);
}

/// Decode one inbound frame and deliver it: transactional frames complete the
/// tracker, everything else goes to the listener fan-out. Malformed frames are
/// logged and skipped so a single bad frame cannot kill a healthy session.
fn handle_frame(manager: &Manager, session: &Arc<Session>, frame: Bytes) {
    session.statistics().record_received(frame.len());

    let message = match session.wire_format().decode(&frame) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(device = %session.id(), err = %e, "undecodable frame skipped");
            return;
        }
    };

    if !source_admitted(manager.source_check(), session, &message.source) {
        return;
    }

    if let Some(key) = message.transaction_key().map(str::to_owned) {
        let response = Response {
            device: session.id().clone(),
            message: message.clone(),
            format: session.wire_format(),
            contents: frame.clone(),
        };
        match session.transactions().complete(&key, response) {
            Ok(()) => {
                counter!(names::REQUEST_RESPONSE_COUNT).increment(1);
                manager.dispatch(&Event::TransactionComplete {
                    device: Arc::clone(session),
                    transaction_key: key,
                });
                return;
            }
            // Unsolicited or late; deliver it like any other message.
            Err(DeviceError::NoSuchTransactionKey) => {}
            Err(e) => {
                tracing::warn!(device = %session.id(), err = %e, "transaction completion failed");
                return;
            }
        }
    }

    manager.dispatch(&Event::MessageReceived {
        device: Arc::clone(session),
        message: Box::new(message),
        contents: frame,
    });
}

/// Apply the source-validation policy. True means the frame may proceed.
fn source_admitted(policy: SourceCheck, session: &Session, source: &str) -> bool {
    if policy == SourceCheck::Off {
        return true;
    }
    let matches = DeviceId::parse(source).is_ok_and(|parsed| parsed == *session.id());
    if matches {
        counter!(names::SOURCE_CHECK, "outcome" => "accepted").increment(1);
        return true;
    }
    counter!(names::SOURCE_CHECK, "outcome" => "rejected").increment(1);
    tracing::warn!(device = %session.id(), source, "frame source does not match session");
    policy == SourceCheck::Lenient
}

// -- Write pump ----------------------------------------------------------------

async fn write_pump(
    manager: Arc<Manager>,
    session: Arc<Session>,
    mut writer: WriteHalf,
    mut queue: mpsc::Receiver<Envelope>,
) {
    let mut ping = tokio::time::interval(manager.ping_period());
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.reset(); // no immediate tick
    let ping_payload = Bytes::from(format!("ping[{}]", session.id()));

    let reason = loop {
        tokio::select! {
            _ = session.shutdown_token().cancelled() => {
                let text = session
                    .close_reason()
                    .map(|r| r.text)
                    .unwrap_or_else(|| "normal".to_owned());
                writer.send_close(&text).await;
                break None;
            }

            envelope = queue.recv() => match envelope {
                Some(envelope) => {
                    if let Err(reason) = write_envelope(&manager, &session, &mut writer, envelope).await {
                        break Some(reason);
                    }
                }
                // The session owns a sender for its whole lifetime, so this
                // only happens once it is dropped; treat as shutdown.
                None => break None,
            },

            _ = ping.tick() => {
                counter!(names::PING_COUNT).increment(1);
                if let Err(e) = writer.ping(ping_payload.clone()).await {
                    break Some(CloseReason::internal_error(e));
                }
            }
        }
    };

    if let Some(reason) = reason {
        session.request_close(reason);
    }
    writer.shutdown().await;
    manager.finish_pump(&session);
}

/// Encode and write one envelope, signaling the submitter either way. An
/// error return carries the close reason that ends the pump.
async fn write_envelope(
    manager: &Manager,
    session: &Arc<Session>,
    writer: &mut WriteHalf,
    envelope: Envelope,
) -> Result<(), CloseReason> {
    let Envelope { request, done } = envelope;

    // Reuse pre-encoded bytes when they are already in this session's format.
    let frame = match request.contents {
        Some(contents) if request.format == session.wire_format() => Ok(contents),
        _ => session.wire_format().encode(&request.message),
    };

    let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
            let _ = done.send(Err(e.clone()));
            manager.dispatch(&Event::MessageFailed {
                device: Arc::clone(session),
                error: e.to_string(),
            });
            return Err(CloseReason::internal_error(e.to_string()));
        }
    };

    match writer.write(frame.clone()).await {
        Ok(()) => {
            session.statistics().record_sent(frame.len());
            let _ = done.send(Ok(()));
            manager.dispatch(&Event::MessageSent { device: Arc::clone(session) });
            Ok(())
        }
        Err(e) => {
            let _ = done.send(Err(DeviceError::DeviceClosed));
            manager.dispatch(&Event::MessageFailed {
                device: Arc::clone(session),
                error: e.clone(),
            });
            Err(CloseReason::internal_error(e))
        }
    }
}
