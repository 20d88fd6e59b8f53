//! Per-client connection
//!
//! A reader loop turns client frames into engine calls; a writer task drains
//! the client's mailbox onto the stream. Until the client says hello its mailbox
//! is emptied without writing anything, and the greeting itself runs on the
//! writer so INIT always goes out before the events that follow it.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::events::Subscription;
use crate::game::engine::GameEngine;
use crate::game::state::PlayerId;
use crate::net::framing::{read_client_message, write_event, FramingError};
use crate::net::protocol::ClientMessage;

/// Run one client to completion, then disconnect it
pub async fn serve<S>(stream: S, engine: Arc<GameEngine>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let (id, subscription) = engine.connect();
    let (hello_tx, hello_rx) = mpsc::unbounded_channel();

    let mut writer_task = tokio::spawn(write_loop(
        writer,
        Arc::clone(&engine),
        id,
        subscription,
        hello_rx,
    ));

    let written = tokio::select! {
        read = read_loop(&mut reader, &engine, id, &hello_tx) => {
            if let Err(e) = read {
                debug!("Player {} read failed: {}", id, e);
            }
            None
        }
        written = &mut writer_task => Some(written),
    };

    let ended = match written {
        Some(written) => written,
        None => {
            // Lets the writer hand the mailbox back
            drop(hello_tx);
            writer_task.await
        }
    };

    match ended {
        Ok((subscription, result)) => {
            if let Err(e) = result {
                debug!("Player {} write failed: {}", id, e);
            }
            engine.disconnect(id, subscription);
        }
        Err(e) => {
            error!("Writer for player {} aborted: {}", id, e);
            engine.remove_player(id);
        }
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    reader: &mut R,
    engine: &GameEngine,
    id: PlayerId,
    hellos: &mpsc::UnboundedSender<String>,
) -> Result<(), FramingError> {
    let metrics = engine.metrics();

    loop {
        let message = match read_client_message(reader).await {
            Ok(message) => message,
            Err(FramingError::ConnectionClosed) => return Ok(()),
            Err(e) if e.is_recoverable() => {
                metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                metrics.rejected_messages.fetch_add(1, Ordering::Relaxed);
                warn!("Player {} sent an unreadable message: {}", id, e);
                continue;
            }
            Err(e) => return Err(e),
        };
        metrics.messages_received.fetch_add(1, Ordering::Relaxed);

        match message {
            ClientMessage::Input(input) => {
                if let Err(e) = engine.set_input(id, input) {
                    warn!("Input rejected: {}", e);
                }
            }
            ClientMessage::Hello { name } => {
                if hellos.send(name).is_err() {
                    return Ok(());
                }
            }
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    engine: Arc<GameEngine>,
    id: PlayerId,
    mut subscription: Subscription,
    mut hellos: mpsc::UnboundedReceiver<String>,
) -> (Subscription, Result<(), FramingError>) {
    let result = pump(&mut writer, &engine, id, &mut subscription, &mut hellos).await;
    (subscription, result)
}

async fn pump<W: AsyncWrite + Unpin>(
    writer: &mut W,
    engine: &GameEngine,
    id: PlayerId,
    subscription: &mut Subscription,
    hellos: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), FramingError> {
    let metrics = engine.metrics();
    let mut greeted = false;

    loop {
        let event = tokio::select! {
            biased;

            hello = hellos.recv() => match hello {
                Some(name) => match engine.hello(id, &name, subscription) {
                    Ok(init) => {
                        info!("Player {} said hello", id);
                        greeted = true;
                        Arc::new(init)
                    }
                    Err(e) => {
                        warn!("Hello rejected: {}", e);
                        continue;
                    }
                },
                None => return Ok(()),
            },
            broadcast = subscription.recv() => match broadcast {
                Some(event) if greeted => event,
                Some(_) => continue,
                None => return Ok(()),
            },
        };

        write_event(writer, event.as_ref()).await?;
        metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
    }
}
