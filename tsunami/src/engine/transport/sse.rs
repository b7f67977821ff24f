//! `GET /api/updates`: the SSE push channel (spec.md §4.7).
//!
//! Each connection gets its own bounded channel; a full channel silently
//! drops the event, since spec.md treats these as hints, not data
//! ("Drops silently on full channel"). Keepalive is delegated to
//! `axum::response::sse::KeepAlive` rather than a hand-rolled timer, the
//! idiomatic axum way to emit the periodic comment spec.md asks for.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 100;
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct SseHub {
    channels: Mutex<HashMap<u64, mpsc::Sender<Event>>>,
    next_id: AtomicU64,
}

/// One peer's connection to the hub. Unregisters itself from the hub on
/// drop - spec.md §4.7: "SSE connections end when the peer disconnects;
/// the channel is closed and unregistered" - so a dropped axum response
/// body (peer disconnect) cleans up for free, with no separate handler
/// needed.
pub struct Connection {
    id: u64,
    hub: Arc<SseHub>,
    inner: ReceiverStream<Event>,
}

impl Stream for Connection {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_next(cx).map(|opt| opt.map(Ok))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
    }
}

impl SseHub {
    pub fn connect(self: &Arc<Self>) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.channels.lock().insert(id, tx);
        Connection {
            id,
            hub: self.clone(),
            inner: ReceiverStream::new(rx),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.channels.lock().len()
    }

    fn disconnect(&self, id: u64) {
        self.channels.lock().remove(&id);
    }

    /// Returns whether the event reached at least one live channel. A hint
    /// event (`asyncinitiation`) has no use for this; a data-carrying event
    /// (`showmodal`) needs it to know whether it must fall back (spec.md §7
    /// "Resource errors").
    fn broadcast(&self, event: Event) -> bool {
        let mut dead = Vec::new();
        let mut delivered = false;
        let channels = self.channels.lock();
        for (id, tx) in channels.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered = true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(channel = id, "sse channel full; dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
            }
        }
        drop(channels);
        if !dead.is_empty() {
            let mut channels = self.channels.lock();
            for id in dead {
                channels.remove(&id);
            }
        }
        delivered
    }

    pub fn broadcast_async_initiation(&self) {
        self.broadcast(Event::default().event("asyncinitiation"));
    }

    /// `showmodal` (spec.md §4.8). Returns whether the event was actually
    /// delivered to a live peer channel - a full or absent channel means the
    /// modal can never be answered, so the caller must resolve it itself
    /// (spec.md §7: "data-carrying events like modal-show fall back to
    /// closing the modal with a cancelled result").
    pub fn broadcast_show_modal(&self, config: &serde_json::Value) -> bool {
        let data = serde_json::to_string(config).unwrap_or_default();
        self.broadcast(Event::default().event("showmodal").data(data))
    }
}

pub fn response(stream: impl Stream<Item = Result<Event, Infallible>> + Send + 'static) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEPALIVE_INTERVAL).text("keepalive"))
}
