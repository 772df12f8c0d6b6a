//! Client-side connection session
//!
//! One socket per session. A spawned receive task decodes response frames as
//! they arrive and folds them into [`SessionState`]; sends are fire-and-forget
//! calls made from the caller's task. Every state change is published on the
//! session's [`EventBus`] so a presentation layer can redraw the focused group.
//!
//! The server may drop a bootstrap request that lands before its handler is
//! ready, so [`ClientSession::bootstrap`] keeps re-sending whichever of the tag
//! list, row table and clip layout have not arrived yet.

use crate::cache::{CacheEntry, ImageCache};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::navigator::Navigator;
use crate::selection::{apply_selection, coalesce_ranges, Selection};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tagsync_common::events::{ClientEvent, EventBus};
use tagsync_common::labels::{decode_projection, Projection};
use tagsync_common::protocol::{FrameReader, FrameWriter, Request, Response};
use tagsync_common::Clip;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

/// Everything the session has learned from the server
#[derive(Debug, Default)]
pub struct SessionState {
    pub aliases: Option<Vec<String>>,
    pub labels: Option<Projection>,
    pub clips: Option<Vec<Clip>>,
    pub cache: ImageCache,
    pub navigator: Navigator,
}

impl SessionState {
    fn missing(&self) -> Vec<Bootstrap> {
        let mut missing = Vec::new();
        if self.aliases.is_none() {
            missing.push(Bootstrap::TagList);
        }
        if self.labels.is_none() {
            missing.push(Bootstrap::RowTable);
        }
        if self.clips.is_none() {
            missing.push(Bootstrap::ClipLayout);
        }
        missing
    }
}

/// Data the session needs before labelling can start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bootstrap {
    TagList,
    RowTable,
    ClipLayout,
}

impl Bootstrap {
    fn name(self) -> &'static str {
        match self {
            Bootstrap::TagList => "tag list",
            Bootstrap::RowTable => "row table",
            Bootstrap::ClipLayout => "clip layout",
        }
    }

    fn request(self) -> Request {
        match self {
            Bootstrap::TagList => Request::TagList,
            Bootstrap::RowTable => Request::RowTable,
            Bootstrap::ClipLayout => Request::ClipLayout,
        }
    }
}

/// What a call to [`ClientSession::select_tag`] put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmitOutcome {
    /// Tag mutations sent, one per contiguous row range
    pub mutations: usize,
    /// Save requests triggered by the autosave cadence
    pub saves: usize,
}

/// Serializable overview of the session
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub server: String,
    pub connected: bool,
    pub aliases: Vec<String>,
    pub data_cnt: usize,
    pub clip_cnt: usize,
    pub group_cnt: usize,
    /// Rows carrying each tag, in alias order
    pub tagged_rows: Vec<usize>,
}

/// State shared with the receive task
struct Shared {
    state: RwLock<SessionState>,
    events: EventBus<ClientEvent>,
    writer: Mutex<Option<FrameWriter<OwnedWriteHalf>>>,
    connected: AtomicBool,
    generation: AtomicU64,
}

impl Shared {
    fn new(event_capacity: usize) -> Self {
        Self {
            state: RwLock::new(SessionState::default()),
            events: EventBus::new(event_capacity),
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Tear down connection `generation` unless a newer one replaced it
    ///
    /// Returns whether anything was torn down.
    async fn disconnect(&self, generation: u64) -> bool {
        {
            let mut writer = self.writer.lock().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            writer.take();
            self.connected.store(false, Ordering::SeqCst);
        }
        self.release_pending().await;
        true
    }

    /// Requests in flight died with the connection
    async fn release_pending(&self) {
        let released = self.state.write().await.cache.release_pending();
        if released > 0 {
            debug!("{} image requests dropped with the connection", released);
        }
    }
}

pub struct ClientSession {
    config: ClientConfig,
    shared: Arc<Shared>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    mutations: AtomicU64,
}

impl ClientSession {
    /// Open the connection and start the receive task
    pub async fn connect(config: ClientConfig) -> Result<Arc<Self>> {
        let session = Arc::new(Self {
            config,
            shared: Arc::new(Shared::new(EVENT_CAPACITY)),
            receiver: Mutex::new(None),
            mutations: AtomicU64::new(0),
        });
        session.open().await?;
        Ok(session)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    async fn open(&self) -> Result<()> {
        let addr = self.config.server_addr();
        let stream = match timeout(self.config.connect_timeout(), TcpStream::connect(&addr)).await {
            Err(_) => return Err(ClientError::ConnectTimeout { addr }),
            Ok(Err(source)) => return Err(ClientError::Connect { addr, source }),
            Ok(Ok(stream)) => stream,
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Cannot set TCP_NODELAY: {}", e);
        }
        let (read_half, write_half) = stream.into_split();

        let generation = {
            let mut writer = self.shared.writer.lock().await;
            *writer = Some(FrameWriter::new(write_half));
            self.shared.connected.store(true, Ordering::SeqCst);
            self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let task = tokio::spawn(receive_loop(
            Arc::clone(&self.shared),
            read_half,
            self.config.read_timeout(),
            generation,
        ));
        if let Some(old) = self.receiver.lock().await.replace(task) {
            old.abort();
        }
        info!("Connected to {}", addr);
        Ok(())
    }

    /// Reopen a lost connection and fetch any bootstrap data still missing
    ///
    /// Does nothing while connected.
    pub async fn reconnect(&self) -> Result<()> {
        if self.is_connected() {
            info!("Already connected, no need to reconnect");
            return Ok(());
        }
        self.open().await?;
        self.bootstrap().await?;
        info!("Reconnection successful");
        Ok(())
    }

    /// Drop the connection without emitting `Disconnected`
    pub async fn close(&self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.disconnect(generation).await;
        if let Some(task) = self.receiver.lock().await.take() {
            task.abort();
        }
    }

    async fn send(&self, request: Request) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        let Some(frame_writer) = writer.as_mut().filter(|_| self.is_connected()) else {
            return Err(ClientError::NotConnected);
        };
        if let Err(e) = frame_writer.send_request(&request).await {
            warn!("Send of {:?} failed: {}", request.command(), e);
            *writer = None;
            self.shared.connected.store(false, Ordering::SeqCst);
            drop(writer);
            self.shared.release_pending().await;
            return Err(e.into());
        }
        debug!("Sent {:?}", request.command());
        Ok(())
    }

    pub async fn request_tag_list(&self) -> Result<()> {
        self.send(Request::TagList).await
    }

    pub async fn request_row_table(&self) -> Result<()> {
        self.send(Request::RowTable).await
    }

    pub async fn request_clip_layout(&self) -> Result<()> {
        self.send(Request::ClipLayout).await
    }

    pub async fn request_save(&self) -> Result<()> {
        self.send(Request::Save).await
    }

    /// Request one row's image, marking it pending in the cache
    pub async fn request_image(&self, row: u32) -> Result<()> {
        {
            let mut state = self.shared.state.write().await;
            let len = state.cache.len();
            if !state.cache.fill(row, CacheEntry::Pending) {
                return Err(ClientError::OutOfRange {
                    what: "row",
                    index: row as usize,
                    len,
                });
            }
        }
        let result = self.send(Request::Image { row }).await;
        if result.is_err() {
            self.shared.state.write().await.cache.release(row);
        }
        result
    }

    /// Send a tag mutation for rows `[begin, end]`
    ///
    /// Returns whether the autosave cadence sent a save request after it.
    pub async fn submit_tags(&self, begin: u32, end: u32, values: Vec<bool>) -> Result<bool> {
        self.send(Request::SetTags { begin, end, values }).await?;
        self.autosave_tick().await
    }

    /// Count one sent mutation and save when the cadence says so
    async fn autosave_tick(&self) -> Result<bool> {
        let interval = u64::from(self.config.autosave_interval);
        let count = self.mutations.fetch_add(1, Ordering::SeqCst) + 1;
        if interval > 0 && count % interval == 0 {
            debug!("Autosave after {} mutations", count);
            self.request_save().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Apply a tag action to every row of `group`
    ///
    /// Local labels change immediately; the server gets one mutation per run
    /// of consecutive rows that end up with the same label vector. Rows whose
    /// mutation never went out get their previous labels back.
    pub async fn select_tag(&self, group: usize, selection: Selection) -> Result<SubmitOutcome> {
        let (updates, previous, focused) = {
            let mut state = self.shared.state.write().await;
            let rows = state
                .navigator
                .layout()
                .group(group)
                .map(<[u32]>::to_vec)
                .ok_or(ClientError::OutOfRange {
                    what: "group",
                    index: group,
                    len: state.navigator.group_count(),
                })?;
            let multiple = self.config.multiple_selection;
            let focused = state.navigator.current() == group;
            let labels = state
                .labels
                .as_mut()
                .ok_or(ClientError::NotReady("row table"))?;
            if let Selection::Tag(tag) = selection {
                if tag >= labels.columns.len() {
                    return Err(ClientError::OutOfRange {
                        what: "tag",
                        index: tag,
                        len: labels.columns.len(),
                    });
                }
            }

            let mut updates = Vec::with_capacity(rows.len());
            let mut previous = Vec::with_capacity(rows.len());
            for row in rows {
                let Some(current) = labels.rows.get_mut(row as usize) else {
                    warn!("Group {} references row {} past the row table", group, row);
                    continue;
                };
                previous.push((row, current.clone()));
                *current = apply_selection(current, selection, multiple);
                updates.push((row, current.clone()));
            }
            (updates, previous, focused)
        };

        if focused {
            self.shared.events.emit(ClientEvent::Redraw { group });
        }

        let mut outcome = SubmitOutcome::default();
        for (begin, end, values) in coalesce_ranges(&updates) {
            if let Err(e) = self.send(Request::SetTags { begin, end, values }).await {
                self.restore_labels(&previous, begin, focused.then_some(group))
                    .await;
                return Err(e);
            }
            outcome.mutations += 1;
            match self.autosave_tick().await {
                Ok(saved) => outcome.saves += usize::from(saved),
                Err(e) => {
                    let unsent = end.saturating_add(1);
                    self.restore_labels(&previous, unsent, focused.then_some(group))
                        .await;
                    return Err(e);
                }
            }
        }
        Ok(outcome)
    }

    /// Put back the labels of rows from `from` on
    async fn restore_labels(&self, previous: &[(u32, Vec<bool>)], from: u32, redraw: Option<usize>) {
        let restored = {
            let mut state = self.shared.state.write().await;
            let Some(labels) = state.labels.as_mut() else {
                return;
            };
            let mut restored = 0;
            for (row, old) in previous.iter().filter(|(row, _)| *row >= from) {
                if let Some(current) = labels.rows.get_mut(*row as usize) {
                    *current = old.clone();
                    restored += 1;
                }
            }
            restored
        };
        if restored > 0 {
            warn!("Reverted local labels of {} unsent rows", restored);
            if let Some(group) = redraw {
                self.shared.events.emit(ClientEvent::Redraw { group });
            }
        }
    }

    /// Request every image of `group` that is neither cached nor in flight
    ///
    /// Returns the number of requests sent.
    pub async fn ensure_group_images(&self, group: usize) -> Result<usize> {
        let rows: Vec<u32> = {
            let mut state = self.shared.state.write().await;
            let SessionState {
                cache, navigator, ..
            } = &mut *state;
            let rows = navigator
                .layout()
                .group(group)
                .ok_or(ClientError::OutOfRange {
                    what: "group",
                    index: group,
                    len: navigator.group_count(),
                })?;
            rows.iter().copied().filter(|row| cache.claim(*row)).collect()
        };

        self.send_image_requests(&rows).await?;
        Ok(rows.len())
    }

    /// Request every image that is neither cached nor in flight
    ///
    /// Returns the number of requests sent.
    pub async fn request_all_images(&self) -> Result<usize> {
        let rows = {
            let mut state = self.shared.state.write().await;
            if state.labels.is_none() {
                return Err(ClientError::NotReady("row table"));
            }
            state.cache.claim_all()
        };
        self.send_image_requests(&rows).await?;
        info!("Requested {} images", rows.len());
        Ok(rows.len())
    }

    /// Send image requests for rows already claimed in the cache
    async fn send_image_requests(&self, rows: &[u32]) -> Result<()> {
        for (i, row) in rows.iter().enumerate() {
            if let Err(e) = self.send(Request::Image { row: *row }).await {
                let mut state = self.shared.state.write().await;
                for unsent in &rows[i..] {
                    state.cache.release(*unsent);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Request the tag list, row table and clip layout until all three arrive
    pub async fn bootstrap(&self) -> Result<()> {
        let mut events = self.subscribe();
        let retry = self.config.bootstrap_retry();

        for round in 1..=self.config.bootstrap_attempts.max(1) {
            let missing = self.shared.state.read().await.missing();
            if missing.is_empty() {
                break;
            }
            debug!("Bootstrap round {}: requesting {:?}", round, missing);
            for item in &missing {
                self.send(item.request()).await?;
            }

            let deadline = Instant::now() + retry;
            loop {
                if self.shared.state.read().await.missing().is_empty() {
                    break;
                }
                match timeout_at(deadline, events.recv()).await {
                    Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => continue,
                    Ok(Err(RecvError::Closed)) | Err(_) => break,
                }
            }
        }

        let missing = self.shared.state.read().await.missing();
        if !missing.is_empty() {
            return Err(ClientError::BootstrapIncomplete {
                missing: missing.into_iter().map(Bootstrap::name).collect(),
            });
        }
        info!("Bootstrap complete");
        Ok(())
    }

    /// Focus `group` and announce it
    pub async fn goto_group(&self, group: usize) -> bool {
        let moved = self.shared.state.write().await.navigator.goto(group);
        if moved {
            self.shared.events.emit(ClientEvent::Redraw { group });
        }
        moved
    }

    pub async fn next_group(&self) -> bool {
        let current = self.current_group().await;
        self.goto_group(current + 1).await
    }

    pub async fn prev_group(&self) -> bool {
        match self.current_group().await.checked_sub(1) {
            Some(group) => self.goto_group(group).await,
            None => false,
        }
    }

    pub async fn current_group(&self) -> usize {
        self.shared.state.read().await.navigator.current()
    }

    pub async fn group_count(&self) -> usize {
        self.shared.state.read().await.navigator.group_count()
    }

    pub async fn group_rows(&self, group: usize) -> Option<Vec<u32>> {
        let state = self.shared.state.read().await;
        state.navigator.layout().group(group).map(<[u32]>::to_vec)
    }

    pub async fn aliases(&self) -> Option<Vec<String>> {
        self.shared.state.read().await.aliases.clone()
    }

    pub async fn clips(&self) -> Option<Vec<Clip>> {
        self.shared.state.read().await.clips.clone()
    }

    pub async fn data_cnt(&self) -> Option<usize> {
        let state = self.shared.state.read().await;
        state.labels.as_ref().map(Projection::data_cnt)
    }

    /// Local label vector of a row
    pub async fn labels(&self, row: u32) -> Option<Vec<bool>> {
        let state = self.shared.state.read().await;
        state.labels.as_ref()?.rows.get(row as usize).cloned()
    }

    pub async fn image(&self, row: u32) -> Option<CacheEntry> {
        self.shared.state.read().await.cache.get(row).cloned()
    }

    /// Request an image and wait until it is cached or reported missing
    pub async fn fetch_image(&self, row: u32, wait: Duration) -> Result<CacheEntry> {
        if let Some(entry @ (CacheEntry::Ready(_) | CacheEntry::Failed(_))) = self.image(row).await {
            return Ok(entry);
        }
        let mut events = self.subscribe();
        self.request_image(row).await?;
        wait_for(&mut events, wait, |event| match event {
            ClientEvent::ImageReady { row: r } | ClientEvent::ImageFailed { row: r, .. } => *r == row,
            _ => false,
        })
        .await?;
        self.image(row).await.ok_or(ClientError::OutOfRange {
            what: "row",
            index: row as usize,
            len: 0,
        })
    }

    /// Wait for the acks of a [`SubmitOutcome`]
    ///
    /// Returns `false` if the server rejected any of them. `events` must have
    /// been subscribed before the requests were sent.
    pub async fn wait_for_acks(
        &self,
        events: &mut broadcast::Receiver<ClientEvent>,
        outcome: SubmitOutcome,
        wait: Duration,
    ) -> Result<bool> {
        let mut mutations = outcome.mutations;
        let mut saves = outcome.saves;
        let mut all_ok = true;
        while mutations + saves > 0 {
            let event = wait_for(events, wait, |event| {
                matches!(
                    event,
                    ClientEvent::MutationAcked { .. } | ClientEvent::SaveAcked { .. }
                )
            })
            .await?;
            match event {
                ClientEvent::MutationAcked { ok } => {
                    mutations = mutations.saturating_sub(1);
                    all_ok &= ok;
                }
                ClientEvent::SaveAcked { ok } => {
                    saves = saves.saturating_sub(1);
                    all_ok &= ok;
                }
                _ => {}
            }
        }
        Ok(all_ok)
    }

    /// Wait until `count` images have arrived or been reported missing
    ///
    /// Returns `(ready, failed)`. `events` must have been subscribed before
    /// the requests were sent.
    pub async fn wait_for_images(
        &self,
        events: &mut broadcast::Receiver<ClientEvent>,
        count: usize,
        wait: Duration,
    ) -> Result<(usize, usize)> {
        let (mut ready, mut failed) = (0, 0);
        while ready + failed < count {
            let event = wait_for(events, wait, |event| {
                matches!(
                    event,
                    ClientEvent::ImageReady { .. } | ClientEvent::ImageFailed { .. }
                )
            })
            .await?;
            match event {
                ClientEvent::ImageReady { .. } => ready += 1,
                _ => failed += 1,
            }
        }
        Ok((ready, failed))
    }

    pub async fn summary(&self) -> SessionSummary {
        let state = self.shared.state.read().await;
        let aliases = state.aliases.clone().unwrap_or_default();
        let tagged_rows = match &state.labels {
            Some(labels) => (0..labels.columns.len())
                .map(|tag| labels.rows.iter().filter(|r| r.get(tag) == Some(&true)).count())
                .collect(),
            None => Vec::new(),
        };
        SessionSummary {
            server: self.config.server_addr(),
            connected: self.is_connected(),
            aliases,
            data_cnt: state.labels.as_ref().map_or(0, Projection::data_cnt),
            clip_cnt: state.clips.as_ref().map_or(0, Vec::len),
            group_cnt: state.navigator.group_count(),
            tagged_rows,
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if let Some(task) = self.receiver.get_mut().take() {
            task.abort();
        }
    }
}

/// Receive events until one matches or `wait` elapses
async fn wait_for<F>(
    events: &mut broadcast::Receiver<ClientEvent>,
    wait: Duration,
    pred: F,
) -> Result<ClientEvent>
where
    F: Fn(&ClientEvent) -> bool,
{
    let deadline = Instant::now() + wait;
    loop {
        match timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) if pred(&event) => return Ok(event),
            Ok(Ok(ClientEvent::Disconnected { .. })) => return Err(ClientError::NotConnected),
            Ok(Ok(_)) => continue,
            Ok(Err(RecvError::Lagged(n))) => {
                warn!("Event receiver lagged by {} events", n);
                continue;
            }
            Ok(Err(RecvError::Closed)) => return Err(ClientError::NotConnected),
            Err(_) => return Err(ClientError::ResponseTimeout),
        }
    }
}

async fn receive_loop(shared: Arc<Shared>, read_half: OwnedReadHalf, read_timeout: Duration, generation: u64) {
    let mut reader = FrameReader::new(BufReader::new(read_half), read_timeout);
    let reason = loop {
        match reader.next_response().await {
            Ok(Some(response)) => apply_response(&shared, response).await,
            Ok(None) => break "connection closed by server".to_string(),
            Err(e) if e.is_recoverable() => warn!("Dropping response frame: {}", e),
            Err(e) => break e.to_string(),
        }
    };

    // A newer connection owns the flag now
    if !shared.disconnect(generation).await {
        return;
    }
    warn!("Disconnected: {}", reason);
    shared.events.emit(ClientEvent::Disconnected { reason });
}

async fn apply_response(shared: &Shared, response: Response) {
    match response {
        Response::ImageData { row, bytes } => {
            debug!("Image for row {}: {} bytes", row, bytes.len());
            store_image(shared, row, CacheEntry::Ready(bytes), ClientEvent::ImageReady { row }).await;
        }
        Response::ImageError { row, message } => {
            warn!("Server could not deliver row {}: {}", row, message);
            let event = ClientEvent::ImageFailed {
                row,
                message: message.clone(),
            };
            store_image(shared, row, CacheEntry::Failed(message), event).await;
        }
        Response::TagList { status, aliases } => {
            if !status.is_ok() {
                warn!("Server failed to send the tag list");
                return;
            }
            info!("Received {} tags: {:?}", aliases.len(), aliases);
            let tag_cnt = aliases.len();
            shared.state.write().await.aliases = Some(aliases);
            shared.events.emit(ClientEvent::TagListReady { tag_cnt });
        }
        Response::RowTable { status, table } => {
            if !status.is_ok() {
                warn!("Server failed to send the row table");
                return;
            }
            let projection = match decode_projection(&table) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Cannot parse row table: {}", e);
                    return;
                }
            };
            if projection.unparsed_cells > 0 {
                warn!("{} row table cells were not booleans", projection.unparsed_cells);
            }
            let data_cnt = projection.data_cnt();
            let group = {
                let mut state = shared.state.write().await;
                if let Some(aliases) = &state.aliases {
                    if aliases.len() != projection.columns.len() {
                        warn!(
                            "Row table has {} label columns but {} tags were announced",
                            projection.columns.len(),
                            aliases.len()
                        );
                    }
                }
                state.labels = Some(projection);
                state.cache.reset(data_cnt);
                state.navigator.current()
            };
            info!("Received row table with {} rows", data_cnt);
            shared.events.emit(ClientEvent::RowTableReady { data_cnt });
            shared.events.emit(ClientEvent::Redraw { group });
        }
        Response::ClipLayout { status, clips } => {
            if !status.is_ok() {
                warn!("Server failed to send the clip layout");
                return;
            }
            let (clip_cnt, group_cnt, group) = {
                let mut state = shared.state.write().await;
                state.navigator.set_clips(&clips);
                let counts = (clips.len(), state.navigator.group_count(), state.navigator.current());
                state.clips = Some(clips);
                counts
            };
            info!("Received {} clips forming {} groups", clip_cnt, group_cnt);
            shared
                .events
                .emit(ClientEvent::ClipLayoutReady { clip_cnt, group_cnt });
            shared.events.emit(ClientEvent::Redraw { group });
        }
        Response::SetTags { status } => {
            if !status.is_ok() {
                warn!("Server rejected a tag update");
            }
            shared
                .events
                .emit(ClientEvent::MutationAcked { ok: status.is_ok() });
        }
        Response::Save { status } => {
            if status.is_ok() {
                info!("Server saved the labels");
            } else {
                warn!("Server failed to save the labels, check the server log");
            }
            shared.events.emit(ClientEvent::SaveAcked { ok: status.is_ok() });
        }
    }
}

async fn store_image(shared: &Shared, row: u32, entry: CacheEntry, event: ClientEvent) {
    let focused_group = {
        let mut state = shared.state.write().await;
        if !state.cache.fill(row, entry) {
            warn!("Image for unknown row {} ignored", row);
            return;
        }
        state
            .navigator
            .is_focused(row)
            .then(|| state.navigator.current())
    };
    shared.events.emit(event);
    if let Some(group) = focused_group {
        shared.events.emit(ClientEvent::Redraw { group });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_bootstrap_items() {
        let mut state = SessionState::default();
        assert_eq!(
            state.missing(),
            vec![Bootstrap::TagList, Bootstrap::RowTable, Bootstrap::ClipLayout]
        );
        state.aliases = Some(vec!["a".into()]);
        state.clips = Some(Vec::new());
        assert_eq!(state.missing(), vec![Bootstrap::RowTable]);
    }

    #[tokio::test]
    async fn test_image_redraw_only_for_focused_group() {
        let shared = Shared::new(16);
        {
            let mut state = shared.state.write().await;
            state.cache.reset(4);
            state.navigator.set_clips(&[Clip::new(0, 4, 2)]);
        }
        let mut rx = shared.events.subscribe();

        apply_response(
            &shared,
            Response::ImageData {
                row: 1,
                bytes: vec![1],
            },
        )
        .await;
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::ImageReady { row: 1 });
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::Redraw { group: 0 });

        apply_response(
            &shared,
            Response::ImageError {
                row: 3,
                message: "gone".into(),
            },
        )
        .await;
        assert_eq!(
            rx.recv().await.unwrap(),
            ClientEvent::ImageFailed {
                row: 3,
                message: "gone".into()
            }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(
            shared.state.read().await.cache.get(3),
            Some(&CacheEntry::Failed("gone".into()))
        );
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_newer_connection() {
        let shared = Shared::new(16);
        shared.generation.store(2, Ordering::SeqCst);
        shared.connected.store(true, Ordering::SeqCst);
        {
            let mut state = shared.state.write().await;
            state.cache.reset(2);
            state.cache.claim(0);
            state.cache.fill(1, CacheEntry::Ready(vec![3]));
        }

        assert!(!shared.disconnect(1).await);
        assert!(shared.connected.load(Ordering::SeqCst));
        assert_eq!(shared.state.read().await.cache.get(0), Some(&CacheEntry::Pending));

        assert!(shared.disconnect(2).await);
        assert!(!shared.connected.load(Ordering::SeqCst));
        let state = shared.state.read().await;
        assert_eq!(state.cache.get(0), Some(&CacheEntry::Absent));
        assert_eq!(state.cache.get(1), Some(&CacheEntry::Ready(vec![3])));
    }

    #[tokio::test]
    async fn test_row_table_resets_cache() {
        let shared = Shared::new(16);
        {
            let mut state = shared.state.write().await;
            state.cache.reset(2);
            state.cache.fill(0, CacheEntry::Ready(vec![7]));
        }

        apply_response(
            &shared,
            Response::RowTable {
                status: true.into(),
                table: "tag_code_1\nTrue\nFalse\nFalse\n".into(),
            },
        )
        .await;

        let state = shared.state.read().await;
        assert_eq!(state.cache.len(), 3);
        assert_eq!(state.cache.get(0), Some(&CacheEntry::Absent));
        assert_eq!(state.labels.as_ref().unwrap().rows[0], vec![true]);
    }
}
