//! Location sync engine.
//!
//! The walker pushes one sample per tick; the owner pulls the full sample
//! list per tick and replaces its path with it. The role picks the
//! [`TickStrategy`] once, at construction. Each running sync is a single
//! tokio task owning its interval, its path and the renderer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use walkmate_shared::{BoardId, ChatRoomId, LocationSample, Role};

use crate::api::WalkApi;
use crate::error::ClientError;
use crate::events::{emit_event, UiEvent, UiSender};
use crate::geolocation::{acquire_or_fallback, PositionSource};
use crate::path::PathRenderer;

/// The session a sync task reads and writes.
#[derive(Clone)]
pub struct SyncContext {
    pub board_id: BoardId,
    pub chat_room_id: ChatRoomId,
    pub api: Arc<dyn WalkApi>,
}

#[async_trait]
pub trait TickStrategy: Send + 'static {
    /// Run one tick. Returns `true` when `path` changed and must be redrawn.
    async fn on_tick(&mut self, ctx: &SyncContext, path: &mut Vec<LocationSample>) -> bool;
}

/// Walker side: sample the device and push.
pub struct PushSamples {
    source: Arc<dyn PositionSource>,
    geolocation_timeout: Duration,
}

impl PushSamples {
    pub fn new(source: Arc<dyn PositionSource>, geolocation_timeout: Duration) -> Self {
        Self {
            source,
            geolocation_timeout,
        }
    }
}

#[async_trait]
impl TickStrategy for PushSamples {
    async fn on_tick(&mut self, ctx: &SyncContext, path: &mut Vec<LocationSample>) -> bool {
        let position = acquire_or_fallback(self.source.as_ref(), self.geolocation_timeout).await;
        path.push(LocationSample::new(ctx.chat_room_id, position, Utc::now()));

        match ctx
            .api
            .push_location(ctx.board_id, ctx.chat_room_id, position)
            .await
        {
            Ok(()) => debug!(room = %ctx.chat_room_id, lat = position.latitude, lng = position.longitude, "Location pushed"),
            Err(e) => warn!(room = %ctx.chat_room_id, error = %ClientError::SyncRequestFailed(e), "Push failed"),
        }
        true
    }
}

/// Owner side: pull the walker's full path.
#[derive(Debug, Default)]
pub struct PullSamples;

#[async_trait]
impl TickStrategy for PullSamples {
    async fn on_tick(&mut self, ctx: &SyncContext, path: &mut Vec<LocationSample>) -> bool {
        match ctx.api.fetch_locations(ctx.board_id, ctx.chat_room_id).await {
            Ok(samples) => {
                debug!(room = %ctx.chat_room_id, samples = samples.len(), "Locations pulled");
                *path = samples;
                true
            }
            Err(e) => {
                warn!(room = %ctx.chat_room_id, error = %ClientError::SyncRequestFailed(e), "Pull failed");
                false
            }
        }
    }
}

pub fn strategy_for(
    role: Role,
    positions: Arc<dyn PositionSource>,
    geolocation_timeout: Duration,
) -> Box<dyn TickStrategy> {
    match role {
        Role::Walker => Box::new(PushSamples::new(positions, geolocation_timeout)),
        Role::Owner => Box::new(PullSamples),
    }
}

/// A running sync. Dropping it stops the interval.
pub struct LocationSync {
    room: ChatRoomId,
    path_rx: watch::Receiver<Vec<LocationSample>>,
    task: Option<JoinHandle<()>>,
}

impl LocationSync {
    /// Start ticking every `period`; the first tick fires immediately.
    pub fn start(
        mut strategy: Box<dyn TickStrategy>,
        ctx: SyncContext,
        mut renderer: PathRenderer,
        ui: UiSender,
        period: Duration,
    ) -> Self {
        let room = ctx.chat_room_id;
        let (path_tx, path_rx) = watch::channel(Vec::new());

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut path = Vec::new();

            loop {
                ticker.tick().await;
                if strategy.on_tick(&ctx, &mut path).await {
                    let rendered = renderer.render(&path).clone();
                    path_tx.send_replace(path.clone());
                    emit_event(&ui, UiEvent::PathRendered(rendered));
                }
            }
        });

        info!(room = %room, period_secs = period.as_secs(), "Location sync started");
        Self {
            room,
            path_rx,
            task: Some(task),
        }
    }

    /// Local copy of the path as of the last completed tick.
    pub fn path(&self) -> Vec<LocationSample> {
        self.path_rx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Cancel the interval. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!(room = %self.room, "Location sync stopped");
        }
    }
}

impl Drop for LocationSync {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ui_channel;
    use crate::geolocation::{FixedPosition, NoPosition};
    use crate::path::WatchSurface;
    use crate::test_support::FakeApi;
    use walkmate_shared::{Coordinate, UserId};

    const PERIOD: Duration = Duration::from_secs(10);
    const HERE: Coordinate = Coordinate {
        latitude: 37.51,
        longitude: 127.02,
    };

    fn ctx(api: &Arc<FakeApi>) -> SyncContext {
        SyncContext {
            board_id: BoardId(1),
            chat_room_id: ChatRoomId(2),
            api: api.clone(),
        }
    }

    fn start(api: &Arc<FakeApi>, strategy: Box<dyn TickStrategy>) -> LocationSync {
        let (surface, _rx) = WatchSurface::new();
        let (ui, _ui_rx) = ui_channel();
        LocationSync::start(strategy, ctx(api), PathRenderer::new(Box::new(surface)), ui, PERIOD)
    }

    fn walker(source: Arc<dyn PositionSource>) -> Box<dyn TickStrategy> {
        strategy_for(Role::Walker, source, Duration::from_secs(10))
    }

    fn sample(lat: f64) -> LocationSample {
        LocationSample::new(ChatRoomId(2), Coordinate::new(lat, 127.0), Utc::now())
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_walker_pushes_immediately_then_every_period() {
        let api = FakeApi::new(UserId(7), UserId(42));
        let sync = start(&api, walker(Arc::new(FixedPosition(HERE))));

        settle().await;
        assert_eq!(api.push_calls(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        let pushes = api.push_calls();
        assert!((2..=4).contains(&pushes), "{pushes} pushes in 30s");
        assert_eq!(sync.path().len(), pushes);
        assert!(api.pushed().iter().all(|c| *c == HERE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_geolocation_pushes_fallback() {
        let api = FakeApi::new(UserId(7), UserId(42));
        let _sync = start(&api, walker(Arc::new(NoPosition)));

        settle().await;
        assert_eq!(api.pushed(), vec![Coordinate::new(37.5665, 126.9780)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_path_equals_latest_pull() {
        let api = FakeApi::new(UserId(7), UserId(42));
        api.script_pull(vec![sample(37.1), sample(37.2), sample(37.3)]);
        let latest = vec![sample(36.0)];
        api.script_pull(latest.clone());

        let sync = start(&api, Box::new(PullSamples));
        settle().await;
        assert_eq!(sync.path().len(), 3);

        tokio::time::sleep(PERIOD).await;
        settle().await;
        assert_eq!(sync.path(), latest);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pull_keeps_previous_path_and_interval() {
        let api = FakeApi::new(UserId(7), UserId(42));
        let first = vec![sample(37.1), sample(37.2)];
        api.script_pull(first.clone());

        let sync = start(&api, Box::new(PullSamples));
        settle().await;
        assert_eq!(sync.path(), first);

        api.set_fail_pull(true);
        tokio::time::sleep(PERIOD * 2).await;
        settle().await;
        assert_eq!(sync.path(), first);
        assert!(api.pull_calls() >= 2);

        api.set_fail_pull(false);
        api.script_pull(vec![]);
        tokio::time::sleep(PERIOD).await;
        settle().await;
        assert!(sync.path().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_push_does_not_stop_interval() {
        let api = FakeApi::new(UserId(7), UserId(42));
        api.set_fail_push(true);
        let sync = start(&api, walker(Arc::new(FixedPosition(HERE))));

        tokio::time::sleep(PERIOD * 2).await;
        settle().await;
        assert!(api.push_calls() >= 2);
        assert!(api.pushed().is_empty());
        // the local path still grows
        assert_eq!(sync.path().len(), api.push_calls());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_calls_after_stop() {
        let api = FakeApi::new(UserId(7), UserId(42));
        let mut sync = start(&api, walker(Arc::new(FixedPosition(HERE))));
        settle().await;

        sync.stop();
        sync.stop();
        assert!(!sync.is_running());
        let calls = api.sync_calls();

        tokio::time::sleep(PERIOD * 5).await;
        settle().await;
        assert_eq!(api.sync_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_owner_polling() {
        let api = FakeApi::new(UserId(7), UserId(42));
        let sync = start(&api, Box::new(PullSamples));
        settle().await;
        drop(sync);
        let calls = api.pull_calls();

        tokio::time::sleep(PERIOD * 3).await;
        settle().await;
        assert_eq!(api.pull_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_emit_rendered_path() {
        let api = FakeApi::new(UserId(7), UserId(42));
        let (surface, map_rx) = WatchSurface::new();
        let (ui, mut ui_rx) = ui_channel();
        let _sync = LocationSync::start(
            walker(Arc::new(FixedPosition(HERE))),
            ctx(&api),
            PathRenderer::new(Box::new(surface)),
            ui,
            PERIOD,
        );

        match ui_rx.recv().await {
            Some(UiEvent::PathRendered(path)) => {
                assert_eq!(path.polyline, vec![HERE]);
                assert_eq!(*map_rx.borrow(), path);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
