//! One-shot device positioning.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;

use walkmate_shared::Coordinate;

use crate::error::ClientError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeolocationError {
    #[error("Permission to read the device position was denied")]
    Denied,

    #[error("Position unavailable: {0}")]
    Unavailable(String),

    #[error("No position within {0:?}")]
    Timeout(Duration),
}

/// Device positioning provider.
#[async_trait]
pub trait PositionSource: Send + Sync + 'static {
    async fn current_position(&self) -> Result<Coordinate, GeolocationError>;
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Coordinate);

#[async_trait]
impl PositionSource for FixedPosition {
    async fn current_position(&self) -> Result<Coordinate, GeolocationError> {
        Ok(self.0)
    }
}

/// A device without positioning, or one where the user declined access.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPosition;

#[async_trait]
impl PositionSource for NoPosition {
    async fn current_position(&self) -> Result<Coordinate, GeolocationError> {
        Err(GeolocationError::Denied)
    }
}

/// Position fed by a platform callback.
///
/// Resolves with the latest fix, waiting for the first one if none has
/// arrived yet.
#[derive(Debug, Clone)]
pub struct WatchedPosition {
    rx: watch::Receiver<Option<Coordinate>>,
}

impl WatchedPosition {
    pub fn new() -> (watch::Sender<Option<Coordinate>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }
}

#[async_trait]
impl PositionSource for WatchedPosition {
    async fn current_position(&self) -> Result<Coordinate, GeolocationError> {
        let mut rx = self.rx.clone();
        let fix = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| GeolocationError::Unavailable("position feed closed".into()))?;
        (*fix).ok_or_else(|| GeolocationError::Unavailable("empty fix".into()))
    }
}

/// Ask `source` for one fix, giving up after `timeout`.
pub async fn acquire(
    source: &dyn PositionSource,
    timeout: Duration,
) -> Result<Coordinate, GeolocationError> {
    match tokio::time::timeout(timeout, source.current_position()).await {
        Ok(result) => result,
        Err(_) => Err(GeolocationError::Timeout(timeout)),
    }
}

/// Like [`acquire`], substituting [`Coordinate::FALLBACK`] on any failure.
pub async fn acquire_or_fallback(source: &dyn PositionSource, timeout: Duration) -> Coordinate {
    match acquire(source, timeout).await {
        Ok(position) => position,
        Err(e) => {
            warn!(error = %ClientError::from(e), "Using fallback coordinate");
            Coordinate::FALLBACK
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hanging;

    #[async_trait]
    impl PositionSource for Hanging {
        async fn current_position(&self) -> Result<Coordinate, GeolocationError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_fixed_position() {
        let here = Coordinate::new(37.0, 127.0);
        let got = acquire(&FixedPosition(here), Duration::from_secs(10)).await;
        assert_eq!(got, Ok(here));
    }

    #[tokio::test]
    async fn test_denied_falls_back() {
        assert_eq!(
            acquire(&NoPosition, Duration::from_secs(10)).await,
            Err(GeolocationError::Denied)
        );
        let got = acquire_or_fallback(&NoPosition, Duration::from_secs(10)).await;
        assert_eq!(got, Coordinate::new(37.5665, 126.9780));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_source_times_out() {
        let timeout = Duration::from_secs(10);
        let started = tokio::time::Instant::now();
        assert_eq!(
            acquire(&Hanging, timeout).await,
            Err(GeolocationError::Timeout(timeout))
        );
        assert!(started.elapsed() >= timeout);
        assert_eq!(acquire_or_fallback(&Hanging, timeout).await, Coordinate::FALLBACK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watched_position_waits_for_first_fix() {
        let (tx, source) = WatchedPosition::new();
        let here = Coordinate::new(37.1, 127.2);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let _ = tx.send(Some(here));
            // keep the feed open until the reader is done
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        assert_eq!(acquire(&source, Duration::from_secs(10)).await, Ok(here));
    }

    #[tokio::test]
    async fn test_watched_position_closed_feed() {
        let (tx, source) = WatchedPosition::new();
        drop(tx);
        assert!(matches!(
            acquire(&source, Duration::from_secs(1)).await,
            Err(GeolocationError::Unavailable(_))
        ));
    }
}
