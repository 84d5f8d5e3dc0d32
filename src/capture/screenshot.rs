//! Display stream backed by the `xcap` crate.
//!
//! This is the infrastructure layer. It talks to the OS.
//! Each sample is a fresh screenshot of the chosen monitor. The monitor is
//! tracked by ID and looked up again on every grab. A background watcher
//! also polls for it between grabs, so an unplugged display ends the stream
//! even while nothing is being captured.

use super::source::{SourceProvider, StreamConstraints, VideoSource};
use super::CaptureError;
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use xcap::Monitor;

/// How often the watcher checks that the monitor is still attached.
const PRESENCE_POLL: Duration = Duration::from_secs(1);

/// Grants streams of the primary monitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorProvider;

impl SourceProvider for MonitorProvider {
    async fn acquire(
        &self,
        constraints: StreamConstraints,
    ) -> Result<Box<dyn VideoSource>, CaptureError> {
        if constraints.audio {
            return Err(CaptureError::UnsupportedConstraint("audio"));
        }
        if !constraints.show_cursor {
            log::debug!("[SOURCE] Cursor hiding not supported by xcap, pointer may still appear");
        }

        let start = std::time::Instant::now();
        let (id, name) = tokio::task::spawn_blocking(find_primary_monitor)
            .await
            .map_err(|e| CaptureError::SourceAcquisition(e.to_string()))??;

        log::info!(
            "[SOURCE] Acquired monitor '{}' (id {}) in {}ms",
            name,
            id,
            start.elapsed().as_millis()
        );

        let mut source = MonitorSource::new(id, name);
        source.watch_presence(PRESENCE_POLL);
        Ok(Box::new(source))
    }
}

/// Picks the primary monitor, falling back to the first one listed.
fn find_primary_monitor() -> Result<(u32, String), CaptureError> {
    let monitors =
        Monitor::all().map_err(|e| CaptureError::SourceAcquisition(e.to_string()))?;

    let chosen = monitors
        .iter()
        .find(|m| m.is_primary().unwrap_or(false))
        // Fallback: if no monitor reports as primary, use the first one
        .or_else(|| monitors.first())
        .ok_or_else(|| CaptureError::SourceAcquisition("no monitor found".to_string()))?;

    let id = chosen
        .id()
        .map_err(|e| CaptureError::SourceAcquisition(e.to_string()))?;
    let name = chosen.name().unwrap_or_else(|_| format!("monitor-{}", id));
    Ok((id, name))
}

fn monitor_present(monitor_id: u32) -> bool {
    match Monitor::all() {
        Ok(monitors) => monitors
            .iter()
            .any(|m| m.id().map(|id| id == monitor_id).unwrap_or(false)),
        // Enumeration hiccups are not proof the display is gone.
        Err(e) => {
            log::debug!("[SOURCE] Monitor enumeration failed: {}", e);
            true
        }
    }
}

/// Poll `present` every `period` on the blocking pool and flip `ended`
/// once it reports the display gone.
///
/// Returns when the display disappears or every receiver is dropped.
async fn watch_until_gone<F>(
    ended: Arc<watch::Sender<bool>>,
    period: Duration,
    present: F,
) where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let present = Arc::new(present);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if ended.is_closed() || *ended.borrow() {
            return;
        }
        let check = Arc::clone(&present);
        let still_there = tokio::task::spawn_blocking(move || (*check)())
            .await
            .unwrap_or(true);
        if !still_there {
            log::warn!("[SOURCE] Display detached, ending stream");
            ended.send_replace(true);
            return;
        }
    }
}

/// Screenshot stream of one monitor.
pub struct MonitorSource {
    monitor_id: u32,
    name: String,
    ended: Arc<watch::Sender<bool>>,
    watcher: Option<JoinHandle<()>>,
    released: bool,
}

impl MonitorSource {
    pub fn new(monitor_id: u32, name: String) -> Self {
        Self {
            monitor_id,
            name,
            ended: Arc::new(watch::channel(false).0),
            watcher: None,
            released: false,
        }
    }

    /// Start the background presence check. Needs a tokio runtime.
    pub fn watch_presence(&mut self, period: Duration) {
        if let Some(old) = self.watcher.take() {
            old.abort();
        }
        let monitor_id = self.monitor_id;
        self.watcher = Some(tokio::spawn(watch_until_gone(
            Arc::clone(&self.ended),
            period,
            move || monitor_present(monitor_id),
        )));
    }

    fn lookup(&self) -> Option<Monitor> {
        Monitor::all()
            .ok()?
            .into_iter()
            .find(|m| m.id().map(|id| id == self.monitor_id).unwrap_or(false))
    }
}

impl VideoSource for MonitorSource {
    fn current_frame(&mut self) -> Option<RgbaImage> {
        if self.released {
            return None;
        }

        let Some(monitor) = self.lookup() else {
            log::warn!("[SOURCE] Monitor '{}' disappeared, ending stream", self.name);
            self.ended.send_replace(true);
            return None;
        };

        match monitor.capture_image() {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("[SOURCE] Screenshot of '{}' failed: {}", self.name, e);
                None
            }
        }
    }

    fn termination(&self) -> watch::Receiver<bool> {
        self.ended.subscribe()
    }

    fn release(&mut self) {
        self.released = true;
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }

    fn label(&self) -> String {
        format!("monitor '{}'", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn audio_is_rejected() {
        let constraints = StreamConstraints {
            show_cursor: true,
            audio: true,
        };
        let result = MonitorProvider.acquire(constraints).await;
        assert!(matches!(
            result,
            Err(CaptureError::UnsupportedConstraint("audio"))
        ));
    }

    #[test]
    fn released_source_yields_nothing() {
        let mut source = MonitorSource::new(0, "test".to_string());
        source.release();
        assert!(source.current_frame().is_none());
    }

    #[tokio::test]
    async fn watcher_ends_stream_when_display_goes() {
        let ended = Arc::new(watch::channel(false).0);
        let mut rx = ended.subscribe();
        let attached = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&attached);
        let watcher = tokio::spawn(watch_until_gone(
            Arc::clone(&ended),
            Duration::from_millis(10),
            move || flag.load(Ordering::SeqCst),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!*rx.borrow());

        attached.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|gone| *gone))
            .await
            .expect("watcher never noticed")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .expect("watcher kept running")
            .unwrap();
    }

    #[tokio::test]
    async fn release_stops_watcher() {
        let mut source = MonitorSource::new(0, "test".to_string());
        source.watch_presence(Duration::from_millis(10));
        let rx = source.termination();
        source.release();
        assert!(source.watcher.is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    #[ignore = "requires graphical display and screen recording permissions"]
    async fn primary_monitor_produces_frames() {
        let mut source = MonitorProvider
            .acquire(StreamConstraints::default())
            .await
            .expect("acquire failed");
        let frame = source.current_frame().expect("no frame");
        assert!(frame.width() > 0 && frame.height() > 0);
        source.release();
    }
}
