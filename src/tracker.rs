//! The detection loop: a cancellable worker that polls the camera at a
//! fixed interval, runs single-face analysis and publishes expression and
//! overlay state for the view.
//!
//! The loop is strictly sequential: each cycle fully completes before the
//! next is scheduled, so there is exactly one writer of the shared state.
//! Rescheduling is a timed wait on the stop channel, which makes teardown
//! immediate instead of waiting out the interval.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use image::{DynamicImage, RgbaImage};
use log::{debug, info, warn};
use moodmirror_vision::draw::{self, Overlay};
use moodmirror_vision::video::RgbFrame;
use moodmirror_vision::{Analyzer, Camera, Dimensions, Expression};

/// State shared between the detection loop (single writer) and the view.
///
/// The view also writes one field: the rendered video dimensions, which the
/// loop reads back each cycle to size the overlay.
pub struct SharedView {
    expression: Mutex<Option<Expression>>,
    video_frame: Mutex<Option<RgbFrame>>,
    overlay_frame: Mutex<Option<RgbaImage>>,
    display_dims: Mutex<Dimensions>,
    consecutive_failures: AtomicU32,
}

impl SharedView {
    pub fn new() -> Self {
        Self {
            expression: Mutex::new(None),
            video_frame: Mutex::new(None),
            overlay_frame: Mutex::new(None),
            display_dims: Mutex::new(Dimensions {
                width: 0,
                height: 0,
            }),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn expression(&self) -> Option<Expression> {
        *lock(&self.expression)
    }

    pub fn video_frame(&self) -> Option<RgbFrame> {
        lock(&self.video_frame).clone()
    }

    pub fn overlay_frame(&self) -> Option<RgbaImage> {
        lock(&self.overlay_frame).clone()
    }

    /// Written by the view every frame with the on-screen video size.
    pub fn set_display_dims(&self, dims: Dimensions) {
        *lock(&self.display_dims) = dims;
    }

    pub fn display_dims(&self) -> Dimensions {
        *lock(&self.display_dims)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    fn publish_expression(&self, expression: Expression) {
        *lock(&self.expression) = Some(expression);
    }

    fn publish_video(&self, frame: RgbFrame) {
        *lock(&self.video_frame) = Some(frame);
    }

    fn publish_overlay(&self, overlay: RgbaImage) {
        *lock(&self.overlay_frame) = Some(overlay);
    }

    fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for SharedView {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct Tracker {
    camera: Camera,
    analyzer: Analyzer,
    overlay: Overlay,
    shared: Arc<SharedView>,
    interval: Duration,
}

impl Tracker {
    pub fn new(
        camera: Camera,
        analyzer: Analyzer,
        shared: Arc<SharedView>,
        interval: Duration,
    ) -> Self {
        let overlay = Overlay::new(camera.dimensions());
        Self {
            camera,
            analyzer,
            overlay,
            shared,
            interval,
        }
    }

    /// Start the loop on its own thread. The returned handle cancels the
    /// pending cycle and joins the thread on `stop` (or drop), taking the
    /// camera down with it.
    pub fn spawn(self) -> anyhow::Result<TrackerHandle> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("moodmirror-tracker".to_string())
            .spawn(move || self.run(stop_rx))?;
        Ok(TrackerHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn run(mut self, stop: Receiver<()>) {
        info!(
            "detection loop started, polling every {} ms",
            self.interval.as_millis()
        );

        // Wait for the camera to deliver a usable frame before polling.
        loop {
            match self.camera.frame() {
                Ok(frame) if frame.width() > 0 && frame.height() > 0 => {
                    self.shared.publish_video(frame);
                    break;
                }
                Ok(_) => debug!("camera delivered an empty frame, still waiting"),
                Err(err) => warn!("waiting for camera: {err}"),
            }
            if wait(&stop, Duration::from_millis(100)) == Wait::Stop {
                info!("detection loop stopped before video became ready");
                return;
            }
        }
        info!("video ready");

        loop {
            self.cycle();
            if wait(&stop, self.interval) == Wait::Stop {
                break;
            }
        }
        info!("detection loop stopped");
    }

    fn cycle(&mut self) {
        match self.run_cycle() {
            Ok(()) => self.shared.record_success(),
            Err(err) => {
                let failures = self.shared.record_failure();
                warn!("detection cycle failed ({failures} consecutive): {err}");
            }
        }
    }

    fn run_cycle(&mut self) -> moodmirror_vision::Result<()> {
        let frame = self.camera.frame()?;
        let img = DynamicImage::ImageRgb8(frame.clone());
        self.shared.publish_video(frame);

        let dims = self.shared.display_dims();
        if dims.width == 0 || dims.height == 0 {
            debug!("view not laid out yet, skipping detection this cycle");
            return Ok(());
        }

        let Some(analysis) = self.analyzer.detect_single_face(&img)? else {
            debug!("no face in frame");
            return Ok(());
        };

        let (dominant, score) = analysis.expressions.dominant();
        debug!("dominant expression: {dominant} ({score:.2})");
        self.shared.publish_expression(dominant);

        let resized = analysis.resized_to(dims);
        self.overlay.match_dimensions(dims);
        self.overlay.clear();
        draw::draw_detection(self.overlay.image_mut(), &resized);
        draw::draw_landmarks(self.overlay.image_mut(), &resized);
        draw::draw_expression_scores(self.overlay.image_mut(), &resized);
        self.shared.publish_overlay(self.overlay.image().clone());

        Ok(())
    }
}

#[derive(PartialEq)]
enum Wait {
    Stop,
    Tick,
}

fn wait(stop: &Receiver<()>, timeout: Duration) -> Wait {
    match stop.recv_timeout(timeout) {
        Err(RecvTimeoutError::Timeout) => Wait::Tick,
        // An explicit stop or a dropped handle both end the loop.
        Ok(()) | Err(RecvTimeoutError::Disconnected) => Wait::Stop,
    }
}

/// Owns the loop thread; stopping (or dropping) cancels the pending cycle
/// and waits for the thread to exit.
pub struct TrackerHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TrackerHandle {
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The loop may already be gone; the drop of the sender is
            // enough either way.
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("detection loop panicked");
            }
        }
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_view_starts_unset() {
        let shared = SharedView::new();
        assert_eq!(shared.expression(), None);
        assert!(shared.video_frame().is_none());
        assert!(shared.overlay_frame().is_none());
        assert_eq!(
            shared.display_dims(),
            Dimensions {
                width: 0,
                height: 0
            }
        );
        assert_eq!(shared.consecutive_failures(), 0);
    }

    #[test]
    fn failure_counter_counts_consecutively_and_resets() {
        let shared = SharedView::new();
        assert_eq!(shared.record_failure(), 1);
        assert_eq!(shared.record_failure(), 2);
        assert_eq!(shared.record_failure(), 3);
        shared.record_success();
        assert_eq!(shared.consecutive_failures(), 0);
        assert_eq!(shared.record_failure(), 1);
    }

    #[test]
    fn expression_updates_are_visible() {
        let shared = SharedView::new();
        shared.publish_expression(Expression::Happy);
        assert_eq!(shared.expression(), Some(Expression::Happy));
        // a later cycle overwrites, it never appends
        shared.publish_expression(Expression::Sad);
        assert_eq!(shared.expression(), Some(Expression::Sad));
    }

    #[test]
    fn display_dims_round_trip() {
        let shared = SharedView::new();
        let dims = Dimensions {
            width: 800,
            height: 450,
        };
        shared.set_display_dims(dims);
        assert_eq!(shared.display_dims(), dims);
    }

    #[test]
    fn wait_reports_stop_on_disconnect() {
        let (tx, rx) = mpsc::channel::<()>();
        drop(tx);
        assert!(wait(&rx, Duration::from_millis(1)) == Wait::Stop);

        let (tx, rx) = mpsc::channel::<()>();
        assert!(wait(&rx, Duration::from_millis(1)) == Wait::Tick);
        tx.send(()).unwrap();
        assert!(wait(&rx, Duration::from_millis(1)) == Wait::Stop);
    }
}
