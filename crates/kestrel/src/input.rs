//! Frame ingestion and synchronization.
//!
//! Image producers push timestamped left/right frames independently (e.g. from two capture
//! threads). A synchronization thread pairs the two streams within a small tolerance, dropping
//! whichever buffer head is too old, and hands complete frames over a bounded channel to the
//! consumer thread that owns the [`Tracker`]. Estimator feedback (predictions, outlier sets,
//! restarts) is queued as commands and applied between frames, never mid-frame.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use kestrel_image::Image;
use kestrel_utils::timer::FpsCounter;
use nalgebra::Vector3;

use crate::{frame::FeatureFrame, tracker::Tracker};

/// Maximum timestamp difference for a left/right pair to count as synchronized, in seconds.
const SYNC_TOLERANCE: f64 = 0.003;

/// Poll interval of the synchronization loop while its buffers are empty.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// The landmarks of one processed frame, with the frame's timestamp.
#[derive(Debug, Clone)]
pub struct TrackedFrame {
    pub time: f64,
    pub features: FeatureFrame,
}

enum Command {
    Prediction(HashMap<u64, Vector3<f64>>),
    Outliers(HashSet<u64>),
    Restart,
}

type FrameBuffer = Arc<Mutex<VecDeque<(f64, Image)>>>;

/// Owns the synchronization and tracking threads around a [`Tracker`].
pub struct Pipeline {
    left: FrameBuffer,
    right: FrameBuffer,
    commands: Sender<Command>,
    output: Receiver<TrackedFrame>,
    stop: Arc<AtomicBool>,
    sync_thread: Option<JoinHandle<()>>,
    track_thread: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawns the synchronization and tracking threads.
    pub fn spawn(tracker: Tracker) -> Self {
        let left: FrameBuffer = Arc::default();
        let right: FrameBuffer = Arc::default();
        let stop = Arc::new(AtomicBool::new(false));

        let (pair_tx, pair_rx) = channel::bounded::<(f64, Image, Option<Image>)>(2);
        let (cmd_tx, cmd_rx) = channel::unbounded::<Command>();
        let (out_tx, out_rx) = channel::unbounded::<TrackedFrame>();

        let stereo = tracker.is_stereo();

        let sync_thread = {
            let left = left.clone();
            let right = right.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("frame-sync".into())
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        match next_frame(&left, &right, stereo) {
                            Some(frame) => {
                                if pair_tx.send(frame).is_err() {
                                    break;
                                }
                            }
                            None => thread::sleep(POLL_INTERVAL),
                        }
                    }
                })
                .expect("failed to spawn frame-sync thread")
        };

        let track_thread = {
            let stop = stop.clone();
            thread::Builder::new()
                .name("tracker".into())
                .spawn(move || {
                    let mut tracker = tracker;
                    let mut fps = FpsCounter::new("tracker");
                    let mut last_time = f64::NEG_INFINITY;

                    while !stop.load(Ordering::Relaxed) {
                        match pair_rx.recv_timeout(POLL_INTERVAL) {
                            Ok((time, left, right)) => {
                                // Estimator feedback queued up to this point is applied before
                                // the frame, never mid-frame.
                                while let Ok(command) = cmd_rx.try_recv() {
                                    match command {
                                        Command::Prediction(predicted) => {
                                            tracker.set_prediction(&predicted)
                                        }
                                        Command::Outliers(ids) => tracker.remove_outliers(&ids),
                                        Command::Restart => tracker.restart(),
                                    }
                                }

                                if time <= last_time {
                                    log::warn!(
                                        "skipping frame with non-increasing timestamp {time} (last {last_time})",
                                    );
                                    continue;
                                }
                                last_time = time;

                                let features = tracker.track(time, left, right);
                                fps.tick_with(tracker.timers());
                                if out_tx.send(TrackedFrame { time, features }).is_err() {
                                    break;
                                }
                            }
                            Err(RecvTimeoutError::Timeout) => {}
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                })
                .expect("failed to spawn tracker thread")
        };

        Self {
            left,
            right,
            commands: cmd_tx,
            output: out_rx,
            stop,
            sync_thread: Some(sync_thread),
            track_thread: Some(track_thread),
        }
    }

    /// Queues a left-eye frame.
    pub fn push_left(&self, time: f64, image: Image) {
        self.left.lock().unwrap().push_back((time, image));
    }

    /// Queues a right-eye frame.
    pub fn push_right(&self, time: f64, image: Image) {
        self.right.lock().unwrap().push_back((time, image));
    }

    /// Queues predicted 3D landmark positions for the next frame's warm start.
    pub fn push_prediction(&self, predicted: HashMap<u64, Vector3<f64>>) {
        self.send(Command::Prediction(predicted));
    }

    /// Queues a set of landmark ids to drop.
    pub fn push_outliers(&self, ids: HashSet<u64>) {
        self.send(Command::Outliers(ids));
    }

    /// Queues a tracker state flush.
    pub fn restart(&self) {
        self.send(Command::Restart);
    }

    /// The stream of processed frames.
    pub fn output(&self) -> &Receiver<TrackedFrame> {
        &self.output
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::warn!("tracking pipeline is shut down, dropping command");
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.sync_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.track_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Pops the next synchronized frame from the input buffers, or `None` if none is ready.
///
/// In stereo mode, buffer heads further than [`SYNC_TOLERANCE`] apart are dropped (oldest first)
/// until a pair matches.
fn next_frame(
    left: &FrameBuffer,
    right: &FrameBuffer,
    stereo: bool,
) -> Option<(f64, Image, Option<Image>)> {
    if !stereo {
        let mut left = left.lock().unwrap();
        return left.pop_front().map(|(time, image)| (time, image, None));
    }

    let mut left = left.lock().unwrap();
    let mut right = right.lock().unwrap();
    loop {
        let time_left = left.front()?.0;
        let time_right = right.front()?.0;

        if time_left < time_right - SYNC_TOLERANCE {
            log::debug!("dropping unmatched left frame at t={time_left}");
            left.pop_front();
        } else if time_left > time_right + SYNC_TOLERANCE {
            log::debug!("dropping unmatched right frame at t={time_right}");
            right.pop_front();
        } else {
            let (time, left_img) = left.pop_front().unwrap();
            let (_, right_img) = right.pop_front().unwrap();
            return Some((time, left_img, Some(right_img)));
        }
    }
}
