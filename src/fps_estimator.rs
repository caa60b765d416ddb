use std::time::{Duration, Instant};

/// Measures the wall-clock delta between frames and logs the achieved rate
/// about once a second. The simulation advances by the measured dt, so a
/// slow frame stretches that step rather than dropping time.
#[derive(Debug)]
pub struct FpsEstimator {
    frame_start: Instant,
    target_frame_duration: Duration,
    window_start: Instant,
    window_frames: u32,
}

impl FpsEstimator {
    pub fn new(fps: f64) -> FpsEstimator {
        let now = Instant::now();
        FpsEstimator {
            frame_start: now,
            target_frame_duration: Duration::from_secs_f64(1.0 / fps),
            window_start: now,
            window_frames: 0,
        }
    }

    pub fn tick(&mut self) -> Duration {
        let delta_t = self.frame_start.elapsed();
        self.frame_start = Instant::now();

        if delta_t > self.target_frame_duration * 2 {
            log::debug!("Slow frame: {:?}", delta_t);
        }

        self.window_frames += 1;
        let window = self.window_start.elapsed();
        if window >= Duration::from_secs(1) {
            let fps = self.window_frames as f64 / window.as_secs_f64();
            log::info!("FPS: {:.1}", fps);
            self.window_start = self.frame_start;
            self.window_frames = 0;
        }
        delta_t
    }
}
