// Frame timer
//
// Counts frames per wall-clock second and keeps ten-entry histograms of FPS
// and frame time for the statistics overlay.

use std::time::Instant;

pub const HISTOGRAM_SIZE: usize = 10;

/// Starting value of every statistic until real samples arrive
const INITIAL_VALUE: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct TimerData {
    start: Instant,
    last_update: Instant,
    time: f64,
    delta_time: f32,
    average_delta_time: f32,
    average_fps: f32,
    current_second_fps: f32,
    previous_second: u64,
    fps_histogram: [f32; HISTOGRAM_SIZE],
    delta_time_histogram: [f32; HISTOGRAM_SIZE],
}

impl Default for TimerData {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerData {
    pub fn new() -> Self {
        let now = Instant::now();
        let mut timer = Self {
            start: now,
            last_update: now,
            time: 0.0,
            delta_time: INITIAL_VALUE,
            average_delta_time: INITIAL_VALUE,
            average_fps: INITIAL_VALUE,
            current_second_fps: INITIAL_VALUE,
            previous_second: 0,
            fps_histogram: [INITIAL_VALUE; HISTOGRAM_SIZE],
            delta_time_histogram: [INITIAL_VALUE; HISTOGRAM_SIZE],
        };
        timer.update();
        timer
    }

    /// Sample the clock; call once per frame
    pub fn update(&mut self) {
        let now = Instant::now();
        let delta = now.duration_since(self.last_update);
        self.last_update = now;

        self.tick(
            now.duration_since(self.start).as_secs_f64(),
            delta.as_secs_f32(),
        );
    }

    /// Advance to `time` seconds, `delta_time` seconds after the previous tick
    pub fn tick(&mut self, time: f64, delta_time: f32) {
        self.time = time;
        self.delta_time = delta_time;

        // Alternates every second; a change closes the previous second's bucket
        let current_second = (time as u64) % 2;
        if current_second != self.previous_second {
            self.average_fps = self.current_second_fps
                + self.fps_histogram[1..].iter().sum::<f32>();

            self.fps_histogram.rotate_left(1);
            self.delta_time_histogram.rotate_left(1);
            self.fps_histogram[HISTOGRAM_SIZE - 1] = self.current_second_fps;
            self.delta_time_histogram[HISTOGRAM_SIZE - 1] = 1000.0 / self.current_second_fps;

            self.average_fps *= 1.0 / HISTOGRAM_SIZE as f32;
            self.average_delta_time = 1000.0 / self.average_fps;
            self.current_second_fps = 0.0;
        }
        self.current_second_fps += 1.0;
        self.previous_second = current_second;
    }

    /// Seconds since the timer was created
    pub fn time(&self) -> f32 {
        self.time as f32
    }

    /// Seconds between the last two updates
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Milliseconds per frame averaged over the histogram
    pub fn average_delta_time(&self) -> f32 {
        self.average_delta_time
    }

    pub fn average_fps(&self) -> f32 {
        self.average_fps
    }

    pub fn fps_histogram(&self) -> &[f32; HISTOGRAM_SIZE] {
        &self.fps_histogram
    }

    pub fn delta_time_histogram(&self) -> &[f32; HISTOGRAM_SIZE] {
        &self.delta_time_histogram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fresh() -> TimerData {
        let mut timer = TimerData::new();
        // Pin to the start of an even second with no frames counted yet
        timer.previous_second = 0;
        timer.current_second_fps = 0.0;
        timer
    }

    #[test]
    fn starts_with_initial_statistics() {
        let timer = TimerData::new();
        assert_eq!(timer.fps_histogram(), &[INITIAL_VALUE; HISTOGRAM_SIZE]);
        assert_eq!(timer.delta_time_histogram(), &[INITIAL_VALUE; HISTOGRAM_SIZE]);
        assert_relative_eq!(timer.average_fps(), INITIAL_VALUE);
    }

    #[test]
    fn counts_frames_within_a_second() {
        let mut timer = fresh();
        for i in 0..30 {
            timer.tick(0.01 * i as f64, 0.01);
        }
        // Histograms untouched until the second changes
        assert_eq!(timer.fps_histogram()[HISTOGRAM_SIZE - 1], INITIAL_VALUE);
        assert_relative_eq!(timer.current_second_fps, 30.0);
    }

    #[test]
    fn second_change_pushes_histogram() {
        let mut timer = fresh();
        for i in 0..50 {
            timer.tick(0.02 * i as f64, 0.02);
        }
        timer.tick(1.0, 0.02);

        assert_relative_eq!(timer.fps_histogram()[HISTOGRAM_SIZE - 1], 50.0);
        assert_relative_eq!(timer.delta_time_histogram()[HISTOGRAM_SIZE - 1], 20.0);

        // Nine older buckets of 10 plus the new one, divided by ten
        assert_relative_eq!(timer.average_fps(), (9.0 * INITIAL_VALUE + 50.0) / 10.0);
        assert_relative_eq!(timer.average_delta_time(), 1000.0 / timer.average_fps());

        // The frame that closed the bucket starts the next one
        assert_relative_eq!(timer.current_second_fps, 1.0);
    }

    #[test]
    fn histogram_shifts_left() {
        let mut timer = fresh();
        timer.fps_histogram = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        timer.current_second_fps = 11.0;
        timer.tick(1.5, 0.1);

        assert_eq!(
            timer.fps_histogram(),
            &[2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0]
        );
    }

    #[test]
    fn update_measures_elapsed_time() {
        let mut timer = TimerData::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        timer.update();
        assert!(timer.delta_time() >= 0.005);
        assert!(timer.time() >= 0.005);
    }
}
