//! Robot telemetry gauges

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::NtResult;
use crate::sync::SyncClient;
use crate::value::Value;

pub const LIFT_HEIGHT_PATH: &str = "SmartDashboard/Lift Distance";
pub const LEFT_SPEED_PATH: &str = "SmartDashboard/Left Speed (RPM)";
pub const RIGHT_SPEED_PATH: &str = "SmartDashboard/Right Speed (RPM)";
pub const TIME_RUNNING_PATH: &str = "SmartDashboard/time_running";

/// Length of a match in seconds
pub const MATCH_SECONDS: u32 = 135;

/// Needle sweep of the accelerometer in degrees
const NEEDLE_SWEEP: f64 = 240.0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lift height gauge
#[derive(Clone)]
pub struct Lift {
    max_height: f64,
    height: Arc<Mutex<f64>>,
}

impl Lift {
    pub fn new(client: &SyncClient, max_height: f64) -> NtResult<Self> {
        let lift = Self {
            max_height,
            height: Arc::new(Mutex::new(0.0)),
        };
        let height = lift.height.clone();
        client.add_double_listener(LIFT_HEIGHT_PATH, move |h| *lock(&height) = h)?;
        Ok(lift)
    }

    pub fn height(&self) -> f64 {
        *lock(&self.height)
    }

    pub fn max_height(&self) -> f64 {
        self.max_height
    }

    /// Height as a fraction of the maximum
    pub fn fraction(&self) -> f64 {
        if self.max_height <= 0.0 {
            return 0.0;
        }
        self.height() / self.max_height
    }
}

/// Drive speed gauge
#[derive(Clone)]
pub struct Accelerometer {
    max_rpm: f64,
    /// (left, right)
    speeds: Arc<Mutex<(f64, f64)>>,
}

impl Accelerometer {
    pub fn new(client: &SyncClient, max_rpm: f64) -> NtResult<Self> {
        let gauge = Self {
            max_rpm,
            speeds: Arc::new(Mutex::new((0.0, 0.0))),
        };
        let speeds = gauge.speeds.clone();
        client.add_double_listener(LEFT_SPEED_PATH, move |rpm| lock(&speeds).0 = rpm)?;
        let speeds = gauge.speeds.clone();
        client.add_double_listener(RIGHT_SPEED_PATH, move |rpm| lock(&speeds).1 = rpm)?;
        Ok(gauge)
    }

    /// Mean of both sides, rounded to hundredths, unsigned
    pub fn velocity(&self) -> f64 {
        let (left, right) = *lock(&self.speeds);
        mean_velocity(left, right)
    }

    /// Needle angle, -120 at rest
    pub fn degrees(&self) -> i32 {
        needle_degrees(self.velocity(), self.max_rpm)
    }
}

pub fn mean_velocity(left: f64, right: f64) -> f64 {
    (((left + right) / 2.0) * 100.0).round_ties_even().abs() / 100.0
}

pub fn needle_degrees(velocity: f64, max_rpm: f64) -> i32 {
    if max_rpm <= 0.0 {
        return -(NEEDLE_SWEEP / 2.0) as i32;
    }
    (velocity / max_rpm * NEEDLE_SWEEP).round_ties_even() as i32 - (NEEDLE_SWEEP / 2.0) as i32
}

#[derive(Debug, Clone, Copy)]
struct TimerState {
    seconds: u32,
    running: bool,
}

/// Match countdown, started and stopped by the robot
#[derive(Clone)]
pub struct MatchTimer {
    state: Arc<Mutex<TimerState>>,
}

impl Default for MatchTimer {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(TimerState {
                seconds: MATCH_SECONDS,
                running: false,
            })),
        }
    }
}

impl MatchTimer {
    /// Follow `SmartDashboard/time_running`
    pub fn new(client: &SyncClient) -> NtResult<Self> {
        let timer = Self::default();
        let handle = timer.clone();
        client.add_value_listener(TIME_RUNNING_PATH, move |value| handle.on_time_running(&value))?;
        Ok(timer)
    }

    /// The robot sends either a bool or the string "true"
    fn on_time_running(&self, value: &Value) {
        let should_run = match value {
            Value::Bool(running) => *running,
            Value::String(text) => text == "true",
            _ => false,
        };

        if should_run {
            self.start();
        } else if self.is_running() {
            debug!("Match timer stopped by robot");
            self.stop_and_reset();
        }
    }

    pub fn start(&self) {
        lock(&self.state).running = true;
    }

    pub fn stop(&self) {
        lock(&self.state).running = false;
    }

    pub fn stop_and_reset(&self) {
        *lock(&self.state) = TimerState {
            seconds: MATCH_SECONDS,
            running: false,
        };
    }

    /// One second elapsed
    pub fn tick(&self) {
        let mut state = lock(&self.state);
        if state.running {
            state.seconds = state.seconds.saturating_sub(1);
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    pub fn seconds(&self) -> u32 {
        lock(&self.state).seconds
    }

    /// `m:ss`
    pub fn display(&self) -> String {
        format_clock(self.seconds())
    }
}

pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{Dispatcher, SyncOptions};
    use crate::transport::MemoryServer;

    fn client(server: &MemoryServer) -> (SyncClient, Dispatcher) {
        let client = SyncClient::new(Arc::new(server.connector()), SyncOptions::default());
        let dispatcher = client.take_dispatcher().unwrap();
        (client, dispatcher)
    }

    #[test]
    fn test_velocity_math() {
        assert_eq!(mean_velocity(3.0, 5.0), 4.0);
        assert_eq!(mean_velocity(-3.0, -5.0), 4.0);
        assert_eq!(mean_velocity(1.111, 1.113), 1.11);
        assert_eq!(needle_degrees(0.0, 10.0), -120);
        assert_eq!(needle_degrees(10.0, 10.0), 120);
        assert_eq!(needle_degrees(5.0, 10.0), 0);
        assert_eq!(needle_degrees(5.0, 0.0), -120);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(135), "2:15");
        assert_eq!(format_clock(65), "1:05");
        assert_eq!(format_clock(9), "0:09");
        assert_eq!(format_clock(0), "0:00");
    }

    #[test]
    fn test_timer_countdown() {
        let timer = MatchTimer::default();
        timer.tick();
        assert_eq!(timer.display(), "2:15");

        timer.start();
        timer.tick();
        timer.tick();
        assert_eq!(timer.seconds(), 133);

        timer.stop_and_reset();
        assert!(!timer.is_running());
        assert_eq!(timer.seconds(), MATCH_SECONDS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gauges_follow_table() {
        let server = MemoryServer::new("10.0.0.2");
        server.put(LIFT_HEIGHT_PATH, 3.5);
        server.put(LEFT_SPEED_PATH, 4.0);
        server.put(RIGHT_SPEED_PATH, 6.0);
        let (client, mut dispatcher) = client(&server);
        let lift = Lift::new(&client, 7.0).unwrap();
        let gauge = Accelerometer::new(&client, 10.0).unwrap();

        assert!(client.connect("10.0.0.2").await);
        dispatcher.dispatch_pending();

        assert_eq!(lift.fraction(), 0.5);
        assert_eq!(gauge.velocity(), 5.0);
        assert_eq!(gauge.degrees(), 0);

        server.put(LIFT_HEIGHT_PATH, 7.0);
        dispatcher.dispatch_pending();
        assert_eq!(lift.fraction(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_follows_robot() {
        let server = MemoryServer::new("10.0.0.2");
        let (client, mut dispatcher) = client(&server);
        let timer = MatchTimer::new(&client).unwrap();
        assert!(client.connect("10.0.0.2").await);
        dispatcher.dispatch_pending();
        assert!(!timer.is_running());

        server.put(TIME_RUNNING_PATH, "true");
        dispatcher.dispatch_pending();
        assert!(timer.is_running());
        timer.tick();
        assert_eq!(timer.display(), "2:14");

        server.put(TIME_RUNNING_PATH, false);
        dispatcher.dispatch_pending();
        assert!(!timer.is_running());
        assert_eq!(timer.display(), "2:15");
    }
}
