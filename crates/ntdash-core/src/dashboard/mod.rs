//! Dashboard consumers
//!
//! Non-visual logic behind each dashboard panel. Every consumer registers
//! its listeners on a shared [`SyncClient`] at construction and keeps its
//! own state, updated from the dispatcher.

mod autonomous;
mod camera;
mod telemetry;
mod warnings;

pub use autonomous::{
    parse_auto_modes, AutoMode, AutonomousSelector, StartPosition, AUTONOMOUS_TABLE,
    AUTO_MODES_KEY, SELECTED_MODES_KEY, SELECTED_POSITION_KEY,
};
pub use camera::{settings_url_from, stream_url_from, CameraDirectory, CAMERA_TABLE};
pub use telemetry::{
    format_clock, mean_velocity, needle_degrees, Accelerometer, Lift, MatchTimer,
    LEFT_SPEED_PATH, LIFT_HEIGHT_PATH, MATCH_SECONDS, RIGHT_SPEED_PATH, TIME_RUNNING_PATH,
};
pub use warnings::{
    Cautioner, WarningsMirror, CURRENT_WARNINGS_KEY, DEFAULT_MESSAGE, ROTATE_INTERVAL_SECS,
    WARNINGS_TABLE,
};

use serde::Serialize;

use crate::config::Config;
use crate::error::NtResult;
use crate::path;
use crate::sync::SyncClient;

/// Entries the panels read from the robot
pub fn panel_paths() -> Vec<String> {
    vec![
        LIFT_HEIGHT_PATH.to_string(),
        LEFT_SPEED_PATH.to_string(),
        RIGHT_SPEED_PATH.to_string(),
        TIME_RUNNING_PATH.to_string(),
        path::join(WARNINGS_TABLE, CURRENT_WARNINGS_KEY),
        path::join(AUTONOMOUS_TABLE, AUTO_MODES_KEY),
        path::join(AUTONOMOUS_TABLE, SELECTED_MODES_KEY),
        path::join(AUTONOMOUS_TABLE, SELECTED_POSITION_KEY),
    ]
}

/// Every panel wired to one client
pub struct Dashboard {
    client: SyncClient,
    pub autonomous: AutonomousSelector,
    pub warnings: WarningsMirror,
    pub lift: Lift,
    pub accelerometer: Accelerometer,
    pub timer: MatchTimer,
    pub cameras: CameraDirectory,
}

/// Point-in-time view of every panel
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub status: &'static str,
    pub lift_height: f64,
    pub lift_fraction: f64,
    pub velocity: f64,
    pub needle_degrees: i32,
    pub match_time: String,
    pub timer_running: bool,
    pub caution: String,
    pub warnings: Vec<String>,
    pub auto_modes: Vec<AutoMode>,
    pub selected_modes: Vec<String>,
    pub cameras: Vec<String>,
    pub selected_camera: Option<String>,
}

impl Dashboard {
    /// Register every panel; call before connecting so replay reaches them
    pub fn new(client: &SyncClient, config: &Config) -> NtResult<Self> {
        Ok(Self {
            client: client.clone(),
            autonomous: AutonomousSelector::new(client.clone())?,
            warnings: WarningsMirror::new(client.clone())?,
            lift: Lift::new(client, config.max_lift_height)?,
            accelerometer: Accelerometer::new(client, config.max_rpm)?,
            timer: MatchTimer::new(client)?,
            cameras: CameraDirectory::new(client.clone()),
        })
    }

    /// Advance clocks by one second
    ///
    /// `elapsed` is the number of seconds since start; warnings rotate on
    /// every [`ROTATE_INTERVAL_SECS`]th second.
    pub fn tick(&self, elapsed: u64) {
        self.timer.tick();
        if elapsed % ROTATE_INTERVAL_SECS == 0 {
            self.warnings.tick();
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            status: self.client.status_message(),
            lift_height: self.lift.height(),
            lift_fraction: self.lift.fraction(),
            velocity: self.accelerometer.velocity(),
            needle_degrees: self.accelerometer.degrees(),
            match_time: self.timer.display(),
            timer_running: self.timer.is_running(),
            caution: self.warnings.message(),
            warnings: self.warnings.warnings(),
            auto_modes: self.autonomous.modes(),
            selected_modes: self.autonomous.selected_ids(),
            cameras: self.cameras.available(),
            selected_camera: self.cameras.selected(),
        }
    }
}
