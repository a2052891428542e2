//! ---
//! rovlink_section: "06-receiver-actuation"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Drive and arm actuator interfaces with simulated implementations."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rovlink_msg::ArmCommand;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("actuator fault: {0}")]
    Fault(String),
}

/// Differential drive. Each call returns once the motion has finished.
#[async_trait]
pub trait MotorController: Send + Sync {
    async fn forward(&self, distance: f32) -> Result<(), ActuatorError>;
    async fn backward(&self, distance: f32) -> Result<(), ActuatorError>;
    async fn turn_left(&self, degrees: f32) -> Result<(), ActuatorError>;
    async fn turn_right(&self, degrees: f32) -> Result<(), ActuatorError>;
}

/// Three-joint arm. `move_to` returns after `duration` with the arm at `pose`.
#[async_trait]
pub trait ArmController: Send + Sync {
    async fn move_to(&self, pose: ArmCommand, duration: Duration) -> Result<(), ActuatorError>;
}

const MS_PER_DISTANCE_UNIT: f32 = 100.0;
const MS_PER_DEGREE: f32 = 10.0;

fn scaled(millis: f32, time_scale: f32) -> Duration {
    Duration::from_secs_f32((millis * time_scale).max(0.0) / 1000.0)
}

/// Dead-reckoned pose of the simulated drive.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Odometry {
    pub x: f32,
    pub y: f32,
    /// Degrees, counter-clockwise, normalised to `[0, 360)`.
    pub heading: f32,
    pub travelled: f32,
}

/// Drive that logs each manoeuvre and sleeps for its duration.
#[derive(Debug)]
pub struct SimulatedDrive {
    time_scale: f32,
    odometry: Mutex<Odometry>,
}

impl SimulatedDrive {
    pub fn new(time_scale: f32) -> Self {
        Self {
            time_scale,
            odometry: Mutex::new(Odometry::default()),
        }
    }

    pub fn odometry(&self) -> Odometry {
        *self.odometry.lock()
    }

    async fn drive(&self, distance: f32) {
        tokio::time::sleep(scaled(distance.abs() * MS_PER_DISTANCE_UNIT, self.time_scale)).await;
        let mut odo = self.odometry.lock();
        let radians = odo.heading.to_radians();
        odo.x += distance * radians.cos();
        odo.y += distance * radians.sin();
        odo.travelled += distance.abs();
        info!(distance, x = odo.x, y = odo.y, "drive moved");
    }

    async fn turn(&self, degrees: f32) {
        tokio::time::sleep(scaled(degrees.abs() * MS_PER_DEGREE, self.time_scale)).await;
        let mut odo = self.odometry.lock();
        odo.heading = (odo.heading + degrees).rem_euclid(360.0);
        info!(degrees, heading = odo.heading, "drive turned");
    }
}

#[async_trait]
impl MotorController for SimulatedDrive {
    async fn forward(&self, distance: f32) -> Result<(), ActuatorError> {
        self.drive(distance).await;
        Ok(())
    }

    async fn backward(&self, distance: f32) -> Result<(), ActuatorError> {
        self.drive(-distance).await;
        Ok(())
    }

    async fn turn_left(&self, degrees: f32) -> Result<(), ActuatorError> {
        self.turn(degrees).await;
        Ok(())
    }

    async fn turn_right(&self, degrees: f32) -> Result<(), ActuatorError> {
        self.turn(-degrees).await;
        Ok(())
    }
}

/// Arm that logs each move and holds the commanded pose.
#[derive(Debug)]
pub struct SimulatedArm {
    time_scale: f32,
    pose: Mutex<ArmCommand>,
}

impl SimulatedArm {
    pub fn new(time_scale: f32) -> Self {
        Self {
            time_scale,
            pose: Mutex::new(ArmCommand {
                base: 90.0,
                shoulder: 45.0,
                elbow: 90.0,
            }),
        }
    }

    pub fn pose(&self) -> ArmCommand {
        *self.pose.lock()
    }
}

#[async_trait]
impl ArmController for SimulatedArm {
    async fn move_to(&self, pose: ArmCommand, duration: Duration) -> Result<(), ActuatorError> {
        tokio::time::sleep(duration.mul_f32(self.time_scale.max(0.0))).await;
        *self.pose.lock() = pose;
        info!(
            base = pose.base,
            shoulder = pose.shoulder,
            elbow = pose.elbow,
            "arm moved"
        );
        Ok(())
    }
}
