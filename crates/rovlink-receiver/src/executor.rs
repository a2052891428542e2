//! ---
//! rovlink_section: "06-receiver-actuation"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Parses command lines and dispatches them to actuators."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::sync::Arc;

use rovlink_msg::{parse_line, ArmCommand, Command, MalformedCommand, MoveCommand};
use tracing::debug;

use crate::actuators::{ActuatorError, ArmController, MotorController};

/// What a successful dispatch did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatched {
    Move(MoveCommand),
    Arm(ArmCommand),
}

impl Dispatched {
    pub fn kind(&self) -> &'static str {
        match self {
            Dispatched::Move(_) => "move",
            Dispatched::Arm(_) => "arm",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Malformed(#[from] MalformedCommand),
    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

impl DispatchError {
    pub fn reason(&self) -> &'static str {
        match self {
            DispatchError::Malformed(malformed) => malformed.reason(),
            DispatchError::Actuator(_) => "actuator_fault",
        }
    }
}

/// Routes parsed commands to the drive and the arm.
///
/// Each dispatch awaits the actuator to completion, so a long arm move delays the next line.
pub struct CommandExecutor {
    motors: Arc<dyn MotorController>,
    arm: Arc<dyn ArmController>,
}

impl CommandExecutor {
    pub fn new(motors: Arc<dyn MotorController>, arm: Arc<dyn ArmController>) -> Self {
        Self { motors, arm }
    }

    /// Parse and execute one line. Malformed lines never reach an actuator.
    pub async fn dispatch(&self, line: &str) -> Result<Dispatched, DispatchError> {
        match parse_line(line)? {
            Command::Move(command) => {
                let magnitude = command.magnitude();
                match command {
                    MoveCommand::Forward => self.motors.forward(magnitude).await?,
                    MoveCommand::Backward => self.motors.backward(magnitude).await?,
                    MoveCommand::TurnLeft => self.motors.turn_left(magnitude).await?,
                    MoveCommand::TurnRight => self.motors.turn_right(magnitude).await?,
                }
                debug!(token = command.token(), magnitude, "move dispatched");
                Ok(Dispatched::Move(command))
            }
            Command::Arm(pose) => {
                self.arm.move_to(pose, pose.duration()).await?;
                debug!(?pose, "arm dispatched");
                Ok(Dispatched::Arm(pose))
            }
        }
    }
}
