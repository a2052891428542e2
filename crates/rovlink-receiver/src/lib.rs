//! ---
//! rovlink_section: "06-receiver-actuation"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Motor and arm controller service."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---

pub mod actuators;
pub mod executor;
pub mod runtime;

pub use actuators::{
    ActuatorError, ArmController, MotorController, Odometry, SimulatedArm, SimulatedDrive,
};
pub use executor::{CommandExecutor, DispatchError, Dispatched};
pub use runtime::{run_receiver, serve_session, Receiver, SerialReader, SerialSource};
