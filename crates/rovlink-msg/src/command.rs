//! ---
//! rovlink_section: "02-wire-protocols"
//! rovlink_subsection: "module"
//! rovlink_type: "source"
//! rovlink_scope: "code"
//! rovlink_description: "Typed drive and arm commands and their serial line form."
//! rovlink_version: "v0.0.0-prealpha"
//! rovlink_owner: "tbd"
//! ---
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Prefix of drive command lines.
pub const MOVE_PREFIX: &str = "MOVE:";
/// Prefix of arm command lines.
pub const ARM_PREFIX: &str = "ARM:";

/// Distance units covered by a single forward or backward command.
pub const DRIVE_DISTANCE: f32 = 5.0;
/// Degrees turned by a single turn command.
pub const TURN_DEGREES: f32 = 30.0;
/// Time allotted to every arm transition.
pub const ARM_TRANSITION: Duration = Duration::from_millis(200);

/// Drive manoeuvres understood by the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveCommand {
    /// `W`
    Forward,
    /// `S`
    Backward,
    /// `A`
    TurnLeft,
    /// `D`
    TurnRight,
}

impl MoveCommand {
    /// Map a wire token to a manoeuvre. Tokens are case sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "W" => Some(MoveCommand::Forward),
            "S" => Some(MoveCommand::Backward),
            "A" => Some(MoveCommand::TurnLeft),
            "D" => Some(MoveCommand::TurnRight),
            _ => None,
        }
    }

    /// Wire token for this manoeuvre.
    pub fn token(&self) -> &'static str {
        match self {
            MoveCommand::Forward => "W",
            MoveCommand::Backward => "S",
            MoveCommand::TurnLeft => "A",
            MoveCommand::TurnRight => "D",
        }
    }

    /// Fixed magnitude: distance units for straight moves, degrees for turns.
    pub fn magnitude(&self) -> f32 {
        match self {
            MoveCommand::Forward | MoveCommand::Backward => DRIVE_DISTANCE,
            MoveCommand::TurnLeft | MoveCommand::TurnRight => TURN_DEGREES,
        }
    }
}

/// Target joint angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmCommand {
    /// Base rotation, `0..=180`.
    pub base: f32,
    /// Shoulder lift, `0..=90`.
    pub shoulder: f32,
    /// Elbow bend, `0..=180`.
    pub elbow: f32,
}

impl ArmCommand {
    /// Allowed base range.
    pub const BASE_RANGE: RangeInclusive<f32> = 0.0..=180.0;
    /// Allowed shoulder range.
    pub const SHOULDER_RANGE: RangeInclusive<f32> = 0.0..=90.0;
    /// Allowed elbow range.
    pub const ELBOW_RANGE: RangeInclusive<f32> = 0.0..=180.0;

    /// Build a pose from finite angles, clamping each joint into its range.
    pub fn new(base: f32, shoulder: f32, elbow: f32) -> Result<Self, MalformedCommand> {
        for value in [base, shoulder, elbow] {
            if !value.is_finite() {
                return Err(MalformedCommand::InvalidNumber(value.to_string()));
            }
        }
        Ok(Self {
            base: clamp_to(base, &Self::BASE_RANGE),
            shoulder: clamp_to(shoulder, &Self::SHOULDER_RANGE),
            elbow: clamp_to(elbow, &Self::ELBOW_RANGE),
        })
    }

    /// Transition duration applied to every arm move.
    pub fn duration(&self) -> Duration {
        ARM_TRANSITION
    }
}

fn clamp_to(value: f32, range: &RangeInclusive<f32>) -> f32 {
    value.clamp(*range.start(), *range.end())
}

/// A parsed command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Drive manoeuvre.
    Move(MoveCommand),
    /// Arm pose.
    Arm(ArmCommand),
}

impl Command {
    /// Metrics label for the command kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Move(_) => "move",
            Command::Arm(_) => "arm",
        }
    }
}

/// Reasons a received line is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedCommand {
    /// `MOVE:` followed by anything other than `W`, `S`, `A` or `D`.
    #[error("unknown move token {0:?}")]
    UnknownMoveToken(String),
    /// `ARM:` without exactly three fields.
    #[error("arm command expects 3 fields, got {0}")]
    WrongArity(usize),
    /// A field that is not a finite number.
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    /// Neither prefix matched.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
}

impl MalformedCommand {
    /// Metrics label for the rejection reason.
    pub fn reason(&self) -> &'static str {
        match self {
            MalformedCommand::UnknownMoveToken(_) => "unknown_move_token",
            MalformedCommand::WrongArity(_) => "wrong_arity",
            MalformedCommand::InvalidNumber(_) => "invalid_number",
            MalformedCommand::UnknownCommand(_) => "unknown_command",
        }
    }
}

/// Parse one received line. Trailing whitespace (including `\r`) is ignored.
pub fn parse_line(line: &str) -> Result<Command, MalformedCommand> {
    let line = line.trim_end();
    if let Some(token) = line.strip_prefix(MOVE_PREFIX) {
        return MoveCommand::from_token(token)
            .map(Command::Move)
            .ok_or_else(|| MalformedCommand::UnknownMoveToken(token.to_owned()));
    }
    if let Some(fields) = line.strip_prefix(ARM_PREFIX) {
        let parts: Vec<&str> = fields.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(MalformedCommand::WrongArity(parts.len()));
        }
        let mut angles = [0f32; 3];
        for (slot, part) in angles.iter_mut().zip(&parts) {
            *slot = parse_finite(part)?;
        }
        return ArmCommand::new(angles[0], angles[1], angles[2]).map(Command::Arm);
    }
    Err(MalformedCommand::UnknownCommand(line.to_owned()))
}

fn parse_finite(text: &str) -> Result<f32, MalformedCommand> {
    text.parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| MalformedCommand::InvalidNumber(text.to_owned()))
}

/// Errors raised while building a [`CommandLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandLineError {
    /// The text contains `\n` or `\r`, which would split it on the wire.
    #[error("command line contains a line break")]
    EmbeddedLineBreak,
    /// An arm parameter is NaN or infinite.
    #[error("arm parameter is not a finite number")]
    NonFinite,
}

/// Text of one serial command, without its terminating newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine(String);

impl CommandLine {
    /// Wrap arbitrary text, rejecting embedded line breaks.
    pub fn new(text: impl Into<String>) -> Result<Self, CommandLineError> {
        let text = text.into();
        if text.contains(['\n', '\r']) {
            return Err(CommandLineError::EmbeddedLineBreak);
        }
        Ok(Self(text))
    }

    /// `MOVE:<token>` with the token forwarded verbatim.
    pub fn for_move_token(token: &str) -> Result<Self, CommandLineError> {
        Self::new(format!("{MOVE_PREFIX}{token}"))
    }

    /// `ARM:<b>,<h>,<c>` using the shortest float text (`10.0` renders as `10`).
    pub fn for_arm(base: f32, shoulder: f32, elbow: f32) -> Result<Self, CommandLineError> {
        if ![base, shoulder, elbow].iter().all(|v| v.is_finite()) {
            return Err(CommandLineError::NonFinite);
        }
        Self::new(format!("{ARM_PREFIX}{base},{shoulder},{elbow}"))
    }

    /// Line text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Metrics label derived from the prefix.
    pub fn kind(&self) -> &'static str {
        if self.0.starts_with(MOVE_PREFIX) {
            "move"
        } else if self.0.starts_with(ARM_PREFIX) {
            "arm"
        } else {
            "other"
        }
    }
}

impl From<MoveCommand> for CommandLine {
    fn from(command: MoveCommand) -> Self {
        Self(format!("{MOVE_PREFIX}{}", command.token()))
    }
}

impl From<ArmCommand> for CommandLine {
    fn from(arm: ArmCommand) -> Self {
        Self(format!(
            "{ARM_PREFIX}{},{},{}",
            arm.base, arm.shoulder, arm.elbow
        ))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_move_token() {
        for (line, expected) in [
            ("MOVE:W", MoveCommand::Forward),
            ("MOVE:S", MoveCommand::Backward),
            ("MOVE:A", MoveCommand::TurnLeft),
            ("MOVE:D\r", MoveCommand::TurnRight),
        ] {
            assert_eq!(parse_line(line), Ok(Command::Move(expected)));
        }
    }

    #[test]
    fn rejects_unknown_and_empty_move_tokens() {
        assert_eq!(
            parse_line("MOVE:Q"),
            Err(MalformedCommand::UnknownMoveToken("Q".into()))
        );
        assert_eq!(
            parse_line("MOVE:"),
            Err(MalformedCommand::UnknownMoveToken(String::new()))
        );
        assert_eq!(
            parse_line("MOVE:w"),
            Err(MalformedCommand::UnknownMoveToken("w".into()))
        );
    }

    #[test]
    fn parses_arm_fields_with_whitespace() {
        assert_eq!(
            parse_line("ARM: 10, 20 ,30.5\n"),
            Ok(Command::Arm(ArmCommand {
                base: 10.0,
                shoulder: 20.0,
                elbow: 30.5
            }))
        );
    }

    #[test]
    fn clamps_arm_angles_into_range() {
        let arm = ArmCommand::new(-15.0, 120.0, 181.0).unwrap();
        assert_eq!((arm.base, arm.shoulder, arm.elbow), (0.0, 90.0, 180.0));
    }

    #[test]
    fn rejects_bad_arm_lines() {
        assert_eq!(parse_line("ARM:10,20"), Err(MalformedCommand::WrongArity(2)));
        assert_eq!(parse_line("ARM:"), Err(MalformedCommand::WrongArity(1)));
        assert_eq!(
            parse_line("ARM:10,x,30"),
            Err(MalformedCommand::InvalidNumber("x".into()))
        );
        assert!(matches!(
            parse_line("ARM:10,NaN,30"),
            Err(MalformedCommand::InvalidNumber(_))
        ));
        assert!(matches!(
            parse_line("ARM:inf,1,1"),
            Err(MalformedCommand::InvalidNumber(_))
        ));
    }

    #[test]
    fn unknown_prefix_is_rejected() {
        assert_eq!(
            parse_line("JUMP:1"),
            Err(MalformedCommand::UnknownCommand("JUMP:1".into()))
        );
    }

    #[test]
    fn command_line_rejects_line_breaks() {
        assert_eq!(
            CommandLine::for_move_token("W\nARM:0,0,0"),
            Err(CommandLineError::EmbeddedLineBreak)
        );
        assert_eq!(
            CommandLine::new("MOVE:W\r"),
            Err(CommandLineError::EmbeddedLineBreak)
        );
    }

    #[test]
    fn arm_line_uses_shortest_float_text() {
        let line = CommandLine::for_arm(10.0, 20.0, 30.0).unwrap();
        assert_eq!(line.as_str(), "ARM:10,20,30");
        assert_eq!(line.kind(), "arm");
        let line = CommandLine::for_arm(12.5, 0.0, 179.75).unwrap();
        assert_eq!(line.as_str(), "ARM:12.5,0,179.75");
        assert_eq!(
            CommandLine::for_arm(f32::NAN, 0.0, 0.0),
            Err(CommandLineError::NonFinite)
        );
    }

    #[test]
    fn typed_commands_render_parseable_lines() {
        let line = CommandLine::from(MoveCommand::TurnLeft);
        assert_eq!(line.as_str(), "MOVE:A");
        let arm = ArmCommand::new(45.0, 30.0, 90.0).unwrap();
        let line = CommandLine::from(arm);
        assert_eq!(parse_line(line.as_str()), Ok(Command::Arm(arm)));
    }
}
