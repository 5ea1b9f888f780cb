use std::fmt;

use crate::error::Result;
use crate::Error;

const NAMES: [&str; 5] = ["OK", "INSTALLED", "TESTING", "FAILED", "UNKNOWN"];

/// Update state of an environment as seen by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum UpdateState {
    #[default]
    Ok = 0,
    Installed = 1,
    Testing = 2,
    Failed = 3,
    Unknown = 4,
}

impl UpdateState {
    /// The states a user may request; `Unknown` is only ever read back.
    pub const SETTABLE: [UpdateState; 4] = [
        UpdateState::Ok,
        UpdateState::Installed,
        UpdateState::Testing,
        UpdateState::Failed,
    ];

    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => UpdateState::Ok,
            1 => UpdateState::Installed,
            2 => UpdateState::Testing,
            3 => UpdateState::Failed,
            _ => UpdateState::Unknown,
        }
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        NAMES[self as usize]
    }

    /// Case-insensitive prefix match: the input has to start with one of the
    /// settable state names. Anything else is `Unknown`.
    pub fn from_name(input: &str) -> Self {
        let input = input.as_bytes();
        Self::SETTABLE
            .into_iter()
            .find(|state| {
                let name = state.name().as_bytes();
                input.len() >= name.len() && input[..name.len()].eq_ignore_ascii_case(name)
            })
            .unwrap_or(UpdateState::Unknown)
    }

    /// Parses user input, either numeric (0-3) or a state name.
    pub fn parse_arg(input: &str) -> Result<Self> {
        let input = input.trim();
        if let Ok(value) = input.parse::<i64>() {
            return match value {
                0..=3 => Ok(Self::from_raw(value as u8)),
                _ => Err(Error::validation(format!(
                    "Invalid ustate value specified. Possible values: 0 ({}), 1 ({}), 2 ({}), 3 ({})",
                    NAMES[0], NAMES[1], NAMES[2], NAMES[3]
                ))),
            };
        }
        match Self::from_name(input) {
            UpdateState::Unknown => Err(Error::validation(format!(
                "Invalid state specified: {}",
                input
            ))),
            state => Ok(state),
        }
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
