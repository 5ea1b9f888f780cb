use crate::codec::{nul_terminated, text_payload};
use crate::commit::UpdateStateApi;
use crate::env::{check_text, EnvRecord, UpdateState};
use crate::error::Result;
use crate::Error;

/// The fixed fields of an environment record. Anything else a journal
/// action names is a user variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownField {
    KernelFile,
    KernelParams,
    Revision,
    WatchdogTimeout,
    UpdateState,
    InProgress,
}

impl WellKnownField {
    pub const ALL: [WellKnownField; 6] = [
        WellKnownField::KernelFile,
        WellKnownField::KernelParams,
        WellKnownField::Revision,
        WellKnownField::WatchdogTimeout,
        WellKnownField::UpdateState,
        WellKnownField::InProgress,
    ];

    pub fn key(self) -> &'static str {
        match self {
            WellKnownField::KernelFile => "kernelfile",
            WellKnownField::KernelParams => "kernelparams",
            WellKnownField::Revision => "revision",
            WellKnownField::WatchdogTimeout => "watchdog_timeout_sec",
            WellKnownField::UpdateState => "ustate",
            WellKnownField::InProgress => "in_progress",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    /// Validates a command line argument and turns it into the payload
    /// staged in the journal. Nothing invalid gets past this point.
    pub fn encode_arg(self, arg: &str) -> Result<Vec<u8>> {
        let text = match self {
            WellKnownField::KernelFile | WellKnownField::KernelParams => {
                check_text(self.key(), arg)?;
                arg.to_string()
            }
            WellKnownField::Revision => parse_number::<u32>(arg, "revision")?.to_string(),
            WellKnownField::WatchdogTimeout => {
                parse_number::<u16>(arg, "watchdog timeout")?.to_string()
            }
            WellKnownField::UpdateState => UpdateState::parse_arg(arg)?.as_raw().to_string(),
            WellKnownField::InProgress => match parse_number::<u8>(arg, "in_progress")? {
                v @ 0..=1 => v.to_string(),
                _ => {
                    return Err(Error::validation(
                        "Invalid value specified. Possible values: 0 (no), 1 (yes)",
                    ))
                }
            },
        };
        Ok(nul_terminated(&text))
    }

    /// Writes a staged payload into `record`.
    pub fn apply(
        self,
        record: &mut EnvRecord,
        payload: &[u8],
        state_api: &mut dyn UpdateStateApi,
    ) -> Result<()> {
        let text = text_payload(payload);
        let text = text.as_str();
        match self {
            WellKnownField::KernelFile => record
                .set_kernelfile(text)
                .map_err(|e| Error::apply(self.key(), e.to_string())),
            WellKnownField::KernelParams => record
                .set_kernelparams(text)
                .map_err(|e| Error::apply(self.key(), e.to_string())),
            WellKnownField::Revision => {
                record.revision = self.parse_payload(text)?;
                Ok(())
            }
            WellKnownField::WatchdogTimeout => {
                record.watchdog_timeout_sec = self.parse_payload(text)?;
                Ok(())
            }
            WellKnownField::InProgress => {
                record.in_progress = match self.parse_payload::<u8>(text)? {
                    0 => false,
                    1 => true,
                    v => return Err(Error::apply(self.key(), format!("invalid value {}", v))),
                };
                Ok(())
            }
            WellKnownField::UpdateState => {
                let raw: u8 = self.parse_payload(text)?;
                let state = match UpdateState::from_raw(raw) {
                    UpdateState::Unknown => {
                        return Err(Error::apply(
                            self.key(),
                            format!("Invalid value for ustate: {}", text),
                        ))
                    }
                    state => state,
                };
                state_api.set_global_state(record, state).map_err(|e| {
                    Error::apply(self.key(), format!("Error setting global state: {}", e))
                })
            }
        }
    }

    fn parse_payload<T: std::str::FromStr>(self, text: &str) -> Result<T> {
        text.trim()
            .parse()
            .map_err(|_| Error::apply(self.key(), format!("invalid number: {:?}", text)))
    }
}

fn parse_number<T: std::str::FromStr>(arg: &str, what: &str) -> Result<T> {
    arg.trim()
        .parse()
        .map_err(|_| Error::validation(format!("Invalid {} specified: {}", what, arg)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::LocalState;

    fn apply(field: WellKnownField, record: &mut EnvRecord, arg: &str) -> Result<()> {
        let payload = field.encode_arg(arg)?;
        field.apply(record, &payload, &mut LocalState)
    }

    #[test]
    fn test_keys_roundtrip() {
        for field in WellKnownField::ALL {
            assert_eq!(WellKnownField::from_key(field.key()), Some(field));
        }
        assert_eq!(WellKnownField::from_key("kernel"), None);
    }

    #[test]
    fn test_apply_each_field() {
        let mut record = EnvRecord::new();
        apply(WellKnownField::KernelFile, &mut record, "C:\\vmlinuz").unwrap();
        apply(WellKnownField::KernelParams, &mut record, "console=ttyS0").unwrap();
        apply(WellKnownField::Revision, &mut record, "12").unwrap();
        apply(WellKnownField::WatchdogTimeout, &mut record, "60").unwrap();
        apply(WellKnownField::UpdateState, &mut record, "installed").unwrap();
        apply(WellKnownField::InProgress, &mut record, "1").unwrap();

        assert_eq!(record.kernelfile(), "C:\\vmlinuz");
        assert_eq!(record.kernelparams(), "console=ttyS0");
        assert_eq!(record.revision, 12);
        assert_eq!(record.watchdog_timeout_sec, 60);
        assert_eq!(record.update_state(), UpdateState::Installed);
        assert!(record.in_progress);
    }

    #[test]
    fn test_invalid_args_rejected_before_staging() {
        let cases = [
            (WellKnownField::Revision, "-1"),
            (WellKnownField::Revision, "abc"),
            (WellKnownField::WatchdogTimeout, "-5"),
            (WellKnownField::WatchdogTimeout, "70000"),
            (WellKnownField::InProgress, "2"),
            (WellKnownField::UpdateState, "4"),
            (WellKnownField::UpdateState, "bogus"),
        ];
        for (field, arg) in cases {
            assert!(
                matches!(field.encode_arg(arg), Err(Error::Validation(_))),
                "{:?} {} should be rejected",
                field,
                arg
            );
        }
        let long = "x".repeat(300);
        assert!(WellKnownField::KernelFile.encode_arg(&long).is_err());
    }

    #[test]
    fn test_ustate_payload_is_numeric() {
        assert_eq!(
            WellKnownField::UpdateState.encode_arg("TESTING").unwrap(),
            b"2\0"
        );
        assert_eq!(WellKnownField::UpdateState.encode_arg("2").unwrap(), b"2\0");
    }

    #[test]
    fn test_malformed_payload_is_apply_error() {
        let mut record = EnvRecord::new();
        let result = WellKnownField::UpdateState.apply(&mut record, b"nope\0", &mut LocalState);
        assert!(matches!(result, Err(Error::Apply { .. })));

        let result = WellKnownField::UpdateState.apply(&mut record, b"9\0", &mut LocalState);
        assert!(matches!(result, Err(Error::Apply { .. })));

        let result = WellKnownField::Revision.apply(&mut record, b"\0", &mut LocalState);
        assert!(matches!(result, Err(Error::Apply { .. })));
        assert_eq!(record.revision, 0);
    }
}
