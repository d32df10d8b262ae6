// Consistent exit codes for the courier CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error (rejected request)
//   10 = daemon not reachable
//   11 = not found
//   12 = conflict
//   13 = network error (timeouts, upstream failures)

use std::process;

use crate::client::{ApiError, DaemonUnavailable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    DaemonDown = 10,
    NotFound = 11,
    Conflict = 12,
    Network = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.downcast_ref::<DaemonUnavailable>().is_some() {
                return Self::DaemonDown;
            }
            if let Some(api) = cause.downcast_ref::<ApiError>() {
                return Self::from_api_code(&api.code);
            }
            if let Some(http) = cause.downcast_ref::<reqwest::Error>() {
                if http.is_timeout() {
                    return Self::Network;
                }
            }
        }
        Self::Error
    }

    /// Map a daemon error code to an exit code.
    pub fn from_api_code(code: &str) -> Self {
        match code {
            "VALIDATION_FAILED" | "INVALID_KEY" | "PAYLOAD_TOO_LARGE" => Self::Usage,
            "NOT_FOUND" => Self::NotFound,
            "CONFLICT" => Self::Conflict,
            "UPSTREAM_FAILED" => Self::Network,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::Usage.code(), 2);
        assert_eq!(ExitCode::DaemonDown.code(), 10);
        assert_eq!(ExitCode::Network.code(), 13);
    }

    #[test]
    fn api_codes_map_to_exit_codes() {
        assert_eq!(ExitCode::from_api_code("INVALID_KEY"), ExitCode::Usage);
        assert_eq!(ExitCode::from_api_code("NOT_FOUND"), ExitCode::NotFound);
        assert_eq!(ExitCode::from_api_code("CONFLICT"), ExitCode::Conflict);
        assert_eq!(ExitCode::from_api_code("UPSTREAM_FAILED"), ExitCode::Network);
        assert_eq!(ExitCode::from_api_code("INTERNAL_ERROR"), ExitCode::Error);
    }

    #[test]
    fn api_error_in_chain_is_found() {
        let api = ApiError { status: 409, code: "CONFLICT".into(), message: "run in use".into() };
        let err = anyhow::Error::new(api).context("failed to delete run");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Conflict);
    }

    #[test]
    fn generic_error_is_general_failure() {
        let err = anyhow::anyhow!("something went wrong");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Error);
    }
}
