//! Human-readable error descriptions and structured JSON error formatting.

use std::error::Error as StdError;

use mpg_core::error::{BuildError, EngineError, SettingError};
use mpg_hardware::HwError;
use thiserror::Error;

/// Failures that originate in the CLI layer itself.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },
    #[error("expected NAME=VALUE, got '{0}'")]
    BadAssignment(String),
    #[error("self-check found {0} fault(s)")]
    SelfCheckFailed(usize),
}

/// First error of type `E` anywhere in the report's chain.
fn find<E: StdError + 'static>(err: &eyre::Report) -> Option<&E> {
    err.chain().find_map(|e| e.downcast_ref::<E>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ce) = find::<CliError>(err) {
        return match ce {
            CliError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: A misspelled key, a wrong type, or an out-of-range value in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            CliError::UnknownName { kind, name } => format!(
                "What happened: There is no {kind} called '{name}'.\nHow to fix: Run `mpg programs` or see `mpg --help` for valid names."
            ),
            CliError::BadAssignment(s) => format!(
                "What happened: Could not parse '{s}' as a setting assignment.\nHow to fix: Use NAME=VALUE with the stored (x1000) value, e.g. --set tank_size=15000."
            ),
            CliError::SelfCheckFailed(n) => format!(
                "What happened: {n} catalog evaluation(s) faulted.\nLikely causes: A program table edit left a bad skip or call.\nHow to fix: Re-run with --log-level=debug to see each fault."
            ),
        };
    }

    if let Some(be) = find::<BuildError>(err) {
        return match be {
            BuildError::MissingStorage => {
                "What happened: No non-volatile store was provided to the computer.\nHow to fix: Pass a store via with_storage(...).".to_string()
            }
            BuildError::ZeroCycleRate | BuildError::BadTickLength(_) => format!(
                "What happened: Invalid clock parameters ({be}).\nHow to fix: Check [engine] cycles_per_second and tick_cycles in the config."
            ),
        };
    }

    if let Some(se) = find::<SettingError>(err) {
        return format!(
            "What happened: {se}.\nLikely causes: The value is outside the setting's storage width.\nHow to fix: Run `mpg settings` to see current values and choose a smaller one."
        );
    }

    if let Some(he) = find::<HwError>(err) {
        return format!(
            "What happened: Storage image problem ({he}).\nLikely causes: The [storage] image path points at a foreign or truncated file.\nHow to fix: Point storage.image at a fresh path or remove the bad image."
        );
    }

    if let Some(ee) = find::<EngineError>(err) {
        return format!(
            "What happened: {ee}.\nLikely causes: The storage image could not be read or written, or a trip slot number is outside 0..9.\nHow to fix: Check storage.image and the --save slot, then rerun."
        );
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes. Usage errors from clap exit with 2 on their own.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match find::<CliError>(err) {
        Some(CliError::UnknownName { .. } | CliError::BadAssignment(_)) => return 2,
        Some(CliError::InvalidConfig(_)) => return 3,
        Some(CliError::SelfCheckFailed(_)) => return 5,
        None => {}
    }
    if find::<BuildError>(err).is_some() {
        return 3;
    }
    if find::<HwError>(err).is_some() {
        return 4;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(ce) = find::<CliError>(err) {
        return match ce {
            CliError::InvalidConfig(_) => "InvalidConfig",
            CliError::UnknownName { .. } => "UnknownName",
            CliError::BadAssignment(_) => "BadAssignment",
            CliError::SelfCheckFailed(_) => "SelfCheckFailed",
        };
    }
    if find::<BuildError>(err).is_some() {
        "InvalidConfig"
    } else if find::<SettingError>(err).is_some() {
        "Setting"
    } else if find::<HwError>(err).is_some() {
        "Storage"
    } else {
        "Error"
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
