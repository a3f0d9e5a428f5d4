use helpdesk_core::config::AppConfig;
use serde::Serialize;

use crate::commands::{
    load_config, open_store, runtime, CommandResult, EXIT_CONFIG, EXIT_OK, EXIT_STORE,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let (report, exit_code) = build_report();

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report() -> (DoctorReport, u8) {
    let mut checks = Vec::new();
    let mut exit_code = EXIT_OK;

    match load_config("doctor") {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            let store_check = check_store_readability(&config);
            if store_check.status == CheckStatus::Fail {
                exit_code = EXIT_STORE;
            }
            checks.push(store_check);
            checks.push(check_static_directory(&config));
        }
        Err(failure) => {
            exit_code = EXIT_CONFIG;
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: config_failure_details(&failure),
            });
            for name in ["store_readability", "static_directory"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_fail = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_fail { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    (DoctorReport { overall_status, summary, checks }, exit_code)
}

fn check_store_readability(config: &AppConfig) -> DoctorCheck {
    let runtime = match runtime("doctor") {
        Ok(runtime) => runtime,
        Err(failure) => {
            return DoctorCheck {
                name: "store_readability",
                status: CheckStatus::Fail,
                details: failure.output,
            };
        }
    };

    let store = open_store(config);
    match runtime.block_on(store.inspect()) {
        Ok(document) => DoctorCheck {
            name: "store_readability",
            status: CheckStatus::Pass,
            details: format!(
                "`{}` readable: {} feedback record(s), {} allowance(s), {} ticket(s)",
                config.storage.data_path.display(),
                document.feedback.len(),
                document.allowances.len(),
                document.tickets.len()
            ),
        },
        Err(error) => DoctorCheck {
            name: "store_readability",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_static_directory(config: &AppConfig) -> DoctorCheck {
    let static_dir = &config.server.static_dir;
    if static_dir.is_dir() {
        DoctorCheck {
            name: "static_directory",
            status: CheckStatus::Pass,
            details: format!("serving dashboard files from `{}`", static_dir.display()),
        }
    } else {
        DoctorCheck {
            name: "static_directory",
            status: CheckStatus::Warn,
            details: format!("`{}` does not exist; dashboard pages will 404", static_dir.display()),
        }
    }
}

fn config_failure_details(failure: &CommandResult) -> String {
    serde_json::from_str::<serde_json::Value>(&failure.output)
        .ok()
        .and_then(|payload| payload["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| failure.output.clone())
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
