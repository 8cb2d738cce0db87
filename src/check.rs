use anyhow::Result;
use console::Style;

use crate::exec::run_cmd_unchecked;
use crate::progress::{finish_spinner, stage_spinner};
use crate::types::CheckResult;

struct ToolSpec {
    name: &'static str,
    version_args: &'static [&'static str],
    used_by: &'static str,
    fix_hint: &'static str,
}

const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "allure",
        version_args: &["--version"],
        used_by: "report",
        fix_hint: "Install the Allure CLI: https://allurereport.org/docs/install/",
    },
    ToolSpec {
        name: "java",
        version_args: &["-version"],
        used_by: "report",
        fix_hint: "Allure needs a Java runtime (8+): https://adoptium.net",
    },
    ToolSpec {
        name: "git",
        version_args: &["version"],
        used_by: "report, deploy",
        fix_hint: "Install git from https://git-scm.com",
    },
    ToolSpec {
        name: "tar",
        version_args: &["--version"],
        used_by: "deploy --target artifact",
        fix_hint: "Install GNU tar (or bsdtar) from your package manager",
    },
];

/// Check every external tool. Returns whether all of them are usable.
pub fn run_check() -> Result<bool> {
    let mut results: Vec<CheckResult> = Vec::new();

    for tool in TOOLS {
        let pb = stage_spinner(&format!("Checking {}...", tool.name));
        let result = check_tool(tool);
        finish_spinner(&pb, result.passed);
        results.push(result);
    }

    print_results(&results);
    Ok(results.iter().all(|r| r.passed))
}

fn check_tool(tool: &ToolSpec) -> CheckResult {
    let (passed, detail) = if which::which(tool.name).is_err() {
        (false, "Not found on PATH".to_string())
    } else {
        match run_cmd_unchecked(tool.name, tool.version_args) {
            Ok(exec) if exec.success() => {
                // `java -version` reports on stderr
                let text = if exec.stdout.trim().is_empty() {
                    exec.stderr
                } else {
                    exec.stdout
                };
                (true, text.lines().next().unwrap_or("").trim().to_string())
            }
            _ => (false, "Found on PATH but failed to get version".to_string()),
        }
    };

    CheckResult {
        name: tool.name.to_string(),
        passed,
        detail,
        fix_hint: (!passed).then(|| tool.fix_hint.to_string()),
        used_by: tool.used_by,
    }
}

fn print_results(results: &[CheckResult]) {
    println!();
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    let dim = Style::new().dim();

    for r in results {
        let used_by = dim.apply_to(format!("({})", r.used_by));
        if r.passed {
            println!("  {} {}: {} {}", green.apply_to("PASS"), r.name, r.detail, used_by);
        } else {
            println!("  {} {}: {} {}", red.apply_to("FAIL"), r.name, r.detail, used_by);
            if let Some(hint) = &r.fix_hint {
                println!("       hint: {hint}");
            }
        }
    }
    println!();
}
