//! Mimic Scenario Linter
//!
//! Validates a scenario data directory (or a single scenario file) with the
//! same rules the server applies on save, before the files are loaded.
//!
//! Usage:
//!   mimic-lint <directory_or_file> [OPTIONS]
//!
//! Features:
//! - YAML/JSON parse errors
//! - Name, path, status and weight validation
//! - Regex and JSONPath pattern compilation
//! - Name conflicts within a lookup bucket
//! - Files the server would skip because of their location
//! - Missing body fixtures
//! - Declared weights that exceed 100% on one path

use clap::Parser;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use mimic_http_mock::scenario::{
    validate_scenario, BucketKey, Scenario, ScenarioError, ScenarioKey, Weight,
};
use mimic_http_mock::storage::{scenario_relative_path, FIXTURES_DIR};

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Mimic Scenario Linter
#[derive(Parser, Debug)]
#[command(name = "mimic-lint")]
#[command(author, version, about = "Validate Mimic scenario files")]
struct Args {
    /// Scenario file or data directory
    #[arg(required = true)]
    path: PathBuf,

    /// Output format: text (default), json
    #[arg(short, long, default_value = "text")]
    output: String,

    /// Only show errors (hide warnings)
    #[arg(short = 'e', long)]
    errors_only: bool,

    /// Strict mode - treat warnings as errors
    #[arg(short, long)]
    strict: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn color(&self) -> &'static str {
        match self {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone)]
struct LintIssue {
    severity: Severity,
    code: &'static str,
    message: String,
    file: PathBuf,
    suggestion: Option<String>,
}

#[derive(Debug, Default)]
struct LintResult {
    issues: Vec<LintIssue>,
    files_checked: usize,
    errors: usize,
    warnings: usize,
}

impl LintResult {
    fn add_issue(&mut self, issue: LintIssue) {
        match issue.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
        }
        self.issues.push(issue);
    }

    fn error(&mut self, code: &'static str, file: &Path, message: String, suggestion: Option<&str>) {
        self.add_issue(LintIssue {
            severity: Severity::Error,
            code,
            message,
            file: file.to_path_buf(),
            suggestion: suggestion.map(str::to_string),
        });
    }

    fn warning(&mut self, code: &'static str, file: &Path, message: String, suggestion: Option<&str>) {
        self.add_issue(LintIssue {
            severity: Severity::Warning,
            code,
            message,
            file: file.to_path_buf(),
            suggestion: suggestion.map(str::to_string),
        });
    }
}

/// A scenario that parsed and passed validation.
struct LoadedScenario {
    file: PathBuf,
    scenario: Scenario,
}

fn main() {
    let args = Args::parse();
    let json = args.output == "json";

    if !json {
        println!("{BOLD}{CYAN}Mimic Scenario Linter{RESET}");
        println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");
    }

    let files = collect_scenario_files(&args.path);
    if files.is_empty() {
        if !json {
            println!(
                "{YELLOW}Warning:{RESET} No scenario files found in {:?}",
                args.path
            );
        }
        std::process::exit(0);
    }

    if !json {
        println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}", args.path.display());
        println!(
            "{DIM}Found:{RESET}    {BOLD}{}{RESET} scenario file(s)\n",
            files.len()
        );
    }

    let result = lint(&args.path, &files);

    if json {
        print_results_json(&result);
    } else {
        print_results(&result, &args);
    }

    let has_errors = result.errors > 0 || (args.strict && result.warnings > 0);
    std::process::exit(if has_errors { 1 } else { 0 });
}

fn lint(root: &Path, files: &[PathBuf]) -> LintResult {
    let mut result = LintResult {
        files_checked: files.len(),
        ..Default::default()
    };
    let data_dir = root.is_dir().then_some(root);

    // First pass: parse and validate each file on its own
    let mut loaded = Vec::new();
    for file in files {
        let mut scenario = match load_scenario_file(file) {
            Ok(s) => s,
            Err(e) => {
                result.error(
                    "E001",
                    file,
                    format!("Failed to parse scenario: {e}"),
                    Some("Check for YAML syntax errors and required fields (method, name, path)"),
                );
                continue;
            }
        };
        if let Err(e) = validate_scenario(&mut scenario) {
            report_validation_error(file, &e, &mut result);
            continue;
        }
        if let Some(dir) = data_dir {
            check_location(dir, file, &scenario, &mut result);
            check_fixture(dir, file, &scenario, &mut result);
        }
        if scenario.response.contents.is_some() && scenario.response.contents_file.is_some() {
            result.warning(
                "W003",
                file,
                "Both contents and contents_file are set; contents is ignored".to_string(),
                Some("Remove one of the two body sources"),
            );
        }
        loaded.push(LoadedScenario {
            file: file.clone(),
            scenario,
        });
    }

    // Second pass: checks across files
    check_bucket_conflicts(&loaded, &mut result);
    check_weight_totals(&loaded, &mut result);
    result
}

fn collect_scenario_files(path: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if path.is_file() {
        if is_scenario_file(path) {
            files.push(path.to_path_buf());
        }
    } else if path.is_dir() {
        collect_dir(path, &mut files);
    }

    files.sort();
    files
}

fn collect_dir(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if entry_path.is_dir() {
            if entry_path.file_name().is_some_and(|n| n == FIXTURES_DIR) {
                continue;
            }
            collect_dir(&entry_path, files);
        } else if is_scenario_file(&entry_path) {
            files.push(entry_path);
        }
    }
}

fn is_scenario_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml" || ext == "json")
}

fn load_scenario_file(path: &Path) -> Result<Scenario, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_yaml::from_str(&content).map_err(|e| e.to_string())
}

fn report_validation_error(file: &Path, error: &ScenarioError, result: &mut LintResult) {
    let (code, suggestion) = match error {
        ScenarioError::InvalidPattern { .. } => (
            "E003",
            "Patterns are regular expressions; escape literal characters like '.', '?' and '['",
        ),
        ScenarioError::InvalidWeight { .. } => (
            "E004",
            "Use a fraction (0.7), a percentage (70%) or a bare percent (70)",
        ),
        _ => (
            "E002",
            "Names use letters, digits, '_', '-' and '.'; paths use '/', ':name' or '{name}' segments",
        ),
    };
    result.error(code, file, error.to_string(), Some(suggestion));
}

/// The server skips files that are not where their identity says they belong.
fn check_location(root: &Path, file: &Path, scenario: &Scenario, result: &mut LintResult) {
    let expected = root.join(scenario_relative_path(&scenario.key()));
    if expected != file {
        result.warning(
            "W001",
            file,
            format!(
                "File location does not match scenario {}; the server will skip it",
                scenario.key()
            ),
            Some(&format!("Move it to {}", expected.display())),
        );
    }
}

fn check_fixture(root: &Path, file: &Path, scenario: &Scenario, result: &mut LintResult) {
    if let Some(fixture) = &scenario.response.contents_file {
        if !root.join(FIXTURES_DIR).join(fixture).is_file() {
            result.warning(
                "W002",
                file,
                format!("Fixture '{fixture}' not found in {FIXTURES_DIR}/"),
                Some("Lookups selecting this scenario will fail until the fixture exists"),
            );
        }
    }
}

fn check_bucket_conflicts(loaded: &[LoadedScenario], result: &mut LintResult) {
    let mut by_bucket_name: BTreeMap<(String, String), Vec<(&Path, ScenarioKey)>> = BTreeMap::new();
    for entry in loaded {
        let key = entry.scenario.key();
        let bucket = BucketKey::for_pattern(key.method, &key.path);
        by_bucket_name
            .entry((format!("{}:{}", bucket.method, bucket.prefix), key.name.clone()))
            .or_default()
            .push((&entry.file, key));
    }

    for ((_, name), entries) in by_bucket_name {
        if entries.len() < 2 {
            continue;
        }
        let (first_file, first_key) = &entries[0];
        for (file, key) in &entries[1..] {
            if key == first_key {
                result.error(
                    "E006",
                    file,
                    format!(
                        "Scenario {key} is defined again (first in {})",
                        first_file.display()
                    ),
                    Some("Delete one of the duplicate files"),
                );
            } else {
                result.error(
                    "E005",
                    file,
                    format!("Name '{name}' is already used by {first_key} in the same lookup bucket"),
                    Some("Scenario names must be unique per method and first path segment"),
                );
            }
        }
    }
}

fn check_weight_totals(loaded: &[LoadedScenario], result: &mut LintResult) {
    let mut by_route: HashMap<(String, String), Vec<(&Path, f64)>> = HashMap::new();
    for entry in loaded {
        let Some(raw) = &entry.scenario.predicate else {
            continue;
        };
        let Ok(weight) = Weight::parse(raw) else {
            continue;
        };
        let key = entry.scenario.key();
        by_route
            .entry((key.method.to_string(), key.path.clone()))
            .or_default()
            .push((&entry.file, weight.fraction()));
    }

    for ((method, path), weights) in by_route {
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total > 1.0 + 1e-9 {
            result.warning(
                "W004",
                weights[0].0,
                format!(
                    "Weights on {method} {path} add up to {:.0}%; shares will be scaled down",
                    total * 100.0
                ),
                Some("Make the declared weights sum to at most 100%"),
            );
        }
    }
}

fn print_results_json(result: &LintResult) {
    use serde_json::json;

    let issues: Vec<_> = result
        .issues
        .iter()
        .map(|issue| {
            json!({
                "severity": issue.severity.label(),
                "code": issue.code,
                "message": issue.message,
                "file": issue.file.to_string_lossy(),
                "suggestion": issue.suggestion
            })
        })
        .collect();

    let output = json!({
        "files_checked": result.files_checked,
        "errors": result.errors,
        "warnings": result.warnings,
        "issues": issues
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string())
    );
}

fn print_results(result: &LintResult, args: &Args) {
    println!();

    if result.issues.is_empty() {
        println!("{GREEN}{BOLD}No issues found!{RESET}");
    } else {
        // Group issues by file
        let mut issues_by_file: BTreeMap<&PathBuf, Vec<&LintIssue>> = BTreeMap::new();
        for issue in &result.issues {
            issues_by_file.entry(&issue.file).or_default().push(issue);
        }

        for (file, issues) in issues_by_file {
            let filtered: Vec<_> = issues
                .into_iter()
                .filter(|i| !args.errors_only || i.severity == Severity::Error)
                .collect();
            if filtered.is_empty() {
                continue;
            }

            let file_errors = filtered
                .iter()
                .filter(|i| i.severity == Severity::Error)
                .count();
            let file_warnings = filtered.len() - file_errors;

            let status_indicator = if file_errors > 0 {
                format!("{RED}FAIL{RESET}")
            } else {
                format!("{YELLOW}WARN{RESET}")
            };
            let counts = match (file_errors, file_warnings) {
                (0, w) => format!(" {DIM}({YELLOW}{w} warning(s){RESET}{DIM}){RESET}"),
                (e, 0) => format!(" {DIM}({RED}{e} error(s){RESET}{DIM}){RESET}"),
                (e, w) => format!(
                    " {DIM}({RED}{e} error(s){RESET}{DIM}, {YELLOW}{w} warning(s){RESET}{DIM}){RESET}"
                ),
            };

            println!("{status_indicator} {BOLD}{CYAN}{}{RESET}{counts}", file.display());

            for issue in filtered {
                let color = issue.severity.color();
                let marker = format!("{color}|{RESET}");
                println!(
                    "  {marker} {BOLD}{color}{}{RESET}: {} {DIM}({color}{}{DIM}){RESET}",
                    issue.severity.label(),
                    issue.message,
                    issue.code
                );
                if let Some(suggestion) = &issue.suggestion {
                    println!("  {marker}   {GREEN}-> {suggestion}{RESET}");
                }
            }
            println!();
        }
    }

    // Summary
    println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");
    println!("{BOLD}{CYAN}Summary{RESET}");
    println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");
    println!(
        "  {DIM}Files checked:{RESET} {BOLD}{}{RESET}",
        result.files_checked
    );
    if result.errors > 0 {
        println!("  {RED}Errors:{RESET}    {BOLD}{RED}{}{RESET}", result.errors);
    } else {
        println!("  {GREEN}Errors:{RESET}    {BOLD}{GREEN}0{RESET}");
    }
    if result.warnings > 0 {
        println!(
            "  {YELLOW}Warnings:{RESET}  {BOLD}{YELLOW}{}{RESET}",
            result.warnings
        );
    } else {
        println!("  {DIM}Warnings:{RESET}  {BOLD}0{RESET}");
    }
    println!();

    if result.errors == 0 && result.warnings == 0 {
        println!("{GREEN}{BOLD}All checks passed!{RESET}");
    } else if result.errors == 0 {
        println!("{YELLOW}{BOLD}Passed with warnings{RESET}");
    } else {
        println!("{RED}{BOLD}Linting failed with errors{RESET}");
    }
}
