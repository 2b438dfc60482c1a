use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use directive::{DiagnosticError, Script};

const TEST_SUFFIX: &str = ".test.toml";

#[derive(Debug, Deserialize)]
pub struct ExpectedError {
    /// Substring that must appear in the error message.
    pub contains: String,

    /// If set, the directive must have been invoked on this line.
    #[serde(default)]
    pub line: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Expect {
    /// Expected exact handler output (trimmed comparison).
    #[serde(default)]
    pub output: Option<String>,

    /// Expected directive errors, in call order. If present (even empty), the error
    /// count and content are checked.
    #[serde(default)]
    pub errors: Option<Vec<ExpectedError>>,

    /// Expect the script itself to be rejected with a message containing this.
    #[serde(default)]
    pub load_error: Option<String>,
}

/// The test-only tables of a `.test.toml` file. The rest of the file is the script.
#[derive(Debug, Deserialize)]
pub struct TestConfig {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub expect: Expect,
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

fn run_single_test(path: &Path) -> TestResult {
    let fail = |description: Option<String>, reason: String| TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Fail(reason),
    };

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return fail(None, format!("cannot read file: {}", e)),
    };

    let config: TestConfig = match toml::from_str(&content) {
        Ok(c) => c,
        Err(e) => return fail(None, format!("test config error: {}", e.message())),
    };
    let description = config.description.clone();

    let script = content.parse::<Script>();

    if let Some(expected) = &config.expect.load_error {
        let outcome = match script {
            Err(e) if e.to_string().contains(expected.as_str()) => TestOutcome::Pass,
            Err(e) => TestOutcome::Fail(format!(
                "expected load error containing \"{}\", got: {}",
                expected, e
            )),
            Ok(_) => TestOutcome::Fail("expected load error, but the script loaded".into()),
        };
        return TestResult {
            path: path.to_path_buf(),
            description,
            outcome,
        };
    }

    let script = match script {
        Ok(s) => s,
        Err(e) => return fail(description, format!("unexpected load error: {}", e)),
    };

    let mut output_buf = Vec::new();
    let run = match directive::run_script(&script, &mut output_buf, 0) {
        Ok(run) => run,
        Err(e) => return fail(description, format!("script failed: {}", e)),
    };

    if let Some(expected_output) = &config.expect.output {
        let actual = String::from_utf8_lossy(&output_buf);
        let actual_trimmed = actual.trim();
        let expected_trimmed = expected_output.trim();
        if actual_trimmed != expected_trimmed {
            return fail(
                description,
                format!(
                    "output mismatch\n  expected: {}\n  actual:   {}",
                    expected_trimmed, actual_trimmed
                ),
            );
        }
    }

    match &config.expect.errors {
        Some(expected) => {
            if let Some(reason) = check_errors(&run.diagnostics, expected) {
                return fail(description, reason);
            }
        }
        None if run.has_errors() => {
            let msgs: Vec<String> = run.diagnostics.iter().map(|d| d.to_string()).collect();
            return fail(
                description,
                format!("unexpected directive errors: {}", msgs.join("; ")),
            );
        }
        None => {}
    }

    TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Pass,
    }
}

/// Check that actual errors match expectations. Returns `Some(reason)` on mismatch.
fn check_errors(diagnostics: &[DiagnosticError], expected: &[ExpectedError]) -> Option<String> {
    if diagnostics.len() != expected.len() {
        let actual_msgs: Vec<String> = diagnostics
            .iter()
            .map(|d| format!("  - {}", d))
            .collect();
        return Some(format!(
            "expected {} error(s), got {}\n  actual errors:\n{}",
            expected.len(),
            diagnostics.len(),
            if actual_msgs.is_empty() {
                "    (none)".to_string()
            } else {
                actual_msgs.join("\n")
            }
        ));
    }

    for (i, (actual, expected)) in diagnostics.iter().zip(expected.iter()).enumerate() {
        let msg = actual.to_string();

        if !msg.contains(&expected.contains) {
            return Some(format!(
                "error[{}]: expected message containing \"{}\", got: {}",
                i, expected.contains, msg
            ));
        }

        if let Some(expected_line) = expected.line {
            if actual.line != Some(expected_line) {
                return Some(format!(
                    "error[{}]: expected on line {}, but it was reported on {}",
                    i,
                    expected_line,
                    actual
                        .line
                        .map(|l| format!("line {}", l))
                        .unwrap_or_else(|| "no line".to_string())
                ));
            }
        }
    }

    None
}

/// Category of a test file: its directory relative to `root`, `/`-separated.
fn category_of(file: &Path, root: &Path) -> String {
    file.parent()
        .and_then(|dir| dir.strip_prefix(root).ok())
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

/// Walk `root` for test files, grouped by category and sorted within each group.
fn find_tests(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(listing) = std::fs::read_dir(&dir) else {
            log::debug!("skipping unreadable directory {}", dir.display());
            continue;
        };
        for path in listing.flatten().map(|e| e.path()) {
            if path.is_dir() {
                pending.push(path);
            } else if path.to_string_lossy().ends_with(TEST_SUFFIX) {
                groups.entry(category_of(&path, root)).or_default().push(path);
            }
        }
    }

    groups.values_mut().for_each(|files| files.sort());
    groups
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

/// Print each category under `path` with its test count.
pub fn print_categories(path: &Path) {
    if path.is_file() {
        eprintln!("{} is a single test file", path.display());
        return;
    }

    let groups = find_tests(path);
    if groups.is_empty() {
        eprintln!("no {} files under {}", TEST_SUFFIX, path.display());
        return;
    }
    for (category, files) in &groups {
        eprintln!("{:<24} {}", category_label(category), files.len());
    }
}

fn paint(s: &str, code: &str, no_color: bool) -> String {
    if no_color {
        s.to_string()
    } else {
        format!("\x1b[{}m{}\x1b[0m", code, s)
    }
}

fn label_for<'a>(result: &'a TestResult) -> &'a str {
    result.description.as_deref().unwrap_or_else(|| {
        result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.trim_end_matches(TEST_SUFFIX))
            .unwrap_or("?")
    })
}

/// Run all `.test.toml` files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let groups: BTreeMap<String, Vec<PathBuf>> = if path.is_file() {
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        let found = find_tests(path);
        if found.is_empty() {
            eprintln!("no {} files under {}", TEST_SUFFIX, path.display());
            return 1;
        }
        select_categories(found, categories)
    };

    if groups.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &groups {
        if !path.is_file() {
            eprintln!();
            eprintln!("{}", paint(category_label(cat), "1", no_color));
        }

        for file in files {
            let result = run_single_test(file);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", paint("PASS", "32", no_color), label_for(&result));
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", paint("FAIL", "31", no_color), label_for(&result));
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    if failures.is_empty() {
        eprintln!(
            "test result: {}. {} passed, 0 failed",
            paint("ok", "32", no_color),
            passed
        );
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            paint("FAILED", "31", no_color),
            passed,
            failures.len(),
            passed + failures.len()
        );
        1
    }
}

/// Keep the groups named in `requested`, including their subcategories.
/// An empty request keeps everything.
fn select_categories(
    mut groups: BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<String, Vec<PathBuf>> {
    if requested.is_empty() {
        return groups;
    }

    let wanted: Vec<&str> = requested.iter().map(|r| r.trim_matches('/')).collect();
    let matches = |category: &str, want: &str| {
        category
            .strip_prefix(want)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    };

    for want in &wanted {
        if !groups.keys().any(|c| matches(c, want)) {
            let known: Vec<&str> = groups.keys().map(|c| category_label(c)).collect();
            eprintln!("warning: no tests in category `{}' (have: {})", want, known.join(" "));
        }
    }
    groups.retain(|category, _| wanted.iter().any(|want| matches(category, want)));
    groups
}
