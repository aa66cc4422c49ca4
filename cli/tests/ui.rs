use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use similar::TextDiff;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Each case is an `.args` file beside a `.stdout` (the run must succeed and print exactly that)
/// or a `.stderr` (the run must fail and mention every listed line).
#[test]
fn ui_tests() -> TestResult {
    let mut cases: Vec<PathBuf> = fs::read_dir(ui_dir())?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    cases.retain(|path| path.extension().is_some_and(|ext| ext == "args"));
    cases.sort();

    if cases.is_empty() {
        return Err(format!("no ui cases found under {}", ui_dir().display()).into());
    }
    for case in &cases {
        run_case(case)?;
    }
    Ok(())
}

fn ui_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/ui")
}

fn run_case(case: &Path) -> TestResult {
    let output = run_trove(&read_args(case)?)?;
    let stdout = normalize(&String::from_utf8_lossy(&output.stdout));
    let stderr = normalize(&String::from_utf8_lossy(&output.stderr));

    let expected_stdout = case.with_extension("stdout");
    let expected_stderr = case.with_extension("stderr");

    if expected_stdout.exists() {
        if !output.status.success() {
            return Err(format!("{} failed:\n{stderr}", case.display()).into());
        }
        let expected = normalize(&fs::read_to_string(&expected_stdout)?);
        if expected != stdout {
            panic!("stdout mismatch for {}\n{}", case.display(), diff(&expected, &stdout));
        }
    } else if expected_stderr.exists() {
        if output.status.success() {
            return Err(format!("{} succeeded but was expected to fail", case.display()).into());
        }
        if !stdout.is_empty() {
            return Err(format!("{} printed to stdout on failure:\n{stdout}", case.display()).into());
        }
        // Diagnostics are wrapped to the terminal width, so only fragments are compared.
        let expected = normalize(&fs::read_to_string(&expected_stderr)?);
        for fragment in expected.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !stderr.contains(fragment) {
                panic!(
                    "stderr for {} does not mention `{fragment}`\n{}",
                    case.display(),
                    diff(&expected, &stderr)
                );
            }
        }
    } else {
        return Err(format!("{} has no .stdout or .stderr expectation", case.display()).into());
    }
    Ok(())
}

fn run_trove(args: &[String]) -> TestResult<Output> {
    let fixtures = ui_dir().join("fixtures");
    let output = Command::new(env!("CARGO_BIN_EXE_trove"))
        .args(args)
        .current_dir(ui_dir())
        .env("TROVE_SETTINGS", fixtures.join("settings.xml"))
        .env("TROVE_GLOBAL_SETTINGS", fixtures.join("no-global-settings.xml"))
        .env("TROVE_LOCAL_REPOSITORY", fixtures.join("repository"))
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .env("TERM", "dumb")
        .env("CLICOLOR", "0")
        .env("RUST_BACKTRACE", "0")
        .output()?;
    Ok(output)
}

/// Whitespace separated arguments, one or more per line, with `$UI` standing for the ui
/// directory. Lines starting with `#` are comments.
fn read_args(case: &Path) -> TestResult<Vec<String>> {
    let ui = ui_dir().display().to_string();
    Ok(fs::read_to_string(case)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace())
        .map(|arg| arg.replace("$UI", &ui))
        .collect())
}

fn normalize(text: &str) -> String {
    let plain = strip_ansi_escapes::strip(text.replace("\r\n", "\n").as_bytes());
    let mut out = String::from_utf8_lossy(&plain).into_owned();

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut roots = vec![manifest_dir.to_path_buf()];
    roots.extend(manifest_dir.canonicalize().ok());
    for root in roots {
        out = out.replace(root.to_string_lossy().as_ref(), "<CARGO_MANIFEST_DIR>");
    }
    if cfg!(windows) {
        out = out.replace('\\', "/");
    }
    out.trim_end_matches('\n').to_string()
}

fn diff(expected: &str, actual: &str) -> String {
    TextDiff::from_lines(expected, actual)
        .unified_diff()
        .header("expected", "actual")
        .to_string()
}
