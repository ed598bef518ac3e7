//! Heuristics for recognising test-related commits.
//!
//! A commit counts as test-related when its message mentions testing, or
//! when at least half of the files it touches look like test files. False
//! positives are expected (a message saying "latest" contains "test").

/// Lowercase substrings that mark a commit message as test-related.
pub const TEST_KEYWORDS: &[&str] = &[
    "test",
    "spec",
    "unittest",
    "integration test",
    "e2e test",
    "add test",
    "update test",
    "fix test",
    "test fix",
    "testing",
    "coverage",
    "mock",
    "stub",
];

const TEST_DIRS: &[&str] = &["test", "tests", "spec", "specs", "__tests__", "__test__"];

const TEST_AFFIXES: &[&str] = &["test", "tests", "spec"];

pub fn message_mentions_tests(message: &str) -> bool {
    let lower = message.to_lowercase();
    TEST_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Whether a repository path looks like a test file.
///
/// Matches a directory segment named `test(s)`/`spec(s)`, or a file stem that
/// starts or ends with `test`/`spec` (`test_parser.py`, `parser_test.go`,
/// `ParserTest.java`, `parser.spec.ts`).
pub fn is_test_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/").to_lowercase();
    let mut segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let Some(file_name) = segments.pop() else {
        return false;
    };

    if segments.iter().any(|seg| TEST_DIRS.contains(seg)) {
        return true;
    }

    // Strip the final extension only, so "parser.spec.ts" keeps "parser.spec".
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };

    TEST_AFFIXES
        .iter()
        .any(|affix| stem.starts_with(affix) || stem.ends_with(affix))
}

/// At least half of `files` are test paths. Empty lists never qualify.
pub fn mostly_test_files<S: AsRef<str>>(files: &[S]) -> bool {
    if files.is_empty() {
        return false;
    }
    let test_files = files.iter().filter(|f| is_test_path(f.as_ref())).count();
    test_files * 2 >= files.len()
}

pub fn is_test_commit<S: AsRef<str>>(message: &str, files: &[S]) -> bool {
    message_mentions_tests(message) || mostly_test_files(files)
}
