//! Best-effort language detection and changed-symbol extraction.
//!
//! Symbols are pulled from added and removed patch lines with per-language
//! regexes. This is intentionally shallow: no parsing, no scope tracking.

use regex::Regex;
use std::sync::LazyLock;

/// Map a path's extension to a language name.
pub fn detect_language(path: &str) -> Option<&'static str> {
    let ext = std::path::Path::new(path)
        .extension()?
        .to_str()?
        .to_lowercase();
    let language = match ext.as_str() {
        "py" => "python",
        "java" => "java",
        "js" | "jsx" | "mjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "c" | "h" => "c",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        _ => return None,
    };
    Some(language)
}

static PYTHON_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").expect("static regex is valid")
});
static PYTHON_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*class\s+([A-Za-z_]\w*)").expect("static regex is valid"));

static RUST_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+([A-Za-z_]\w*)")
        .expect("static regex is valid")
});
static RUST_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union)\s+([A-Za-z_]\w*)")
        .expect("static regex is valid")
});

static GO_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)\s*\(").expect("static regex is valid")
});
static GO_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*type\s+([A-Za-z_]\w*)\s+(?:struct|interface)").expect("static regex is valid")
});

static JS_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?(?:function\s*\*?\s*([A-Za-z_$][\w$]*)|(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>)",
    )
    .expect("static regex is valid")
});

// Shared by the brace languages: class/interface/object declarations.
static CLASS_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:export|public|private|protected|internal|abstract|final|sealed|static|open|data|default)\s+)*(?:class|interface|object|struct|enum|trait|record|module)\s+([A-Za-z_]\w*)",
    )
    .expect("static regex is valid")
});

static JVM_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|override|synchronized|async|virtual|open|suspend)\s+)+[\w<>\[\],.?\s]*?\b([A-Za-z_]\w*)\s*\([^;]*$",
    )
    .expect("static regex is valid")
});
static KOTLIN_SCALA_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[a-z]+\s+)*(?:fun|def)\s+(?:<[^>]*>\s*)?([A-Za-z_]\w*)")
        .expect("static regex is valid")
});
static SWIFT_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[a-z@]+\s+)*func\s+([A-Za-z_]\w*)").expect("static regex is valid")
});
static RUBY_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*def\s+(?:self\.)?([A-Za-z_]\w*[?!=]?)").expect("static regex is valid")
});
static PHP_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|static|abstract|final)\s+)*function\s+&?([A-Za-z_]\w*)")
        .expect("static regex is valid")
});
static C_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[A-Za-z_][\w:<>*&\s]*?[\s*&])([A-Za-z_][\w:~]*)\s*\([^;]*\)\s*(?:const\s*)?\{?\s*$")
        .expect("static regex is valid")
});

const NOT_FUNCTIONS: &[&str] = &["if", "for", "while", "switch", "return", "catch", "sizeof", "new"];

fn patterns_for(language: &str) -> Vec<&'static Regex> {
    match language {
        "python" => vec![&PYTHON_FN, &PYTHON_CLASS],
        "rust" => vec![&RUST_FN, &RUST_TYPE],
        "go" => vec![&GO_FN, &GO_TYPE],
        "javascript" | "typescript" => vec![&JS_FN, &CLASS_LIKE],
        "java" | "csharp" => vec![&JVM_METHOD, &CLASS_LIKE],
        "kotlin" | "scala" => vec![&KOTLIN_SCALA_FN, &CLASS_LIKE],
        "swift" => vec![&SWIFT_FN, &CLASS_LIKE],
        "ruby" => vec![&RUBY_DEF, &CLASS_LIKE],
        "php" => vec![&PHP_FN, &CLASS_LIKE],
        "c" | "cpp" => vec![&C_FN, &CLASS_LIKE],
        _ => Vec::new(),
    }
}

/// Names of functions and types declared on added or removed lines of `patch`.
///
/// Returned in first-seen order without duplicates.
pub fn changed_symbols(patch: &str, language: &str) -> Vec<String> {
    let patterns = patterns_for(language);
    if patterns.is_empty() {
        return Vec::new();
    }

    let mut symbols: Vec<String> = Vec::new();
    for line in super::aggregate::changed_lines(patch) {
        for pattern in &patterns {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            let name = caps
                .iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str().to_string());
            if let Some(name) = name
                && !NOT_FUNCTIONS.contains(&name.as_str())
                && !symbols.contains(&name)
            {
                symbols.push(name);
            }
        }
    }
    symbols
}
