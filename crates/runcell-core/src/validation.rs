//! Static safety gate for untrusted code fragments
//!
//! This module implements the pre-execution analysis that decides whether a
//! code fragment may run at all. Detection is layered: category-keyed regex
//! tables scan the raw source text for every language, and languages with a
//! lexical scanner (Python, JavaScript/TypeScript) get a second pass that
//! strips comments and string literals before flagging call expressions
//! whose callee is on the dangerous-symbol denylist. Both layers feed the
//! same `CodeValidationResult`, so the rest of the engine is agnostic to
//! which one produced a finding.
//!
//! Validation is a pure function of its input: no side effects, and the same
//! code always yields the same findings in the same order.

use regex::Regex;

use crate::core_types::{CodeValidationResult, ExecutionLanguage, RiskLevel, SecurityLevel};

/// Finding categories. The first six are regex-table categories; the dynamic
/// ones are produced only by the lexical call-site scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternCategory {
    SystemCalls,
    NetworkOperations,
    FileOperations,
    PrivilegeEscalation,
    EnvironmentManipulation,
    ProcessManipulation,
    DynamicEvaluation,
    DynamicImport,
}

impl PatternCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternCategory::SystemCalls => "system_calls",
            PatternCategory::NetworkOperations => "network_operations",
            PatternCategory::FileOperations => "file_operations",
            PatternCategory::PrivilegeEscalation => "privilege_escalation",
            PatternCategory::EnvironmentManipulation => "environment_manipulation",
            PatternCategory::ProcessManipulation => "process_manipulation",
            PatternCategory::DynamicEvaluation => "dynamic_evaluation",
            PatternCategory::DynamicImport => "dynamic_import",
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            PatternCategory::SystemCalls => {
                "Avoid shell and system-call invocations; use language-level APIs instead"
            }
            PatternCategory::NetworkOperations => {
                "Network access is disabled in the sandbox; remove outbound calls"
            }
            PatternCategory::FileOperations => {
                "Restrict file access to the provided working directory"
            }
            PatternCategory::PrivilegeEscalation => {
                "Privilege changes are never permitted in sandboxed code"
            }
            PatternCategory::EnvironmentManipulation => {
                "Pass configuration through the execution environment instead of mutating it"
            }
            PatternCategory::ProcessManipulation => {
                "Spawning or signalling processes is restricted by the sandbox"
            }
            PatternCategory::DynamicEvaluation => {
                "Dynamic code evaluation defeats static analysis; inline the logic"
            }
            PatternCategory::DynamicImport => {
                "Import modules statically so they can be audited"
            }
        }
    }
}

struct CategoryTable {
    category: PatternCategory,
    patterns: Vec<Regex>,
}

/// Static analyzer that scans source text for dangerous constructs and
/// assigns a risk classification, gated by the configured [`SecurityLevel`].
pub struct DangerousPatternDetector {
    security_level: SecurityLevel,
    tables: Vec<CategoryTable>,
}

impl DangerousPatternDetector {
    pub fn new(security_level: SecurityLevel) -> Self {
        let table = |category, patterns: &[&str]| CategoryTable {
            category,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p).expect("pattern table regex"))
                .collect(),
        };

        let tables = vec![
            table(
                PatternCategory::SystemCalls,
                &[
                    r"os\.system",
                    r"os\.popen",
                    r"subprocess\.",
                    r"commands\.getoutput",
                    r"child_process",
                    r"execSync\s*\(",
                    r"Deno\.run",
                    r"Deno\.Command",
                ],
            ),
            table(
                PatternCategory::NetworkOperations,
                &[
                    r"\bsocket\b",
                    r"urllib",
                    r"requests\.",
                    r"http\.client",
                    r"\bfetch\s*\(",
                    r"XMLHttpRequest",
                    r"net\.connect",
                    r"\bcurl\s",
                    r"\bwget\s",
                ],
            ),
            table(
                PatternCategory::FileOperations,
                &[
                    r#"open\s*\([^)]*['"][wa]"#,
                    r"os\.remove",
                    r"os\.unlink",
                    r"os\.rmdir",
                    r"shutil\.",
                    r"fs\.unlink",
                    r"fs\.rm",
                    r"fs\.writeFile",
                    r"rm\s+-rf?\b",
                    r"\bmkfs",
                    r">\s*/dev/",
                ],
            ),
            table(
                PatternCategory::PrivilegeEscalation,
                &[
                    r"\bsudo\b",
                    r"\bsetuid\b",
                    r"os\.setuid",
                    r"os\.seteuid",
                    r"chmod\s+\+s",
                    r"\bsu\s+-",
                    r"/etc/passwd",
                    r"/etc/shadow",
                ],
            ),
            table(
                PatternCategory::EnvironmentManipulation,
                &[
                    r"os\.environ\s*\[",
                    r"os\.putenv",
                    r"process\.env\s*\[",
                    r"Deno\.env",
                    r"\bexport\s+\w+=",
                    r"\bunset\s+\w",
                ],
            ),
            table(
                PatternCategory::ProcessManipulation,
                &[
                    r"os\.kill",
                    r"os\.fork",
                    r"os\.abort",
                    r"process\.kill",
                    r"multiprocessing",
                    r"signal\.",
                    r"\bkill\s+-\d",
                    r"\bpkill\b",
                ],
            ),
        ];

        Self {
            security_level,
            tables,
        }
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// Scan `code` and classify its risk. Pure and deterministic.
    pub fn validate(&self, code: &str, language: ExecutionLanguage) -> CodeValidationResult {
        let mut findings: Vec<(PatternCategory, String)> = Vec::new();

        for table in &self.tables {
            for pattern in &table.patterns {
                if let Some(m) = pattern.find(code) {
                    findings.push((
                        table.category,
                        format!("{}: {}", table.category.as_str(), m.as_str().trim()),
                    ));
                }
            }
        }

        let mut lex_warning = None;
        if let Some(scanner) = CallSiteScanner::for_language(language) {
            match scanner.scan(code) {
                Ok(calls) => {
                    for (category, symbol) in calls {
                        findings.push((
                            category,
                            format!("{}: {}(...)", category.as_str(), symbol),
                        ));
                    }
                }
                Err(reason) => {
                    // Parse failure is a low-severity note; it never raises
                    // the risk beyond what the pattern tables found.
                    lex_warning = Some(format!("syntax_warning: {}", reason));
                }
            }
        }

        let risk_level = escalate(&findings);

        let mut detected_patterns: Vec<String> =
            findings.iter().map(|(_, text)| text.clone()).collect();
        if let Some(warning) = lex_warning {
            detected_patterns.push(warning);
        }

        let mut recommendations: Vec<String> = Vec::new();
        for (category, _) in &findings {
            let rec = category.recommendation().to_string();
            if !recommendations.contains(&rec) {
                recommendations.push(rec);
            }
        }

        let is_safe = permits(self.security_level, risk_level, &detected_patterns);

        CodeValidationResult {
            is_safe,
            risk_level,
            detected_patterns,
            recommendations,
        }
    }
}

fn escalate(findings: &[(PatternCategory, String)]) -> RiskLevel {
    let mut risk = RiskLevel::Low;
    for (category, _) in findings {
        let level = match category {
            PatternCategory::SystemCalls | PatternCategory::PrivilegeEscalation => {
                RiskLevel::Critical
            }
            PatternCategory::NetworkOperations | PatternCategory::FileOperations => RiskLevel::High,
            _ => RiskLevel::Medium,
        };
        if level > risk {
            risk = level;
        }
    }
    risk
}

fn permits(security_level: SecurityLevel, risk: RiskLevel, detected: &[String]) -> bool {
    match security_level {
        SecurityLevel::Low => risk < RiskLevel::Critical,
        SecurityLevel::Medium => risk < RiskLevel::High,
        SecurityLevel::High => risk < RiskLevel::Medium,
        // Maximum refuses anything the scan flagged at all, including code
        // the lexical pass could not fully read.
        SecurityLevel::Maximum => detected.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Lexical call-site scanning
// ---------------------------------------------------------------------------

/// Denylist-driven call-expression scan over comment- and string-stripped
/// source. Stands in for a full parser: good enough to catch `eval(...)`
/// while ignoring `"eval("` inside a string literal.
struct CallSiteScanner {
    denylist: &'static [(PatternCategory, &'static str)],
    style: CommentStyle,
}

#[derive(Clone, Copy)]
enum CommentStyle {
    Python,
    CLike,
}

impl CallSiteScanner {
    fn for_language(language: ExecutionLanguage) -> Option<Self> {
        match language {
            ExecutionLanguage::Python => Some(Self {
                denylist: &[
                    (PatternCategory::DynamicEvaluation, "eval"),
                    (PatternCategory::DynamicEvaluation, "exec"),
                    (PatternCategory::DynamicEvaluation, "compile"),
                    (PatternCategory::DynamicImport, "__import__"),
                    (PatternCategory::DynamicImport, "importlib.import_module"),
                    (PatternCategory::SystemCalls, "os.system"),
                    (PatternCategory::SystemCalls, "os.popen"),
                    (PatternCategory::SystemCalls, "subprocess.run"),
                    (PatternCategory::SystemCalls, "subprocess.call"),
                    (PatternCategory::SystemCalls, "subprocess.Popen"),
                    (PatternCategory::SystemCalls, "subprocess.check_output"),
                ],
                style: CommentStyle::Python,
            }),
            ExecutionLanguage::JavaScript
            | ExecutionLanguage::NodeJs
            | ExecutionLanguage::TypeScript => Some(Self {
                denylist: &[
                    (PatternCategory::DynamicEvaluation, "eval"),
                    (PatternCategory::DynamicEvaluation, "Function"),
                    (PatternCategory::DynamicImport, "import"),
                    (PatternCategory::DynamicImport, "require"),
                    (PatternCategory::SystemCalls, "child_process.exec"),
                    (PatternCategory::SystemCalls, "child_process.execSync"),
                    (PatternCategory::SystemCalls, "child_process.spawn"),
                ],
                style: CommentStyle::CLike,
            }),
            // No scanner for shell; the regex tables carry it alone.
            ExecutionLanguage::Bash => None,
        }
    }

    fn scan(&self, code: &str) -> Result<Vec<(PatternCategory, String)>, String> {
        let stripped = strip_literals(code, self.style)?;
        let mut calls = Vec::new();
        for (category, symbol) in self.denylist {
            let pattern = format!(r"(^|[^\w.]){}\s*\(", regex::escape(symbol));
            let re = Regex::new(&pattern).expect("denylist regex");
            if re.is_match(&stripped) {
                calls.push((*category, symbol.to_string()));
            }
        }
        Ok(calls)
    }
}

/// Replace comments and string-literal contents with spaces, preserving the
/// overall shape of the source. Returns an error for an unterminated string.
fn strip_literals(code: &str, style: CommentStyle) -> Result<String, String> {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match style {
            CommentStyle::Python => {
                if c == '#' {
                    while i < chars.len() && chars[i] != '\n' {
                        i += 1;
                    }
                    continue;
                }
                if c == '\'' || c == '"' {
                    let triple = i + 2 < chars.len() && chars[i + 1] == c && chars[i + 2] == c;
                    let end = if triple {
                        skip_triple_quoted(&chars, i + 3, c)
                    } else {
                        skip_single_quoted(&chars, i + 1, c)
                    };
                    match end {
                        Some(end) => {
                            out.push(' ');
                            i = end;
                            continue;
                        }
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
            }
            CommentStyle::CLike => {
                if c == '/' && i + 1 < chars.len() && chars[i + 1] == '/' {
                    while i < chars.len() && chars[i] != '\n' {
                        i += 1;
                    }
                    continue;
                }
                if c == '/' && i + 1 < chars.len() && chars[i + 1] == '*' {
                    let mut j = i + 2;
                    while j + 1 < chars.len() && !(chars[j] == '*' && chars[j + 1] == '/') {
                        j += 1;
                    }
                    if j + 1 >= chars.len() {
                        return Err("unterminated block comment".to_string());
                    }
                    i = j + 2;
                    continue;
                }
                if c == '\'' || c == '"' || c == '`' {
                    match skip_single_quoted(&chars, i + 1, c) {
                        Some(end) => {
                            out.push(' ');
                            i = end;
                            continue;
                        }
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
            }
        }
        out.push(c);
        i += 1;
    }

    Ok(out)
}

fn skip_single_quoted(chars: &[char], mut i: usize, quote: char) -> Option<usize> {
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return Some(i + 1),
            // Template literals span lines; ordinary strings do not.
            '\n' if quote != '`' => return None,
            _ => i += 1,
        }
    }
    None
}

fn skip_triple_quoted(chars: &[char], mut i: usize, quote: char) -> Option<usize> {
    while i + 2 < chars.len() {
        if chars[i] == '\\' {
            i += 2;
            continue;
        }
        if chars[i] == quote && chars[i + 1] == quote && chars[i + 2] == quote {
            return Some(i + 3);
        }
        i += 1;
    }
    None
}
