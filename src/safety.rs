//! The script safety checker (SPEC_FULL.md §4.8): a pure, stateless
//! classifier the dispatcher calls before any `evaluate` command reaches the
//! driver. Grounded on `security_service.py`'s pattern catalog and scoring.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct Verdict {
    pub level: RiskLevel,
    pub score: i32,
    pub risks: Vec<String>,
    pub safe_to_run: bool,
}

struct Pattern {
    regex: &'static str,
    severity: i32,
    description: &'static str,
}

const HIGH_SEVERITY: i32 = 60;
const MEDIUM_SEVERITY: i32 = 30;
const LOW_SEVERITY: i32 = 10;

fn catalog() -> &'static [Pattern] {
    static CATALOG: OnceLock<Vec<Pattern>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        vec![
            Pattern { regex: r"\beval\s*\(", severity: HIGH_SEVERITY, description: "calls eval" },
            Pattern { regex: r"\bnew\s+Function\s*\(", severity: HIGH_SEVERITY, description: "constructs a Function" },
            Pattern { regex: r"\bfetch\s*\(", severity: MEDIUM_SEVERITY, description: "issues a network request" },
            Pattern { regex: r"\bXMLHttpRequest\b", severity: MEDIUM_SEVERITY, description: "issues a network request" },
            Pattern { regex: r"\.innerHTML\s*=", severity: MEDIUM_SEVERITY, description: "writes innerHTML" },
            Pattern { regex: r"\bdocument\.write\s*\(", severity: MEDIUM_SEVERITY, description: "calls document.write" },
            Pattern { regex: r"\bwindow\.(top|parent)\b", severity: MEDIUM_SEVERITY, description: "reaches across frames" },
            Pattern { regex: r"\bwhile\s*\(\s*true\s*\)", severity: LOW_SEVERITY, description: "possible infinite loop" },
            Pattern { regex: r"\blocalStorage\b", severity: LOW_SEVERITY, description: "touches localStorage" },
        ]
    })
}

fn compiled() -> &'static [(Regex, i32, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, i32, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        catalog()
            .iter()
            .map(|p| (Regex::new(p.regex).expect("static pattern compiles"), p.severity, p.description))
            .collect()
    })
}

pub struct ScriptSafetyChecker;

impl Default for ScriptSafetyChecker {
    fn default() -> Self {
        Self
    }
}

impl ScriptSafetyChecker {
    /// Inspects each non-comment line against the pattern catalog and scores
    /// the result starting at 100. `strict` additionally blocks `Medium`.
    pub fn check(&self, code: &str, strict: bool) -> Verdict {
        let mut score: i32 = 100;
        let mut risks = Vec::new();
        let mut worst_severity = 0;

        for line in code.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("//") || trimmed.is_empty() {
                continue;
            }
            for (regex, severity, description) in compiled() {
                if regex.is_match(trimmed) {
                    score -= severity;
                    worst_severity = worst_severity.max(*severity);
                    risks.push(description.to_string());
                }
            }
        }

        let level = if worst_severity >= HIGH_SEVERITY {
            RiskLevel::High
        } else if worst_severity >= MEDIUM_SEVERITY {
            RiskLevel::Medium
        } else if worst_severity > 0 {
            RiskLevel::Low
        } else {
            RiskLevel::Low
        };

        let safe_to_run = match level {
            RiskLevel::High => false,
            RiskLevel::Medium => !strict,
            RiskLevel::Low => true,
        };

        Verdict {
            level,
            score: score.max(0),
            risks,
            safe_to_run,
        }
    }
}
