use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Statements containing any of these as a whole word never reach the database.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "TRUNCATE", "EXEC", "EXECUTE",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    /// Uppercased keyword that caused the rejection.
    pub keyword: Option<String>,
}

/// Syntactic denylist check. This is a backstop against model drift, not a
/// SQL sandbox: it does not parse, and anything it does not list gets through.
#[derive(Debug, Clone)]
pub struct SafetyGate {
    keywords: Vec<String>,
    pattern: Regex,
}

impl SafetyGate {
    pub fn new<I, S>(keywords: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_uppercase();
            if !keyword.is_empty() && !list.contains(&keyword) {
                list.push(keyword);
            }
        }

        let alternation = list
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        // An empty alternation would match at every word boundary.
        let source = if list.is_empty() {
            r"[^\s\S]".to_string()
        } else {
            format!(r"\b(?:{})\b", alternation)
        };
        let pattern = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            keywords: list,
            pattern,
        })
    }

    /// Default denylist plus any configured additions.
    pub fn with_extra(extra: &[String]) -> Result<Self, regex::Error> {
        Self::new(
            DEFAULT_DENYLIST
                .iter()
                .map(|k| k.to_string())
                .chain(extra.iter().cloned()),
        )
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn check(&self, sql: &str) -> SafetyVerdict {
        match self.pattern.find(sql) {
            Some(hit) => SafetyVerdict {
                safe: false,
                keyword: Some(hit.as_str().to_uppercase()),
            },
            None => SafetyVerdict {
                safe: true,
                keyword: None,
            },
        }
    }

    pub fn is_safe(&self, sql: &str) -> bool {
        self.check(sql).safe
    }
}
