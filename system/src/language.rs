use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const JAVASCRIPT_TEMPLATE: &str = r#"function solution(input) {
  // Write your code here
  return input;
}

console.log(solution('Hello, interview!'));"#;

const PYTHON_TEMPLATE: &str = r#"def solution(value):
    # Write your code here
    return value


print(solution("Hello, interview!"))"#;

const TYPESCRIPT_TEMPLATE: &str = r#"export function solution(input: string): string {
  // Write your code here
  return input;
}

console.log(solution("Hello, interview!"));"#;

/// Language of a session's shared buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[serde(alias = "js")]
    JavaScript,
    #[serde(alias = "py")]
    Python,
    #[serde(alias = "ts")]
    TypeScript,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown language: {0}")]
pub struct UnknownLanguage(pub String);

impl Language {
    pub const ALL: [Language; 3] = [Language::JavaScript, Language::Python, Language::TypeScript];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::TypeScript => "typescript",
        }
    }

    /// Buffer a new session starts with.
    pub fn starter_template(&self) -> &'static str {
        match self {
            Self::JavaScript => JAVASCRIPT_TEMPLATE,
            Self::Python => PYTHON_TEMPLATE,
            Self::TypeScript => TYPESCRIPT_TEMPLATE,
        }
    }

    /// Unknown or missing tags fall back to the default language instead of failing.
    pub fn parse_or_default(tag: Option<&str>) -> Self {
        tag.and_then(|tag| tag.parse().ok()).unwrap_or_default()
    }
}

impl std::default::Default for Language {
    fn default() -> Self {
        Self::JavaScript
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(Self::JavaScript),
            "python" | "py" => Ok(Self::Python),
            "typescript" | "ts" => Ok(Self::TypeScript),
            _ => Err(UnknownLanguage(s.to_owned())),
        }
    }
}
