//! Parser configuration.
//!
//! [`ParserOptions`] can be built in code or loaded from YAML:
//!
//! ```yaml
//! start: [value, dict]
//! lexer: basic
//! keep_all_tokens: false
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::LarchError;

/// How the lexer picks candidate terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LexerMode {
    /// Only terminals the parser can accept next are tried first.
    #[default]
    Contextual,
    /// Every terminal is tried everywhere.
    Basic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserOptions {
    /// Start rules to build tables for. The first is the default.
    pub start: Vec<String>,
    pub lexer: LexerMode,
    /// Keep anonymous literal tokens in every rule, as if all were `!rule`.
    pub keep_all_tokens: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            start: vec!["start".to_string()],
            lexer: LexerMode::default(),
            keep_all_tokens: false,
        }
    }
}

impl ParserOptions {
    pub fn from_yaml_str(text: &str) -> Result<Self, LarchError> {
        serde_yaml::from_str(text).map_err(|e| LarchError::Config {
            message: format!("invalid parser options: {}", e),
            source: Some(Box::new(e)),
        })
    }

    /// Replaces the start rules with `start` alone.
    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.start = vec![start.into()];
        self
    }

    pub fn with_starts<I, S>(mut self, starts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start = starts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lexer(mut self, lexer: LexerMode) -> Self {
        self.lexer = lexer;
        self
    }

    pub fn with_keep_all_tokens(mut self, keep: bool) -> Self {
        self.keep_all_tokens = keep;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorType;

    #[test]
    fn yaml_overrides_defaults() {
        let options = ParserOptions::from_yaml_str("start: [value]\nlexer: basic\n").unwrap();
        assert_eq!(options.start, vec!["value"]);
        assert_eq!(options.lexer, LexerMode::Basic);
        assert!(!options.keep_all_tokens);
    }

    #[test]
    fn unknown_fields_are_config_errors() {
        let err = ParserOptions::from_yaml_str("strat: [value]\n").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);
    }
}
