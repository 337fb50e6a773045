//! 環境変数からの設定読み込み。
//!
//! | 変数 | 既定値 | 意味 |
//! |------|--------|------|
//! | `SISH_MAX_ARGS` | `20` | 1 コマンドあたりの引数上限 |
//! | `SISH_PROMPT` | `> ` | プロンプトのカレントディレクトリ直後に付ける区切り |
//! | `SISH_LOG` | `warn` | `tracing` のフィルタ（`main` のサブスクライバが読む） |

use std::env;

use thiserror::Error;

use crate::parser::DEFAULT_MAX_ARGS;

pub const MAX_ARGS_VAR: &str = "SISH_MAX_ARGS";
pub const PROMPT_VAR: &str = "SISH_PROMPT";
pub const LOG_VAR: &str = "SISH_LOG";

pub const DEFAULT_PROMPT_DELIMITER: &str = "> ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: expected a positive integer, got `{value}`")]
    InvalidNumber { var: &'static str, value: String },
}

/// シェルの設定値。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub max_args: usize,
    pub prompt_delimiter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_args: DEFAULT_MAX_ARGS,
            prompt_delimiter: DEFAULT_PROMPT_DELIMITER.to_string(),
        }
    }
}

impl Config {
    /// プロセスの環境変数から読み込む。未設定の変数は既定値。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// `lookup` で変数を引いて設定を組み立てる。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(MAX_ARGS_VAR) {
            config.max_args = match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        var: MAX_ARGS_VAR,
                        value,
                    })
                }
            };
        }
        if let Some(value) = lookup(PROMPT_VAR) {
            config.prompt_delimiter = value;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_args, 20);
        assert_eq!(config.prompt_delimiter, "> ");
    }

    #[test]
    fn overrides() {
        let config =
            Config::from_lookup(lookup_from(&[(MAX_ARGS_VAR, "64"), (PROMPT_VAR, " $ ")])).unwrap();
        assert_eq!(config.max_args, 64);
        assert_eq!(config.prompt_delimiter, " $ ");
    }

    #[test]
    fn invalid_max_args() {
        let err = Config::from_lookup(lookup_from(&[(MAX_ARGS_VAR, "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                var: MAX_ARGS_VAR,
                value: "lots".to_string(),
            }
        );
    }

    #[test]
    fn zero_max_args_rejected() {
        assert!(Config::from_lookup(lookup_from(&[(MAX_ARGS_VAR, "0")])).is_err());
    }
}
