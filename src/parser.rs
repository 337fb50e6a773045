//! トークナイザ + 分類器: 入力行を 3 種類のコマンド形状のいずれかに変換する。
//!
//! ## 対応構文
//!
//! - 単純コマンド: `ls -la`
//! - 2 段パイプライン: `cmd1 | cmd2`（3 段以上はエラー）
//! - 出力リダイレクト: `cmd > file`（`>>` も上書きとして扱う）
//! - バックグラウンド実行: 行のどこかに `&` があれば background フラグを立てる
//!
//! 分類の優先順位は `>` → `|` → 単純コマンド。`>` と `|` が両方ある行は
//! リダイレクトとして扱い、右辺のパイプ構文は解釈しない。
//! クォート・エスケープ・変数展開は行わない。

use thiserror::Error;

/// 1 コマンドあたりの引数数の既定上限。
pub const DEFAULT_MAX_ARGS: usize = 20;

/// バックグラウンド実行マーカー。
pub const BACKGROUND_MARKER: &str = "&";

// ── AST ─────────────────────────────────────────────────────────────

/// 分類済みコマンド。形状と background フラグを持つ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub shape: CommandShape,
    /// 生の入力行に `&` が含まれていれば `true`。形状に依らず独立に判定する。
    pub background: bool,
}

/// コマンドの形状。各引数ベクタの先頭要素がプログラム名。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandShape {
    /// `cmd args...`
    Plain(Vec<String>),
    /// `left | right` — left の stdout を right の stdin に接続する。
    Piped { left: Vec<String>, right: Vec<String> },
    /// `cmd args... > target`
    Redirected { args: Vec<String>, target: String },
}

// ── Error ───────────────────────────────────────────────────────────

/// パース時に発生しうるエラー。いずれも回復可能で、シェルは次の入力に進む。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// 引数が上限を超えた。
    #[error("too many arguments (limit is {limit})")]
    TooManyArguments { limit: usize },
    /// `>` の右辺にファイル名がない（`echo > &` など）。
    #[error("syntax error: missing redirect target")]
    MissingRedirectTarget,
    /// パイプまたはリダイレクトの片側にコマンドがない。
    #[error("syntax error: missing command")]
    MissingCommand,
    /// 3 段以上のパイプライン。
    #[error("syntax error: only two-command pipelines are supported")]
    TooManyStages,
}

// ── Tokenizer ───────────────────────────────────────────────────────

/// 既定上限で [`tokenize_with_limit`] を呼ぶ。
pub fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    tokenize_with_limit(line, DEFAULT_MAX_ARGS)
}

/// 空白の連続で分割して引数ベクタを作る。
///
/// `&` 単独のトークンに到達したらそこで打ち切り、`&` 自体は含めない。
/// 空白のみの行は空ベクタ。トークン数が `limit` を超えたら
/// [`ParseError::TooManyArguments`]。
pub fn tokenize_with_limit(line: &str, limit: usize) -> Result<Vec<String>, ParseError> {
    let mut args = Vec::new();
    for token in line.split_whitespace() {
        if token == BACKGROUND_MARKER {
            break;
        }
        if args.len() == limit {
            return Err(ParseError::TooManyArguments { limit });
        }
        args.push(token.to_string());
    }
    Ok(args)
}

// ── Classifier ──────────────────────────────────────────────────────

/// 既定上限で [`classify_with_limit`] を呼ぶ。
pub fn classify(line: &str) -> Result<Option<ParsedCommand>, ParseError> {
    classify_with_limit(line, DEFAULT_MAX_ARGS)
}

/// 入力行を分類する。
///
/// 戻り値:
/// - `Ok(Some(cmd))` — 実行すべきコマンド
/// - `Ok(None)` — トークンが 1 つもない行（空行、`&` のみ）
/// - `Err(e)` — 構文エラー
///
/// 区切り文字の右辺が空白のみなら次の規則にフォールスルーする。
/// そのため `echo hi >` は `Plain(["echo", "hi", ">"])` になる。
pub fn classify_with_limit(line: &str, limit: usize) -> Result<Option<ParsedCommand>, ParseError> {
    let background = line.contains(BACKGROUND_MARKER);

    if let Some(shape) = classify_redirect(line, limit)? {
        return Ok(Some(ParsedCommand { shape, background }));
    }
    if let Some(shape) = classify_pipe(line, limit)? {
        return Ok(Some(ParsedCommand { shape, background }));
    }

    let args = tokenize_with_limit(line, limit)?;
    if args.is_empty() {
        return Ok(None);
    }
    Ok(Some(ParsedCommand {
        shape: CommandShape::Plain(args),
        background,
    }))
}

/// 最初の `>` で分割する。右辺が空白のみなら `None`。
fn classify_redirect(line: &str, limit: usize) -> Result<Option<CommandShape>, ParseError> {
    let (left, right) = match line.split_once('>') {
        Some(parts) => parts,
        None => return Ok(None),
    };
    if right.trim().is_empty() {
        return Ok(None);
    }

    // 右辺の最初のワードがターゲット。`>` も区切りとして扱い、残りは無視する。
    let target = right
        .split(|c: char| c == '>' || c.is_whitespace())
        .find(|w| !w.is_empty())
        .filter(|w| *w != BACKGROUND_MARKER)
        .ok_or(ParseError::MissingRedirectTarget)?;

    let args = tokenize_with_limit(left, limit)?;
    if args.is_empty() {
        return Err(ParseError::MissingCommand);
    }
    Ok(Some(CommandShape::Redirected {
        args,
        target: target.to_string(),
    }))
}

/// 最初の `|` で分割する。右辺が空白のみなら `None`。
fn classify_pipe(line: &str, limit: usize) -> Result<Option<CommandShape>, ParseError> {
    let (left, right) = match line.split_once('|') {
        Some(parts) => parts,
        None => return Ok(None),
    };
    if right.trim().is_empty() {
        return Ok(None);
    }
    if right.contains('|') {
        return Err(ParseError::TooManyStages);
    }

    let left = tokenize_with_limit(left, limit)?;
    let right = tokenize_with_limit(right, limit)?;
    if left.is_empty() || right.is_empty() {
        return Err(ParseError::MissingCommand);
    }
    Ok(Some(CommandShape::Piped { left, right }))
}

// ── テスト ──────────────────────────────────────────────────────────
