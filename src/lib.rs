//! sish ライブラリ — テスト・ベンチマーク用にモジュールを公開する。
//!
//! バイナリ本体は `main.rs` の REPL ループ。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`parser`] | トークナイザ + 分類器（単純コマンド / 2 段パイプ / `>` リダイレクト、`&`） |
//! | [`executor`] | コマンド実行（ビルトイン判定、パイプ接続、リダイレクト、フォアグラウンド待機） |
//! | [`spawn`] | `posix_spawnp` ラッパー |
//! | [`job`] | ジョブテーブル（追加・一覧・番号/PID で削除）と非ブロッキング reap |
//! | [`signal`] | SIGINT ハンドラとフォアグラウンド子スロット |
//! | [`builtins`] | ビルトイン（`exit`, `cd`, `pwd`, `jobs`, `fg`） |
//! | [`shell`] | セッション状態（ジョブテーブル、スロット、設定）とプロンプト |
//! | [`reader`] | 1 行読み取り |
//! | [`config`] | 環境変数からの設定 |

pub mod builtins;
pub mod config;
pub mod executor;
pub mod job;
pub mod parser;
pub mod reader;
pub mod shell;
pub mod signal;
pub mod spawn;
