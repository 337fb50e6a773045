//! sish — 2 段パイプ・出力リダイレクト・バックグラウンドジョブに対応した小さなシェル
//!
//! REPLループ: reap → プロンプト表示 → 1 行読み取り → 分類 → 実行 → ループ

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use sish::config::{Config, LOG_VAR};
use sish::reader::{self, LineReader};
use sish::shell::{self, ShellSession};
use sish::signal;

/// `SISH_LOG` に従ってログを stderr に出す。未設定なら `warn`。
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 入力が尽きるか `exit` されるまでコマンドを読み取り実行する。
///
/// 子プロセスやパイプを作れない場合だけ `Err` を返す。
fn run(session: &mut ShellSession, reader: &mut dyn LineReader) -> anyhow::Result<()> {
    while session.running {
        // プロンプト前に終了済みバックグラウンドジョブを回収
        session.reap();

        shell::render_prompt(session).context("failed to write prompt")?;

        let line = match reader.read_line().context("failed to read input")? {
            Some(line) => line,
            None => {
                // EOF (Ctrl+D): 改行を出力して正常終了
                println!();
                break;
            }
        };

        session.run_line(&line)?;
    }
    Ok(())
}

fn main() {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("sish: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = signal::install() {
        eprintln!("sish: cannot install signal handlers: {}", e);
        std::process::exit(1);
    }

    let mut session = ShellSession::new(config);
    let mut reader = reader::stdin_reader();

    if let Err(e) = run(&mut session, &mut reader) {
        eprintln!("sish: {:#}", e);
        std::process::exit(1);
    }
}
