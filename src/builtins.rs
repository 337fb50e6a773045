//! ビルトインコマンドの実装。
//!
//! ビルトインは子プロセスを作らずシェル自身のプロセス内で実行される。
//! `try_exec()` が `Some(status)` を返せばビルトインとして処理済み、
//! `None` なら外部コマンドとして executor に委ねる。
//! 出力は `out` に書く（通常は stdout、テストではバッファ）。エラーは stderr。

use std::env;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::shell::ShellSession;

/// ビルトインコマンドの実行を試みる。
///
/// 戻り値:
/// - `Some(status)` — ビルトインとして実行済み
/// - `None` — 該当するビルトインなし（外部コマンドとして実行すべき）
pub fn try_exec<S: AsRef<str>>(
    session: &mut ShellSession,
    args: &[S],
    out: &mut dyn Write,
) -> Option<i32> {
    let args: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();
    let status = match *args.first()? {
        "exit" => builtin_exit(session),
        "cd" => builtin_cd(&args, out),
        "pwd" => builtin_pwd(out),
        "jobs" => builtin_jobs(session, out),
        "fg" => builtin_fg(session, &args, out),
        _ => return None,
    };
    let _ = out.flush();
    Some(status)
}

/// `exit` — REPL ループを終了させる。
fn builtin_exit(session: &mut ShellSession) -> i32 {
    session.running = false;
    0
}

/// `cd [dir]` — カレントディレクトリを変更する。引数省略時はカレントディレクトリを表示。
fn builtin_cd(args: &[&str], out: &mut dyn Write) -> i32 {
    let target = match args.get(1) {
        Some(target) => *target,
        None => return builtin_pwd(out),
    };

    if let Err(e) = env::set_current_dir(Path::new(target)) {
        eprintln!("sish: cd: {}: {}", target, e);
        1
    } else {
        0
    }
}

/// `pwd` — カレントディレクトリを表示する。
fn builtin_pwd(out: &mut dyn Write) -> i32 {
    match env::current_dir() {
        Ok(dir) => {
            let _ = writeln!(out, "{}", dir.display());
            0
        }
        Err(e) => {
            eprintln!("sish: pwd: {}", e);
            1
        }
    }
}

/// `jobs` — `[index] pid command` を 1 行ずつ表示する。
fn builtin_jobs(session: &ShellSession, out: &mut dyn Write) -> i32 {
    for line in session.jobs.list() {
        let _ = writeln!(out, "{}", line);
    }
    0
}

/// `fg [index]` — ジョブをテーブルから外し、終了までフォアグラウンドで待つ。
///
/// 引数省略時は番号 0。ジョブは待機の前にテーブルから削除される。
/// 端末の読み取りで停止したジョブも再開させてから待つ。
fn builtin_fg(session: &mut ShellSession, args: &[&str], out: &mut dyn Write) -> i32 {
    let index = match args.get(1) {
        None => 0,
        Some(arg) => match arg.parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("sish: fg: {}: numeric argument required", arg);
                return 1;
            }
        },
    };

    let job = match session.jobs.remove_by_index(index) {
        Some(job) => job,
        None => {
            eprintln!("sish: fg: {}: no such job", index);
            return 1;
        }
    };

    let _ = writeln!(out, "{}", job.command());
    let _ = out.flush();
    debug!(pid = job.pid(), index, "foregrounding job");
    session.resume_foreground(job.pid())
}

// ── テスト ───────────────────────────────────────────────────────────
