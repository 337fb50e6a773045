//! シェルのセッション状態とプロンプト表示。
//!
//! ジョブテーブルとフォアグラウンドスロットをプロセスグローバルではなく
//! [`ShellSession`] に集約し、executor と builtins には参照で渡す。
//! スロットだけはシグナルハンドラと共有するため `&'static` で保持する。

use std::env;
use std::io::{self, Write};
use std::os::unix::io::RawFd;

use tracing::debug;

use crate::config::Config;
use crate::executor::{self, ExecError};
use crate::job::{self, JobTable};
use crate::parser;
use crate::signal::{self, ForegroundSlot};

/// シェルの実行状態。REPL ループ全体で共有される。
pub struct ShellSession {
    /// バックグラウンドジョブのレジストリ。
    pub jobs: JobTable,
    /// 同期待機中の子 PID。シグナルハンドラと共有する。
    pub foreground: &'static ForegroundSlot,
    /// `exit` ビルトインで false にセットされ、REPL ループを終了させる。
    pub running: bool,
    /// 直前のコマンドの終了ステータス。
    pub last_status: i32,
    pub config: Config,
    /// 対話端末の fd。stdin が端末でなければ `None` で、端末の受け渡しをしない。
    pub terminal_fd: Option<RawFd>,
    /// シェル自身のプロセスグループ。`fg` の後に端末を戻す先。
    pub shell_pgid: libc::pid_t,
}

impl ShellSession {
    /// シグナルハンドラが参照するグローバルスロットを使うセッション。
    ///
    /// stdin が端末なら、`fg` でジョブに端末を渡せるよう記録する。
    pub fn new(config: Config) -> Self {
        let mut session = Self::with_slot(config, signal::foreground_slot());
        if unsafe { libc::isatty(libc::STDIN_FILENO) } == 1 {
            session.terminal_fd = Some(libc::STDIN_FILENO);
        }
        session
    }

    /// スロットを指定して作る。端末は扱わない。
    pub fn with_slot(config: Config, foreground: &'static ForegroundSlot) -> Self {
        Self {
            jobs: JobTable::new(),
            foreground,
            running: true,
            last_status: 0,
            config,
            terminal_fd: None,
            shell_pgid: unsafe { libc::getpgrp() },
        }
    }

    /// 子の終了を同期的に待つ。待機中だけスロットに PID を載せる。
    pub fn wait_foreground(&self, pid: libc::pid_t) -> i32 {
        self.foreground.set(pid);
        let status = job::wait_for(pid);
        self.foreground.clear();
        status
    }

    /// バックグラウンドジョブをフォアグラウンドで再開し、終了を待つ。
    ///
    /// ジョブは独自のプロセスグループ（`pgid == pid`）にいるので、端末をそのグループに渡し、
    /// `SIGCONT` で再開させてから待つ。待機後は端末をシェルに戻す。
    pub fn resume_foreground(&self, pgid: libc::pid_t) -> i32 {
        if let Some(fd) = self.terminal_fd {
            job::give_terminal_to(fd, pgid);
        }
        job::continue_group(pgid);
        let status = self.wait_foreground(pgid);
        if let Some(fd) = self.terminal_fd {
            job::take_terminal_back(fd, self.shell_pgid);
        }
        status
    }

    /// 1 行を分類して実行する。
    ///
    /// 構文エラーは報告して `Ok(())`。`Err` はシェルを続行できない失敗のみ。
    pub fn run_line(&mut self, line: &str) -> Result<(), ExecError> {
        match parser::classify_with_limit(line, self.config.max_args) {
            Ok(Some(cmd)) => {
                debug!(?cmd, "classified");
                executor::execute(self, &cmd)?;
            }
            Ok(None) => {}
            Err(e) => {
                eprintln!("sish: {}", e);
                self.last_status = 2;
            }
        }
        Ok(())
    }

    /// 終了済みバックグラウンドジョブを回収する。ループ 1 周につき 1 回呼ぶ。
    pub fn reap(&mut self) {
        job::reap_jobs(&mut self.jobs);
    }
}

/// プロンプト文字列: カレントディレクトリ + 区切り。
///
/// カレントディレクトリが読めない場合はエラーを報告し、区切りだけを返す。
pub fn prompt_string(delimiter: &str) -> String {
    match env::current_dir() {
        Ok(dir) => format!("{}{}", dir.display(), delimiter),
        Err(e) => {
            eprintln!("sish: cannot read working directory: {}", e);
            delimiter.to_string()
        }
    }
}

/// プロンプトを stdout に出力してフラッシュする。
pub fn render_prompt(session: &ShellSession) -> io::Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "{}", prompt_string(&session.config.prompt_delimiter))?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SlotState;

    fn leaked_slot() -> &'static ForegroundSlot {
        Box::leak(Box::new(ForegroundSlot::new()))
    }

    #[test]
    fn new_session_state() {
        let session = ShellSession::with_slot(Config::default(), leaked_slot());
        assert!(session.running);
        assert!(session.jobs.is_empty());
        assert_eq!(session.foreground.state(), SlotState::Idle);
    }

    #[test]
    fn run_line_syntax_error_continues() {
        let mut session = ShellSession::with_slot(Config::default(), leaked_slot());
        session.run_line("a | b | c").unwrap();
        assert_eq!(session.last_status, 2);
        assert!(session.running);
    }

    #[test]
    fn run_line_blank_is_noop() {
        let mut session = ShellSession::with_slot(Config::default(), leaked_slot());
        session.run_line("   ").unwrap();
        assert_eq!(session.last_status, 0);
    }

    #[test]
    fn run_line_respects_arg_limit() {
        let config = Config {
            max_args: 2,
            ..Config::default()
        };
        let mut session = ShellSession::with_slot(config, leaked_slot());
        session.run_line("echo a b c").unwrap();
        assert_eq!(session.last_status, 2);
        session.run_line("exit").unwrap();
        assert!(!session.running);
    }

    #[test]
    fn prompt_ends_with_delimiter() {
        let prompt = prompt_string("> ");
        let cwd = env::current_dir().unwrap();
        assert_eq!(prompt, format!("{}> ", cwd.display()));
    }

    #[test]
    fn wait_foreground_clears_slot() {
        let session = ShellSession::with_slot(Config::default(), leaked_slot());
        let child = std::process::Command::new("sh")
            .args(["-c", "exit 7"])
            .spawn()
            .unwrap();
        assert_eq!(session.wait_foreground(child.id() as libc::pid_t), 7);
        assert_eq!(session.foreground.state(), SlotState::Idle);
    }
}
