//! ジョブテーブルとバックグラウンド reap。
//!
//! ジョブの表示番号はエントリに保存せず、一覧表示のたびに挿入順から 0 始まりで計算する。
//! そのため削除しても番号の欠番や振り直しは発生しない。
//! reap（[`reap_jobs`]）はプロンプト表示前に 1 回呼ばれ、決してブロックしない。

use std::fmt;
use std::os::unix::io::RawFd;

use libc::pid_t;
use tracing::{debug, warn};

/// `waitpid` が失敗したときに報告する終了ステータス。
const WAIT_FAILED_STATUS: i32 = 1;

// ── データ構造 ───────────────────────────────────────────────────────

/// バックグラウンドジョブ。PID が生存中の一意な識別子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundJob {
    pid: pid_t,
    /// 表示用コマンド文字列（引数を空白 1 つで連結したもの）。生成後は不変。
    command: String,
}

impl BackgroundJob {
    pub fn pid(&self) -> pid_t {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

/// `jobs` の 1 行。`[index] pid command` 形式で表示する。
pub struct JobLine<'a> {
    pub index: usize,
    pub job: &'a BackgroundJob,
}

impl fmt::Display for JobLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.index, self.job.pid, self.job.command)
    }
}

// ── JobTable ─────────────────────────────────────────────────────────

/// ジョブテーブル。挿入順を保持する可変長配列で、エントリを排他的に所有する。
///
/// [`ShellSession`](crate::shell::ShellSession) が所有し、executor と builtins から
/// PID または表示番号でのみ参照される。
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<BackgroundJob>,
}

impl JobTable {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// ジョブを末尾に追加し、現在の表示番号を返す。
    pub fn append<S: AsRef<str>>(&mut self, pid: pid_t, raw_args: &[S]) -> usize {
        let command = raw_args
            .iter()
            .map(|a| a.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        self.jobs.push(BackgroundJob { pid, command });
        self.jobs.len() - 1
    }

    /// 表示番号付きで全ジョブを挿入順に返す。番号はこの呼び出しの時点で割り当てる。
    pub fn list(&self) -> impl Iterator<Item = JobLine<'_>> {
        self.jobs
            .iter()
            .enumerate()
            .map(|(index, job)| JobLine { index, job })
    }

    /// 表示番号 `index` のジョブを削除して返す。範囲外なら何も変更せず `None`。
    pub fn remove_by_index(&mut self, index: usize) -> Option<BackgroundJob> {
        if index < self.jobs.len() {
            Some(self.jobs.remove(index))
        } else {
            None
        }
    }

    /// PID が一致するジョブを削除して返す。該当なしなら何もしない。
    pub fn remove_by_pid(&mut self, pid: pid_t) -> Option<BackgroundJob> {
        let pos = self.jobs.iter().position(|j| j.pid == pid)?;
        Some(self.jobs.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// 登録中の全 PID（挿入順）。
    pub fn pids(&self) -> Vec<pid_t> {
        self.jobs.iter().map(|j| j.pid).collect()
    }
}

// ── reap ─────────────────────────────────────────────────────────────

/// 非ブロッキングで終了済みバックグラウンドジョブを回収する。
///
/// 登録中の各 PID に `waitpid(pid, WNOHANG)` を発行し、終了していればテーブルから削除する。
/// `waitpid(-1, ...)` を使わないのは、ジョブ以外の子（フォアグラウンド待機中の子など）を
/// 横取りしないため。完了したジョブは `[pid]  Done  command` を stderr に出力する。
pub fn reap_jobs(jobs: &mut JobTable) -> Vec<BackgroundJob> {
    let finished = reap_with(jobs, try_reap);
    for job in &finished {
        eprintln!("[{}]  Done  {}", job.pid, job.command);
    }
    finished
}

/// `exited(pid)` が `true` を返したジョブを削除して返す。
pub(crate) fn reap_with<F>(jobs: &mut JobTable, mut exited: F) -> Vec<BackgroundJob>
where
    F: FnMut(pid_t) -> bool,
{
    let mut finished = Vec::new();
    for pid in jobs.pids() {
        if exited(pid) {
            if let Some(job) = jobs.remove_by_pid(pid) {
                debug!(pid, command = %job.command, "reaped background job");
                finished.push(job);
            }
        }
    }
    finished
}

/// `waitpid(pid, WNOHANG)` で 1 プロセスを回収する。
///
/// 回収できた場合と、既に存在しない場合（`ECHILD`）に `true`。
fn try_reap(pid: pid_t) -> bool {
    let mut raw_status: i32 = 0;
    let ret = unsafe { libc::waitpid(pid, &mut raw_status, libc::WNOHANG) };
    if ret == pid {
        debug!(pid, status = decode_status(raw_status), "background child exited");
        return true;
    }
    if ret < 0 {
        let err = std::io::Error::last_os_error();
        return err.raw_os_error() == Some(libc::ECHILD);
    }
    false
}

// ── 待機ヘルパー ─────────────────────────────────────────────────────

/// `waitpid(pid, 0)` で子の終了までブロックし、終了ステータスを返す。
///
/// `EINTR` なら再試行する。それ以外の失敗（回収済みの `ECHILD` など）は
/// 成功と区別できるよう 1 を返す。
pub fn wait_for(pid: pid_t) -> i32 {
    loop {
        let mut raw_status: i32 = 0;
        let ret = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        if ret == pid {
            let status = decode_status(raw_status);
            debug!(pid, status, "foreground child exited");
            return status;
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        warn!(pid, error = %err, "waitpid failed");
        return WAIT_FAILED_STATUS;
    }
}

/// 停止中のプロセスグループに `SIGCONT` を送って再開させる。
///
/// 端末を読もうとしたバックグラウンドジョブは `SIGTTIN` で停止しているので、
/// 待機の前に必ず再開させる。停止していなければ何も起きない。
pub fn continue_group(pgid: pid_t) {
    if unsafe { libc::kill(-pgid, libc::SIGCONT) } != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "SIGCONT failed");
    }
}

// ── 端末制御 ─────────────────────────────────────────────────────────

/// `tcsetpgrp` で端末のフォアグラウンドプロセスグループを `pgid` にする。
///
/// シェルが SIGTTOU を無視しているため、バックグラウンドからの呼び出しでもブロックしない。
pub fn give_terminal_to(terminal_fd: RawFd, pgid: pid_t) {
    if unsafe { libc::tcsetpgrp(terminal_fd, pgid) } != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "tcsetpgrp failed");
    }
}

/// 端末のフォアグラウンドプロセスグループをシェルに戻す。
pub fn take_terminal_back(terminal_fd: RawFd, shell_pgid: pid_t) {
    give_terminal_to(terminal_fd, shell_pgid);
}

/// `waitpid` の raw status を終了コードに変換する。シグナル終了は 128 + シグナル番号。
pub fn decode_status(raw_status: i32) -> i32 {
    if libc::WIFEXITED(raw_status) {
        libc::WEXITSTATUS(raw_status)
    } else if libc::WIFSIGNALED(raw_status) {
        128 + libc::WTERMSIG(raw_status)
    } else {
        1
    }
}

// ── テスト ───────────────────────────────────────────────────────────
