//! コマンド実行: ビルトイン判定、子プロセス起動、パイプ接続、出力リダイレクト、
//! フォアグラウンド待機 / バックグラウンド登録。
//!
//! - [`execute`]: 分類済みコマンドを形状ごとに実行する
//!   - `Plain`: ビルトインならプロセス内で実行、それ以外は 1 子を起動
//!     - foreground: スロットに PID を載せて `waitpid` で待機
//!     - background: 独自プロセスグループで起動し、ジョブテーブルに登録して即座に返る
//!   - `Piped`: 1 本のパイプで 2 子を接続し、左 → 右の順に待機
//!   - `Redirected`: 親でターゲットを開き、子の stdout に付け替えて待機
//!
//! 子プロセスを作れない・パイプを作れないときだけ [`ExecError`] を返す（シェルごと終了）。
//! コマンドが見つからない等の失敗は報告して終了ステータスを返し、シェルは続行する。

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use thiserror::Error;
use tracing::debug;

use crate::builtins;
use crate::parser::{CommandShape, ParsedCommand};
use crate::shell::ShellSession;
use crate::spawn::{self, SpawnError, SpawnOptions};

/// リダイレクト先ファイルのパーミッション（umask 適用前）。
const REDIRECT_MODE: u32 = 0o644;

/// シェルを続行できない失敗。
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("fork failed: {0}")]
    Spawn(#[source] SpawnError),
}

/// 分類済みコマンドを実行し、終了ステータスを返す。
///
/// 戻り値のステータスは `session.last_status` にも記録される。
pub fn execute(session: &mut ShellSession, cmd: &ParsedCommand) -> Result<i32, ExecError> {
    let status = match &cmd.shape {
        CommandShape::Plain(args) => execute_plain(session, args, cmd.background)?,
        CommandShape::Piped { left, right } => {
            if cmd.background {
                debug!("background marker ignored for pipeline");
            }
            execute_piped(session, left, right, None)?
        }
        CommandShape::Redirected { args, target } => {
            if cmd.background {
                debug!("background marker ignored for redirection");
            }
            execute_redirected(session, args, target)?
        }
    };
    session.last_status = status;
    Ok(status)
}

/// spawn の失敗を振り分ける。致命的なら `Err`、子だけの失敗なら報告してステータスを返す。
fn launch_failure(e: SpawnError) -> Result<i32, ExecError> {
    if e.is_fatal() {
        return Err(ExecError::Spawn(e));
    }
    eprintln!("sish: {}", e);
    Ok(e.exit_status())
}

// ── Plain ───────────────────────────────────────────────────────────

fn execute_plain(
    session: &mut ShellSession,
    args: &[String],
    background: bool,
) -> Result<i32, ExecError> {
    if let Some(status) = builtins::try_exec(session, args, &mut io::stdout()) {
        return Ok(status);
    }

    let opts = SpawnOptions {
        own_process_group: background,
        ..SpawnOptions::default()
    };
    let pid = match spawn::spawn(args, &opts) {
        Ok(pid) => pid,
        Err(e) => return launch_failure(e),
    };

    if background {
        let index = session.jobs.append(pid, args);
        debug!(pid, index, "registered background job");
        println!("[{}] {}", index, pid);
        Ok(0)
    } else {
        Ok(session.wait_foreground(pid))
    }
}

// ── Piped ───────────────────────────────────────────────────────────

/// 単方向パイプの両端。Drop で両端を close する。
struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl Pipe {
    /// `pipe2(2)` で両端を `O_CLOEXEC` 付きで作成する。
    ///
    /// 作成と同時にフラグが立つので、並行する spawn に端が漏れない。
    /// 子では dup2 した fd だけが exec を越えて残る（dup2 は `FD_CLOEXEC` を引き継がない）。
    fn new() -> io::Result<Self> {
        let mut fds = [-1i32; 2];
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(unsafe {
            Self {
                read: OwnedFd::from_raw_fd(fds[0]),
                write: OwnedFd::from_raw_fd(fds[1]),
            }
        })
    }
}

/// `left | right` を実行する。
///
/// - 左の子: stdout → パイプ書き込み端、読み込み端は close
/// - 右の子: stdin → パイプ読み込み端、書き込み端は close。stdout は `final_stdout`（`None` なら継承）
/// - 親: 両方の spawn 後に両端を close し、左 → 右の順に待機
///
/// 終了ステータスは右の子のもの。
fn execute_piped(
    session: &mut ShellSession,
    left: &[String],
    right: &[String],
    final_stdout: Option<RawFd>,
) -> Result<i32, ExecError> {
    let pipe = Pipe::new().map_err(ExecError::Pipe)?;
    let read_fd = pipe.read.as_raw_fd();
    let write_fd = pipe.write.as_raw_fd();

    let left_opts = SpawnOptions {
        stdout_fd: Some(write_fd),
        fds_to_close: vec![read_fd],
        ..SpawnOptions::default()
    };
    let left_pid = match spawn::spawn(left, &left_opts) {
        Ok(pid) => pid,
        Err(e) => return launch_failure(e),
    };

    let right_opts = SpawnOptions {
        stdin_fd: Some(read_fd),
        stdout_fd: final_stdout,
        fds_to_close: vec![write_fd],
        ..SpawnOptions::default()
    };
    let right = spawn::spawn(right, &right_opts);

    // 親側の両端を閉じる。書き込み端が残ると右の子が EOF を受け取れない
    drop(pipe);

    let right_pid = match right {
        Ok(pid) => pid,
        Err(e) => {
            // 左の子は読み手がいないので SIGPIPE で終了する
            session.wait_foreground(left_pid);
            return launch_failure(e);
        }
    };

    debug!(left_pid, right_pid, "pipeline started");
    session.wait_foreground(left_pid);
    Ok(session.wait_foreground(right_pid))
}

// ── Redirected ──────────────────────────────────────────────────────

/// リダイレクト先を書き込み用に開く（なければ作成、あれば切り詰め、0644）。
fn open_redirect_target(target: &str) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(REDIRECT_MODE)
        .open(target)
}

/// `args > target` を実行する。
///
/// ターゲットを開けなければ子を起動せずに失敗を報告する。
fn execute_redirected(
    session: &mut ShellSession,
    args: &[String],
    target: &str,
) -> Result<i32, ExecError> {
    let file = match open_redirect_target(target) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("sish: {}: {}", target, e);
            return Ok(1);
        }
    };

    let opts = SpawnOptions {
        stdout_fd: Some(file.as_raw_fd()),
        ..SpawnOptions::default()
    };
    let pid = match spawn::spawn(args, &opts) {
        Ok(pid) => pid,
        Err(e) => return launch_failure(e),
    };
    // 親側の fd は不要
    drop(file);

    Ok(session.wait_foreground(pid))
}

// ── テスト ──────────────────────────────────────────────────────────
