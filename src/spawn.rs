//! `posix_spawnp()` の安全な Rust ラッパー。
//!
//! 子プロセスの生成と exec を 1 回の呼び出しで行い、fd の付け替えは
//! file actions として子側で適用させる。exec の失敗（コマンドが見つからない等）は
//! 子を残さず errno として親に返るので、シェル本体は影響を受けない。
//!
//! ## 構成
//!
//! | 型 | 役割 |
//! |-----|------|
//! | [`SpawnAttr`] | `posix_spawnattr_t` の RAII ラッパー（プロセスグループ、シグナル設定） |
//! | [`FileActions`] | `posix_spawn_file_actions_t` の RAII ラッパー（fd 操作） |
//! | [`CStringVec`] | argv 用の NULL 終端ポインタ配列 |
//! | [`spawn`] | 上記を組み合わせて `posix_spawnp` を呼ぶ公開関数 |

use std::ffi::CString;
use std::fmt;
use std::os::unix::io::RawFd;

use tracing::debug;

// ── エラー型 ──────────────────────────────────────────────────────

/// `posix_spawnp` の失敗を表すエラー。
#[derive(Debug)]
pub struct SpawnError {
    /// errno 値。
    pub errno: i32,
    /// コマンド名（エラーメッセージ用）。
    pub command: String,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self.errno {
            libc::ENOENT => "command not found".to_string(),
            libc::EACCES => "permission denied".to_string(),
            libc::EINVAL => "invalid argument".to_string(),
            errno => format!("cannot create process: {}", std::io::Error::from_raw_os_error(errno)),
        };
        write!(f, "{}: {}", self.command, msg)
    }
}

impl std::error::Error for SpawnError {}

impl SpawnError {
    /// エラーに対応する終了ステータスを返す。
    /// 127 = command not found, 126 = permission denied, 1 = その他。
    pub fn exit_status(&self) -> i32 {
        match self.errno {
            libc::ENOENT => 127,
            libc::EACCES => 126,
            _ => 1,
        }
    }

    /// プロセス自体を作れなかった（資源枯渇）なら `true`。シェルごと終了すべき失敗。
    ///
    /// それ以外（プログラムが見つからない・実行できない）は子だけの失敗として扱う。
    pub fn is_fatal(&self) -> bool {
        matches!(self.errno, libc::EAGAIN | libc::ENOMEM)
    }
}

// ── SpawnAttr ─────────────────────────────────────────────────────

/// `posix_spawnattr_t` の RAII ラッパー。Drop で自動 destroy。
struct SpawnAttr {
    inner: libc::posix_spawnattr_t,
}

impl SpawnAttr {
    fn new() -> Self {
        unsafe {
            let mut attr: libc::posix_spawnattr_t = std::mem::zeroed();
            libc::posix_spawnattr_init(&mut attr);
            Self { inner: attr }
        }
    }

    fn add_flags(&mut self, flag: libc::c_int) {
        unsafe {
            let mut flags: libc::c_short = 0;
            libc::posix_spawnattr_getflags(&self.inner, &mut flags);
            flags |= flag as libc::c_short;
            libc::posix_spawnattr_setflags(&mut self.inner, flags);
        }
    }

    /// 子を新しいプロセスグループのリーダーにする。
    ///
    /// バックグラウンドジョブに使う。端末からの Ctrl+C はシェルのグループにだけ届くので、
    /// バックグラウンドジョブは割り込みで終了しない。`fg` では端末をこのグループに渡す。
    fn set_own_pgroup(&mut self) {
        self.add_flags(libc::POSIX_SPAWN_SETPGROUP);
        unsafe {
            libc::posix_spawnattr_setpgroup(&mut self.inner, 0);
        }
    }

    /// SIGINT, SIGQUIT, SIGPIPE, SIGTTOU, SIGTTIN を子で `SIG_DFL` に戻す。
    ///
    /// Rust ランタイムはシェル自身の SIGPIPE を無視に設定するため、戻さないと
    /// パイプの書き手が読み手の終了後も動き続ける。SIGTTOU/SIGTTIN はシェルが無視している。
    fn set_sigdefault(&mut self) {
        self.add_flags(libc::POSIX_SPAWN_SETSIGDEF);
        unsafe {
            let mut sigset: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut sigset);
            for sig in [
                libc::SIGINT,
                libc::SIGQUIT,
                libc::SIGPIPE,
                libc::SIGTTOU,
                libc::SIGTTIN,
            ] {
                libc::sigaddset(&mut sigset, sig);
            }
            libc::posix_spawnattr_setsigdefault(&mut self.inner, &sigset);
        }
    }

    fn as_ptr(&self) -> *const libc::posix_spawnattr_t {
        &self.inner
    }
}

impl Drop for SpawnAttr {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawnattr_destroy(&mut self.inner);
        }
    }
}

// ── FileActions ───────────────────────────────────────────────────

/// `posix_spawn_file_actions_t` の RAII ラッパー。Drop で自動 destroy。
struct FileActions {
    inner: libc::posix_spawn_file_actions_t,
}

impl FileActions {
    fn new() -> Self {
        unsafe {
            let mut actions: libc::posix_spawn_file_actions_t = std::mem::zeroed();
            libc::posix_spawn_file_actions_init(&mut actions);
            Self { inner: actions }
        }
    }

    /// `dup2(fd, newfd)` アクションを追加する。パイプ接続・リダイレクト用。
    fn add_dup2(&mut self, fd: RawFd, newfd: RawFd) {
        unsafe {
            libc::posix_spawn_file_actions_adddup2(&mut self.inner, fd, newfd);
        }
    }

    /// `close(fd)` アクションを追加する。
    fn add_close(&mut self, fd: RawFd) {
        unsafe {
            libc::posix_spawn_file_actions_addclose(&mut self.inner, fd);
        }
    }

    fn as_ptr(&self) -> *const libc::posix_spawn_file_actions_t {
        &self.inner
    }
}

impl Drop for FileActions {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawn_file_actions_destroy(&mut self.inner);
        }
    }
}

// ── CStringVec ────────────────────────────────────────────────────

/// argv 用の CString ベクタ。NULL 終端のポインタ配列を構築する。
struct CStringVec {
    _strings: Vec<CString>,
    ptrs: Vec<*mut libc::c_char>,
}

impl CStringVec {
    /// 引数に NUL バイトが含まれていれば `None`。
    fn from_args<S: AsRef<str>>(args: &[S]) -> Option<Self> {
        let strings = args
            .iter()
            .map(|s| CString::new(s.as_ref()).ok())
            .collect::<Option<Vec<CString>>>()?;
        let mut ptrs: Vec<*mut libc::c_char> = strings
            .iter()
            .map(|s| s.as_ptr() as *mut libc::c_char)
            .collect();
        ptrs.push(std::ptr::null_mut()); // NULL 終端
        Some(Self {
            _strings: strings,
            ptrs,
        })
    }

    fn as_ptr(&self) -> *const *mut libc::c_char {
        self.ptrs.as_ptr()
    }
}

// ── spawn 関数 ────────────────────────────────────────────────────

/// 子プロセスの fd とプロセスグループの指定。
#[derive(Debug, Default, Clone)]
pub struct SpawnOptions {
    /// stdin に接続する fd（`None` なら継承）。
    pub stdin_fd: Option<RawFd>,
    /// stdout に接続する fd（`None` なら継承）。
    pub stdout_fd: Option<RawFd>,
    /// 子プロセスで閉じる fd（パイプの未使用端など）。
    pub fds_to_close: Vec<RawFd>,
    /// `true` なら子を独自のプロセスグループに置く（バックグラウンドジョブ用）。
    pub own_process_group: bool,
}

/// `posix_spawnp` で子プロセスを起動する。成功時は子 PID を返す。
///
/// `args[0]` がコマンド名で、PATH 検索される。`args` は空であってはならない。
pub fn spawn<S: AsRef<str>>(args: &[S], opts: &SpawnOptions) -> Result<libc::pid_t, SpawnError> {
    let command = args
        .first()
        .map(|a| a.as_ref().to_string())
        .unwrap_or_default();
    let argv = match CStringVec::from_args(args) {
        Some(argv) if !args.is_empty() => argv,
        _ => {
            return Err(SpawnError {
                errno: libc::EINVAL,
                command,
            })
        }
    };

    let mut attr = SpawnAttr::new();
    attr.set_sigdefault();
    if opts.own_process_group {
        attr.set_own_pgroup();
    }

    // ファイルアクション: dup2 で付け替えた元 fd は閉じる
    let mut actions = FileActions::new();
    if let Some(fd) = opts.stdin_fd {
        actions.add_dup2(fd, libc::STDIN_FILENO);
        if fd != libc::STDIN_FILENO {
            actions.add_close(fd);
        }
    }
    if let Some(fd) = opts.stdout_fd {
        actions.add_dup2(fd, libc::STDOUT_FILENO);
        if fd != libc::STDOUT_FILENO {
            actions.add_close(fd);
        }
    }
    for &fd in &opts.fds_to_close {
        // dup2 の後で既に close 済みの fd を再 close しない
        let already_closed = [opts.stdin_fd, opts.stdout_fd].contains(&Some(fd));
        if !already_closed {
            actions.add_close(fd);
        }
    }

    // environ を継承
    extern "C" {
        static environ: *const *mut libc::c_char;
    }

    let mut pid: libc::pid_t = 0;
    let ret = unsafe {
        libc::posix_spawnp(
            &mut pid,
            argv.as_ptr().read() as *const libc::c_char,
            actions.as_ptr(),
            attr.as_ptr(),
            argv.as_ptr(),
            environ as *const *mut libc::c_char,
        )
    };

    if ret != 0 {
        debug!(command = %command, errno = ret, "posix_spawnp failed");
        return Err(SpawnError {
            errno: ret,
            command,
        });
    }

    debug!(pid, command = %command, "spawned child");
    Ok(pid)
}

// ── テスト ────────────────────────────────────────────────────────
