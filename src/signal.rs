//! SIGINT ハンドラとフォアグラウンド子プロセスのスロット。
//!
//! シグナルハンドラとメインループで共有される唯一の状態が [`ForegroundSlot`]。
//! ハンドラは非同期に実行されるため、スロットは `AtomicI32` のみで構成し、
//! ハンドラ内ではアトミック操作と `kill(2)` 以外は行わない。
//!
//! 状態遷移:
//! - `Idle` → `ChildActive`: executor がブロッキング待機の直前に [`ForegroundSlot::set`]
//! - `ChildActive` → `Idle`: 割り込み（[`ForegroundSlot::interrupt`]）または子の終了後の [`ForegroundSlot::clear`]

use std::io;
use std::sync::atomic::{AtomicI32, Ordering};

use libc::pid_t;

/// 割り込み時にフォアグラウンド子へ送るシグナル。
pub const TERMINATION_SIGNAL: libc::c_int = libc::SIGQUIT;

/// 「子なし」を表すスロット値。PID 0 は子プロセスになりえない。
const NO_CHILD: pid_t = 0;

/// シグナルハンドラが参照するプロセス全体で唯一のスロット。
static FOREGROUND: ForegroundSlot = ForegroundSlot::new();

/// 割り込み制御の状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    ChildActive(pid_t),
}

/// 同期待機中の子 PID を保持する単一スロット。
#[derive(Debug)]
pub struct ForegroundSlot {
    pid: AtomicI32,
}

impl ForegroundSlot {
    pub const fn new() -> Self {
        Self {
            pid: AtomicI32::new(NO_CHILD),
        }
    }

    /// ブロッキング待機の直前に呼ぶ。
    pub fn set(&self, pid: pid_t) {
        self.pid.store(pid, Ordering::SeqCst);
    }

    /// 待機終了後に呼ぶ。割り込みで既に空になっていても問題ない。
    pub fn clear(&self) {
        self.pid.store(NO_CHILD, Ordering::SeqCst);
    }

    pub fn state(&self) -> SlotState {
        match self.pid.load(Ordering::SeqCst) {
            NO_CHILD => SlotState::Idle,
            pid => SlotState::ChildActive(pid),
        }
    }

    /// 割り込みを処理する。async-signal-safe。
    ///
    /// 子が登録されていればスロットを空にして [`TERMINATION_SIGNAL`] を送り、その PID を返す。
    /// 停止中の子にはシグナルが保留されたままになるので、続けて `SIGCONT` も送る。
    /// 子がいなければ何もせず `None`（シェル自体は終了しない）。
    pub fn interrupt(&self) -> Option<pid_t> {
        let pid = self.pid.swap(NO_CHILD, Ordering::SeqCst);
        if pid == NO_CHILD {
            return None;
        }
        unsafe {
            libc::kill(pid, TERMINATION_SIGNAL);
            libc::kill(pid, libc::SIGCONT);
        }
        Some(pid)
    }
}

impl Default for ForegroundSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// シグナルハンドラと共有されるグローバルスロットを返す。
pub fn foreground_slot() -> &'static ForegroundSlot {
    &FOREGROUND
}

extern "C" fn handle_sigint(_signal: libc::c_int) {
    FOREGROUND.interrupt();
}

/// シェル自身のシグナル設定を行う。
///
/// - SIGINT: [`handle_sigint`] を `SA_RESTART` 付きで登録（`waitpid`/`read` は自動再開）
/// - SIGTSTP: 無視（停止/再開のジョブ制御は行わない）
/// - SIGTTOU, SIGTTIN: 無視（`fg` の後に端末を取り戻す `tcsetpgrp` で止まらないように）
///
/// 子プロセスでは exec 時にハンドラが既定動作に戻る。無視設定は spawn 側で戻す。
pub fn install() -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
        for sig in [libc::SIGTSTP, libc::SIGTTOU, libc::SIGTTIN] {
            if libc::signal(sig, libc::SIG_IGN) == libc::SIG_ERR {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

// ── テスト ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn starts_idle() {
        assert_eq!(ForegroundSlot::new().state(), SlotState::Idle);
    }

    #[test]
    fn set_and_clear() {
        let slot = ForegroundSlot::new();
        slot.set(4242);
        assert_eq!(slot.state(), SlotState::ChildActive(4242));
        slot.clear();
        assert_eq!(slot.state(), SlotState::Idle);
    }

    #[test]
    fn interrupt_without_child_is_noop() {
        let slot = ForegroundSlot::new();
        assert_eq!(slot.interrupt(), None);
        assert_eq!(slot.state(), SlotState::Idle);
    }

    #[test]
    fn interrupt_terminates_active_child() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id() as pid_t;
        let slot = ForegroundSlot::new();
        slot.set(pid);

        assert_eq!(slot.interrupt(), Some(pid));
        assert_eq!(slot.state(), SlotState::Idle);

        let mut raw_status = 0;
        let ret = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        assert_eq!(ret, pid);
        assert!(libc::WIFSIGNALED(raw_status));
        assert_eq!(libc::WTERMSIG(raw_status), TERMINATION_SIGNAL);
    }

    #[test]
    fn second_interrupt_is_noop() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id() as pid_t;
        let slot = ForegroundSlot::new();
        slot.set(pid);

        assert_eq!(slot.interrupt(), Some(pid));
        assert_eq!(slot.interrupt(), None);
        unsafe {
            libc::waitpid(pid, std::ptr::null_mut(), 0);
        }
    }

    #[test]
    fn interrupt_terminates_stopped_child() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id() as pid_t;
        let mut raw_status = 0;
        unsafe {
            libc::kill(pid, libc::SIGSTOP);
            assert_eq!(libc::waitpid(pid, &mut raw_status, libc::WUNTRACED), pid);
        }
        assert!(libc::WIFSTOPPED(raw_status));

        let slot = ForegroundSlot::new();
        slot.set(pid);
        assert_eq!(slot.interrupt(), Some(pid));

        let ret = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        assert_eq!(ret, pid);
        assert!(libc::WIFSIGNALED(raw_status));
        assert_eq!(libc::WTERMSIG(raw_status), TERMINATION_SIGNAL);
    }

    #[test]
    fn installed_handler_interrupts_foreground_child() {
        install().unwrap();
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id() as pid_t;
        let slot = foreground_slot();
        slot.set(pid);

        // raise はハンドラの実行を終えてから戻る
        unsafe {
            libc::raise(libc::SIGINT);
        }
        assert_eq!(slot.state(), SlotState::Idle);

        let mut raw_status = 0;
        let ret = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        assert_eq!(ret, pid);
        assert!(libc::WIFSIGNALED(raw_status));
        assert_eq!(libc::WTERMSIG(raw_status), TERMINATION_SIGNAL);

        // 子がいなければシェル（このプロセス）は何もされない
        unsafe {
            libc::raise(libc::SIGINT);
        }
        assert_eq!(slot.state(), SlotState::Idle);
    }
}
