//! Real-time scheduling helpers for the thread driving a session.

use nix::libc;

use tracing::{debug, warn};

use crate::error::EngineError;

/// Puts the calling thread on SCHED_FIFO at `priority` and verifies the
/// kernel accepted it by reading the policy back.
pub fn promote_current_thread(priority: i32) -> Result<(), EngineError> {
    let max = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };
    let min = unsafe { libc::sched_get_priority_min(libc::SCHED_FIFO) };
    if max < 0 || min < 0 {
        return Err(EngineError::Device(
            "SCHED_FIFO priority range unavailable".into(),
        ));
    }
    let priority = priority.clamp(min, max);

    let param = libc::sched_param {
        sched_priority: priority,
    };
    let thread = unsafe { libc::pthread_self() };
    let rc = unsafe { libc::pthread_setschedparam(thread, libc::SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(EngineError::Device(format!(
            "pthread_setschedparam failed: {}",
            std::io::Error::from_raw_os_error(rc)
        )));
    }

    let mut policy = 0;
    let mut applied = libc::sched_param { sched_priority: 0 };
    let rc = unsafe { libc::pthread_getschedparam(thread, &mut policy, &mut applied) };
    if rc != 0 || policy != libc::SCHED_FIFO || applied.sched_priority != priority {
        warn!(policy, got = applied.sched_priority, want = priority, "scheduling readback mismatch");
        return Err(EngineError::Device(
            "SCHED_FIFO promotion did not stick".into(),
        ));
    }
    debug!(priority, "thread promoted to SCHED_FIFO");
    Ok(())
}

/// Locks current and future pages into RAM so the audio path cannot fault.
pub fn lock_memory() -> Result<(), EngineError> {
    let rc = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if rc != 0 {
        return Err(EngineError::Device(format!(
            "mlockall failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    debug!("memory pages locked");
    Ok(())
}
