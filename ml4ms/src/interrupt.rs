// Interrupt deferral - hold back termination signals while a collection file
// is replaced. While a DeferredInterrupts guard is alive SIGINT, SIGTERM and
// SIGHUP are blocked for the calling thread. Dropping the guard restores the
// previous mask on every exit path, unwinding included, and the kernel then
// delivers whatever arrived in the meantime. No-op on non-unix targets.

#[cfg(unix)]
const DEFERRED_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

/// RAII guard that keeps termination signals pending until dropped.
pub struct DeferredInterrupts {
    #[cfg(unix)]
    previous: Option<libc::sigset_t>,
}

impl DeferredInterrupts {
    /// Block the deferred signals for the current thread.
    #[cfg(unix)]
    pub fn block() -> Self {
        // SAFETY: sigset_t is plain data initialized by sigemptyset before use,
        // and pthread_sigmask only touches the calling thread's mask.
        unsafe {
            let mut blocked: libc::sigset_t = std::mem::zeroed();
            let mut previous: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut blocked);
            for sig in DEFERRED_SIGNALS {
                libc::sigaddset(&mut blocked, sig);
            }
            if libc::pthread_sigmask(libc::SIG_BLOCK, &blocked, &mut previous) != 0 {
                log::warn!("Could not block termination signals; write is not interrupt-safe");
                return Self { previous: None };
            }
            Self {
                previous: Some(previous),
            }
        }
    }

    #[cfg(not(unix))]
    pub fn block() -> Self {
        Self {}
    }
}

impl Drop for DeferredInterrupts {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            let Some(previous) = self.previous.take() else {
                return;
            };
            // SAFETY: `previous` was filled by pthread_sigmask in `block`.
            unsafe {
                let mut pending: libc::sigset_t = std::mem::zeroed();
                if libc::sigpending(&mut pending) == 0 {
                    for sig in DEFERRED_SIGNALS {
                        if libc::sigismember(&pending, sig) == 1 {
                            log::debug!("Signal {sig} received during write, delivering now");
                        }
                    }
                }
                libc::pthread_sigmask(libc::SIG_SETMASK, &previous, std::ptr::null_mut());
            }
        }
    }
}

/// Run `f` with termination signals deferred until it returns.
pub fn with_deferred_interrupts<T>(f: impl FnOnce() -> T) -> T {
    let _guard = DeferredInterrupts::block();
    f()
}
