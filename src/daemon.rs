use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

static RUNNING: AtomicBool = AtomicBool::new(true);

/// True while the worker threads should keep going.
pub fn running() -> bool {
    RUNNING.load(Ordering::SeqCst)
}

/// Ask every thread to wind down. Also called from the signal handler, so it
/// must stay async-signal-safe: a single atomic store, nothing else. Both
/// worker loops use bounded waits and observe the flag within ~100 ms.
pub fn request_stop() {
    RUNNING.store(false, Ordering::SeqCst);
}

extern "C" fn handle_signal(_signal: nix::libc::c_int) {
    request_stop();
}

/// Route SIGINT and SIGTERM to the running flag.
pub fn install_signal_handlers() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // The handler only performs an atomic store.
    unsafe {
        signal::sigaction(Signal::SIGINT, &action)?;
        signal::sigaction(Signal::SIGTERM, &action)?;
    }
    Ok(())
}

/// Fork into the background, detaching from the controlling terminal.
pub fn daemonize() -> nix::Result<()> {
    nix::unistd::daemon(false, false)
}
