//! Unix double-fork daemonization, used when `run.run-as-damon` is set
//! (`__OSAL_DaemonAPI_Daemonize` in `server_runner.cpp`/`client_runner.cpp`).
//!
//! Must be called before the tokio runtime starts: `fork()` after threads
//! exist only duplicates the calling thread, leaving every other runtime
//! thread absent from the child.

#[cfg(target_family = "unix")]
pub fn daemonize() -> std::io::Result<()> {
    use std::ffi::CString;

    // SAFETY: each libc call below is checked for the documented error
    // return before the next step runs; no pointers escape this function.
    unsafe {
        match libc::fork() {
            -1 => return Err(std::io::Error::last_os_error()),
            0 => {}
            _ => std::process::exit(0),
        }

        if libc::setsid() == -1 {
            return Err(std::io::Error::last_os_error());
        }

        match libc::fork() {
            -1 => return Err(std::io::Error::last_os_error()),
            0 => {}
            _ => std::process::exit(0),
        }

        if libc::chdir(c"/".as_ptr()) == -1 {
            return Err(std::io::Error::last_os_error());
        }

        let dev_null = CString::new("/dev/null").expect("no interior NUL");
        let fd = libc::open(dev_null.as_ptr(), libc::O_RDWR);
        if fd == -1 {
            return Err(std::io::Error::last_os_error());
        }
        libc::dup2(fd, libc::STDIN_FILENO);
        libc::dup2(fd, libc::STDOUT_FILENO);
        libc::dup2(fd, libc::STDERR_FILENO);
        if fd > libc::STDERR_FILENO {
            libc::close(fd);
        }
    }

    Ok(())
}

#[cfg(not(target_family = "unix"))]
pub fn daemonize() -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "daemonization is only implemented for unix targets",
    ))
}
