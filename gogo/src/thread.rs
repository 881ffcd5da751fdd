//! Thin wrapper around `std::thread::spawn` that names the OS thread, used
//! for every worker (network receiver/sender, dispatcher, progress
//! reporter) so `top`/`gdb` show something more useful than "Thread 7".

use std::thread::JoinHandle;

#[cfg(unix)]
pub fn set_name(name: &str) {
    use std::ffi::CString;

    let Ok(cstr) = CString::new(name) else { return };

    unsafe {
        libc::pthread_setname_np(libc::pthread_self(), cstr.as_ptr());
    }
}

#[cfg(not(unix))]
pub fn set_name(_name: &str) {}

pub fn spawn<F>(name: &'static str, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            set_name(name);
            f()
        })
        .expect("spawn thread")
}
