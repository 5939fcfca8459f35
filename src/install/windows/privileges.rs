//! Process elevation check.

use std::mem;

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Security::{GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation};
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

/// RAII wrapper for a process token handle
struct TokenHandle(HANDLE);

impl Drop for TokenHandle {
    #[inline]
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

/// Whether the current process token is elevated
pub(crate) fn is_elevated() -> bool {
    let mut raw: HANDLE = HANDLE::default();

    unsafe {
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut raw).is_err() {
            return false;
        }
        let token = TokenHandle(raw);

        let mut elevation: TOKEN_ELEVATION = mem::zeroed();
        let mut return_length: u32 = 0;

        let queried = GetTokenInformation(
            token.0,
            TokenElevation,
            Some(&mut elevation as *mut _ as *mut std::ffi::c_void),
            mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut return_length,
        );

        queried.is_ok() && elevation.TokenIsElevated != 0
    }
}
