//! # Remote-thread module loader (Windows).
//!
//! ```text
//! OpenProcess(create-thread | vm-operation | vm-write | vm-read)   → ProcessAccessDenied
//! GetProcAddress(kernel32, "LoadLibraryW")                         → EntryPointNotFound
//! VirtualAllocEx(len(path) + NUL, read-write)                      → RemoteAllocationFailed
//! WriteProcessMemory(path as UTF-16)                               → RemoteWriteFailed
//! CreateRemoteThread(start = LoadLibraryW, arg = remote path)      → RemoteThreadCreationFailed
//! ```
//! The remote path buffer must outlive the loader thread, so it is only released
//! when the write or the thread creation fails.

use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, HANDLE};
use windows_sys::Win32::System::Diagnostics::Debug::WriteProcessMemory;
use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows_sys::Win32::System::Memory::{
    VirtualAllocEx, VirtualFreeEx, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
};
use windows_sys::Win32::System::Threading::{
    CreateRemoteThread, OpenProcess, PROCESS_CREATE_THREAD, PROCESS_QUERY_INFORMATION,
    PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
};

use super::CodeLoader;
use crate::error::{LoadError, LoadErrorKind};

type ThreadStart = unsafe extern "system" fn(*mut c_void) -> u32;

/// Closes a kernel handle on drop.
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle was returned non-null by the OS and is closed once.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn wide(s: impl AsRef<std::ffi::OsStr>) -> Vec<u16> {
    s.as_ref().encode_wide().chain(std::iter::once(0)).collect()
}

/// Loads modules by starting a thread at `LoadLibraryW` inside the target.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteThreadLoader;

impl RemoteThreadLoader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CodeLoader for RemoteThreadLoader {
    fn load_module(&self, pid: u32, module: &Path) -> Result<(), LoadError> {
        let fail = |kind: LoadErrorKind| {
            // SAFETY: plain thread-local error query.
            let code = unsafe { GetLastError() };
            LoadError::new(kind, pid, module).with_os_code(code)
        };

        // SAFETY: FFI call with plain integer arguments.
        let raw = unsafe {
            OpenProcess(
                PROCESS_CREATE_THREAD
                    | PROCESS_QUERY_INFORMATION
                    | PROCESS_VM_OPERATION
                    | PROCESS_VM_WRITE
                    | PROCESS_VM_READ,
                0,
                pid,
            )
        };
        if raw == 0 {
            return Err(fail(LoadErrorKind::ProcessAccessDenied));
        }
        let process = OwnedHandle(raw);

        let kernel32 = wide("kernel32.dll");
        // SAFETY: both strings are NUL-terminated and live across the calls.
        let entry = unsafe {
            let module_handle = GetModuleHandleW(kernel32.as_ptr());
            if module_handle == 0 {
                None
            } else {
                GetProcAddress(module_handle, b"LoadLibraryW\0".as_ptr())
            }
        };
        let Some(entry) = entry else {
            return Err(fail(LoadErrorKind::EntryPointNotFound));
        };

        let path = wide(module.as_os_str());
        let size = path.len() * std::mem::size_of::<u16>();

        // SAFETY: `process` is a valid handle with VM_OPERATION rights.
        let remote = unsafe {
            VirtualAllocEx(
                process.0,
                std::ptr::null(),
                size,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };
        if remote.is_null() {
            return Err(fail(LoadErrorKind::RemoteAllocationFailed));
        }

        let mut written = 0usize;
        // SAFETY: `remote` spans `size` bytes in the target; `path` spans `size` bytes here.
        let ok = unsafe {
            WriteProcessMemory(
                process.0,
                remote,
                path.as_ptr().cast(),
                size,
                &mut written,
            )
        };
        if ok == 0 || written != size {
            let err = fail(LoadErrorKind::RemoteWriteFailed);
            // SAFETY: releasing the region allocated above, nothing references it.
            unsafe { VirtualFreeEx(process.0, remote, 0, MEM_RELEASE) };
            return Err(err);
        }

        // SAFETY: LoadLibraryW has the thread-start ABI (one pointer argument,
        // pointer-sized return) and kernel32 is mapped at the same address in every
        // process of the session.
        let start: ThreadStart = unsafe { std::mem::transmute(entry) };
        let thread = unsafe {
            CreateRemoteThread(
                process.0,
                std::ptr::null(),
                0,
                Some(start),
                remote,
                0,
                std::ptr::null_mut(),
            )
        };
        if thread == 0 {
            let err = fail(LoadErrorKind::RemoteThreadCreationFailed);
            // SAFETY: no thread was created, so the region is unreferenced.
            unsafe { VirtualFreeEx(process.0, remote, 0, MEM_RELEASE) };
            return Err(err);
        }
        drop(OwnedHandle(thread));

        Ok(())
    }
}
