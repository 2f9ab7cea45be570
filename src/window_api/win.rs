use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::error;
use windows::{
    core::PWSTR,
    Win32::{
        Foundation::{CloseHandle, GetLastError, BOOL, HANDLE},
        System::{
            Diagnostics::Debug::{
                FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
            },
            SystemServices::{LANG_ENGLISH, SUBLANG_ENGLISH_US},
            Threading::{
                OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
                PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
            },
        },
        UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId},
    },
};

use super::{clean_process_name, ForegroundResolver};

fn last_error_message() -> String {
    let err = unsafe { GetLastError() };
    let mut message_buffer = [0u16; 2048];
    let size = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            err.0,
            LANG_ENGLISH | (SUBLANG_ENGLISH_US << 10),
            PWSTR::from_raw(message_buffer.as_mut_ptr()),
            2048,
            None,
        )
    };
    String::from_utf16_lossy(&message_buffer[0..size as usize])
}

#[tracing::instrument]
pub fn get_foreground_process() -> Result<String> {
    let window = unsafe { GetForegroundWindow() };

    if window.is_invalid() {
        return Err(anyhow!("Failed to get foreground window"));
    }

    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    if id == 0 {
        return Err(anyhow!("Failed to get active window {}", last_error_message()));
    }
    let process_handle = unsafe {
        OpenProcess(
            PROCESS_QUERY_INFORMATION | PROCESS_VM_READ,
            BOOL::from(false),
            id,
        )
    }
    .inspect_err(|e| error!("Failed to open process {e:?}"))?;

    let mut text: [u16; 4096] = [0; 4096];
    let process_path = unsafe { get_process_path(process_handle, &mut text) }
        .inspect_err(|e| error!("Failed to get window process path {e:?}"));

    unsafe { CloseHandle(process_handle) }
        .inspect_err(|e| error!("Failed to close handle {e:?}"))?;

    Ok(clean_process_name(&process_path?))
}

unsafe fn get_process_path(process_handle: HANDLE, text: &mut [u16]) -> Result<String> {
    unsafe {
        let mut length = text.len() as u32;
        QueryFullProcessImageNameW(
            process_handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(text.as_mut_ptr()),
            &mut length,
        )?;
        Ok(String::from_utf16_lossy(&text[..length as usize]))
    }
}

#[derive(Default)]
pub struct WindowsForegroundResolver {}

impl WindowsForegroundResolver {
    pub fn new() -> Self {
        Self {}
    }
}

impl ForegroundResolver for WindowsForegroundResolver {
    fn current_app(&mut self) -> Result<Arc<str>> {
        get_foreground_process()
            .map(Into::into)
            .inspect_err(|e| error!("Failed to get foreground process {e:?}"))
    }
}
