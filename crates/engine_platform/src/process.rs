//! Process enumerator (§4.I/§6): `{pid, exeName, windowTitle,
//! hasActiveAudio}` snapshots. May be slow — callers must not invoke it
//! from an audio callback.
//!
//! The Windows path is adapted almost verbatim from
//! `gecko_platform::windows::process::ProcessEnumerator` (Toolhelp32
//! snapshot) combined
//! with `windows::session::SessionEnumerator::get_all_audio_pids`
//! (`IAudioSessionManager2`/`IAudioSessionControl2` session walking) to
//! fill in `has_active_audio`. On platforms with no equivalent official
//! introspection in this dependency set, `has_active_audio` is always
//! `false` and callers fall back to listing explicitly-named sources
//! (§4.I.amb).

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub exe_name: String,
    pub window_title: Option<String>,
    pub has_active_audio: bool,
}

#[cfg(target_os = "windows")]
pub fn enumerate_audio_processes() -> Result<Vec<ProcessInfo>, PlatformError> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
    };

    let active_pids = active_audio_pids().unwrap_or_default();

    let snapshot = unsafe {
        CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
            .map_err(|e| PlatformError::Internal(format!("failed to create process snapshot: {e}")))?
    };

    struct SnapshotGuard(windows::Win32::Foundation::HANDLE);
    impl Drop for SnapshotGuard {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
    let _guard = SnapshotGuard(snapshot);

    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    let mut out = Vec::new();
    unsafe {
        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                if entry.th32ProcessID != 0 && entry.th32ProcessID != 4 {
                    let name_end = entry
                        .szExeFile
                        .iter()
                        .position(|&c| c == 0)
                        .unwrap_or(entry.szExeFile.len());
                    let exe_name = String::from_utf16_lossy(&entry.szExeFile[..name_end]);
                    out.push(ProcessInfo {
                        pid: entry.th32ProcessID,
                        exe_name,
                        window_title: None,
                        has_active_audio: active_pids.contains(&entry.th32ProcessID),
                    });
                }
                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }
    }
    Ok(out)
}

#[cfg(target_os = "windows")]
fn active_audio_pids() -> Result<std::collections::HashSet<u32>, PlatformError> {
    use std::collections::HashSet;
    use windows::Win32::Media::Audio::{
        eConsole, eRender, AudioSessionStateActive, IAudioSessionControl2, IAudioSessionManager2,
    };
    use windows::Win32::Media::Audio::{IMMDeviceEnumerator, MMDeviceEnumerator};
    use windows::Win32::System::Com::{
        CoCreateInstance, CoInitializeEx, CLSCTX_ALL, COINIT_MULTITHREADED,
    };

    unsafe {
        let _ = CoInitializeEx(None, COINIT_MULTITHREADED);

        let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
            .map_err(|e| PlatformError::Internal(format!("failed to create device enumerator: {e}")))?;
        let device = enumerator
            .GetDefaultAudioEndpoint(eRender, eConsole)
            .map_err(|e| PlatformError::Internal(format!("no default render endpoint: {e}")))?;
        let session_manager: IAudioSessionManager2 = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| PlatformError::Internal(format!("failed to activate session manager: {e}")))?;
        let sessions = session_manager
            .GetSessionEnumerator()
            .map_err(|e| PlatformError::Internal(format!("failed to enumerate sessions: {e}")))?;

        let count = sessions.GetCount().unwrap_or(0);
        let mut pids = HashSet::new();
        for i in 0..count {
            let Ok(control) = sessions.GetSession(i) else {
                continue;
            };
            let Ok(control2): Result<IAudioSessionControl2, _> = control.cast() else {
                continue;
            };
            let state = control2.GetState().unwrap_or(windows::Win32::Media::Audio::AudioSessionStateInactive);
            if state != AudioSessionStateActive {
                continue;
            }
            if let Ok(pid) = control2.GetProcessId() {
                pids.insert(pid);
            }
        }
        Ok(pids)
    }
}

#[cfg(not(target_os = "windows"))]
pub fn enumerate_audio_processes() -> Result<Vec<ProcessInfo>, PlatformError> {
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_info_serialization() {
        let info = ProcessInfo {
            pid: 1234,
            exe_name: "firefox.exe".into(),
            window_title: Some("Mozilla Firefox".into()),
            has_active_audio: true,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("firefox.exe"));
    }
}
