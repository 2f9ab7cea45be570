use std::sync::Arc;

use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::instrument;
use xcb::{
    x::{self, Atom, GetProperty, InternAtom, Window, ATOM_ANY},
    Connection,
};

use super::{clean_process_name, ForegroundResolver};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<u32>().first().copied())
}

fn get_active_window(conn: &Connection, root: Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    result
        .value::<Window>()
        .first()
        .copied()
        .ok_or_else(|| anyhow!("_NET_ACTIVE_WINDOW is not set"))
}

fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value()).to_string())
}

/// Resolves the foreground app through EWMH hints: `_NET_ACTIVE_WINDOW` gives the window,
/// `_NET_WM_PID` its process. Windows without a pid are attributed by their title.
pub struct X11ForegroundResolver {
    connection: Connection,
    preferred_screen: usize,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
    system: System,
}

impl X11ForegroundResolver {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern_atom(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            preferred_screen: preferred_screen.max(0) as usize,
            active_window_atom,
            window_name_atom,
            pid_atom,
            system: System::new(),
        })
    }

    fn process_name(&mut self, pid: u32) -> Option<String> {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_exe(sysinfo::UpdateKind::OnlyIfNotSet),
        );
        let process = self.system.process(pid)?;
        process
            .exe()
            .and_then(|v| v.to_str())
            .map(clean_process_name)
            .or_else(|| process.name().to_str().map(|v| v.to_string()))
    }
}

impl ForegroundResolver for X11ForegroundResolver {
    #[instrument(skip(self))]
    fn current_app(&mut self) -> Result<Arc<str>> {
        let root = self
            .connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen)
            .ok_or_else(|| anyhow!("Screen {} is missing", self.preferred_screen))?
            .root();

        let active_window = get_active_window(&self.connection, root, self.active_window_atom)?;
        if let Some(name) = get_pid(&self.connection, active_window, self.pid_atom)?
            .and_then(|pid| self.process_name(pid))
        {
            return Ok(name.into());
        }

        let title = get_name(&self.connection, active_window, self.window_name_atom)?;
        if title.is_empty() {
            return Err(anyhow!("Active window has neither a pid nor a title"));
        }
        Ok(title.into())
    }
}
