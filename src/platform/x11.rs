use anyhow::{Result, anyhow};
use tracing::instrument;
use xcb::{
    Connection,
    screensaver::{QueryInfo, QueryInfoReply},
    x::{self, ATOM_ANY, Atom, Drawable, GetProperty, GrabServer, InternAtom, UngrabServer, Window},
};

use super::{IdleSource, SourceError, WindowSource};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_active_window(conn: &Connection, root: &Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: *root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    result
        .value::<Window>()
        .first()
        .copied()
        .ok_or_else(|| anyhow!("Window manager didn't report an active window"))
}

pub fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value()).into_owned())
}

pub struct X11Platform {
    connection: Connection,
    preferred_screen: usize,
    active_window_atom: Atom,
    window_name_atom: Atom,
}

impl X11Platform {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        Ok(Self {
            connection,
            preferred_screen: preferred_screen.max(0) as usize,
            active_window_atom,
            window_name_atom,
        })
    }

    fn root(&self) -> Result<Window> {
        // Currently the application only supports 1 x11 screen.
        self.connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen)
            .map(|screen| screen.root())
            .ok_or_else(|| anyhow!("Screen {} is not available", self.preferred_screen))
    }

    #[instrument(skip(self))]
    fn get_active_inner(&self) -> Result<String> {
        let root = self.root()?;
        let active_window = get_active_window(&self.connection, &root, self.active_window_atom)?;
        get_name(&self.connection, active_window, self.window_name_atom)
    }
}

impl WindowSource for X11Platform {
    #[instrument(skip(self))]
    fn active_window_title(&mut self) -> Result<String> {
        let _ = self.connection.send_request(&GrabServer {});

        let result = self.get_active_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }
}

impl IdleSource for X11Platform {
    #[instrument(skip(self))]
    fn idle_seconds(&mut self) -> Result<f64, SourceError> {
        let root = self.root()?;
        let idle = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(root),
        });
        let reply: QueryInfoReply = self
            .connection
            .wait_for_reply(idle)
            .map_err(anyhow::Error::from)?;
        Ok(reply.ms_since_user_input() as f64 / 1000.)
    }
}
