//! Opening task destinations.
//!
//! A "browsing context" here is a child process started with the task URL
//! as its last argument. The context is live while the process runs, so the
//! configured command must stay in the foreground (e.g. `firefox
//! --new-instance --profile <dir>`); openers that hand off and exit
//! immediately, such as `xdg-open` or macOS `open`, pause dwell on the first
//! poll and are never picked as a fallback.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use crate::config::LauncherConfig;
use crate::testing::ContextLauncher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrowserFamily {
    Firefox,
    Chromium,
}

/// Browsers tried, in order, when no command is configured.
const FALLBACK_BROWSERS: &[(&str, BrowserFamily)] = &[
    ("firefox", BrowserFamily::Firefox),
    ("chromium", BrowserFamily::Chromium),
    ("chromium-browser", BrowserFamily::Chromium),
    ("google-chrome", BrowserFamily::Chromium),
    ("microsoft-edge", BrowserFamily::Chromium),
];

/// Arguments that keep a browser process in the foreground for as long as
/// its window is open. A private profile stops it handing the URL to an
/// already running instance.
fn foreground_args(family: BrowserFamily, profile_dir: &Path) -> Vec<String> {
    let profile = profile_dir.display().to_string();
    match family {
        BrowserFamily::Firefox => vec!["--new-instance".into(), "--profile".into(), profile],
        BrowserFamily::Chromium => vec![format!("--user-data-dir={profile}"), "--new-window".into()],
    }
}

fn profile_dir(browser: &str) -> PathBuf {
    std::env::temp_dir().join("taskgate-browser").join(browser)
}

/// Opaque handle to an opened browsing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(u64);

impl ContextHandle {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Launcher that treats a spawned process as the opened context.
#[derive(Debug)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
    next_id: u64,
    children: HashMap<ContextHandle, Child>,
    released: Vec<Child>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            next_id: 1,
            children: HashMap::new(),
            released: Vec::new(),
        }
    }

    /// Build from configuration, falling back to the first known browser
    /// found on `PATH`, run with its own profile so it stays in the
    /// foreground. `None` when nothing suitable is installed.
    #[must_use]
    pub fn from_config(config: &LauncherConfig) -> Option<Self> {
        if let Some((program, args)) = config.command.split_first() {
            return Some(Self::new(program.clone(), args.to_vec()));
        }
        let (name, family) = FALLBACK_BROWSERS
            .iter()
            .find(|(name, _)| which::which(name).is_ok())?;

        let profile = profile_dir(name);
        if let Err(e) = std::fs::create_dir_all(&profile) {
            warn!("Could not create browser profile {}: {}", profile.display(), e);
        }
        debug!("Using {} to open task destinations", name);
        Some(Self::new(*name, foreground_args(*family, &profile)))
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Collect released children that have exited since the last call.
    fn reap_released(&mut self) {
        self.released
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }
}

impl ContextLauncher for ProcessLauncher {
    fn open(&mut self, url: &str) -> Option<ContextHandle> {
        self.reap_released();
        let spawned = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => {
                let handle = ContextHandle(self.next_id);
                self.next_id += 1;
                self.children.insert(handle, child);
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to launch {}: {}", self.program, e);
                None
            }
        }
    }

    fn is_live(&mut self, handle: ContextHandle) -> bool {
        self.reap_released();
        let Some(child) = self.children.get_mut(&handle) else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) | Err(_) => {
                self.children.remove(&handle);
                false
            }
        }
    }

    fn release(&mut self, handle: ContextHandle) {
        if let Some(child) = self.children.remove(&handle) {
            self.released.push(child);
        }
        self.reap_released();
    }
}

impl Drop for ProcessLauncher {
    fn drop(&mut self) {
        // Reap exited children; running browsers are left to the user.
        for child in self.children.values_mut().chain(self.released.iter_mut()) {
            let _ = child.try_wait();
        }
    }
}
