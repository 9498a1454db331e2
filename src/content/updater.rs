use futures::channel::mpsc;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

use super::fetcher::ContentSource;
use super::installer::{ArchiveInstaller, LocalInstallation};
use super::session::{SessionOutcome, TempArchive, UpdateSession};
use super::version::{VersionString, VersionStore};
use crate::config::Config;
use crate::error::{Result, UpdateError};
use crate::shell::{
    ask, load_best_effort, notify_best_effort, Dialog, Location, Notice, ShellWindow,
};

/// The parts of [`Config`] the updater runs on
#[derive(Debug, Clone)]
pub struct UpdaterSettings {
    pub version_url: String,
    pub archive_url: String,
    pub game_url: String,
    pub archive_subtree: String,
    pub poll_interval: Duration,
    pub startup_delay: Duration,
    pub remind_delay: Duration,
    pub auto_check: bool,
}

impl UpdaterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            version_url: config.version_url.clone(),
            archive_url: config.archive_url.clone(),
            game_url: config.game_url.clone(),
            archive_subtree: config.archive_subtree.clone(),
            poll_interval: config.poll_interval(),
            startup_delay: config.startup_delay(),
            remind_delay: config.remind_delay(),
            auto_check: config.auto_check,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdaterState {
    Uninitialized,
    CheckingLocal,
    Installed,
    Idle,
    CheckingRemote,
    PromptingUser,
    Downloading { initial: bool },
    DownloadFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Switch to the recurring schedule and check right away
    StartPolling,
    CheckRemote,
    /// Ask about the already known pending version again
    Remind,
}

/// Next scheduled wake-up of the updater
#[derive(Debug, Clone)]
pub struct PollTimer {
    action: TimerAction,
    deadline: Instant,
    period: Option<Duration>,
}

impl PollTimer {
    pub fn recurring(period: Duration) -> Self {
        Self {
            action: TimerAction::CheckRemote,
            deadline: Instant::now() + period,
            period: Some(period),
        }
    }

    pub fn once(delay: Duration, action: TimerAction) -> Self {
        Self {
            action,
            deadline: Instant::now() + delay,
            period: None,
        }
    }

    pub fn action(&self) -> TimerAction {
        self.action
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_recurring(&self) -> bool {
        self.period.is_some()
    }

    fn fire(&mut self) -> TimerAction {
        if let Some(period) = self.period {
            self.deadline = Instant::now() + period;
        }
        self.action
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateChoice {
    UpdateNow,
    RemindLater,
    Disable,
}

impl UpdateChoice {
    fn from_index(index: usize) -> Self {
        match index {
            0 => UpdateChoice::UpdateNow,
            1 => UpdateChoice::RemindLater,
            _ => UpdateChoice::Disable,
        }
    }
}

/// Keeps the local game copy in sync with the published one.
///
/// Everything runs on one task: timer firings, network I/O and prompts are awaited in
/// turn, so at most one session exists at a time. The timer is cleared before a prompt
/// or session starts and only rescheduled once the session has concluded.
pub struct Updater<S, W> {
    settings: UpdaterSettings,
    installation: LocalInstallation,
    source: S,
    shell: W,
    versions: VersionStore,
    timer: Option<PollTimer>,
    state: UpdaterState,
    last_outcome: Option<SessionOutcome>,
}

impl<S: ContentSource, W: ShellWindow> Updater<S, W> {
    pub fn new(
        settings: UpdaterSettings,
        installation: LocalInstallation,
        source: S,
        shell: W,
    ) -> Self {
        Self {
            settings,
            installation,
            source,
            shell,
            versions: VersionStore::default(),
            timer: None,
            state: UpdaterState::Uninitialized,
            last_outcome: None,
        }
    }

    pub fn state(&self) -> UpdaterState {
        self.state
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn timer(&self) -> Option<&PollTimer> {
        self.timer.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&SessionOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn installation(&self) -> &LocalInstallation {
        &self.installation
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn shell(&self) -> &W {
        &self.shell
    }

    /// Read the installed version into the store; false when nothing usable is installed
    pub fn load_installed(&mut self) -> bool {
        match self.installation.read_version() {
            Ok(version) if !version.is_default() => {
                self.versions = VersionStore::new(version);
                true
            }
            Ok(_) => {
                log::info!("Installed copy reports the default version, treating as missing");
                false
            }
            Err(e) => {
                log::info!("No local copy: {:#}", e);
                false
            }
        }
    }

    /// Decide between showing the installed copy and fetching it for the first time
    pub async fn startup(&mut self) {
        self.state = UpdaterState::CheckingLocal;

        if !self.load_installed() {
            log::info!("Downloading game files into {}", self.installation.data_dir().display());
            let remote = Location::Remote(self.settings.game_url.clone());
            load_best_effort(&self.shell, &remote).await;

            // The installed descriptor replaces this once extraction succeeds
            match self.source.fetch_descriptor(&self.settings.version_url).await {
                Ok(descriptor) => self.versions.set_pending(descriptor.version),
                Err(e) => log::debug!("Remote version unknown before first download: {}", e),
            }

            self.run_session(true).await;
            return;
        }

        log::info!("Installed version {}", self.versions.current());
        self.state = UpdaterState::Installed;
        let local = self.installation.display_location(&self.settings.game_url);
        load_best_effort(&self.shell, &local).await;

        // Give the window time to come up before the first check
        if self.settings.auto_check {
            self.timer = Some(PollTimer::once(
                self.settings.startup_delay,
                TimerAction::StartPolling,
            ));
        }
        self.state = UpdaterState::Idle;
    }

    /// Dispatch timer firings until the shell is closed
    pub async fn run(&mut self) {
        while !self.shell.is_closed() {
            match self.timer.as_ref().map(PollTimer::deadline) {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
            self.on_timer_fired().await;
        }
    }

    /// Handle one timer firing; a no-op unless idle with something scheduled
    pub async fn on_timer_fired(&mut self) {
        let Some(timer) = self.timer.as_mut() else {
            log::debug!("Timer fired with nothing scheduled");
            return;
        };
        if self.state != UpdaterState::Idle {
            log::debug!("Timer fired while {:?}, skipping", self.state);
            return;
        }

        let action = timer.fire();
        if !timer.is_recurring() {
            self.timer = None;
        }

        match action {
            TimerAction::StartPolling => {
                self.start_polling();
                self.check_remote().await;
            }
            TimerAction::CheckRemote => self.check_remote().await,
            TimerAction::Remind => self.prompt_update().await,
        }
    }

    pub fn start_polling(&mut self) {
        self.timer = Some(PollTimer::recurring(self.settings.poll_interval));
    }

    fn stop_timer(&mut self) {
        if self.timer.take().is_some() {
            log::debug!("Stopped update checks");
        }
    }

    /// Fetch the remote descriptor; `Some` only for a strictly newer version
    pub async fn check_for_update(&self) -> Result<Option<VersionString>> {
        let descriptor = self.source.fetch_descriptor(&self.settings.version_url).await?;
        if descriptor.version.is_newer_than(self.versions.current()) {
            Ok(Some(descriptor.version))
        } else {
            Ok(None)
        }
    }

    /// Periodic check: any failure means "no update"
    pub async fn check_remote(&mut self) {
        self.state = UpdaterState::CheckingRemote;

        match self.check_for_update().await {
            Ok(Some(version)) => {
                log::info!("Update available: {} -> {}", self.versions.current(), version);
                self.versions.set_pending(version);
                self.stop_timer();
                self.prompt_update().await;
                return;
            }
            Ok(None) => log::debug!("No update available (installed {})", self.versions.current()),
            Err(e) if e.is_transient() => {
                log::warn!("Couldn't check for updated version, might be offline: {}", e)
            }
            Err(e) => log::debug!("Ignoring version check: {}", e),
        }

        self.state = UpdaterState::Idle;
    }

    async fn prompt_update(&mut self) {
        self.state = UpdaterState::PromptingUser;
        let dialog = Dialog::UpdateAvailable {
            version: self.versions.pending().to_string(),
        };

        match UpdateChoice::from_index(ask(&self.shell, &dialog).await) {
            UpdateChoice::UpdateNow => self.run_session(false).await,
            UpdateChoice::RemindLater => {
                self.timer = Some(PollTimer::once(self.settings.remind_delay, TimerAction::Remind));
                self.state = UpdaterState::Idle;
            }
            UpdateChoice::Disable => {
                log::info!("Update check disabled, stop checking for updates");
                self.timer = None;
                self.state = UpdaterState::Idle;
            }
        }
    }

    /// Install `target` with no reload question, for when nothing is displayed yet
    pub async fn update_to(&mut self, target: VersionString) {
        self.versions.set_pending(target);
        self.run_session(true).await;
    }

    /// Download and install the pending version, offering a retry on failure
    pub async fn run_session(&mut self, initial: bool) {
        self.begin_session(initial);

        loop {
            let mut session = UpdateSession::new(
                self.versions.pending().clone(),
                initial,
                self.installation.archive_path(),
            );
            let result = self.download_and_install(&mut session).await;
            session.outcome = Some(match &result {
                Ok(()) => SessionOutcome::Installed,
                Err(e) => SessionOutcome::Failed(e.to_string()),
            });
            self.last_outcome = session.outcome.clone();

            match result {
                Ok(()) => {
                    self.finish_session(initial).await;
                    return;
                }
                Err(e) => {
                    log::warn!("Update to v{} failed: {}", session.target, e);
                    self.state = UpdaterState::DownloadFailed;

                    if self.shell.is_closed() {
                        log::debug!("Window closed, not offering a retry");
                        self.state = UpdaterState::Idle;
                        return;
                    }
                    if ask(&self.shell, &Dialog::UpdateFailed).await != 0 {
                        log::info!("Update abandoned, checks stay paused");
                        self.state = UpdaterState::Idle;
                        return;
                    }
                    self.state = UpdaterState::Downloading { initial };
                }
            }
        }
    }

    pub(crate) fn begin_session(&mut self, initial: bool) {
        self.stop_timer();
        self.state = UpdaterState::Downloading { initial };
    }

    async fn finish_session(&mut self, initial: bool) {
        self.versions.commit();
        if self.settings.auto_check {
            self.start_polling();
        }
        self.state = UpdaterState::Idle;

        let local = Location::Local(self.installation.root_document());
        if initial {
            load_best_effort(&self.shell, &local).await;
            return;
        }
        if ask(&self.shell, &Dialog::ReloadAfterUpdate).await == 0 {
            load_best_effort(&self.shell, &local).await;
        }
    }

    async fn download_and_install(&mut self, session: &mut UpdateSession) -> Result<()> {
        if !session.initial {
            let notice = toast(session, "Downloading files...\nPlease wait...");
            notify_best_effort(&self.shell, notice).await;
        }

        tokio::fs::create_dir_all(self.installation.data_dir()).await?;
        let archive = TempArchive::new(session.archive_path.clone());
        let stream = self.source.open(&self.settings.archive_url).await?;

        let (progress_tx, mut progress_rx) = mpsc::unbounded::<Notice>();
        let shell = &self.shell;
        let receiving = session.receive(stream, &archive, move |s| {
            let _ = progress_tx.unbounded_send(progress_notice(s));
        });
        let forwarding = async move {
            while let Some(notice) = progress_rx.next().await {
                notify_best_effort(shell, notice).await;
            }
        };
        let (received, ()) = futures::join!(receiving, forwarding);
        let bytes = received?;
        log::info!("Downloaded {} bytes for v{}", bytes, session.target);

        let extracting = if session.initial {
            Notice::Status("Files downloaded!\nExtracting files...".to_string())
        } else {
            toast(session, "Files downloaded!\nExtracting files...")
        };
        notify_best_effort(&self.shell, extracting).await;

        let archive_path = archive.path().to_path_buf();
        let data_dir = self.installation.data_dir().to_path_buf();
        let subtree = self.settings.archive_subtree.clone();
        let installed = tokio::task::spawn_blocking(move || {
            ArchiveInstaller::install(&archive_path, &data_dir, &subtree)
        })
        .await
        .unwrap_or(false);
        drop(archive);

        if !installed {
            return Err(UpdateError::Extraction(session.archive_path.clone()));
        }

        match self.installation.read_version() {
            Ok(version) if !version.is_default() => self.versions.set_pending(version),
            Ok(_) => log::debug!(
                "Installed descriptor has no version, keeping v{}",
                session.target
            ),
            Err(e) => log::debug!("Installed descriptor unreadable: {:#}", e),
        }
        if self.versions.pending().is_default() {
            log::warn!(
                "Installed files carry no version, the next launch will download them again"
            );
        }
        Ok(())
    }
}

fn toast(session: &UpdateSession, message: &str) -> Notice {
    Notice::Toast {
        title: format!("[UPDATER] v{}", session.target),
        message: message.to_string(),
    }
}

fn progress_notice(session: &UpdateSession) -> Notice {
    let text = format!("Downloading files...\n{:.2} MB", session.megabytes());
    if session.initial {
        Notice::Status(text)
    } else {
        toast(session, &text)
    }
}
