use std::process::{Child, Command};
use std::time::{Duration, Instant};

use crate::core::{CatalogItem, PlaybackError, PlayerConfig, VideoSource};
use crate::video::player::{build_args, format_timestamp, PlayWindow};
use crate::video::process_tree::{terminate_children, ProcessTree, SystemProcessTree};

const PLAYER_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Running,
    Terminating,
}

/// What `start_playback` chose to play.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedItem {
    pub item: CatalogItem,
    pub window: PlayWindow,
    pub timestamp: String,
}

struct PlaybackSession {
    item: CatalogItem,
    window: PlayWindow,
    child: Child,
    started: Instant,
}

impl PlaybackSession {
    fn deadline_reached(&self) -> bool {
        self.started.elapsed().as_secs_f64() >= self.window.duration_secs
    }
}

/// Runs one external player at a time and decides when it is done.
///
/// The caller polls [`is_finished`](Self::is_finished) until it returns true
/// before starting the next video. A player still running when its clip time
/// is up gets its children and then itself terminated, escalating to SIGKILL
/// after the grace period.
pub struct PlaybackSupervisor<V: VideoSource, T: ProcessTree = SystemProcessTree> {
    source: V,
    tree: T,
    player: PlayerConfig,
    grace_period: Duration,
    session: Option<PlaybackSession>,
    state: PlaybackState,
}

impl<V: VideoSource> PlaybackSupervisor<V, SystemProcessTree> {
    pub fn new(source: V, player: PlayerConfig, grace_period: Duration) -> Self {
        Self::with_process_tree(source, SystemProcessTree, player, grace_period)
    }
}

impl<V: VideoSource, T: ProcessTree> PlaybackSupervisor<V, T> {
    pub fn with_process_tree(source: V, tree: T, player: PlayerConfig, grace_period: Duration) -> Self {
        Self {
            source,
            tree,
            player,
            grace_period,
            session: None,
            state: PlaybackState::Idle,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn source(&self) -> &V {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut V {
        &mut self.source
    }

    /// Pick a random video and start the player on it.
    ///
    /// Starting while a session is still running is rejected; poll
    /// `is_finished` (or call `stop`) first.
    pub fn start_playback(&mut self, mute: bool, clip_duration_secs: f64) -> Result<PlayedItem, PlaybackError> {
        if let Some(session) = &self.session {
            return Err(PlaybackError::SessionActive { path: session.item.path.clone() });
        }

        let item = self.source.select_random()?;
        let window = PlayWindow::plan(item.duration_secs, clip_duration_secs, &mut rand::thread_rng());
        let args = build_args(&self.player, &window, mute, &item.path);
        let timestamp = format_timestamp(window.offset_secs as f64);

        log::info!("playing {}@{}", item.path.display(), timestamp);

        let child = match Command::new(&self.player.program).args(&args).spawn() {
            Ok(child) => child,
            Err(e) => {
                let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
                log::error!("process creation failed: {}", e);
                log::info!("{} {:?}", self.player.program.display(), args);
                return Err(PlaybackError::Spawn {
                    program: self.player.program.display().to_string(),
                    args,
                    source: e,
                });
            }
        };

        log::debug!("Player PID {} will run for {:.1}s", child.id(), window.duration_secs);
        self.session = Some(PlaybackSession {
            item: item.clone(),
            window,
            child,
            started: Instant::now(),
        });
        self.state = PlaybackState::Running;

        Ok(PlayedItem { item, window, timestamp })
    }

    /// Check if the current video is done playing. Ends the player once its
    /// clip time is up. True when nothing is playing.
    pub fn is_finished(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return true;
        };

        match session.child.try_wait() {
            Ok(Some(status)) => {
                log::info!("Player for {} exited ({})", session.item.path.display(), status);
                self.clear_session();
            }
            Ok(None) if !session.deadline_reached() => return false,
            Ok(None) => {
                log::info!("Clip time reached for {}, stopping player", session.item.path.display());
                self.stop();
            }
            Err(e) => {
                log::error!("Failed to poll player for {}: {}", session.item.path.display(), e);
                self.stop();
            }
        }

        true
    }

    /// End the current session now, running the full shutdown sequence.
    /// Does nothing when idle.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        self.state = PlaybackState::Terminating;
        self.terminate_player(session.child);
        self.state = PlaybackState::Idle;
    }

    /// Delete a video from the source. Missing files are only logged.
    pub fn remove(&mut self, filename: &str) {
        self.source.remove(filename);
    }

    fn clear_session(&mut self) {
        self.session = None;
        self.state = PlaybackState::Idle;
    }

    fn terminate_player(&self, mut child: Child) {
        let pid = child.id();
        terminate_children(&self.tree, pid, self.grace_period);

        if let Err(e) = self.tree.terminate(pid) {
            log::debug!("Failed to terminate player PID {}: {}", pid, e);
        }

        let deadline = Instant::now() + self.grace_period;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() < deadline => std::thread::sleep(PLAYER_POLL_INTERVAL),
                Ok(None) => break,
                Err(e) => {
                    log::error!("Failed to poll player PID {}: {}", pid, e);
                    break;
                }
            }
        }

        log::warn!("Player PID {} didn't terminate. Killing.", pid);
        if let Err(e) = child.kill() {
            log::error!("Failed to kill player PID {}: {}", pid, e);
        }
        if let Err(e) = child.wait() {
            log::error!("Failed to reap player PID {}: {}", pid, e);
        }
    }
}

impl<V: VideoSource, T: ProcessTree> Drop for PlaybackSupervisor<V, T> {
    fn drop(&mut self) {
        self.stop();
    }
}
