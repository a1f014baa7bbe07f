use std::path::PathBuf;
use std::sync::mpsc::Receiver;

use tracing::{info, warn};

use super::output::OutputBuffer;
use super::panel::PanelState;
use super::theme::Theme;
use crate::config::Settings;
use crate::error::TransferError;
use crate::services::size_cache::{SizeCache, SizeLookup, SizeUpdate};
use crate::services::transfer::{
    validate_target, JobState, OutputMode, RunMode, TransferJob, TransferMode, TransferRequest,
};

const OUTPUT_CAPACITY: usize = 2000;
const MESSAGE_TICKS: u8 = 30; // ~3 seconds at the draw cadence

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelSide {
    Left,
    Right,
}

pub struct App {
    pub settings: Settings,
    pub theme: Theme,
    pub left_panel: PanelState,
    pub right_panel: PanelState,
    pub active_panel: PanelSide,

    // Pending transfer configuration, toggled before `r` launches a job
    pub transfer_mode: TransferMode,
    pub run_mode: RunMode,
    pub output_mode: OutputMode,

    // At most one attached job; it blocks everything except cancel
    pub attached: Option<TransferJob>,
    pub detached: Vec<TransferJob>,
    pub output: OutputBuffer,

    size_cache: SizeCache,
    size_updates: Receiver<SizeUpdate>,

    pub message: Option<String>,
    pub message_timer: u8,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        fn home() -> PathBuf {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
        }
        let left = PanelState::new(settings.panel_start_path(0, home));
        let right = PanelState::new(settings.panel_start_path(1, home));
        let theme = Theme::load(&settings.theme);
        let (size_cache, size_updates) = SizeCache::new();

        let mut app = Self {
            settings,
            theme,
            left_panel: left,
            right_panel: right,
            active_panel: PanelSide::Left,
            transfer_mode: TransferMode::Copy,
            run_mode: RunMode::Attached,
            output_mode: OutputMode::Progress,
            attached: None,
            detached: Vec::new(),
            output: OutputBuffer::new(OUTPUT_CAPACITY),
            size_cache,
            size_updates,
            message: None,
            message_timer: 0,
        };
        app.request_sizes(PanelSide::Left);
        app.request_sizes(PanelSide::Right);
        app
    }

    pub fn active_panel(&self) -> &PanelState {
        match self.active_panel {
            PanelSide::Left => &self.left_panel,
            PanelSide::Right => &self.right_panel,
        }
    }

    pub fn active_panel_mut(&mut self) -> &mut PanelState {
        match self.active_panel {
            PanelSide::Left => &mut self.left_panel,
            PanelSide::Right => &mut self.right_panel,
        }
    }

    pub fn inactive_panel(&self) -> &PanelState {
        match self.active_panel {
            PanelSide::Left => &self.right_panel,
            PanelSide::Right => &self.left_panel,
        }
    }

    pub fn switch_panel(&mut self) {
        self.active_panel = match self.active_panel {
            PanelSide::Left => PanelSide::Right,
            PanelSide::Right => PanelSide::Left,
        };
    }

    pub fn move_cursor(&mut self, delta: i32) {
        self.active_panel_mut().move_cursor(delta);
    }

    pub fn enter_selected(&mut self) {
        let side = self.active_panel;
        match self.active_panel_mut().enter_selected() {
            Ok(true) => self.request_sizes(side),
            Ok(false) => {}
            Err(e) => self.show_message(&e.to_string()),
        }
    }

    pub fn navigate_up(&mut self) {
        let side = self.active_panel;
        match self.active_panel_mut().navigate_up() {
            Ok(()) => self.request_sizes(side),
            Err(e) => self.show_message(&e.to_string()),
        }
    }

    pub fn toggle_selection(&mut self) {
        self.active_panel_mut().toggle_mark();
    }

    pub fn set_transfer_mode(&mut self, mode: TransferMode) {
        self.transfer_mode = mode;
        self.show_message(&format!("mode: {}", mode.label()));
    }

    pub fn set_run_mode(&mut self, mode: RunMode) {
        self.run_mode = mode;
        self.show_message(&format!("run: {}", mode.label()));
    }

    pub fn set_output_mode(&mut self, mode: OutputMode) {
        self.output_mode = mode;
        self.show_message(&format!("output: {}", mode.label()));
    }

    /// Launch the configured transfer: active panel's marked entries (or
    /// cursor entry) into the other panel's directory.
    pub fn start_transfer(&mut self) {
        match self.try_start_transfer() {
            Ok(()) => {}
            Err(e) => self.show_message(&e.to_string()),
        }
    }

    fn try_start_transfer(&mut self) -> Result<(), TransferError> {
        if self.attached.is_some() {
            return Err(TransferError::Busy);
        }

        let sources = self.active_panel().operation_paths();
        let destination = self.inactive_panel().path.clone();
        validate_target(&sources, &destination)?;

        let request = TransferRequest {
            sources,
            destination,
            mode: self.transfer_mode,
            run_mode: self.run_mode,
            output_mode: self.output_mode,
        };
        let job = TransferJob::launch(
            &self.settings.tool_path,
            request,
            &self.settings.detached_log_path(),
        )?;

        match self.run_mode {
            RunMode::Attached => {
                self.output.clear();
                self.attached = Some(job);
                self.show_message(&format!("{} running (Esc cancels)", self.transfer_mode.label()));
            }
            RunMode::Detached => {
                self.show_message(&format!(
                    "{} detached, output -> {}",
                    self.transfer_mode.label(),
                    self.settings.detached_log_path().display()
                ));
                self.detached.push(job);
            }
        }
        self.active_panel_mut().marked.clear();
        Ok(())
    }

    pub fn cancel_attached(&mut self) {
        if let Some(job) = self.attached.as_mut() {
            job.cancel();
        }
    }

    /// True while an attached job holds the UI; only cancel is accepted.
    pub fn is_blocked(&self) -> bool {
        self.attached.is_some()
    }

    /// One tick of background work: stream attached output, collect size
    /// results, reap finished jobs. Returns true when a redraw is needed.
    pub fn poll_background(&mut self) -> bool {
        let mut dirty = false;

        if let Some(job) = self.attached.as_mut() {
            let lines = job.drain_output();
            if !lines.is_empty() {
                self.output.extend(lines);
                dirty = true;
            }
            if job.poll() {
                let mut job = match self.attached.take() {
                    Some(job) => job,
                    None => return true,
                };
                self.output.extend(job.drain_remaining());
                job.release();
                self.finish_job(&job);
                dirty = true;
            }
        }

        let mut finished = Vec::new();
        self.detached.retain_mut(|job| {
            if job.poll() {
                job.release();
                finished.push((job.request.clone(), job.state));
                false
            } else {
                true
            }
        });
        for (request, state) in finished {
            self.finish_detached(&request, state);
            dirty = true;
        }

        while let Ok(update) = self.size_updates.try_recv() {
            if self.left_panel.apply_size_update(&update) {
                dirty = true;
            }
            if self.right_panel.apply_size_update(&update) {
                dirty = true;
            }
        }

        dirty
    }

    fn finish_job(&mut self, job: &TransferJob) {
        let label = job.request.mode.label();
        match job.state {
            JobState::Succeeded => {
                self.show_message(&format!("{label} finished"));
                self.refresh_after(&job.request);
            }
            JobState::Failed(code) => {
                self.show_message(&format!("{label} failed (exit {code})"));
            }
            JobState::Cancelled => {
                self.show_message(&format!("{label} cancelled"));
                self.refresh_after(&job.request);
            }
            JobState::Running => {}
        }
    }

    fn finish_detached(&mut self, request: &TransferRequest, state: JobState) {
        let label = request.mode.label();
        match state {
            JobState::Succeeded => {
                self.show_message(&format!("detached {label} finished"));
                self.refresh_after(request);
            }
            JobState::Failed(code) => {
                warn!(code, "detached transfer failed");
                self.show_message(&format!(
                    "detached {} failed (exit {}), see {}",
                    label,
                    code,
                    self.settings.detached_log_path().display()
                ));
            }
            JobState::Cancelled => {
                self.show_message(&format!("detached {label} cancelled"));
                self.refresh_after(request);
            }
            JobState::Running => {}
        }
    }

    /// Re-list panels whose directory a finished transfer touched: the
    /// destination, and for moves the parents the sources left.
    fn refresh_after(&mut self, request: &TransferRequest) {
        let mut affected = vec![request.destination.clone()];
        if request.mode == TransferMode::Move {
            for source in &request.sources {
                if let Some(parent) = source.parent() {
                    affected.push(parent.to_path_buf());
                }
            }
        }
        info!(?affected, "refreshing panels after transfer");

        for side in [PanelSide::Left, PanelSide::Right] {
            let panel = match side {
                PanelSide::Left => &mut self.left_panel,
                PanelSide::Right => &mut self.right_panel,
            };
            if affected.iter().any(|dir| dir == &panel.path) {
                if panel.reload().is_err() {
                    // The directory itself went away; climb to survivors
                    while panel.navigate_up().is_err() && panel.path.parent().is_some() {}
                }
                self.request_sizes(side);
            }
        }
    }

    /// Schedule size aggregation for directories the panel has not sized
    /// yet. Cached fresh results are applied synchronously.
    fn request_sizes(&mut self, side: PanelSide) {
        let panel = match side {
            PanelSide::Left => &mut self.left_panel,
            PanelSide::Right => &mut self.right_panel,
        };
        for path in panel.dirs_needing_size() {
            if let SizeLookup::Known(size, partial) = self.size_cache.request(&path) {
                panel.apply_size_update(&SizeUpdate {
                    path,
                    size,
                    partial,
                });
            }
        }
        panel.mark_sizes_calculating();
    }

    pub fn show_message(&mut self, msg: &str) {
        self.message = Some(msg.to_string());
        self.message_timer = MESSAGE_TICKS;
    }

    pub fn tick_message(&mut self) {
        if self.message_timer > 0 {
            self.message_timer -= 1;
            if self.message_timer == 0 {
                self.message = None;
            }
        }
    }

    /// Persist panel positions for the next run.
    pub fn save_session(&mut self) {
        self.settings.panels = vec![
            crate::config::PanelSettings {
                start_path: Some(self.left_panel.path.display().to_string()),
            },
            crate::config::PanelSettings {
                start_path: Some(self.right_panel.path.display().to_string()),
            },
        ];
        if let Err(e) = self.settings.save() {
            warn!(error = %e, "failed to save settings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration, Instant};

    fn test_app() -> (tempfile::TempDir, App) {
        let dir = tempfile::tempdir().unwrap();
        let left = dir.path().join("left");
        let right = dir.path().join("right");
        fs::create_dir(&left).unwrap();
        fs::create_dir(&right).unwrap();
        File::create(left.join("a.txt")).unwrap();
        File::create(left.join("b.txt")).unwrap();

        let settings = Settings {
            tool_path: "echo".to_string(),
            detached_log: Some(dir.path().join("jobs.log").display().to_string()),
            panels: vec![
                crate::config::PanelSettings {
                    start_path: Some(left.display().to_string()),
                },
                crate::config::PanelSettings {
                    start_path: Some(right.display().to_string()),
                },
            ],
            theme: "dark".to_string(),
        };
        (dir, App::new(settings))
    }

    /// A stand-in tool that ignores its arguments and stays alive until
    /// it is signalled.
    #[cfg(unix)]
    fn slow_tool(dir: &tempfile::TempDir) -> String {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.path().join("slowtool");
        fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script.display().to_string()
    }

    fn wait_until<F: FnMut(&mut App) -> bool>(app: &mut App, mut done: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(app) {
            assert!(Instant::now() < deadline, "background work did not finish");
            app.poll_background();
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_switch_panel_round_trips() {
        let (_dir, mut app) = test_app();
        assert_eq!(app.active_panel, PanelSide::Left);
        app.switch_panel();
        assert_eq!(app.active_panel, PanelSide::Right);
        app.switch_panel();
        assert_eq!(app.active_panel, PanelSide::Left);
    }

    #[test]
    fn test_mode_toggles_update_message() {
        let (_dir, mut app) = test_app();
        app.set_transfer_mode(TransferMode::Move);
        assert_eq!(app.transfer_mode, TransferMode::Move);
        app.set_run_mode(RunMode::Detached);
        assert_eq!(app.run_mode, RunMode::Detached);
        app.set_output_mode(OutputMode::Log);
        assert_eq!(app.output_mode, OutputMode::Log);
        assert!(app.message.is_some());
    }

    #[test]
    fn test_attached_transfer_lifecycle() {
        let (_dir, mut app) = test_app();
        app.output_mode = OutputMode::Log;
        // Cursor on "a.txt" (index 0 is the parent row)
        app.active_panel_mut().selected_index = 1;
        app.start_transfer();
        assert!(app.is_blocked());

        wait_until(&mut app, |app| app.attached.is_none());
        assert!(!app.output.is_empty());
        let msg = app.message.clone().unwrap_or_default();
        assert!(msg.contains("finished"), "unexpected message: {msg}");
    }

    #[test]
    fn test_second_attached_transfer_is_rejected() {
        let (_dir, mut app) = test_app();
        app.active_panel_mut().selected_index = 1;
        app.start_transfer();
        assert!(app.is_blocked());

        app.active_panel_mut().selected_index = 2;
        app.start_transfer();
        let msg = app.message.clone().unwrap_or_default();
        assert!(msg.contains("already running"), "unexpected message: {msg}");

        wait_until(&mut app, |app| app.attached.is_none());
    }

    #[test]
    fn test_transfer_into_source_is_rejected() {
        let (dir, mut app) = test_app();
        // Right panel descends into a subdirectory of the left selection
        let nested = dir.path().join("left").join("sub");
        fs::create_dir(&nested).unwrap();
        app.active_panel_mut().reload().unwrap();
        app.switch_panel();
        app.active_panel_mut().navigate_to(nested).unwrap();
        app.switch_panel();

        // Select "sub" in the left panel
        let index = app
            .active_panel()
            .entries
            .iter()
            .position(|e| e.name == "sub")
            .unwrap();
        app.active_panel_mut().selected_index = index;

        app.start_transfer();
        assert!(app.attached.is_none());
        let msg = app.message.clone().unwrap_or_default();
        assert!(msg.contains("inside"), "unexpected message: {msg}");
    }

    #[test]
    fn test_detached_transfer_appends_log_and_reaps() {
        let (dir, mut app) = test_app();
        app.run_mode = RunMode::Detached;
        app.output_mode = OutputMode::Log;
        app.active_panel_mut().selected_index = 1;
        app.start_transfer();
        assert!(!app.is_blocked());
        assert_eq!(app.detached.len(), 1);

        wait_until(&mut app, |app| app.detached.is_empty());
        let log = fs::read_to_string(dir.path().join("jobs.log")).unwrap();
        assert!(log.contains("copy"));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_attached_unblocks_ui() {
        let (dir, mut app) = test_app();
        app.settings.tool_path = slow_tool(&dir);
        app.active_panel_mut().selected_index = 1;
        app.start_transfer();
        assert!(app.is_blocked());

        app.cancel_attached();
        wait_until(&mut app, |app| app.attached.is_none());
        assert!(!app.is_blocked());
        let msg = app.message.clone().unwrap_or_default();
        assert!(msg.contains("cancelled"), "unexpected message: {msg}");
    }

    #[test]
    fn test_failed_transfer_keeps_panels_unrefreshed() {
        let (dir, mut app) = test_app();
        // `false` exits 1 regardless of arguments
        app.settings.tool_path = "false".to_string();
        app.active_panel_mut().selected_index = 1;
        app.start_transfer();
        assert!(app.is_blocked());

        // A new entry in the destination must not surface, since failed
        // transfers leave both listings as they were
        File::create(dir.path().join("right").join("late.txt")).unwrap();
        wait_until(&mut app, |app| app.attached.is_none());
        let msg = app.message.clone().unwrap_or_default();
        assert!(msg.contains("failed (exit 1)"), "unexpected message: {msg}");
        assert!(!app.right_panel.entries.iter().any(|e| e.name == "late.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_detached_cancelled_job_is_reported() {
        let (dir, mut app) = test_app();
        app.settings.tool_path = slow_tool(&dir);
        app.run_mode = RunMode::Detached;
        app.active_panel_mut().selected_index = 1;
        app.start_transfer();
        assert!(!app.is_blocked());
        assert_eq!(app.detached.len(), 1);

        app.detached[0].cancel();
        wait_until(&mut app, |app| app.detached.is_empty());
        let msg = app.message.clone().unwrap_or_default();
        assert!(msg.contains("cancelled"), "unexpected message: {msg}");
    }

    #[test]
    fn test_message_expires_after_ticks() {
        let (_dir, mut app) = test_app();
        app.show_message("hello");
        for _ in 0..MESSAGE_TICKS {
            app.tick_message();
        }
        assert!(app.message.is_none());
    }

    #[test]
    fn test_size_updates_reach_panels() {
        let (dir, mut app) = test_app();
        let sub = dir.path().join("left").join("bulk");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("payload"), vec![0u8; 2048]).unwrap();
        app.active_panel_mut().reload().unwrap();
        app.request_sizes(PanelSide::Left);

        wait_until(&mut app, |app| {
            app.left_panel
                .entries
                .iter()
                .any(|e| e.name == "bulk" && e.size == Some(2048))
        });
    }
}
