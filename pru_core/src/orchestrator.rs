//! Top-level orchestration: state machine, module load, control loop.
//!
//! The orchestrator owns every shared resource — the data exchange, the two
//! cycle threads, the comms channel, the module registry, and the
//! collaborator handles — and passes context into components instead of
//! relying on device-wide singletons.
//!
//! Loop shape, once per iteration: refresh the outgoing header, dispatch the
//! current state's handler, check for a pending configuration upload, then
//! service the comms channel. A fatal status (bit 0x80) permanently skips
//! state dispatch while the comms path stays alive, so the host can still
//! observe the failure through the header.

use crate::comms::CommsChannel;
use crate::exchange::DataExchange;
use crate::modules::registry::ModuleRegistry;
use crate::modules::{Module, ModuleContext};
use crate::state::{State, StateTracker};
use crate::thread::CycleThread;
use pru_common::config::BoardConfig;
use pru_common::protocol::{
    BASE_FREQ_DEFAULT, PRU_DATA, SERVO_FREQ_DEFAULT, THREAD_BASE, THREAD_SERVO,
};
use pru_common::status::{DeviceStatus, ErrorCode, ErrorSource, StatusRegister};
use pru_hal::board::BoardSupport;
use pru_hal::reset::ResetController;
use pru_hal::storage::{ConfigSource, UploadError};
use pru_hal::transport::Transport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// The device orchestrator.
pub struct Orchestrator {
    state: StateTracker,
    exchange: Arc<DataExchange>,
    status: Arc<StatusRegister>,
    comms: CommsChannel,
    base_thread: CycleThread,
    servo_thread: CycleThread,
    on_load: Vec<Box<dyn Module>>,
    registry: ModuleRegistry,
    board: Arc<dyn BoardSupport>,
    config_source: Box<dyn ConfigSource>,
    reset_controller: Arc<dyn ResetController>,
    /// External reset request line (host pin, SIGINT in simulation).
    reset_request: Arc<AtomicBool>,
    threads_running: bool,
    fatal_handled: bool,
    restarting: bool,
}

impl Orchestrator {
    /// Assemble the orchestrator from its collaborators.
    pub fn new(
        transport: Box<dyn Transport>,
        config_source: Box<dyn ConfigSource>,
        board: Arc<dyn BoardSupport>,
        reset_controller: Arc<dyn ResetController>,
    ) -> Self {
        let exchange = Arc::new(DataExchange::new());
        let status = Arc::new(StatusRegister::new());

        let mut comms =
            CommsChannel::new(transport, Arc::clone(&exchange), Arc::clone(&status));
        comms.init();

        Self {
            state: StateTracker::new(),
            exchange,
            status,
            comms,
            base_thread: CycleThread::new("Base", BASE_FREQ_DEFAULT),
            servo_thread: CycleThread::new("Servo", SERVO_FREQ_DEFAULT),
            on_load: Vec::new(),
            registry: ModuleRegistry::with_defaults(),
            board,
            config_source,
            reset_controller,
            reset_request: Arc::new(AtomicBool::new(false)),
            threads_running: false,
            fatal_handled: false,
            restarting: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.state.current()
    }

    /// Previously-visited state (diagnostics).
    pub fn previous_state(&self) -> State {
        self.state.previous()
    }

    /// Shared process data.
    pub fn exchange(&self) -> &Arc<DataExchange> {
        &self.exchange
    }

    /// Process-wide status register.
    pub fn status_register(&self) -> &Arc<StatusRegister> {
        &self.status
    }

    /// External reset request line; assert to force SysReset from Running.
    pub fn reset_request(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.reset_request)
    }

    /// Base cycle thread.
    pub fn base_thread(&self) -> &CycleThread {
        &self.base_thread
    }

    /// Servo cycle thread.
    pub fn servo_thread(&self) -> &CycleThread {
        &self.servo_thread
    }

    /// Number of on-load modules built during Setup.
    pub fn on_load_count(&self) -> usize {
        self.on_load.len()
    }

    /// True once a hardware restart has been triggered.
    pub fn is_restarting(&self) -> bool {
        self.restarting
    }

    /// Top-level control loop. Returns when a hardware restart has been
    /// triggered (simulation only; on hardware the reset does not return).
    pub fn run(&mut self) {
        loop {
            self.run_iteration();
            if self.restarting {
                info!("restart triggered, leaving control loop");
                return;
            }
            std::thread::yield_now();
        }
    }

    /// One iteration of the control loop.
    pub fn run_iteration(&mut self) {
        self.update_header();

        if self.status.is_fatal() {
            if !self.fatal_handled {
                error!("Fatal error detected. Halting state machine dispatch.");
                self.fatal_handled = true;
            }
            // Keep the comms path alive so the host can observe the status.
            self.comms.tasks();
            return;
        }

        match self.state.current() {
            State::Setup => self.handle_setup(),
            State::Start => self.handle_start(),
            State::Idle => self.handle_idle(),
            State::Running => self.handle_running(),
            State::Reset => self.handle_reset(),
            State::SysReset => self.handle_sys_reset(),
        }

        self.check_config_upload();
        self.comms.tasks();
    }

    /// Refresh the outgoing header: DATA code OR'd with the status byte.
    fn update_header(&mut self) {
        self.exchange
            .set_tx_header(PRU_DATA | u32::from(self.status.get().raw()));
    }

    fn handle_setup(&mut self) {
        let (content, load_status) = self.config_source.load();
        if load_status.is_fatal() {
            self.status.set(load_status);
            return;
        }

        match BoardConfig::from_slice(&content) {
            Ok(config) => {
                if let Err(e) = self.base_thread.set_frequency(config.base_freq()) {
                    warn!("cannot retarget base thread: {e}");
                }
                if let Err(e) = self.servo_thread.set_frequency(config.servo_freq()) {
                    warn!("cannot retarget servo thread: {e}");
                }
                self.load_modules(&config);
                self.state.transition_to(State::Start);
            }
            Err(e) => {
                error!("configuration rejected: {e}");
                self.status.set(DeviceStatus::new(
                    ErrorSource::ConfigParse,
                    ErrorCode::ParseFailed,
                    true,
                ));
            }
        }
    }

    /// Build modules from the configuration and register them with their
    /// threads. A failed entry is logged and skipped; siblings still load.
    fn load_modules(&mut self, config: &BoardConfig) {
        info!("Creating modules from config");
        let ctx = ModuleContext {
            exchange: Arc::clone(&self.exchange),
            board: Arc::clone(&self.board),
        };

        for entry in &config.modules {
            if let Some(comment) = &entry.comment {
                info!("{comment}");
            }

            let Some(module) = self.registry.create(entry, &ctx) else {
                warn!(
                    "Failed to create module of type '{}' for thread '{}'. Skipping registration.",
                    entry.type_tag, entry.thread
                );
                if !self.status.is_fatal() {
                    self.status.set(DeviceStatus::new(
                        ErrorSource::ModuleLoad,
                        ErrorCode::UnknownModule,
                        false,
                    ));
                }
                continue;
            };

            let target = match entry.thread.as_str() {
                THREAD_SERVO => &mut self.servo_thread,
                THREAD_BASE => &mut self.base_thread,
                _ => {
                    self.on_load.push(module);
                    continue;
                }
            };
            if let Err(e) = target.register(module) {
                warn!("cannot register '{}': {e}", entry.type_tag);
            }
        }
    }

    fn handle_start(&mut self) {
        for module in &mut self.on_load {
            module.configure();
        }

        if !self.threads_running {
            info!("Starting the Servo thread");
            if let Err(e) = self.servo_thread.start() {
                error!("servo thread start failed: {e}");
            }
            info!("Starting the Base thread");
            if let Err(e) = self.base_thread.start() {
                error!("base thread start failed: {e}");
            }
            self.threads_running = true;
        }

        self.state.transition_to(State::Idle);
    }

    fn handle_idle(&mut self) {
        if self.comms.status() {
            self.state.transition_to(State::Running);
        }
    }

    fn handle_running(&mut self) {
        // Link-loss check runs before the external-reset check; this order
        // is inherited behavior, not documented intent.
        if !self.comms.status() {
            self.state.transition_to(State::Reset);
        }

        if self.reset_request.load(Ordering::SeqCst) {
            self.state.transition_to(State::SysReset);
        }
    }

    fn handle_reset(&mut self) {
        info!("Resetting receive buffer");
        self.exchange.clear_active_rx();
        self.state.transition_to(State::Idle);
    }

    fn handle_sys_reset(&mut self) {
        self.reset_controller.system_reset();
        self.restarting = true;
    }

    /// Apply a pending configuration upload: the storage collaborator
    /// validates length and integrity; success forces a hardware restart so
    /// Setup re-runs with the new document.
    fn check_config_upload(&mut self) {
        if !self.config_source.upload_pending() {
            return;
        }
        info!("Checking new configuration file");
        match self.config_source.commit_upload() {
            Ok(()) => {
                info!("Success. Forcing reboot now...");
                self.reset_controller.system_reset();
                self.restarting = true;
            }
            Err(e) => {
                warn!("Configuration upload rejected: {e}");
                if !self.status.is_fatal() {
                    let code = match e {
                        UploadError::TooLong { .. } => ErrorCode::BadLength,
                        UploadError::ChecksumMismatch { .. } => ErrorCode::BadChecksum,
                        UploadError::NoUpload => return,
                    };
                    self.status.set(DeviceStatus::new(
                        ErrorSource::ConfigStorage,
                        code,
                        false,
                    ));
                }
            }
        }
    }
}
