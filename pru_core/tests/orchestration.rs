//! End-to-end orchestration tests: state sequencing, swap parity, fatal
//! handling, and the module pipeline driven through the real cycle threads.

use pru_common::protocol::{
    DATA_BUFF_SIZE, PRU_ACKNOWLEDGE, PRU_DATA, PRU_ERR, PRU_ESTOP, PRU_READ, PRU_WRITE,
    frame_header,
};
use pru_common::records::{RxRecord, TxRecord};
use pru_common::status::{ErrorCode, FATAL_MASK};
use pru_core::orchestrator::Orchestrator;
use pru_core::state::State;
use pru_hal::board::{BoardSupport, SimBoard};
use pru_hal::reset::SimReset;
use pru_hal::storage::{ConfigSource, MemoryConfigSource, crc32};
use pru_hal::transport::{ScriptTransport, ScriptTransportHandle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cycle threads run slowly in tests; the assertions poll instead of
/// assuming a period boundary.
const TEST_CONFIG: &str = r#"{
    "Board": "TestRig",
    "Threads": [
        { "Thread": "Base", "Frequency": 200 },
        { "Thread": "Servo", "Frequency": 100 }
    ],
    "Modules": [
        {
            "Thread": "Servo",
            "Type": "PWM",
            "Comment": "Spindle PWM",
            "SP[i]": 0,
            "Period SP[i]": 1,
            "PWM Max": 0,
            "PWM Pin": "PA_6",
            "Variable Freq": "False",
            "Period us": 200
        },
        {
            "Thread": "Base",
            "Type": "QEI",
            "PV[i]": 2,
            "Enable Index": "False"
        },
        {
            "Thread": "Servo",
            "Type": "Blink",
            "Pin": "PB_0",
            "Frequency": 4
        },
        {
            "Thread": "On load",
            "Type": "Digipot",
            "Wiper %": 35.0
        }
    ]
}"#;

struct Rig {
    orchestrator: Orchestrator,
    transport: ScriptTransportHandle,
    board: Arc<SimBoard>,
    reset_latch: Arc<AtomicBool>,
}

fn rig_with_source(source: Box<dyn ConfigSource>) -> Rig {
    let (transport, handle) = ScriptTransport::new();
    let board = Arc::new(SimBoard::new());
    let reset = Arc::new(SimReset::new());
    let reset_latch = reset.requested();
    let orchestrator =
        Orchestrator::new(
            Box::new(transport),
            source,
            Arc::clone(&board) as Arc<dyn BoardSupport>,
            reset,
        );
    Rig {
        orchestrator,
        transport: handle,
        board,
        reset_latch,
    }
}

fn rig() -> Rig {
    rig_with_source(Box::new(MemoryConfigSource::with_document(
        TEST_CONFIG.as_bytes(),
    )))
}

fn request(header: u32, set_points: &[(usize, f32)]) -> Vec<u8> {
    let mut record = RxRecord::zeroed();
    record.header = header;
    for &(index, value) in set_points {
        record.set_point[index] = value;
    }
    record.as_bytes().to_vec()
}

/// Drive the rig until Idle (Setup → Start → Idle takes two iterations).
fn run_to_idle(rig: &mut Rig) {
    rig.orchestrator.run_iteration();
    rig.orchestrator.run_iteration();
    assert_eq!(rig.orchestrator.state(), State::Idle);
}

/// Idle → Running via one valid WRITE exchange.
fn run_to_running(rig: &mut Rig, set_points: &[(usize, f32)]) {
    rig.transport.push_frame(&request(PRU_WRITE, set_points));
    rig.orchestrator.run_iteration(); // frame serviced at iteration tail
    rig.orchestrator.run_iteration(); // Idle handler sees the link
    assert_eq!(rig.orchestrator.state(), State::Running);
}

fn poll_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}

#[test]
fn startup_builds_modules_and_reaches_idle() {
    let mut rig = rig();
    run_to_idle(&mut rig);

    assert_eq!(rig.orchestrator.previous_state(), State::Start);
    // PWM + Blink on Servo, QEI on Base, Digipot on load.
    assert_eq!(rig.orchestrator.servo_thread().module_count(), 2);
    assert_eq!(rig.orchestrator.base_thread().module_count(), 1);
    assert_eq!(rig.orchestrator.on_load_count(), 1);

    // Thread frequencies came from the document.
    assert_eq!(rig.orchestrator.base_thread().frequency_hz(), 200);
    assert_eq!(rig.orchestrator.servo_thread().frequency_hz(), 100);

    // The on-load digipot was configured exactly once during Start.
    let pots = rig.board.digipot_states();
    assert_eq!(pots.len(), 1);
    let snap = *pots[0].lock().unwrap();
    assert_eq!(snap.wiper_percent, 35.0);
    assert_eq!(snap.writes, 1);
}

#[test]
fn idle_stays_idle_without_host_link() {
    let mut rig = rig();
    run_to_idle(&mut rig);
    for _ in 0..5 {
        rig.orchestrator.run_iteration();
    }
    assert_eq!(rig.orchestrator.state(), State::Idle);
}

#[test]
fn write_request_promotes_to_running_and_acknowledges() {
    let mut rig = rig();
    run_to_idle(&mut rig);
    run_to_running(&mut rig, &[(0, 42.0)]);

    // Setpoints became active for the cycle threads.
    assert_eq!(rig.orchestrator.exchange().set_point(0), 42.0);
    // One WRITE: both parities toggled once.
    assert_eq!(rig.orchestrator.exchange().rx_active_index(), 1);
    assert_eq!(rig.orchestrator.exchange().tx_active_index(), 1);

    let sent = rig.transport.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(frame_header(&sent[0]), Some(PRU_ACKNOWLEDGE));
}

#[test]
fn read_request_returns_data_and_preserves_setpoints() {
    let mut rig = rig();
    run_to_idle(&mut rig);
    run_to_running(&mut rig, &[(0, 42.0)]);
    rig.transport.take_sent();

    rig.transport.push_frame(&request(PRU_READ, &[]));
    rig.orchestrator.run_iteration();

    // READ swaps the transmit side only.
    assert_eq!(rig.orchestrator.exchange().rx_active_index(), 1);
    assert_eq!(rig.orchestrator.exchange().tx_active_index(), 0);
    assert_eq!(rig.orchestrator.exchange().set_point(0), 42.0);
    assert_eq!(rig.orchestrator.state(), State::Running);

    let sent = rig.transport.take_sent();
    assert_eq!(frame_header(&sent[0]), Some(PRU_DATA));
}

#[test]
fn unknown_header_gets_error_reply() {
    let mut rig = rig();
    run_to_idle(&mut rig);

    rig.transport.push_frame(&request(0xDEAD_BEEF, &[]));
    rig.orchestrator.run_iteration();

    let sent = rig.transport.take_sent();
    assert_eq!(frame_header(&sent[0]), Some(PRU_ERR));
    // No swap happened.
    assert_eq!(rig.orchestrator.exchange().rx_active_index(), 0);
    assert_eq!(rig.orchestrator.exchange().tx_active_index(), 0);
}

#[test]
fn estop_runs_the_reset_cycle_and_clears_setpoints() {
    let mut rig = rig();
    run_to_idle(&mut rig);
    run_to_running(&mut rig, &[(0, 42.0)]);

    rig.transport.push_frame(&request(PRU_ESTOP, &[]));
    rig.orchestrator.run_iteration(); // ESTOP serviced, link drops
    rig.orchestrator.run_iteration(); // Running → Reset
    assert_eq!(rig.orchestrator.state(), State::Reset);
    rig.orchestrator.run_iteration(); // buffer cleared, Reset → Idle

    assert_eq!(rig.orchestrator.state(), State::Idle);
    assert_eq!(rig.orchestrator.previous_state(), State::Reset);
    assert_eq!(rig.orchestrator.exchange().set_point(0), 0.0);
}

#[test]
fn reset_request_in_running_triggers_sys_reset() {
    let mut rig = rig();
    run_to_idle(&mut rig);
    run_to_running(&mut rig, &[]);

    rig.orchestrator.reset_request().store(true, Ordering::SeqCst);
    rig.orchestrator.run_iteration(); // Running → SysReset
    assert_eq!(rig.orchestrator.state(), State::SysReset);
    rig.orchestrator.run_iteration(); // SysReset handler fires the restart

    assert!(rig.orchestrator.is_restarting());
    assert!(rig.reset_latch.load(Ordering::SeqCst));
}

#[test]
fn link_loss_is_checked_before_reset_request() {
    let mut rig = rig();
    run_to_idle(&mut rig);
    run_to_running(&mut rig, &[]);

    // Both causes pending in the same iteration: the handler takes Reset
    // first, then SysReset, so the previous state records Reset.
    rig.transport.push_frame(&request(PRU_ESTOP, &[]));
    rig.orchestrator.run_iteration(); // link drops at iteration tail
    rig.orchestrator.reset_request().store(true, Ordering::SeqCst);
    rig.orchestrator.run_iteration();

    assert_eq!(rig.orchestrator.state(), State::SysReset);
    assert_eq!(rig.orchestrator.previous_state(), State::Reset);
}

#[test]
fn fatal_config_freezes_dispatch_but_comms_stay_alive() {
    let mut rig = rig_with_source(Box::new(MemoryConfigSource::unavailable()));

    for _ in 0..3 {
        rig.orchestrator.run_iteration();
    }
    // Dispatch frozen in Setup, fatal bit raised.
    assert_eq!(rig.orchestrator.state(), State::Setup);
    assert!(rig.orchestrator.status_register().is_fatal());

    // The host can still talk to the device and sees the fatal bit in the
    // reply header.
    rig.transport.push_frame(&request(PRU_READ, &[]));
    rig.orchestrator.run_iteration();
    let sent = rig.transport.take_sent();
    assert_eq!(sent.len(), 1);
    let header = frame_header(&sent[0]).unwrap();
    assert_eq!(header & u32::from(FATAL_MASK), u32::from(FATAL_MASK));

    // Still frozen.
    assert_eq!(rig.orchestrator.state(), State::Setup);
}

#[test]
fn unknown_module_type_is_skipped_siblings_survive() {
    let config = r#"{
        "Board": "TestRig",
        "Threads": [
            { "Thread": "Base", "Frequency": 200 },
            { "Thread": "Servo", "Frequency": 100 }
        ],
        "Modules": [
            { "Thread": "Servo", "Type": "Frobnicator" },
            {
                "Thread": "Servo",
                "Type": "PWM",
                "SP[i]": 0,
                "Period SP[i]": 1,
                "PWM Max": 0,
                "PWM Pin": "PA_6",
                "Variable Freq": "False",
                "Period us": 200
            },
            { "Thread": "Base", "Type": "QEI", "PV[i]": 2, "Enable Index": "False" }
        ]
    }"#;
    let mut rig = rig_with_source(Box::new(MemoryConfigSource::with_document(
        config.as_bytes(),
    )));
    run_to_idle(&mut rig);

    // The bad entry was skipped; its siblings registered.
    assert_eq!(rig.orchestrator.servo_thread().module_count(), 1);
    assert_eq!(rig.orchestrator.base_thread().module_count(), 1);

    // Non-fatal module-load status is observable.
    let status = rig.orchestrator.status_register().get();
    assert!(!status.is_fatal());
    assert_eq!(status.code(), Some(ErrorCode::UnknownModule));
}

#[test]
fn committed_upload_forces_restart() {
    let mut source = MemoryConfigSource::with_document(TEST_CONFIG.as_bytes());
    let new_doc = br#"{"Board": "Uploaded"}"#;
    source.stage_upload(new_doc, crc32(new_doc));

    let mut rig = rig_with_source(Box::new(source));
    rig.orchestrator.run_iteration();

    assert!(rig.orchestrator.is_restarting());
    assert!(rig.reset_latch.load(Ordering::SeqCst));
}

#[test]
fn corrupt_upload_is_rejected_without_restart() {
    let mut source = MemoryConfigSource::with_document(TEST_CONFIG.as_bytes());
    source.stage_upload(b"garbage", 0x1234_5678);

    let mut rig = rig_with_source(Box::new(source));
    run_to_idle(&mut rig);

    assert!(!rig.orchestrator.is_restarting());
    assert!(!rig.reset_latch.load(Ordering::SeqCst));
    let status = rig.orchestrator.status_register().get();
    assert_eq!(status.code(), Some(ErrorCode::BadChecksum));
}

#[test]
fn pwm_duty_flows_from_write_to_driver() {
    let mut rig = rig();
    run_to_idle(&mut rig);
    // 50 % duty on the 200 µs fixed period.
    run_to_running(&mut rig, &[(0, 50.0)]);

    let pwms = rig.board.pwm_states();
    assert_eq!(pwms.len(), 1);
    assert_eq!(pwms[0].0, "PA_6");

    let state = Arc::clone(&pwms[0].1);
    assert!(
        poll_until(Duration::from_secs(2), || {
            state.lock().unwrap().pulse_width_us == 100.0
        }),
        "servo thread never applied the duty setpoint",
    );
}

#[test]
fn encoder_count_flows_to_read_reply() {
    let mut rig = rig();
    run_to_idle(&mut rig);
    run_to_running(&mut rig, &[]);
    rig.transport.take_sent();

    let qeis = rig.board.qei_states();
    assert_eq!(qeis.len(), 1);
    qeis[0].set_count(777);

    // Wait for the base thread to mirror the count into process data.
    let exchange = Arc::clone(rig.orchestrator.exchange());
    assert!(
        poll_until(Duration::from_secs(2), || {
            exchange.process_variable(2) == 777.0
        }),
        "base thread never mirrored the encoder count",
    );

    rig.transport.push_frame(&request(PRU_READ, &[]));
    rig.orchestrator.run_iteration();

    let sent = rig.transport.take_sent();
    let mut record = TxRecord::zeroed();
    record.copy_from_bytes(&sent[0][..DATA_BUFF_SIZE]);
    assert_eq!(record.process_variable[2], 777.0);
}
