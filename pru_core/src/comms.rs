//! Protocol exchange channel.
//!
//! Decodes one pending host frame per service call, applies the buffer-swap
//! policy for the request type, and sends the reply. The channel only ever
//! touches the alternate slots plus the swap itself, so a cycle thread is
//! never stalled for longer than the index exchange.
//!
//! Swap policy:
//! - READ: the host only wants feedback. Swap the transmit pair, leave the
//!   receive pair untouched, reply DATA.
//! - WRITE: new setpoints arrived. Swap both pairs, reply ACKNOWLEDGE.
//! - ESTOP: drop the link status; the state machine reacts with its
//!   Reset→Idle cycle, clearing stale setpoints. The frame is echoed.
//! - anything else: reply ERROR, swap nothing.

use crate::exchange::{DataExchange, Swap};
use pru_common::protocol::{
    DATA_ERR_MAX, PRU_ACKNOWLEDGE, PRU_DATA, PRU_ERR, PRU_ESTOP, PRU_READ, PRU_WRITE, REPLY_LEN,
    frame_header,
};
use pru_common::records::TxRecord;
use pru_common::status::{DeviceStatus, ErrorCode, ErrorSource, StatusRegister};
use pru_hal::transport::Transport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Transport-agnostic protocol endpoint.
pub struct CommsChannel {
    transport: Box<dyn Transport>,
    exchange: Arc<DataExchange>,
    status: Arc<StatusRegister>,
    data_ready: Arc<AtomicBool>,
    link_up: bool,
    error_count: u32,
}

impl CommsChannel {
    /// Create a channel over the given transport.
    pub fn new(
        transport: Box<dyn Transport>,
        exchange: Arc<DataExchange>,
        status: Arc<StatusRegister>,
    ) -> Self {
        Self {
            transport,
            exchange,
            status,
            data_ready: Arc::new(AtomicBool::new(false)),
            link_up: false,
            error_count: 0,
        }
    }

    /// Register the data-received hook with the transport.
    pub fn init(&mut self) {
        let data_ready = Arc::clone(&self.data_ready);
        self.transport.set_data_callback(Box::new(move |intact| {
            if intact {
                data_ready.store(true, Ordering::SeqCst);
            }
        }));
    }

    /// Current link status: true after a valid host exchange, false after
    /// an ESTOP or a run of protocol errors.
    pub fn status(&self) -> bool {
        self.link_up
    }

    /// Per-iteration service: handle at most one pending frame.
    pub fn tasks(&mut self) {
        if !self.data_ready.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut frame = [0u8; REPLY_LEN];
        let len = self.transport.dma_read(&mut frame);
        if len == 0 {
            return;
        }
        self.handle_frame(&frame[..len]);
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        // Payload lands in the alternate receive slot; the active slot may
        // be mid-read on a cycle thread.
        self.exchange.write_alternate_rx(frame);

        match frame_header(frame).unwrap_or(0) {
            PRU_READ => {
                debug!("READ request");
                self.exchange.swap(Swap::TxOnly);
                self.send_reply(PRU_DATA);
                self.mark_good();
            }
            PRU_WRITE => {
                debug!("WRITE request");
                self.exchange.swap(Swap::Both);
                self.send_reply(PRU_ACKNOWLEDGE);
                self.mark_good();
            }
            PRU_ESTOP => {
                warn!("ESTOP received from host");
                self.link_up = false;
                self.send_reply(PRU_ESTOP);
            }
            other => {
                warn!("unknown header code {other:#010x}");
                self.record_error();
                self.send_reply(PRU_ERR);
            }
        }
    }

    /// Build and send the reply from the alternate transmit record (the one
    /// the cycle threads just finished, after a swap).
    fn send_reply(&mut self, code: u32) {
        let mut record: TxRecord = self.exchange.snapshot_alternate_tx();
        record.header = code | u32::from(self.status.get().raw());

        let mut reply = [0u8; REPLY_LEN];
        reply[..record.as_bytes().len()].copy_from_slice(record.as_bytes());
        self.transport.dma_write(&reply);
    }

    fn mark_good(&mut self) {
        self.error_count = 0;
        self.link_up = true;
    }

    fn record_error(&mut self) {
        // A protocol error must not mask a standing fatal status.
        if !self.status.is_fatal() {
            self.status.set(DeviceStatus::new(
                ErrorSource::Comms,
                ErrorCode::BadHeader,
                false,
            ));
        }
        self.error_count += 1;
        if self.error_count > DATA_ERR_MAX {
            warn!("comms error threshold exceeded, dropping link status");
            self.link_up = false;
            self.error_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pru_common::protocol::DATA_BUFF_SIZE;
    use pru_common::records::RxRecord;
    use pru_hal::transport::{ScriptTransport, ScriptTransportHandle};

    fn channel() -> (CommsChannel, ScriptTransportHandle, Arc<DataExchange>) {
        let (transport, handle) = ScriptTransport::new();
        let exchange = Arc::new(DataExchange::new());
        let status = Arc::new(StatusRegister::new());
        let mut channel = CommsChannel::new(Box::new(transport), Arc::clone(&exchange), status);
        channel.init();
        (channel, handle, exchange)
    }

    fn request(header: u32, set_points: &[(usize, f32)]) -> Vec<u8> {
        let mut record = RxRecord::zeroed();
        record.header = header;
        for &(index, value) in set_points {
            record.set_point[index] = value;
        }
        record.as_bytes().to_vec()
    }

    fn reply_header(frame: &[u8]) -> u32 {
        frame_header(frame).unwrap()
    }

    #[test]
    fn write_swaps_both_and_acknowledges() {
        let (mut channel, handle, exchange) = channel();

        handle.push_frame(&request(PRU_WRITE, &[(0, 33.0)]));
        channel.tasks();

        assert_eq!(exchange.rx_active_index(), 1);
        assert_eq!(exchange.tx_active_index(), 1);
        assert_eq!(exchange.set_point(0), 33.0);
        assert!(channel.status());

        let sent = handle.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), REPLY_LEN);
        assert_eq!(reply_header(&sent[0]), PRU_ACKNOWLEDGE);
    }

    #[test]
    fn read_swaps_tx_only_and_returns_feedback() {
        let (mut channel, handle, exchange) = channel();

        // Device logic fills the active transmit record.
        exchange.write_process_variable(1, 512.0);

        handle.push_frame(&request(PRU_READ, &[]));
        channel.tasks();

        assert_eq!(exchange.rx_active_index(), 0);
        assert_eq!(exchange.tx_active_index(), 1);

        let sent = handle.take_sent();
        assert_eq!(reply_header(&sent[0]), PRU_DATA);
        // Feedback written before the swap is in the reply.
        let mut record = TxRecord::zeroed();
        record.copy_from_bytes(&sent[0][..DATA_BUFF_SIZE]);
        assert_eq!(record.process_variable[1], 512.0);
    }

    #[test]
    fn read_leaves_receive_setpoints_intact() {
        let (mut channel, handle, exchange) = channel();

        handle.push_frame(&request(PRU_WRITE, &[(2, 9.5)]));
        channel.tasks();
        assert_eq!(exchange.set_point(2), 9.5);

        // A READ frame carries no meaningful setpoints; the active receive
        // record must keep the previously written ones.
        handle.push_frame(&request(PRU_READ, &[]));
        channel.tasks();
        assert_eq!(exchange.set_point(2), 9.5);
        assert_eq!(exchange.rx_active_index(), 1);
    }

    #[test]
    fn unknown_header_replies_error_without_swapping() {
        let (mut channel, handle, exchange) = channel();

        handle.push_frame(&request(0xDEAD_BEEF, &[]));
        channel.tasks();

        assert_eq!(exchange.rx_active_index(), 0);
        assert_eq!(exchange.tx_active_index(), 0);
        assert!(!channel.status());

        let sent = handle.take_sent();
        assert_eq!(reply_header(&sent[0]), PRU_ERR);
    }

    #[test]
    fn estop_drops_link_status() {
        let (mut channel, handle, _exchange) = channel();

        handle.push_frame(&request(PRU_WRITE, &[]));
        channel.tasks();
        assert!(channel.status());

        handle.push_frame(&request(PRU_ESTOP, &[]));
        channel.tasks();
        assert!(!channel.status());
        let sent = handle.take_sent();
        assert_eq!(reply_header(sent.last().unwrap()), PRU_ESTOP);
    }

    #[test]
    fn error_run_drops_link_after_threshold() {
        let (mut channel, handle, _exchange) = channel();

        handle.push_frame(&request(PRU_WRITE, &[]));
        channel.tasks();
        assert!(channel.status());

        for _ in 0..=DATA_ERR_MAX {
            handle.push_frame(&request(0x0BAD_0BAD, &[]));
            channel.tasks();
        }
        assert!(!channel.status());
    }

    #[test]
    fn reply_header_carries_status_byte() {
        let (transport, handle) = ScriptTransport::new();
        let exchange = Arc::new(DataExchange::new());
        let status = Arc::new(StatusRegister::new());
        status.set(DeviceStatus::new(
            ErrorSource::ModuleLoad,
            ErrorCode::UnknownModule,
            false,
        ));
        let mut channel =
            CommsChannel::new(Box::new(transport), Arc::clone(&exchange), Arc::clone(&status));
        channel.init();

        handle.push_frame(&request(PRU_READ, &[]));
        channel.tasks();

        let sent = handle.take_sent();
        let expected = PRU_DATA | u32::from(status.get().raw());
        assert_eq!(reply_header(&sent[0]), expected);
    }

    #[test]
    fn tasks_without_pending_frame_is_quiet() {
        let (mut channel, handle, _exchange) = channel();
        channel.tasks();
        assert!(handle.take_sent().is_empty());
    }
}
