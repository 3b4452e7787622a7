//! Host side of the device: applies host commands and runs periodic work.

use portable_atomic::Ordering;
use tas_proto::labels;
use tas_proto::{
    ControllerConfig, DeviceMessage, DeviceMode, EncodeError, HostCommand, LogDetail, LogLevel,
    ParseError, CONSOLE_N64, MAX_RAW_FRAME, PORT_COUNT,
};

use crate::device::{DeviceKind, DeviceState};
use crate::flow::StreamFlowController;
use crate::port::Port;

/// Largest encoded device message: a full raw frame plus its header.
pub const MAX_MESSAGE_LEN: usize = 4 + MAX_RAW_FRAME;

/// Error type for the host channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SinkError {
    /// Outgoing buffer has no room for the message.
    Full,
    /// Host not connected.
    Disconnected,
}

/// Error type for session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    Sink(SinkError),
    Encode(EncodeError),
}

impl From<SinkError> for SessionError {
    fn from(err: SinkError) -> Self {
        Self::Sink(err)
    }
}

impl From<EncodeError> for SessionError {
    fn from(err: EncodeError) -> Self {
        Self::Encode(err)
    }
}

/// Destination for encoded device → host messages.
pub trait MessageSink {
    /// Queue one complete encoded message.
    fn write_message(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Encode and queue `msg`.
    fn send(&mut self, msg: &DeviceMessage<'_>) -> Result<(), SessionError> {
        let mut buf = [0u8; MAX_MESSAGE_LEN];
        let len = msg.encode(&mut buf)?;
        self.write_message(&buf[..len])?;
        Ok(())
    }
}

/// Sticky flags already reported to the host in this device session.
#[derive(Debug, Default, Clone, Copy)]
struct Reported {
    playback_overflow: bool,
    playback_underflow: bool,
    capture_overflow: bool,
    capture_underflow: bool,
}

/// Host command adapter.
pub struct Session<'a> {
    state: &'a DeviceState,
    flow: StreamFlowController,
    reported: Reported,
}

impl<'a> Session<'a> {
    pub fn new(state: &'a DeviceState) -> Self {
        Self {
            state,
            flow: StreamFlowController::new(),
            reported: Reported::default(),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.state.kind()
    }

    pub fn flow(&self) -> &StreamFlowController {
        &self.flow
    }

    /// Apply one host command.
    pub fn handle<S: MessageSink>(
        &mut self,
        cmd: &HostCommand,
        sink: &mut S,
    ) -> Result<(), SessionError> {
        match cmd {
            HostCommand::Nop => Ok(()),
            HostCommand::SetDevice { console, mode } => self.set_device(*console, *mode, sink),
            HostCommand::DatastreamData(data) => match self.kind() {
                DeviceKind::Datastream => {
                    self.flow.fill(&self.state.playback, data);
                    Ok(())
                }
                kind => unavailable(kind, "DATASTREAM_DATA", sink),
            },
            HostCommand::ControllerConfig(configs) => match self.kind() {
                DeviceKind::Datastream => self.configure(configs, sink),
                kind => unavailable(kind, "CONTROLLER_CONFIG", sink),
            },
            HostCommand::Describe => sink.send(&DeviceMessage::Log {
                level: LogLevel::Info,
                label: labels::INFO_DESCRIBE,
                detail: LogDetail::Text(describe(self.kind())),
            }),
            HostCommand::Version => sink.send(&DeviceMessage::Log {
                level: LogLevel::Info,
                label: labels::INFO_VERSION,
                detail: LogDetail::Text(env!("CARGO_PKG_VERSION")),
            }),
        }
    }

    /// Report a byte the host parser rejected.
    pub fn report_parse_error<S: MessageSink>(
        &mut self,
        err: ParseError,
        sink: &mut S,
    ) -> Result<(), SessionError> {
        let ParseError::UnknownCommand(byte) = err;
        sink.send(&DeviceMessage::Log {
            level: LogLevel::Warn,
            label: labels::WARN_UNKNOWN_HOST_CMD,
            detail: LogDetail::Hex(&[byte]),
        })
    }

    /// Periodic work of the active device. Call between host reads.
    pub fn update<S: MessageSink>(&mut self, sink: &mut S) -> Result<(), SessionError> {
        match self.kind() {
            DeviceKind::Dummy => Ok(()),
            DeviceKind::Datastream => self.update_datastream(sink),
            DeviceKind::Recorder => self.update_recorder(sink),
        }
    }

    fn set_device<S: MessageSink>(
        &mut self,
        console: [u8; 3],
        mode: DeviceMode,
        sink: &mut S,
    ) -> Result<(), SessionError> {
        if console != CONSOLE_N64 {
            self.select(DeviceKind::Dummy);
            return sink.send(&DeviceMessage::Log {
                level: LogLevel::Error,
                label: labels::ERROR_UNKNOWN_DEVICE,
                detail: LogDetail::Hex(&console),
            });
        }

        let kind = match mode {
            DeviceMode::Datastream => DeviceKind::Datastream,
            DeviceMode::Record => DeviceKind::Recorder,
            DeviceMode::Playback | DeviceMode::Realtime | DeviceMode::Unknown(_) => {
                self.select(DeviceKind::Dummy);
                return sink.send(&DeviceMessage::Log {
                    level: LogLevel::Error,
                    label: labels::ERROR_UNKNOWN_MODE,
                    detail: LogDetail::Hex(&[mode.to_byte()]),
                });
            }
        };

        self.select(kind);
        sink.send(&DeviceMessage::Log {
            level: LogLevel::Info,
            label: labels::INFO_DEVICE_INIT,
            detail: LogDetail::Text(describe(kind)),
        })
    }

    fn select(&mut self, kind: DeviceKind) {
        self.state.select(kind);
        self.flow.reset();
        self.reported = Reported::default();
    }

    fn configure<S: MessageSink>(
        &mut self,
        configs: &[ControllerConfig; PORT_COUNT],
        sink: &mut S,
    ) -> Result<(), SessionError> {
        self.state.controllers.replace_all(configs);

        for (port, config) in Port::ALL.into_iter().zip(configs) {
            let [h0, h1, h2] = config.header;
            let info = [port.number() + 1, u8::from(config.connected), h0, h1, h2];
            sink.send(&DeviceMessage::Log {
                level: LogLevel::Debug,
                label: labels::DEBUG_PORT_INFO,
                detail: LogDetail::Hex(&info),
            })?;
        }
        Ok(())
    }

    fn update_datastream<S: MessageSink>(&mut self, sink: &mut S) -> Result<(), SessionError> {
        let playback = &self.state.playback;

        if let Some(free) = self.flow.poll(playback) {
            if let Err(err) = sink.send(&DeviceMessage::DatastreamRequest(free)) {
                // Not sent, ask again next time.
                self.flow.reset();
                return Err(err);
            }
        }

        if playback.underflowed() && !self.reported.playback_underflow {
            self.reported.playback_underflow = true;
            sink.send(&DeviceMessage::log(
                LogLevel::Error,
                labels::ERROR_DATASTREAM_UNDERFLOW,
            ))?;
        }
        if playback.overflowed() && !self.reported.playback_overflow {
            self.reported.playback_overflow = true;
            sink.send(&DeviceMessage::log(
                LogLevel::Error,
                labels::ERROR_DATASTREAM_OVERFLOW,
            ))?;
        }
        Ok(())
    }

    fn update_recorder<S: MessageSink>(&mut self, sink: &mut S) -> Result<(), SessionError> {
        let capture = &self.state.capture;

        // Records are published whole, so a visible header means the whole
        // record is readable.
        while capture.gets_available() >= 3 {
            let port = capture.get();
            let size = capture.get();
            let request_len = capture.get();

            let mut frame = [0u8; MAX_RAW_FRAME];
            let frame = &mut frame[..size as usize];
            for byte in frame.iter_mut() {
                *byte = capture.get();
            }

            sink.send(&DeviceMessage::RawData {
                port,
                request_len,
                frame,
            })?;
        }

        if capture.overflowed() && !self.reported.capture_overflow {
            self.reported.capture_overflow = true;
            sink.send(&DeviceMessage::log(
                LogLevel::Error,
                labels::ERROR_BUFFER_OVERFLOW,
            ))?;
        }
        if capture.underflowed() && !self.reported.capture_underflow {
            self.reported.capture_underflow = true;
            sink.send(&DeviceMessage::log(
                LogLevel::Error,
                labels::ERROR_BUFFER_UNDERFLOW,
            ))?;
        }

        let invalid = self.state.last_invalid.swap(0, Ordering::Relaxed);
        if invalid != 0 {
            sink.send(&DeviceMessage::Log {
                level: LogLevel::Warn,
                label: labels::WARN_UNKNOWN_CONSOLE_CMD,
                detail: LogDetail::Hex(&[invalid]),
            })?;
        }
        Ok(())
    }
}

fn describe(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::Dummy => "NONE",
        DeviceKind::Datastream => "N64 DATASTREAM",
        DeviceKind::Recorder => "N64 RECORD",
    }
}

/// Warn about a host command the active device cannot serve.
fn unavailable<S: MessageSink>(
    kind: DeviceKind,
    operation: &str,
    sink: &mut S,
) -> Result<(), SessionError> {
    let label = match kind {
        DeviceKind::Dummy => labels::WARN_NO_DEVICE,
        DeviceKind::Datastream | DeviceKind::Recorder => labels::WARN_OP_NOT_IMPLEMENTED,
    };
    sink.send(&DeviceMessage::Log {
        level: LogLevel::Warn,
        label,
        detail: LogDetail::Text(operation),
    })
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::bus::BitBus;
    use crate::mock::{frame_bits, MockLine, StepClock};
    use crate::router::PortRouter;
    use crate::device::{BusDevice, CAPTURE_CAPACITY};
    use std::vec;
    use std::vec::Vec;
    use tas_proto::{DataBytes, HostParser};

    const P0: Port = Port::ALL[0];

    #[derive(Default)]
    struct MockSink {
        sent: Vec<Vec<u8>>,
        refuse: bool,
    }

    impl MessageSink for MockSink {
        fn write_message(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
            if self.refuse {
                return Err(SinkError::Full);
            }
            self.sent.push(bytes.to_vec());
            Ok(())
        }
    }

    impl MockSink {
        fn take(&mut self) -> Vec<Vec<u8>> {
            core::mem::take(&mut self.sent)
        }
    }

    fn parse(bytes: &[u8]) -> HostCommand {
        let mut parser = HostParser::new();
        let mut out = None;
        for &b in bytes {
            out = parser.push_byte(b).unwrap();
        }
        out.unwrap()
    }

    fn datastream_session<'a>(state: &'a DeviceState, sink: &mut MockSink) -> Session<'a> {
        let mut session = Session::new(state);
        session.handle(&parse(b"\x80N64\x03"), sink).unwrap();
        sink.take();
        session
    }

    #[test]
    fn test_set_device_datastream() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = Session::new(&state);

        session.handle(&parse(b"\x80N64\x03"), &mut sink).unwrap();

        assert_eq!(session.kind(), DeviceKind::Datastream);
        assert_eq!(sink.take(), [b"\xFDDEVICE_INIT N64 DATASTREAM\n".to_vec()]);
    }

    #[test]
    fn test_set_device_record() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = Session::new(&state);

        session.handle(&parse(b"\x80N64\x01"), &mut sink).unwrap();
        assert_eq!(session.kind(), DeviceKind::Recorder);
    }

    #[test]
    fn test_unknown_console_falls_back_to_dummy() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = datastream_session(&state, &mut sink);

        session.handle(&parse(b"\x80GCN\x03"), &mut sink).unwrap();

        assert_eq!(session.kind(), DeviceKind::Dummy);
        assert_eq!(sink.take(), [b"\xFFUNKNOWN_DEVICE 47434E\n".to_vec()]);
    }

    #[test]
    fn test_unsupported_modes_fall_back_to_dummy() {
        for mode in [0u8, 2, 7] {
            let state = DeviceState::new();
            let mut sink = MockSink::default();
            let mut session = datastream_session(&state, &mut sink);

            session
                .handle(&parse(&[0x80, b'N', b'6', b'4', mode]), &mut sink)
                .unwrap();

            assert_eq!(session.kind(), DeviceKind::Dummy);
            let sent = sink.take();
            assert_eq!(sent.len(), 1);
            assert!(sent[0].starts_with(b"\xFFUNKNOWN_MODE"));
        }
    }

    #[test]
    fn test_flow_request_and_fill() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = datastream_session(&state, &mut sink);

        session.update(&mut sink).unwrap();
        assert_eq!(sink.take(), [vec![0xD0, 128]]);

        // Outstanding request: nothing new until the host answers.
        session.update(&mut sink).unwrap();
        assert!(sink.take().is_empty());

        let mut data = DataBytes::new();
        data.extend_from_slice(&[0x11; 8]).unwrap();
        session
            .handle(&HostCommand::DatastreamData(data), &mut sink)
            .unwrap();
        assert_eq!(state.playback.gets_available(), 8);

        session.update(&mut sink).unwrap();
        assert_eq!(sink.take(), [vec![0xD0, 120]]);
    }

    #[test]
    fn test_failed_request_is_retried() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = datastream_session(&state, &mut sink);

        sink.refuse = true;
        assert_eq!(
            session.update(&mut sink),
            Err(SessionError::Sink(SinkError::Full))
        );
        assert!(!session.flow().is_pending());

        sink.refuse = false;
        session.update(&mut sink).unwrap();
        assert_eq!(sink.take(), [vec![0xD0, 128]]);
    }

    #[test]
    fn test_controller_config_reports_ports() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = datastream_session(&state, &mut sink);

        let cmd = parse(&[
            0xD1, 1, 5, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ]);
        session.handle(&cmd, &mut sink).unwrap();

        assert_eq!(state.controllers.get(P0), ControllerConfig::standard());
        assert!(!state.controllers.get(Port::ALL[1]).connected);
        let sent = sink.take();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0], b"\xFCPORT_INFO 0101050002\n".to_vec());
        assert_eq!(sent[3], b"\xFCPORT_INFO 0400000000\n".to_vec());
    }

    #[test]
    fn test_data_without_device_warns() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = Session::new(&state);

        session.handle(&parse(&[0xD0, 1, 0x42]), &mut sink).unwrap();

        assert_eq!(state.playback.gets_available(), 0);
        assert_eq!(sink.take(), [b"\xFENO_DEVICE DATASTREAM_DATA\n".to_vec()]);
    }

    #[test]
    fn test_config_on_recorder_not_implemented() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = Session::new(&state);
        session.handle(&parse(b"\x80N64\x01"), &mut sink).unwrap();
        sink.take();

        session
            .handle(&parse(&[0xD1, 1, 5, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]), &mut sink)
            .unwrap();
        assert_eq!(
            sink.take(),
            [b"\xFEOP_NOT_IMPLEMENTED CONTROLLER_CONFIG\n".to_vec()]
        );
    }

    #[test]
    fn test_describe_and_version() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = Session::new(&state);

        session.handle(&HostCommand::Describe, &mut sink).unwrap();
        session.handle(&HostCommand::Version, &mut sink).unwrap();

        let sent = sink.take();
        assert_eq!(sent[0], b"\xFDDESCRIBE NONE\n".to_vec());
        assert!(sent[1].starts_with(b"\xFDVERSION "));
        assert!(sent[1].ends_with(b"\n"));
    }

    #[test]
    fn test_parse_error_reported() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = Session::new(&state);

        session
            .report_parse_error(ParseError::UnknownCommand(0x42), &mut sink)
            .unwrap();
        assert_eq!(sink.take(), [b"\xFEUNKNOWN_HOST_CMD 42\n".to_vec()]);
    }

    #[test]
    fn test_underflow_reported_once() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = datastream_session(&state, &mut sink);
        session.update(&mut sink).unwrap();
        sink.take();

        let _ = state.playback.get();
        session.update(&mut sink).unwrap();
        session.update(&mut sink).unwrap();

        assert_eq!(sink.take(), [b"\xFFDATASTREAM_UNDERFLOW\n".to_vec()]);
        assert!(state.playback.underflowed());
    }

    #[test]
    fn test_overflow_reported_once() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = datastream_session(&state, &mut sink);
        session.update(&mut sink).unwrap();
        sink.take();

        let mut data = DataBytes::new();
        data.extend_from_slice(&[0; 129]).unwrap();
        session
            .handle(&HostCommand::DatastreamData(data), &mut sink)
            .unwrap();
        session.update(&mut sink).unwrap();
        session.update(&mut sink).unwrap();

        assert_eq!(sink.take(), [b"\xFFDATASTREAM_OVERFLOW\n".to_vec()]);
    }

    #[test]
    fn test_switching_device_rearms_reports() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = datastream_session(&state, &mut sink);
        session.update(&mut sink).unwrap();
        let _ = state.playback.get();
        session.update(&mut sink).unwrap();
        sink.take();

        session.handle(&parse(b"\x80N64\x03"), &mut sink).unwrap();
        sink.take();
        session.update(&mut sink).unwrap();
        let _ = state.playback.get();
        session.update(&mut sink).unwrap();

        let sent = sink.take();
        assert_eq!(sent[0], vec![0xD0, 128]);
        assert_eq!(sent[1], b"\xFFDATASTREAM_UNDERFLOW\n".to_vec());
    }

    #[test]
    fn test_recorder_drains_frames_and_warns() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = Session::new(&state);
        session.handle(&parse(b"\x80N64\x01"), &mut sink).unwrap();
        sink.take();

        let mut router = PortRouter::new(
            BitBus::new(MockLine::new(), StepClock::new()),
            BusDevice::new(&state),
        );
        let line = router.bus_mut().line_mut();
        line.feed_bits(P0, &frame_bits(&[0x01], &[0x00, 0x80, 0x05, 0xFB]));
        line.raise(P0);
        router.on_interrupt();

        let line = router.bus_mut().line_mut();
        line.feed_bits(P0, &frame_bits(&[0x03, 0x80, 0x01], &[]));
        line.raise(P0);
        router.on_interrupt();

        session.update(&mut sink).unwrap();
        assert_eq!(
            sink.take(),
            [
                vec![0xB0, 0, 5, 1, 0x01, 0x00, 0x80, 0x05, 0xFB],
                b"\xFEUNKNOWN_CONSOLE_CMD 03\n".to_vec(),
            ]
        );

        // Warning is cleared once reported.
        session.update(&mut sink).unwrap();
        assert!(sink.take().is_empty());
    }

    fn recorder_session<'a>(state: &'a DeviceState, sink: &mut MockSink) -> Session<'a> {
        let mut session = Session::new(state);
        session.handle(&parse(b"\x80N64\x01"), sink).unwrap();
        sink.take();
        session
    }

    fn count(sent: &[Vec<u8>], frame: &[u8]) -> usize {
        sent.iter().filter(|msg| msg.as_slice() == frame).count()
    }

    #[test]
    fn test_capture_overflow_reported_once() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = recorder_session(&state, &mut sink);

        state.capture.add_slice(&[0; CAPTURE_CAPACITY + 1]);
        assert!(state.capture.overflowed());

        session.update(&mut sink).unwrap();
        session.update(&mut sink).unwrap();

        let sent = sink.take();
        assert_eq!(count(&sent, b"\xFFBUFFER_OVERFLOW\n"), 1);
        assert_eq!(count(&sent, b"\xFFBUFFER_UNDERFLOW\n"), 0);
    }

    #[test]
    fn test_capture_underflow_reported_once() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = recorder_session(&state, &mut sink);

        let _ = state.capture.get();
        assert!(state.capture.underflowed());

        session.update(&mut sink).unwrap();
        session.update(&mut sink).unwrap();

        assert_eq!(sink.take(), [b"\xFFBUFFER_UNDERFLOW\n".to_vec()]);
    }

    #[test]
    fn test_dummy_update_is_silent() {
        let state = DeviceState::new();
        let mut sink = MockSink::default();
        let mut session = Session::new(&state);
        session.update(&mut sink).unwrap();
        assert!(sink.take().is_empty());
    }
}
