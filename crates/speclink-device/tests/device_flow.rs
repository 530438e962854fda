//! End-to-end flows through the framed protocol: identity query, config
//! save/get, session busy/retry, error reporting, and the transport
//! worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use speclink_common::{FixedIdentity, Module, ModelName, SerialTag, TransportId, PROTOCOL_VERSION};
use speclink_device::{
    spawn_transport_worker, ActivityTracker, DeviceRegistry, DeviceStore, TransportChannels,
};
use speclink_protocol::{
    encode_frame, validate_frame, ActivityMonitor, CommandPort, SessionArbiter, TransportIo,
    BODY_OFFSET, CMD_CONFIG_COUNT, CMD_CONFIG_RECORD, CMD_DEVICE_QUERY, CMD_DEVICE_STATUS,
    CMD_ERASE_ALL, CMD_ERROR_STATUS, DIR_POLL, DIR_REQUEST, FLAGS_OFFSET, FLAG_RESPONSE_MASK,
    FLAG_RESPONSE_SHIFT, RC_BUSY, RC_ERR, RC_OK,
};
use speclink_status::StatusCenter;
use speclink_store::{
    decode_record, encode_record, ConfigRecord, ConfigStore, FixedScanBody, MemMedium, NvmMedium,
    ScanSection, VariableScan, STORE_SIZE,
};

// ============================================================================
// Harness
// ============================================================================

struct Device {
    port: Arc<CommandPort<DeviceRegistry>>,
    store: Arc<Mutex<DeviceStore>>,
    status: Arc<StatusCenter>,
    session: Arc<SessionArbiter>,
}

fn build_device() -> Device {
    let medium: Box<dyn NvmMedium> = Box::new(MemMedium::new(STORE_SIZE));
    let identity = Box::new(FixedIdentity::new("SL-7001", "SPECLINK-ONE"));
    let mut store = ConfigStore::new(medium, identity);
    store
        .initialize(&ConfigRecord::fixed(FixedScanBody::default()))
        .unwrap();
    store
        .set_serial_number(&SerialTag::from_str_lossy("SL-7001"))
        .unwrap();
    store
        .set_model_name(&ModelName::from_str_lossy("SPECLINK-ONE"))
        .unwrap();

    let store = Arc::new(Mutex::new(store));
    let status = Arc::new(StatusCenter::new());
    let session = Arc::new(SessionArbiter::new());
    let tracker: Arc<dyn ActivityMonitor> = Arc::new(ActivityTracker::new());
    let registry = DeviceRegistry::new(Arc::clone(&store), Arc::clone(&status));
    let port = Arc::new(CommandPort::new(
        Arc::clone(&session),
        Arc::clone(&status),
        tracker,
        registry,
    ));

    Device {
        port,
        store,
        status,
        session,
    }
}

/// Captures response frames; each `write` call is one frame.
#[derive(Default)]
struct VecIo {
    frames: Vec<Vec<u8>>,
}

impl TransportIo for VecIo {
    fn write(&mut self, bytes: &[u8]) -> usize {
        self.frames.push(bytes.to_vec());
        bytes.len()
    }

    fn flush(&mut self) {}
}

fn response_code(frame: &[u8]) -> u8 {
    (frame[FLAGS_OFFSET] & FLAG_RESPONSE_MASK) >> FLAG_RESPONSE_SHIFT
}

/// Send one frame and return the single response frame.
fn exchange(device: &Device, transport: TransportId, direction: u8, body: &[u8]) -> Vec<u8> {
    let mut io = VecIo::default();
    device
        .port
        .on_frame_received(transport, &encode_frame(direction, body), &mut io);
    assert_eq!(io.frames.len(), 1, "expected exactly one response frame");
    io.frames.remove(0)
}

fn sample_variable() -> ConfigRecord {
    ConfigRecord::variable(VariableScan {
        dwell_ms: 40,
        gain: 2,
        sections: vec![
            ScanSection {
                start_nm: 950.0,
                end_nm: 1150.0,
                resolution_nm: 5.0,
                exposure_ms: 10,
                averages: 4,
                pattern: 1,
                reserved: 0,
            },
            ScanSection {
                start_nm: 1150.0,
                end_nm: 1350.0,
                resolution_nm: 2.5,
                exposure_ms: 20,
                averages: 8,
                pattern: 2,
                reserved: 0,
            },
        ],
    })
    .expect("section count in range")
}

// ============================================================================
// Flows
// ============================================================================

#[test]
fn device_query_reports_identity() {
    let device = build_device();
    let response = exchange(
        &device,
        TransportId::Serial,
        DIR_POLL,
        &[CMD_DEVICE_QUERY, 1],
    );

    assert_eq!(response_code(&response), RC_OK);
    let view = validate_frame(&response).unwrap();
    assert_eq!(view.body[0], CMD_DEVICE_QUERY);
    assert_eq!(view.body[1], PROTOCOL_VERSION);
    let serial = SerialTag::from_slice(&view.body[2..18]).unwrap();
    assert_eq!(serial.to_string_lossy(), "SL-7001");
    let model = ModelName::from_slice(&view.body[18..34]).unwrap();
    assert_eq!(model.to_string_lossy(), "SPECLINK-ONE");
}

#[test]
fn save_and_get_config_via_frames() {
    let device = build_device();
    let record = sample_variable();
    let bytes = encode_record(&record);

    // Save into slot 1.
    let mut body = vec![CMD_CONFIG_RECORD, 1];
    body.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    body.extend_from_slice(&bytes);
    let response = exchange(&device, TransportId::Serial, DIR_REQUEST, &body);
    assert_eq!(response_code(&response), RC_OK);
    let view = validate_frame(&response).unwrap();
    let assigned = u32::from_le_bytes(view.body[1..5].try_into().unwrap());
    assert_eq!(assigned, 1, "factory record took index 0");

    // Read it back.
    let response = exchange(
        &device,
        TransportId::Serial,
        DIR_POLL,
        &[CMD_CONFIG_RECORD, 1],
    );
    assert_eq!(response_code(&response), RC_OK);
    let view = validate_frame(&response).unwrap();
    let len = u16::from_le_bytes(view.body[1..3].try_into().unwrap()) as usize;
    let read = decode_record(&view.body[3..3 + len]).unwrap();
    assert_eq!(read.body, record.body);
    assert_eq!(read.header.config_index, assigned);
}

#[test]
fn busy_until_owner_releases() {
    let device = build_device();

    // Serial engages the session with its first command.
    let response = exchange(
        &device,
        TransportId::Serial,
        DIR_POLL,
        &[CMD_DEVICE_STATUS],
    );
    assert_eq!(response_code(&response), RC_OK);
    assert_eq!(device.session.current_owner(), TransportId::Serial);

    // USB is rejected while serial holds the session.
    let response = exchange(&device, TransportId::Usb, DIR_POLL, &[CMD_DEVICE_STATUS]);
    assert_eq!(response_code(&response), RC_BUSY);

    // After release the retry succeeds.
    device.session.release(TransportId::Serial);
    let response = exchange(&device, TransportId::Usb, DIR_POLL, &[CMD_DEVICE_STATUS]);
    assert_eq!(response_code(&response), RC_OK);
    assert_eq!(device.session.current_owner(), TransportId::Usb);
}

#[test]
fn corrupt_frame_is_rejected_before_any_handler() {
    let device = build_device();
    let mut frame = encode_frame(DIR_REQUEST, &[CMD_ERASE_ALL]);
    frame[BODY_OFFSET] ^= 0x20;

    let mut io = VecIo::default();
    device
        .port
        .on_frame_received(TransportId::Serial, &frame, &mut io);

    assert_eq!(response_code(&io.frames[0]), RC_ERR);
    // No erase happened; the catalog still holds the factory record plus
    // nothing else, and the protocol error landed on the serial link.
    assert_eq!(device.store.lock().record_count().unwrap(), 1);
    assert!(device.status.has_error(Module::SerialLink.mask()));
}

#[test]
fn erase_all_truncates_catalog() {
    let device = build_device();
    let record = sample_variable();
    let bytes = encode_record(&record);
    let mut body = vec![CMD_CONFIG_RECORD, 1];
    body.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    body.extend_from_slice(&bytes);
    exchange(&device, TransportId::Serial, DIR_REQUEST, &body);

    let response = exchange(&device, TransportId::Serial, DIR_REQUEST, &[CMD_ERASE_ALL]);
    assert_eq!(response_code(&response), RC_OK);

    let response = exchange(
        &device,
        TransportId::Serial,
        DIR_POLL,
        &[CMD_CONFIG_COUNT],
    );
    let view = validate_frame(&response).unwrap();
    assert_eq!(view.body[1], 1, "only the factory record survives");
}

#[test]
fn error_status_poll_and_clear() {
    let device = build_device();
    device
        .status
        .set_error_with_code(Module::Battery.mask(), true, 12)
        .unwrap();

    let response = exchange(
        &device,
        TransportId::Wireless,
        DIR_POLL,
        &[CMD_ERROR_STATUS],
    );
    let view = validate_frame(&response).unwrap();
    let mask = u32::from_le_bytes(view.body[1..5].try_into().unwrap());
    assert_eq!(mask, Module::Battery.mask());
    let code_offset = 5 + Module::Battery.ordinal() * 2;
    let code = i16::from_le_bytes(
        view.body[code_offset..code_offset + 2].try_into().unwrap(),
    );
    assert_eq!(code, 12);

    // Clear through the write path.
    let mut body = vec![CMD_ERROR_STATUS];
    body.extend_from_slice(&Module::Battery.mask().to_le_bytes());
    let response = exchange(&device, TransportId::Wireless, DIR_REQUEST, &body);
    assert_eq!(response_code(&response), RC_OK);
    assert!(!device.status.has_error(Module::Battery.mask()));
}

// ============================================================================
// Transport Worker
// ============================================================================

#[test]
fn worker_round_trips_chunked_frames() {
    let device = build_device();
    let shutdown = Arc::new(AtomicBool::new(false));
    let (worker_half, harness_half) = TransportChannels::new_pair();

    let worker = spawn_transport_worker(
        TransportId::Usb,
        Arc::clone(&device.port),
        worker_half,
        Arc::clone(&shutdown),
    );

    // Deliver one frame in two chunks, as a byte stream would.
    let frame = encode_frame(DIR_POLL, &[CMD_DEVICE_QUERY, 1]);
    let split = frame.len() / 2;
    harness_half.send(frame[..split].to_vec()).unwrap();
    harness_half.send(frame[split..].to_vec()).unwrap();

    let response = harness_half
        .recv_timeout(Duration::from_secs(5))
        .expect("worker should respond");
    assert_eq!(response_code(&response), RC_OK);
    let view = validate_frame(&response).unwrap();
    assert_eq!(view.body[0], CMD_DEVICE_QUERY);

    shutdown.store(true, Ordering::Relaxed);
    worker.join().unwrap();
}
