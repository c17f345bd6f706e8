//! Background monitor behavior observed through a serial device.

use crate::common::{
    cp2102_device, ft232r_device, recorder, serial_device, wait_until, ParamsBuilder,
};
use usb_serial_bridge::error::UsbTransferError;
use usb_serial_bridge::{ChipKind, PortEvent, SerialErrorKind, SerialPort};

#[test]
fn test_subscribers_see_chunks_in_order() {
    let (port, connection) = serial_device(cp2102_device(), ChipKind::Cp21xx);
    let (handler, events) = recorder();
    port.subscribe(handler);
    port.open(ParamsBuilder::new().build()).unwrap();

    connection.enqueue_bulk_in(0x81, b"first");
    connection.enqueue_bulk_in(0x81, b"second");
    assert!(wait_until(|| events.lock().len() == 2));

    assert_eq!(
        *events.lock(),
        vec![
            PortEvent::DataReceived {
                chunk: b"first".to_vec()
            },
            PortEvent::DataReceived {
                chunk: b"second".to_vec()
            },
        ]
    );
    // Buffered data is still readable after notification.
    assert_eq!(port.read_existing().unwrap(), "firstsecond");
    port.close().unwrap();
}

#[test]
fn test_ftdi_events_carry_payload_only() {
    let (port, connection) = serial_device(ft232r_device(), ChipKind::Ftdi);
    let (handler, events) = recorder();
    port.subscribe(handler);
    port.open(ParamsBuilder::new().build()).unwrap();

    connection.enqueue_bulk_in(0x81, &[0x01, 0x60]);
    connection.enqueue_bulk_in(0x81, &[0x01, 0x60, b'h', b'i']);
    assert!(wait_until(|| !events.lock().is_empty()));

    // The status-only packet carries no payload and raises nothing.
    assert_eq!(
        events.lock()[0],
        PortEvent::DataReceived {
            chunk: b"hi".to_vec()
        }
    );
    port.close().unwrap();
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let (port, connection) = serial_device(cp2102_device(), ChipKind::Cp21xx);
    let (kept, kept_events) = recorder();
    let (dropped, dropped_events) = recorder();
    port.subscribe(kept);
    let id = port.subscribe(dropped);
    port.open(ParamsBuilder::new().build()).unwrap();

    assert!(port.unsubscribe(id));
    assert!(!port.unsubscribe(id));
    assert_eq!(port.subscriber_count(), 1);

    connection.enqueue_bulk_in(0x81, b"x");
    assert!(wait_until(|| kept_events.lock().len() == 1));
    assert!(dropped_events.lock().is_empty());
    port.close().unwrap();
}

#[test]
fn test_read_error_is_reported_and_polling_continues() {
    let (port, connection) = serial_device(cp2102_device(), ChipKind::Cp21xx);
    let (handler, events) = recorder();
    port.subscribe(handler);
    port.open(ParamsBuilder::new().build()).unwrap();

    connection.enqueue_bulk_in_error(0x81, UsbTransferError::Stall);
    connection.enqueue_bulk_in(0x81, b"after");
    assert!(wait_until(|| events.lock().len() == 2));

    let events = events.lock().clone();
    assert!(matches!(
        &events[0],
        PortEvent::ErrorReceived { kind: SerialErrorKind::Io, message } if message.contains("stalled")
    ));
    assert_eq!(
        events[1],
        PortEvent::DataReceived {
            chunk: b"after".to_vec()
        }
    );
    assert!(port.is_monitoring());
    port.close().unwrap();
}

#[test]
fn test_monitor_restarts_with_port() {
    let (port, connection) = serial_device(cp2102_device(), ChipKind::Cp21xx);
    let (handler, events) = recorder();
    port.subscribe(handler);

    port.open(ParamsBuilder::new().build()).unwrap();
    assert!(port.is_monitoring());
    port.close().unwrap();
    assert!(!port.is_monitoring());

    port.open(ParamsBuilder::new().build()).unwrap();
    assert!(port.is_monitoring());
    connection.enqueue_bulk_in(0x81, b"again");
    assert!(wait_until(|| events.lock().len() == 1));
    assert_eq!(port.read_existing().unwrap(), "again");
    port.close().unwrap();
}

#[test]
fn test_no_events_after_close() {
    let (port, connection) = serial_device(cp2102_device(), ChipKind::Cp21xx);
    let (handler, events) = recorder();
    port.subscribe(handler);
    port.open(ParamsBuilder::new().build()).unwrap();
    port.close().unwrap();

    connection.enqueue_bulk_in(0x81, b"late");
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert!(events.lock().is_empty());
    assert_eq!(connection.pending_bulk_in(0x81), 1);
}
