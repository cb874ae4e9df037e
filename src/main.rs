//! Demo binary: encodes a couple of example records into Blueberry packets,
//! dumps the wire bytes, then decodes them back.

use blueberry_wire::{
    deserialize_message, deserialize_packet, empty_message, serialize_message, serialize_packet,
    BlueberryError, Field, Schema, Value, WireKind, WireRecord, BLUEBERRY_PORT,
};

use env_logger::{Builder, Env};
use itertools::Itertools;
use once_cell::sync::Lazy;
use serde::Serialize;

use std::convert::TryFrom;

#[derive(Debug, PartialEq, Serialize)]
struct SensorReading {
    sensor_id: u32,
    temperature: f32,
    humidity: u16,
    alert_high: bool,
    alert_low: bool,
}

static SENSOR_READING_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        Field::new("sensor_id", WireKind::U32),
        Field::new("temperature", WireKind::F32),
        Field::new("humidity", WireKind::U16),
        Field::new("alert_high", WireKind::Bool),
        Field::new("alert_low", WireKind::Bool),
    ])
});

impl WireRecord for SensorReading {
    fn schema() -> &'static Schema {
        &SENSOR_READING_SCHEMA
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::U32(self.sensor_id),
            Value::F32(self.temperature),
            Value::U16(self.humidity),
            Value::Bool(self.alert_high),
            Value::Bool(self.alert_low),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, BlueberryError> {
        let mut values = values.into_iter();
        let mut next = move || values.next().ok_or(BlueberryError::MissingFieldValue);
        Ok(Self {
            sensor_id: u32::try_from(next()?)?,
            temperature: f32::try_from(next()?)?,
            humidity: u16::try_from(next()?)?,
            alert_high: bool::try_from(next()?)?,
            alert_low: bool::try_from(next()?)?,
        })
    }
}

#[derive(Debug, PartialEq, Serialize)]
struct DeviceStatus {
    device_id: u32,
    name: String,
    readings: Vec<u32>,
    online: bool,
    calibrated: bool,
}

static DEVICE_STATUS_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        Field::new("device_id", WireKind::U32),
        Field::new("name", WireKind::Str),
        Field::new("readings", WireKind::Seq(Box::new(WireKind::U32))),
        Field::new("online", WireKind::Bool),
        Field::new("calibrated", WireKind::Bool),
    ])
});

impl WireRecord for DeviceStatus {
    fn schema() -> &'static Schema {
        &DEVICE_STATUS_SCHEMA
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::U32(self.device_id),
            Value::Str(self.name.clone()),
            Value::Seq(self.readings.iter().map(|&r| Value::U32(r)).collect()),
            Value::Bool(self.online),
            Value::Bool(self.calibrated),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, BlueberryError> {
        let mut values = values.into_iter();
        let mut next = move || values.next().ok_or(BlueberryError::MissingFieldValue);
        Ok(Self {
            device_id: u32::try_from(next()?)?,
            name: String::try_from(next()?)?,
            readings: next()?.into_scalars()?,
            online: bool::try_from(next()?)?,
            calibrated: bool::try_from(next()?)?,
        })
    }
}

fn init_logger() {
    let env = Env::default()
        .filter_or("BLUEBERRY_LOG_LEVEL", "info")
        .write_style_or("BLUEBERRY_LOG_STYLE", "auto");

    let mut builder = Builder::from_env(env);

    builder.format_timestamp(None).init();
}

fn hex_dump(label: &str, data: &[u8]) {
    println!("{} ({} bytes):", label, data.len());
    for (row, chunk) in data.chunks(16).enumerate() {
        println!(
            "  {:04x}: {}",
            row * 16,
            chunk
                .iter()
                .format_with(" ", |byte, f| f(&format_args!("{:02x}", byte)))
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    println!("Blueberry wire format demo (transport port {:#06x})", BLUEBERRY_PORT);

    // A fixed-layout record: scalars plus a packed bool run.
    let reading = SensorReading {
        sensor_id: 42,
        temperature: 23.5,
        humidity: 65,
        alert_high: true,
        alert_low: false,
    };
    let reading_msg = serialize_message(&reading, 0x01, 0x42)?;
    let reading_pkt = serialize_packet(&[&reading_msg]);
    hex_dump("SensorReading packet", &reading_pkt);

    // A record with data blocks: a string and a sequence.
    let status = DeviceStatus {
        device_id: 100,
        name: "sensor-alpha".to_string(),
        readings: vec![1023, 2047, 4095],
        online: true,
        calibrated: false,
    };
    let status_msg = serialize_message(&status, 0x01, 0x43)?;
    let status_pkt = serialize_packet(&[&status_msg]);
    hex_dump("DeviceStatus packet", &status_pkt);

    // Decode everything back from one multi-message packet.
    let combined = serialize_packet(&[&reading_msg, &status_msg]);
    let (header, messages) = deserialize_packet(&combined)?;
    println!(
        "Combined packet: {} words, crc {:#06x}, {} messages",
        header.length_words,
        header.crc,
        messages.len()
    );

    let (reading_header, decoded_reading) = deserialize_message::<SensorReading>(&messages[0])?;
    let (status_header, decoded_status) = deserialize_message::<DeviceStatus>(&messages[1])?;
    assert_eq!(decoded_reading, reading);
    assert_eq!(decoded_status, status);

    println!(
        "Message {:#04x}/{:#04x}: {}",
        reading_header.module_key,
        reading_header.message_key,
        serde_json::to_string(&decoded_reading)?
    );
    println!(
        "Message {:#04x}/{:#04x}: {}",
        status_header.module_key,
        status_header.message_key,
        serde_json::to_string(&decoded_status)?
    );

    // Header-only messages serve as acknowledgements.
    let ack = serialize_packet(&[empty_message(0x01, 0x42)]);
    hex_dump("Empty-message packet", &ack);

    Ok(())
}
