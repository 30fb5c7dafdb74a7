//! Compact sensor telemetry (Cayenne LPP style).
//!
//! A telemetry buffer is a sequence of `[channel][type][payload]` triplets.
//! Payload width and fixed-point scale depend on the type:
//!
//! | Type                  | Code | Bytes | Encoding                         |
//! |-----------------------|------|-------|----------------------------------|
//! | digital input/output  | 0/1  | 1     | raw                              |
//! | analog input/output   | 2/3  | 2     | i16 × 100                        |
//! | generic sensor        | 100  | 4     | u32 × 100                        |
//! | illuminance           | 101  | 2     | u16                              |
//! | presence              | 102  | 1     | raw                              |
//! | temperature           | 103  | 2     | i16 × 10                         |
//! | humidity              | 104  | 2     | u16 × 2                          |
//! | accelerometer         | 113  | 6     | 3 × i16 × 1000                   |
//! | barometer             | 115  | 2     | u16 × 10                         |
//! | voltage               | 116  | 2     | u16 × 100                        |
//! | current               | 117  | 2     | u16 × 1000                       |
//! | percentage            | 120  | 1     | raw                              |
//! | altitude              | 121  | 2     | i16 × 100                        |
//! | gyrometer             | 134  | 6     | 3 × i16 × 1000                   |
//! | colour                | 135  | 3     | R, G, B                          |
//! | GPS                   | 136  | 9     | 3 × i24: lat/lon × 1e4, alt × 100 |
//! | switch                | 142  | 1     | raw                              |
//!
//! Decoding skips only the two header bytes of a type it does not know,
//! because the payload width of an unknown type cannot be known. Such a
//! buffer may desynchronise for the rest of the scan. A zero byte where a
//! channel is expected ends the scan.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;

/// Sensor type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorType {
    DigitalInput,
    DigitalOutput,
    AnalogInput,
    AnalogOutput,
    GenericSensor,
    Illuminance,
    Presence,
    Temperature,
    Humidity,
    Accelerometer,
    Barometer,
    Voltage,
    Current,
    Percentage,
    Altitude,
    Gyrometer,
    Colour,
    Gps,
    Switch,
}

impl SensorType {
    /// Look up a type tag.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => SensorType::DigitalInput,
            1 => SensorType::DigitalOutput,
            2 => SensorType::AnalogInput,
            3 => SensorType::AnalogOutput,
            100 => SensorType::GenericSensor,
            101 => SensorType::Illuminance,
            102 => SensorType::Presence,
            103 => SensorType::Temperature,
            104 => SensorType::Humidity,
            113 => SensorType::Accelerometer,
            115 => SensorType::Barometer,
            116 => SensorType::Voltage,
            117 => SensorType::Current,
            120 => SensorType::Percentage,
            121 => SensorType::Altitude,
            134 => SensorType::Gyrometer,
            135 => SensorType::Colour,
            136 => SensorType::Gps,
            142 => SensorType::Switch,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            SensorType::DigitalInput => 0,
            SensorType::DigitalOutput => 1,
            SensorType::AnalogInput => 2,
            SensorType::AnalogOutput => 3,
            SensorType::GenericSensor => 100,
            SensorType::Illuminance => 101,
            SensorType::Presence => 102,
            SensorType::Temperature => 103,
            SensorType::Humidity => 104,
            SensorType::Accelerometer => 113,
            SensorType::Barometer => 115,
            SensorType::Voltage => 116,
            SensorType::Current => 117,
            SensorType::Percentage => 120,
            SensorType::Altitude => 121,
            SensorType::Gyrometer => 134,
            SensorType::Colour => 135,
            SensorType::Gps => 136,
            SensorType::Switch => 142,
        }
    }

    /// Payload width in bytes, excluding the channel and type bytes.
    pub fn payload_len(self) -> usize {
        match self {
            SensorType::DigitalInput
            | SensorType::DigitalOutput
            | SensorType::Presence
            | SensorType::Percentage
            | SensorType::Switch => 1,
            SensorType::AnalogInput
            | SensorType::AnalogOutput
            | SensorType::Illuminance
            | SensorType::Temperature
            | SensorType::Humidity
            | SensorType::Barometer
            | SensorType::Voltage
            | SensorType::Current
            | SensorType::Altitude => 2,
            SensorType::Colour => 3,
            SensorType::GenericSensor => 4,
            SensorType::Accelerometer | SensorType::Gyrometer => 6,
            SensorType::Gps => 9,
        }
    }

    /// Divisor applied to the raw integer of a scalar type.
    fn scale(self) -> f64 {
        match self {
            SensorType::AnalogInput
            | SensorType::AnalogOutput
            | SensorType::GenericSensor
            | SensorType::Voltage
            | SensorType::Altitude => 100.0,
            SensorType::Temperature | SensorType::Barometer => 10.0,
            SensorType::Humidity => 2.0,
            SensorType::Current => 1000.0,
            _ => 1.0,
        }
    }
}

/// A decoded sensor value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryValue {
    Float(f64),
    Integer(u32),
    Vector { x: f64, y: f64, z: f64 },
    Rgb { r: u8, g: u8, b: u8 },
    Gps { lat: f64, lon: f64, alt: f64 },
    Bool(bool),
}

impl TelemetryValue {
    /// Scalar reading, if this value has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TelemetryValue::Float(v) => Some(*v),
            TelemetryValue::Integer(v) => Some(*v as f64),
            TelemetryValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// One `(channel, type, value)` triplet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryPoint {
    pub channel: u8,
    pub sensor: SensorType,
    pub value: TelemetryValue,
}

/// Accumulates telemetry triplets into one buffer.
#[derive(Debug, Clone, Default)]
pub struct TelemetryEncoder {
    buf: BytesMut,
}

impl TelemetryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point, checking that the value shape fits the sensor type.
    pub fn add(&mut self, point: &TelemetryPoint) -> Result<&mut Self, ProtocolError> {
        let sensor = point.sensor;
        match (sensor, point.value) {
            (SensorType::Accelerometer | SensorType::Gyrometer, TelemetryValue::Vector { x, y, z }) => {
                self.header(point.channel, sensor);
                for axis in [x, y, z] {
                    self.buf.put_i16_le(round_i16(axis * 1000.0));
                }
            }
            (SensorType::Colour, TelemetryValue::Rgb { r, g, b }) => {
                self.header(point.channel, sensor);
                self.buf.put_slice(&[r, g, b]);
            }
            (SensorType::Gps, TelemetryValue::Gps { lat, lon, alt }) => {
                self.header(point.channel, sensor);
                put_i24_le(&mut self.buf, lat * 10_000.0);
                put_i24_le(&mut self.buf, lon * 10_000.0);
                put_i24_le(&mut self.buf, alt * 100.0);
            }
            (
                SensorType::Switch | SensorType::Presence,
                TelemetryValue::Bool(on),
            ) => {
                self.header(point.channel, sensor);
                self.buf.put_u8(u8::from(on));
            }
            (
                SensorType::DigitalInput
                | SensorType::DigitalOutput
                | SensorType::Presence
                | SensorType::Percentage
                | SensorType::Switch,
                TelemetryValue::Integer(v),
            ) => {
                self.header(point.channel, sensor);
                self.buf.put_u8(v.min(u8::MAX as u32) as u8);
            }
            (SensorType::Illuminance, TelemetryValue::Integer(v)) => {
                self.header(point.channel, sensor);
                self.buf.put_u16_le(v.min(u16::MAX as u32) as u16);
            }
            (_, value) if sensor.payload_len() == 2 || sensor == SensorType::GenericSensor => {
                let Some(v) = value.as_f64() else {
                    return Err(mismatch(sensor, &value));
                };
                self.scalar(point.channel, sensor, v);
            }
            (_, value) => return Err(mismatch(sensor, &value)),
        }
        Ok(self)
    }

    pub fn add_digital_input(&mut self, channel: u8, value: u8) -> &mut Self {
        self.header(channel, SensorType::DigitalInput);
        self.buf.put_u8(value);
        self
    }

    pub fn add_digital_output(&mut self, channel: u8, value: u8) -> &mut Self {
        self.header(channel, SensorType::DigitalOutput);
        self.buf.put_u8(value);
        self
    }

    pub fn add_analog_input(&mut self, channel: u8, value: f64) -> &mut Self {
        self.scalar(channel, SensorType::AnalogInput, value)
    }

    pub fn add_analog_output(&mut self, channel: u8, value: f64) -> &mut Self {
        self.scalar(channel, SensorType::AnalogOutput, value)
    }

    pub fn add_generic_sensor(&mut self, channel: u8, value: f64) -> &mut Self {
        self.scalar(channel, SensorType::GenericSensor, value)
    }

    pub fn add_illuminance(&mut self, channel: u8, lux: u16) -> &mut Self {
        self.header(channel, SensorType::Illuminance);
        self.buf.put_u16_le(lux);
        self
    }

    pub fn add_presence(&mut self, channel: u8, present: bool) -> &mut Self {
        self.header(channel, SensorType::Presence);
        self.buf.put_u8(u8::from(present));
        self
    }

    /// Temperature in °C (0.1 resolution).
    pub fn add_temperature(&mut self, channel: u8, celsius: f64) -> &mut Self {
        self.scalar(channel, SensorType::Temperature, celsius)
    }

    /// Relative humidity in % (0.5 resolution).
    pub fn add_humidity(&mut self, channel: u8, percent: f64) -> &mut Self {
        self.scalar(channel, SensorType::Humidity, percent)
    }

    /// Acceleration in G per axis.
    pub fn add_accelerometer(&mut self, channel: u8, x: f64, y: f64, z: f64) -> &mut Self {
        self.vector(channel, SensorType::Accelerometer, x, y, z)
    }

    /// Pressure in hPa.
    pub fn add_barometer(&mut self, channel: u8, hpa: f64) -> &mut Self {
        self.scalar(channel, SensorType::Barometer, hpa)
    }

    pub fn add_voltage(&mut self, channel: u8, volts: f64) -> &mut Self {
        self.scalar(channel, SensorType::Voltage, volts)
    }

    pub fn add_current(&mut self, channel: u8, amps: f64) -> &mut Self {
        self.scalar(channel, SensorType::Current, amps)
    }

    pub fn add_percentage(&mut self, channel: u8, percent: u8) -> &mut Self {
        self.header(channel, SensorType::Percentage);
        self.buf.put_u8(percent);
        self
    }

    /// Altitude in metres.
    pub fn add_altitude(&mut self, channel: u8, metres: f64) -> &mut Self {
        self.scalar(channel, SensorType::Altitude, metres)
    }

    /// Rotation in degrees per second per axis.
    pub fn add_gyrometer(&mut self, channel: u8, x: f64, y: f64, z: f64) -> &mut Self {
        self.vector(channel, SensorType::Gyrometer, x, y, z)
    }

    pub fn add_colour(&mut self, channel: u8, r: u8, g: u8, b: u8) -> &mut Self {
        self.header(channel, SensorType::Colour);
        self.buf.put_slice(&[r, g, b]);
        self
    }

    pub fn add_gps(&mut self, channel: u8, lat: f64, lon: f64, alt: f64) -> &mut Self {
        self.header(channel, SensorType::Gps);
        put_i24_le(&mut self.buf, lat * 10_000.0);
        put_i24_le(&mut self.buf, lon * 10_000.0);
        put_i24_le(&mut self.buf, alt * 100.0);
        self
    }

    pub fn add_switch(&mut self, channel: u8, on: bool) -> &mut Self {
        self.header(channel, SensorType::Switch);
        self.buf.put_u8(u8::from(on));
        self
    }

    /// Bytes encoded so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and take the buffer.
    pub fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    fn header(&mut self, channel: u8, sensor: SensorType) {
        self.buf.put_u8(channel);
        self.buf.put_u8(sensor.code());
    }

    fn scalar(&mut self, channel: u8, sensor: SensorType, value: f64) -> &mut Self {
        self.header(channel, sensor);
        let raw = (value * sensor.scale()).round();
        match sensor {
            SensorType::AnalogInput
            | SensorType::AnalogOutput
            | SensorType::Temperature
            | SensorType::Altitude => self.buf.put_i16_le(raw as i16),
            SensorType::GenericSensor => self.buf.put_u32_le(raw as u32),
            _ => self.buf.put_u16_le(raw as u16),
        }
        self
    }

    fn vector(&mut self, channel: u8, sensor: SensorType, x: f64, y: f64, z: f64) -> &mut Self {
        self.header(channel, sensor);
        for axis in [x, y, z] {
            self.buf.put_i16_le(round_i16(axis * 1000.0));
        }
        self
    }
}

/// Decode every triplet in `data`.
pub fn decode_telemetry(data: &[u8]) -> Vec<TelemetryPoint> {
    let mut points = Vec::new();
    let mut pos = 0;

    while pos + 2 <= data.len() {
        let channel = data[pos];
        if channel == 0 {
            break;
        }
        let type_code = data[pos + 1];
        pos += 2;

        let Some(sensor) = SensorType::from_code(type_code) else {
            log::trace!("skipping unknown telemetry type {} on channel {}", type_code, channel);
            continue;
        };

        let Some(payload) = data.get(pos..pos + sensor.payload_len()) else {
            log::debug!(
                "truncated telemetry point: type {} needs {} bytes, {} left",
                type_code,
                sensor.payload_len(),
                data.len() - pos
            );
            break;
        };
        pos += payload.len();

        points.push(TelemetryPoint {
            channel,
            sensor,
            value: decode_value(sensor, payload),
        });
    }

    points
}

fn decode_value(sensor: SensorType, p: &[u8]) -> TelemetryValue {
    let i16_at = |i: usize| i16::from_le_bytes([p[i], p[i + 1]]) as f64;
    let u16_at = |i: usize| u16::from_le_bytes([p[i], p[i + 1]]) as f64;

    match sensor {
        SensorType::DigitalInput | SensorType::DigitalOutput | SensorType::Percentage => {
            TelemetryValue::Integer(p[0] as u32)
        }
        SensorType::Presence | SensorType::Switch => TelemetryValue::Bool(p[0] != 0),
        SensorType::Illuminance => TelemetryValue::Integer(u16_at(0) as u32),
        SensorType::AnalogInput
        | SensorType::AnalogOutput
        | SensorType::Temperature
        | SensorType::Altitude => TelemetryValue::Float(i16_at(0) / sensor.scale()),
        SensorType::Humidity | SensorType::Barometer | SensorType::Voltage | SensorType::Current => {
            TelemetryValue::Float(u16_at(0) / sensor.scale())
        }
        SensorType::GenericSensor => {
            let raw = u32::from_le_bytes([p[0], p[1], p[2], p[3]]);
            TelemetryValue::Float(raw as f64 / sensor.scale())
        }
        SensorType::Accelerometer | SensorType::Gyrometer => TelemetryValue::Vector {
            x: i16_at(0) / 1000.0,
            y: i16_at(2) / 1000.0,
            z: i16_at(4) / 1000.0,
        },
        SensorType::Colour => TelemetryValue::Rgb {
            r: p[0],
            g: p[1],
            b: p[2],
        },
        SensorType::Gps => TelemetryValue::Gps {
            lat: read_i24_le(&p[0..3]) as f64 / 10_000.0,
            lon: read_i24_le(&p[3..6]) as f64 / 10_000.0,
            alt: read_i24_le(&p[6..9]) as f64 / 100.0,
        },
    }
}

const I24_MAX: f64 = 8_388_607.0;
const I24_MIN: f64 = -8_388_608.0;

fn put_i24_le(buf: &mut BytesMut, value: f64) {
    let raw = value.round().clamp(I24_MIN, I24_MAX) as i32;
    buf.put_slice(&raw.to_le_bytes()[..3]);
}

fn read_i24_le(bytes: &[u8]) -> i32 {
    // Sign-extend by placing the 24 bits high and shifting back.
    i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8
}

fn round_i16(value: f64) -> i16 {
    value.round() as i16
}

fn mismatch(sensor: SensorType, value: &TelemetryValue) -> ProtocolError {
    ProtocolError::invalid_input(format!(
        "value {:?} does not fit sensor type {:?}",
        value, sensor
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn single(data: &[u8]) -> TelemetryPoint {
        let points = decode_telemetry(data);
        assert_eq!(points.len(), 1, "expected one point in {:?}", data);
        points[0]
    }

    fn scalar(point: TelemetryPoint) -> f64 {
        point.value.as_f64().expect("scalar value")
    }

    #[test]
    fn test_temperature_bytes() {
        let mut enc = TelemetryEncoder::new();
        enc.add_temperature(1, 25.5);
        assert_eq!(enc.as_bytes(), &[1, 103, 0xFF, 0x00]);

        let point = single(enc.as_bytes());
        assert_eq!(point.channel, 1);
        assert_eq!(point.sensor, SensorType::Temperature);
        assert_abs_diff_eq!(scalar(point), 25.5, epsilon = 0.1);
    }

    #[test]
    fn test_negative_temperature() {
        let mut enc = TelemetryEncoder::new();
        enc.add_temperature(2, -12.3);
        assert_abs_diff_eq!(scalar(single(enc.as_bytes())), -12.3, epsilon = 0.05);
    }

    #[test]
    fn test_scalar_types_round_trip() {
        let mut enc = TelemetryEncoder::new();
        enc.add_humidity(1, 55.5)
            .add_voltage(2, 3.71)
            .add_barometer(3, 1013.2)
            .add_analog_input(4, -1.25)
            .add_current(5, 0.512)
            .add_illuminance(6, 840)
            .add_digital_input(7, 1);
        let points = decode_telemetry(enc.as_bytes());
        assert_eq!(points.len(), 7);

        assert_abs_diff_eq!(scalar(points[0]), 55.5, epsilon = 0.5);
        assert_abs_diff_eq!(scalar(points[1]), 3.71, epsilon = 0.01);
        assert_abs_diff_eq!(scalar(points[2]), 1013.2, epsilon = 0.1);
        assert_abs_diff_eq!(scalar(points[3]), -1.25, epsilon = 0.01);
        assert_abs_diff_eq!(scalar(points[4]), 0.512, epsilon = 0.001);
        assert_eq!(points[5].value, TelemetryValue::Integer(840));
        assert_eq!(points[6].value, TelemetryValue::Integer(1));
    }

    #[test]
    fn test_encoded_widths_match_table() {
        let mut enc = TelemetryEncoder::new();
        enc.add_gps(1, 0.0, 0.0, 0.0);
        assert_eq!(enc.len(), 2 + 9);
        let mut enc = TelemetryEncoder::new();
        enc.add_accelerometer(1, 0.0, 0.0, 1.0);
        assert_eq!(enc.len(), 2 + 6);
        let mut enc = TelemetryEncoder::new();
        enc.add_generic_sensor(1, 12.34);
        assert_eq!(enc.len(), 2 + 4);
        let mut enc = TelemetryEncoder::new();
        enc.add_colour(1, 1, 2, 3);
        assert_eq!(enc.len(), 2 + 3);
    }

    #[test]
    fn test_gps_round_trip() {
        let mut enc = TelemetryEncoder::new();
        enc.add_gps(1, 37.7749, -122.4194, 15.5);
        match single(enc.as_bytes()).value {
            TelemetryValue::Gps { lat, lon, alt } => {
                assert_abs_diff_eq!(lat, 37.7749, epsilon = 0.0001);
                assert_abs_diff_eq!(lon, -122.4194, epsilon = 0.0001);
                assert_abs_diff_eq!(alt, 15.5, epsilon = 0.01);
            }
            other => panic!("expected GPS, got {:?}", other),
        }
    }

    #[test]
    fn test_vector_round_trip() {
        let mut enc = TelemetryEncoder::new();
        enc.add_accelerometer(1, 0.012, -0.5, 1.0)
            .add_gyrometer(2, 1.5, 0.0, -2.25);
        let points = decode_telemetry(enc.as_bytes());
        assert_eq!(
            points[0].value,
            TelemetryValue::Vector { x: 0.012, y: -0.5, z: 1.0 }
        );
        assert_eq!(points[1].sensor, SensorType::Gyrometer);
        assert_eq!(
            points[1].value,
            TelemetryValue::Vector { x: 1.5, y: 0.0, z: -2.25 }
        );
    }

    #[test]
    fn test_unknown_type_skips_header_only() {
        // Type 0x50 is unknown: only [1][0x50] is skipped and the scan
        // resumes at the next byte pair.
        let data = [1, 0x50, 2, 103, 0xFF, 0x00];
        let point = single(&data);
        assert_eq!(point.channel, 2);
        assert_eq!(point.sensor, SensorType::Temperature);
    }

    #[test]
    fn test_zero_channel_terminates() {
        let data = [1, 102, 1, 0, 0, 0, 0];
        let points = decode_telemetry(&data);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, TelemetryValue::Bool(true));
    }

    #[test]
    fn test_truncated_payload_stops() {
        let data = [1, 103, 0xFF];
        assert!(decode_telemetry(&data).is_empty());
        assert!(decode_telemetry(&[]).is_empty());
        assert!(decode_telemetry(&[5]).is_empty());
    }

    #[test]
    fn test_generic_add_checks_value_shape() {
        let mut enc = TelemetryEncoder::new();
        let bad = TelemetryPoint {
            channel: 1,
            sensor: SensorType::Gps,
            value: TelemetryValue::Float(1.0),
        };
        assert!(enc.add(&bad).is_err());
        assert!(enc.is_empty());

        let good = TelemetryPoint {
            channel: 1,
            sensor: SensorType::Voltage,
            value: TelemetryValue::Float(4.2),
        };
        enc.add(&good).unwrap();
        assert_abs_diff_eq!(scalar(single(enc.as_bytes())), 4.2, epsilon = 0.01);
    }

    #[test]
    fn test_every_known_type_has_consistent_code() {
        for code in 0..=u8::MAX {
            if let Some(sensor) = SensorType::from_code(code) {
                assert_eq!(sensor.code(), code);
                assert!(sensor.payload_len() >= 1);
            }
        }
    }
}
