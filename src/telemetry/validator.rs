use serde_json::{Map, Value};

use super::NewReading;

pub const SENSOR_ID: &str = "sensor_id";
pub const TIMESTAMP: &str = "timestamp";
pub const STATUS_FIELDS: [&str; 4] = ["pir1_status", "pir2_status", "relay1_status", "relay2_status"];
pub const POWER_FIELDS: [&str; 4] = ["voltage", "current", "power", "energy"];

/// One offending field in a rejected payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    fn new(field: &str, reason: &str) -> Self {
        Self {
            field: field.to_owned(),
            reason: reason.to_owned(),
        }
    }
}

/// Structural rejection of an inbound payload, one entry per bad field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid payload: {}", summarize(.errors))]
pub struct InvalidPayload {
    pub errors: Vec<FieldError>,
}

impl InvalidPayload {
    pub fn single(field: &str, reason: &str) -> Self {
        Self {
            errors: vec![FieldError::new(field, reason)],
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|e| e.field.as_str())
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} {}", e.field, e.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check `payload` against the device wire contract.
///
/// Every field is checked, so the error lists all offenders rather than the
/// first one. Only shape, type and enum violations are rejected; odd but
/// well-typed values (negative power, a zero timestamp) pass.
pub fn validate(payload: &Value) -> Result<NewReading, InvalidPayload> {
    let Some(obj) = payload.as_object() else {
        return Err(InvalidPayload::single("body", "must be a JSON object"));
    };

    let mut errors = Vec::new();

    let device_id = collect(&mut errors, SENSOR_ID, sensor_id(obj));
    let timestamp = collect(&mut errors, TIMESTAMP, timestamp(obj));
    let [pir1, pir2, relay1, relay2] =
        STATUS_FIELDS.map(|field| collect(&mut errors, field, status_bit(obj, field)));
    let [voltage, current, power, energy] =
        POWER_FIELDS.map(|field| collect(&mut errors, field, measurement(obj, field)));

    if !errors.is_empty() {
        return Err(InvalidPayload { errors });
    }

    // All `collect` calls succeeded, so every option below is populated.
    match (
        device_id, timestamp, pir1, pir2, relay1, relay2, voltage, current, power, energy,
    ) {
        (
            Some(device_id),
            Some(timestamp),
            Some(pir1_status),
            Some(pir2_status),
            Some(relay1_status),
            Some(relay2_status),
            Some(voltage),
            Some(current),
            Some(power),
            Some(energy),
        ) => Ok(NewReading {
            device_id,
            timestamp,
            pir1_status,
            pir2_status,
            relay1_status,
            relay2_status,
            voltage,
            current,
            power,
            energy,
        }),
        _ => Err(InvalidPayload::single("body", "could not be interpreted")),
    }
}

fn collect<T>(
    errors: &mut Vec<FieldError>,
    field: &str,
    result: Result<T, &'static str>,
) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(reason) => {
            errors.push(FieldError::new(field, reason));
            None
        }
    }
}

fn sensor_id(obj: &Map<String, Value>) -> Result<String, &'static str> {
    match obj.get(SENSOR_ID) {
        None => Err("is required"),
        Some(Value::String(s)) if s.is_empty() => Err("must not be empty"),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err("must be a string"),
    }
}

/// Device uptime in clock ticks. Any JSON number.
fn timestamp(obj: &Map<String, Value>) -> Result<f64, &'static str> {
    match obj.get(TIMESTAMP) {
        None => Err("is required"),
        Some(Value::Number(n)) => n.as_f64().ok_or("must be a number"),
        Some(_) => Err("must be a number"),
    }
}

fn status_bit(obj: &Map<String, Value>, field: &str) -> Result<bool, &'static str> {
    let value = obj.get(field).ok_or("is required")?;
    match value.as_f64() {
        Some(f) if f == 0.0 => Ok(false),
        Some(f) if f == 1.0 => Ok(true),
        _ => Err("must be 0 or 1"),
    }
}

fn measurement(obj: &Map<String, Value>, field: &str) -> Result<Option<f64>, &'static str> {
    match obj.get(field) {
        None => Err("is required"),
        Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or("must be a number or null"),
        Some(_) => Err("must be a number or null"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn good() -> Value {
        json!({
            "sensor_id": "esp32-a",
            "timestamp": 1000,
            "pir1_status": 0,
            "pir2_status": 1,
            "relay1_status": 1,
            "relay2_status": 0,
            "voltage": 220.5,
            "current": 0.5,
            "power": 110.2,
            "energy": 3.4
        })
    }

    fn failed_fields(payload: &Value) -> Vec<String> {
        validate(payload)
            .unwrap_err()
            .fields()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn accepts_well_formed_payload() {
        let r = validate(&good()).unwrap();
        assert_eq!(r.device_id, "esp32-a");
        assert_eq!(r.timestamp, 1000.0);
        assert!(!r.pir1_status);
        assert!(r.pir2_status);
        assert!(r.relay1_status);
        assert!(!r.relay2_status);
        assert_eq!(r.voltage, Some(220.5));
        assert_eq!(r.current, Some(0.5));
        assert_eq!(r.power, Some(110.2));
        assert_eq!(r.energy, Some(3.4));
    }

    #[test]
    fn null_power_fields_are_independent() {
        let mut p = good();
        p["voltage"] = Value::Null;
        p["energy"] = Value::Null;
        let r = validate(&p).unwrap();
        assert_eq!(r.voltage, None);
        assert_eq!(r.current, Some(0.5));
        assert_eq!(r.power, Some(110.2));
        assert_eq!(r.energy, None);
    }

    #[test]
    fn zero_is_not_null() {
        let mut p = good();
        p["power"] = json!(0);
        assert_eq!(validate(&p).unwrap().power, Some(0.0));
    }

    #[test]
    fn semantically_odd_values_pass() {
        let mut p = good();
        p["power"] = json!(-42.0);
        p["timestamp"] = json!(0);
        p["current"] = json!(1e9);
        assert!(validate(&p).is_ok());
    }

    #[test]
    fn string_voltage_is_rejected() {
        let mut p = good();
        p["voltage"] = json!("abc");
        let err = validate(&p).unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].field, "voltage");
        assert_eq!(err.errors[0].reason, "must be a number or null");
    }

    #[test]
    fn every_missing_field_is_reported() {
        let all: Vec<&str> = std::iter::once(SENSOR_ID)
            .chain(std::iter::once(TIMESTAMP))
            .chain(STATUS_FIELDS)
            .chain(POWER_FIELDS)
            .collect();

        for field in &all {
            let mut p = good();
            p.as_object_mut().unwrap().remove(*field);
            assert_eq!(failed_fields(&p), vec![field.to_string()], "removing {field}");
        }

        assert_eq!(failed_fields(&json!({})), all);
    }

    #[test]
    fn multiple_offenders_are_all_listed_in_order() {
        let mut p = good();
        p["sensor_id"] = json!("");
        p["relay2_status"] = json!(2);
        p["energy"] = json!(true);
        assert_eq!(failed_fields(&p), vec!["sensor_id", "relay2_status", "energy"]);
    }

    #[test]
    fn status_must_be_zero_or_one() {
        for bad in [json!(2), json!(-1), json!(0.5), json!(true), json!("1"), Value::Null] {
            let mut p = good();
            p["pir1_status"] = bad.clone();
            assert_eq!(failed_fields(&p), vec!["pir1_status"], "value {bad}");
        }
    }

    #[test]
    fn sensor_id_must_be_string() {
        let mut p = good();
        p["sensor_id"] = json!(42);
        let err = validate(&p).unwrap_err();
        assert_eq!(err.errors[0].reason, "must be a string");
    }

    #[test]
    fn timestamp_accepts_any_number() {
        for (raw, expected) in [
            (json!(1000), 1000.0),
            (json!(1000.0), 1000.0),
            (json!(12.5), 12.5),
            (json!(-3), -3.0),
            (json!(u64::MAX), u64::MAX as f64),
            (json!(1e19), 1e19),
        ] {
            let mut p = good();
            p["timestamp"] = raw.clone();
            assert_eq!(validate(&p).unwrap().timestamp, expected, "value {raw}");
        }
    }

    #[test]
    fn timestamp_must_be_a_number() {
        for bad in [json!("1000"), json!(true), Value::Null, json!([1])] {
            let mut p = good();
            p["timestamp"] = bad.clone();
            assert_eq!(failed_fields(&p), vec!["timestamp"], "value {bad}");
        }
    }

    #[test]
    fn non_object_body_is_rejected() {
        for body in [json!([]), json!("x"), json!(1), Value::Null] {
            assert_eq!(failed_fields(&body), vec!["body"]);
        }
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut p = good();
        p["firmware"] = json!("1.2.3");
        assert!(validate(&p).is_ok());
    }

    #[test]
    fn verdict_is_stable_across_calls() {
        let mut p = good();
        p["current"] = json!([1]);
        assert_eq!(validate(&p), validate(&p));
        assert_eq!(validate(&good()), validate(&good()));
    }

    #[test]
    fn error_message_names_fields() {
        let mut p = good();
        p["voltage"] = json!("abc");
        let msg = validate(&p).unwrap_err().to_string();
        assert!(msg.contains("voltage"));
    }
}
