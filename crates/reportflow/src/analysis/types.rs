use serde::{Deserialize, Serialize};

/// Structured values extracted from a lab report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabReport {
    #[serde(default, alias = "patientName")]
    pub patient_name: Option<String>,
    #[serde(default, alias = "bloodSugar")]
    pub blood_sugar: Option<Measurement>,
    #[serde(default)]
    pub cholesterol: Option<Measurement>,
}

impl LabReport {
    /// JSON shape the upstream model is asked to produce.
    pub const SCHEMA_HINT: &'static str = r#"{
  "patient_name": string | null,
  "blood_sugar": { "value": number, "unit": string, "status": "Low" | "Normal" | "High" } | null,
  "cholesterol": { "value": number, "unit": string, "status": "Low" | "Normal" | "High" } | null
}"#;

    pub fn is_empty(&self) -> bool {
        self.patient_name.is_none() && self.blood_sugar.is_none() && self.cholesterol.is_none()
    }
}

/// One measured value. A bare number in the model output becomes
/// `value` with no unit or status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "MeasurementRepr")]
pub struct Measurement {
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub status: Option<String>,
}

impl Measurement {
    pub fn new(value: f64, unit: &str, status: &str) -> Self {
        Self {
            value: Some(value),
            unit: Some(unit.to_string()),
            status: Some(status.to_string()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MeasurementRepr {
    Bare(NumberLike),
    Detailed {
        #[serde(default)]
        value: Option<NumberLike>,
        #[serde(default)]
        unit: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },
}

/// Models sometimes quote numbers (`"95"`); accept both forms.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberLike {
    Number(f64),
    Text(String),
}

impl NumberLike {
    fn to_f64(&self) -> Option<f64> {
        match self {
            NumberLike::Number(n) => Some(*n),
            NumberLike::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<MeasurementRepr> for Measurement {
    fn from(repr: MeasurementRepr) -> Self {
        match repr {
            MeasurementRepr::Bare(n) => Measurement {
                value: n.to_f64(),
                unit: None,
                status: None,
            },
            MeasurementRepr::Detailed {
                value,
                unit,
                status,
            } => Measurement {
                value: value.as_ref().and_then(NumberLike::to_f64),
                unit,
                status,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_shape() {
        let report: LabReport = serde_json::from_str(
            r#"{"patient_name":"[REDACTED]",
                "blood_sugar":{"value":95,"unit":"mg/dL","status":"Normal"},
                "cholesterol":{"value":210,"unit":"mg/dL","status":"High"}}"#,
        )
        .unwrap();

        assert_eq!(report.patient_name.as_deref(), Some("[REDACTED]"));
        assert_eq!(
            report.blood_sugar,
            Some(Measurement::new(95.0, "mg/dL", "Normal"))
        );
        assert_eq!(
            report.cholesterol,
            Some(Measurement::new(210.0, "mg/dL", "High"))
        );
    }

    #[test]
    fn test_bare_number_is_value_only() {
        let report: LabReport =
            serde_json::from_str(r#"{"blood_sugar": 101.5, "cholesterol": null}"#).unwrap();
        assert_eq!(
            report.blood_sugar,
            Some(Measurement {
                value: Some(101.5),
                unit: None,
                status: None
            })
        );
        assert!(report.cholesterol.is_none());
        assert!(report.patient_name.is_none());
    }

    #[test]
    fn test_quoted_numbers_and_camel_case() {
        let report: LabReport = serde_json::from_str(
            r#"{"patientName": null, "bloodSugar": {"value": " 88 ", "unit": "mg/dL"}}"#,
        )
        .unwrap();
        let sugar = report.blood_sugar.unwrap();
        assert_eq!(sugar.value, Some(88.0));
        assert!(sugar.status.is_none());
    }

    #[test]
    fn test_empty_object() {
        let report: LabReport = serde_json::from_str("{}").unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_serializes_measurement_as_object() {
        let json = serde_json::to_value(Measurement::new(95.0, "mg/dL", "Normal")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"value": 95.0, "unit": "mg/dL", "status": "Normal"})
        );
    }
}
