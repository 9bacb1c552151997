//! Fictional FHIR resources for offline runs and tests.
//!
//! Nothing here comes from a real patient. The identifiers line up with the
//! sample task catalog so the offline demo can answer its own questions.

use serde_json::{json, Value};

use assessor_contracts::task::DomainRecord;

// ── Patients ─────────────────────────────────────────────────────────────────

/// Peter Stafford, born 1932-12-29. Used by the patient-search family.
pub fn patient_stafford() -> Value {
    json!({
        "resourceType": "Patient",
        "id": "S6534835",
        "identifier": [{ "system": "http://hospital.example/mrn", "value": "S6534835" }],
        "name": [{ "family": "Stafford", "given": ["Peter"] }],
        "gender": "male",
        "birthDate": "1932-12-29"
    })
}

pub fn patient_reyes() -> Value {
    json!({
        "resourceType": "Patient",
        "id": "S2874099",
        "identifier": [{ "system": "http://hospital.example/mrn", "value": "S2874099" }],
        "name": [{ "family": "Reyes", "given": ["Maria"] }],
        "gender": "female",
        "birthDate": "1964-03-11"
    })
}

// ── Observations ─────────────────────────────────────────────────────────────

/// Most recent serum magnesium for S2874099: 2.3 mg/dL.
pub fn magnesium_latest() -> Value {
    json!({
        "resourceType": "Observation",
        "id": "obs-mg-0042",
        "status": "final",
        "code": {
            "coding": [{ "system": "http://loinc.org", "code": "2601-3", "display": "Magnesium" }],
            "text": "MG"
        },
        "subject": { "reference": "Patient/S2874099" },
        "effectiveDateTime": "2023-11-12T10:15:00+00:00",
        "valueQuantity": { "value": 2.3, "unit": "mg/dL" }
    })
}

// ── Bundled ──────────────────────────────────────────────────────────────────

/// Every fixture as a `DomainRecord`, keyed the way a scope would name it.
pub fn sample_records() -> Vec<DomainRecord> {
    [patient_stafford(), patient_reyes(), magnesium_latest()]
        .into_iter()
        .map(|body| DomainRecord {
            resource_type: body["resourceType"].as_str().unwrap_or_default().to_string(),
            id: body["id"].as_str().unwrap_or_default().to_string(),
            body,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::sample_records;

    #[test]
    fn fixtures_carry_their_own_identity() {
        let records = sample_records();
        assert_eq!(records.len(), 3);
        for record in records {
            assert_eq!(record.body["resourceType"], record.resource_type.as_str());
            assert_eq!(record.body["id"], record.id.as_str());
        }
    }
}
