//! Segment-to-resource mapping.
//!
//! Walks the segments of a validated message in order and emits one
//! [`FhirResource`] envelope per clinical segment:
//!
//! - `PID` -> Patient
//! - `PV1` -> Encounter
//! - `ORC`/`OBR` -> ServiceRequest (ORC opens the order, OBR enriches it)
//! - `OBX` -> Observation
//!
//! Segments with no mapping are skipped and reported as [`MappingWarning`]s,
//! never as errors. Every emitted envelope carries the source message id and
//! the configured FHIR version.

use bridge_types::FhirVersion;
use fhir::{
    Address, CodeableConcept, Coding, ContactPoint, EncounterClass, FhirResource, FhirResult,
    Gender, HumanName, Identifier, ObservationStatus, Period, Reference, RequestPriority,
    RequestStatus,
};
use hl7::{timestamp, ParsedMessage, Segment};
use serde::Serialize;
use uuid::Uuid;

const PATIENT_ID_SYSTEM: &str = "http://hospital.example.org/patient-id";
const MRN_SYSTEM: &str = "http://hospital.example.org/mrn";
const VISIT_SYSTEM: &str = "http://hospital.example.org/visit-number";
const PLACER_SYSTEM: &str = "http://hospital.example.org/placer-order-number";
const FILLER_SYSTEM: &str = "http://hospital.example.org/filler-order-number";
const LOINC: &str = "http://loinc.org";

/// A segment the mapper skipped.
#[derive(Clone, Debug, Serialize)]
pub struct MappingWarning {
    pub segment: String,
    /// Zero-based position of the segment in the message.
    pub index: usize,
    pub message: String,
}

/// Everything the mapper produced for one message.
#[derive(Debug, Default)]
pub struct MappingOutput {
    pub resources: Vec<FhirResource>,
    pub warnings: Vec<MappingWarning>,
}

struct MapContext<'a> {
    message_id: &'a str,
    fhir_version: &'a FhirVersion,
    patient_id: Option<String>,
    encounter_id: Option<String>,
    pending_order: Option<fhir::ServiceRequest>,
    output: MappingOutput,
}

impl MapContext<'_> {
    fn emit(&mut self, resource_id: &str, resource_type: &str, content: String) {
        self.output.resources.push(FhirResource::new(
            resource_id,
            resource_type,
            content,
            self.message_id,
            self.fhir_version.clone(),
        ));
    }

    fn subject(&self) -> Option<Reference> {
        self.patient_id
            .as_deref()
            .map(|id| Reference::to("Patient", id))
    }

    fn encounter(&self) -> Option<Reference> {
        self.encounter_id
            .as_deref()
            .map(|id| Reference::to("Encounter", id))
    }

    /// Renders and emits the order under construction, if any.
    fn flush_order(&mut self) -> FhirResult<()> {
        if let Some(order) = self.pending_order.take() {
            let json = order.render()?;
            let id = order.id;
            self.emit(&id, "ServiceRequest", json);
        }
        Ok(())
    }
}

/// Maps a message's segments to resource envelopes.
pub fn map_message(
    message: &ParsedMessage,
    message_id: &str,
    fhir_version: &FhirVersion,
) -> FhirResult<MappingOutput> {
    let mut ctx = MapContext {
        message_id,
        fhir_version,
        patient_id: None,
        encounter_id: None,
        pending_order: None,
        output: MappingOutput::default(),
    };

    for (index, segment) in message.segments().iter().enumerate() {
        match segment.id() {
            // The header was consumed during parsing and validation.
            "MSH" => {}
            "PID" => map_pid(segment, &mut ctx)?,
            "PV1" => map_pv1(segment, &mut ctx)?,
            "ORC" => map_orc(segment, &mut ctx)?,
            "OBR" => map_obr(segment, &mut ctx),
            "OBX" => map_obx(segment, &mut ctx)?,
            other => ctx.output.warnings.push(MappingWarning {
                segment: other.to_owned(),
                index,
                message: format!("segment {other} has no resource mapping and was skipped"),
            }),
        }
    }
    ctx.flush_order()?;

    tracing::debug!(
        message_id,
        resources = ctx.output.resources.len(),
        skipped = ctx.output.warnings.len(),
        "mapped message segments"
    );
    Ok(ctx.output)
}

fn map_pid(segment: &Segment, ctx: &mut MapContext<'_>) -> FhirResult<()> {
    let id = segment
        .component_value(3, 1)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut patient = fhir::Patient::new(&id);
    patient
        .identifier
        .push(Identifier::new(PATIENT_ID_SYSTEM, &id));
    // PID-3 component 5 is the identifier type; MR marks a medical record
    // number assigned by the facility in component 4.
    if segment.component_value(3, 5) == Some("MR") {
        patient.identifier.push(Identifier::new(MRN_SYSTEM, &id));
    }

    let family = segment.component_value(5, 1);
    let given = segment.component_value(5, 2);
    let middle = segment.component_value(5, 3);
    if family.is_some() || given.is_some() {
        patient.name.push(HumanName {
            use_type: Some("official".to_owned()),
            family: family.map(str::to_owned),
            given: [given, middle].into_iter().flatten().map(str::to_owned).collect(),
        });
    }

    if let Some(dob) = segment.field_value(7).and_then(timestamp::parse_date) {
        patient.birth_date = Some(dob.format("%Y-%m-%d").to_string());
    }
    if let Some(sex) = segment.field_value(8) {
        patient.gender = Some(Gender::from_hl7(sex).to_wire().to_owned());
    }

    let address = Address {
        use_type: None,
        line: segment
            .component_value(11, 1)
            .map(str::to_owned)
            .into_iter()
            .collect(),
        city: segment.component_value(11, 3).map(str::to_owned),
        state: segment.component_value(11, 4).map(str::to_owned),
        postal_code: segment.component_value(11, 5).map(str::to_owned),
    };
    if !address.is_empty() {
        patient.address.push(address);
    }

    if let Some(phone) = segment.field_value(13) {
        patient.telecom.push(ContactPoint {
            system: "phone".to_owned(),
            use_type: Some("home".to_owned()),
            value: phone.to_owned(),
        });
    }

    let json = patient.render()?;
    ctx.emit(&id, "Patient", json);
    ctx.patient_id = Some(id);
    Ok(())
}

fn map_pv1(segment: &Segment, ctx: &mut MapContext<'_>) -> FhirResult<()> {
    let id = segment
        .field_value(19)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut encounter = fhir::Encounter::new(&id);
    encounter
        .identifier
        .push(Identifier::new(VISIT_SYSTEM, &id));
    if let Some(class) = segment.field_value(2) {
        encounter.class = Some(EncounterClass::from_hl7(class).to_coding());
    }
    encounter.subject = ctx.subject();

    let period = Period {
        start: segment
            .field_value(44)
            .and_then(timestamp::parse_datetime)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        end: segment
            .field_value(45)
            .and_then(timestamp::parse_datetime)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
    };
    if !period.is_empty() {
        encounter.period = Some(period);
    }

    // PV1-3: point of care ^ room ^ bed, rendered as a display-only location.
    let display: Vec<&str> = (1..=3)
        .filter_map(|component| segment.component_value(3, component))
        .collect();
    if !display.is_empty() {
        encounter.location.push(fhir::encounter::EncounterLocation {
            location: Reference {
                reference: None,
                display: Some(display.join(" - ")),
            },
        });
    }

    let json = encounter.render()?;
    ctx.emit(&id, "Encounter", json);
    ctx.encounter_id = Some(id);
    Ok(())
}

fn map_orc(segment: &Segment, ctx: &mut MapContext<'_>) -> FhirResult<()> {
    // A new ORC closes the order the previous ORC/OBR pair was building.
    ctx.flush_order()?;

    let id = segment
        .component_value(2, 1)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut order = fhir::ServiceRequest::new(&id);
    if let Some(placer) = segment.component_value(2, 1) {
        order.identifier.push(Identifier::new(PLACER_SYSTEM, placer));
    }
    if let Some(filler) = segment.component_value(3, 1) {
        order.identifier.push(Identifier::new(FILLER_SYSTEM, filler));
    }
    if let Some(control) = segment.field_value(1) {
        order.status = RequestStatus::from_hl7(control).to_wire().to_owned();
    }
    if let Some(ordered) = segment.field_value(9).and_then(timestamp::parse_datetime) {
        order.authored_on = Some(ordered.format("%Y-%m-%dT%H:%M:%S").to_string());
    }
    order.subject = ctx.subject();
    order.encounter = ctx.encounter();

    ctx.pending_order = Some(order);
    Ok(())
}

fn map_obr(segment: &Segment, ctx: &mut MapContext<'_>) {
    if ctx.pending_order.is_none() {
        // OBR without a preceding ORC still describes an order.
        let id = segment
            .component_value(2, 1)
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut order = fhir::ServiceRequest::new(id);
        order.subject = ctx.subject();
        order.encounter = ctx.encounter();
        ctx.pending_order = Some(order);
    }
    let Some(order) = ctx.pending_order.as_mut() else {
        return;
    };

    if let Some(code) = segment.component_value(4, 1) {
        let mut coding = Coding::new(LOINC, code);
        if let Some(name) = segment.component_value(4, 2) {
            coding = coding.with_display(name);
        }
        order.code = Some(CodeableConcept::from_coding(coding));
    }
    if let Some(priority) = segment.field_value(5) {
        order.priority = Some(RequestPriority::from_hl7(priority).to_wire().to_owned());
    }
}

fn map_obx(segment: &Segment, ctx: &mut MapContext<'_>) -> FhirResult<()> {
    let id = segment
        .field_value(1)
        .map(|set_id| format!("{}-obx-{set_id}", ctx.message_id))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut observation = fhir::Observation::new(&id);
    if let Some(status) = segment.field_value(11) {
        observation.status = ObservationStatus::from_hl7(status).to_wire().to_owned();
    }
    if let Some(code) = segment.component_value(3, 1) {
        let mut coding = Coding::new(LOINC, code);
        if let Some(name) = segment.component_value(3, 2) {
            coding = coding.with_display(name);
        }
        observation.code = Some(CodeableConcept::from_coding(coding));
    }
    observation.subject = ctx.subject();
    observation.encounter = ctx.encounter();
    if let Some(observed) = segment.field_value(14).and_then(timestamp::parse_datetime) {
        observation.effective_date_time = Some(observed.format("%Y-%m-%dT%H:%M:%S").to_string());
    }
    if let Some(value) = segment.field_value(5) {
        observation.set_value(value, segment.field_value(6));
    }
    if let Some(range) = segment.field_value(7) {
        observation
            .reference_range
            .push(fhir::observation::ReferenceRange {
                text: range.to_owned(),
            });
    }

    let json = observation.render()?;
    ctx.emit(&id, "Observation", json);
    Ok(())
}
