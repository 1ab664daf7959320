use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::elements::{DecodedSet, TagValue};

/// DICOM multi-value delimiter, used wherever a sequence collapses into one
/// stored scalar.
pub const LIST_DELIMITER: &str = "\\";

const PATIENT_AGE: &str = "patient_age";
const PATIENT_BIRTH_DATE: &str = "patient_birth_date";
const STUDY_DATE: &str = "study_date";
const PATIENT_ORIENTATION: &str = "patient_orientation";

/// Post-decoding adjustment pass over one file's decoded set.
///
/// Each rule checks its own preconditions and is skipped when they are not
/// met; unmet preconditions leave the field at its prior value. Running the
/// pass twice changes nothing.
pub fn normalize(decoded: &mut DecodedSet) {
    derive_patient_age(decoded);
    collapse_patient_orientation(decoded);
}

/// Fill in `patient_age` from birth date and study date when the file did not
/// carry the age tag itself. Whole years, calendar-aware: a birthday not yet
/// reached in the study year subtracts one.
fn derive_patient_age(decoded: &mut DecodedSet) {
    if !decoded.contains(PATIENT_AGE) || decoded.get(PATIENT_AGE).is_some() {
        return;
    }
    let birth = decoded.get(PATIENT_BIRTH_DATE).and_then(parse_date);
    let study = decoded.get(STUDY_DATE).and_then(parse_date);
    let (Some(birth), Some(study)) = (birth, study) else {
        debug!("cannot derive patient age, leaving blank");
        return;
    };

    let mut years = study.year() - birth.year();
    if (study.month(), study.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    decoded.set(PATIENT_AGE, TagValue::Int(years as i64));
}

/// Join a decoded orientation sequence into a single delimited string so it
/// stores as one scalar column.
fn collapse_patient_orientation(decoded: &mut DecodedSet) {
    let Some(TagValue::List(_)) = decoded.get(PATIENT_ORIENTATION) else {
        return;
    };
    let joined = decoded
        .get(PATIENT_ORIENTATION)
        .map(|value| value.render(LIST_DELIMITER))
        .unwrap_or_default();
    decoded.set(PATIENT_ORIENTATION, TagValue::Text(joined));
}

fn parse_date(value: &TagValue) -> Option<NaiveDate> {
    let text = value.as_text()?;
    NaiveDate::parse_from_str(text, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
        .ok()
}
