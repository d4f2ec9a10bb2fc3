//! MeteoFrance public observations (SYNOP bulletins).
//!
//! Bulletins are CSV files under a fixed open-data base:
//! `{base}/Txt/Synop/synop.YYYYMMDDHH.csv`, one per synoptic hour.

use super::{ResolveUrl, TransportError};
use crate::descriptor::{ParamValue, ResourceDescriptor, Scalar};
use crate::url_model::join_url;

pub const METEOFRANCE_BASE_URL: &str = "https://donneespubliques.meteofrance.fr/donnees_libres/";

/// Observation types with a known path under the base.
const OBSERVATION_PATHS: &[(&str, &str)] = &[("synop", "Txt/Synop")];

/// Descriptor of the SYNOP bulletin for `datetime_ref` (`YYYYMMDDHH`).
pub fn synop_descriptor(datetime_ref: &str) -> ResourceDescriptor {
    ResourceDescriptor::new("synop").param("datetime_ref", datetime_ref)
}

/// Resolves observation descriptors (name = observation type, param
/// `datetime_ref`) to bulletin URLs.
#[derive(Debug, Clone)]
pub struct SynopSource {
    pub base_url: String,
}

impl Default for SynopSource {
    fn default() -> Self {
        Self {
            base_url: METEOFRANCE_BASE_URL.to_string(),
        }
    }
}

impl SynopSource {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

fn datetime_ref(descriptor: &ResourceDescriptor) -> Result<String, TransportError> {
    let raw = match descriptor.params.get("datetime_ref") {
        Some(ParamValue::One(Scalar::Str(s))) => s.clone(),
        Some(ParamValue::One(Scalar::Int(i))) => i.to_string(),
        _ => {
            return Err(TransportError::InvalidUrl(format!(
                "{}: missing datetime_ref",
                descriptor.name
            )))
        }
    };
    if raw.len() != 10 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TransportError::InvalidUrl(format!(
            "datetime_ref must be YYYYMMDDHH, got {:?}",
            raw
        )));
    }
    Ok(raw)
}

impl ResolveUrl for SynopSource {
    fn resolve(&self, descriptor: &ResourceDescriptor) -> Result<String, TransportError> {
        let observation = descriptor.name.as_str();
        let path = OBSERVATION_PATHS
            .iter()
            .find(|(name, _)| *name == observation)
            .map(|(_, path)| *path)
            .ok_or_else(|| {
                TransportError::InvalidUrl(format!("unsupported observation type {:?}", observation))
            })?;
        let suffix = format!("{}/{}.{}.csv", path, observation, datetime_ref(descriptor)?);
        join_url(Some(self.base_url.as_str()), Some(suffix.as_str()))
            .ok_or_else(|| TransportError::InvalidUrl(self.base_url.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synop_bulletin_url() {
        let url = SynopSource::default()
            .resolve(&synop_descriptor("2021020812"))
            .unwrap();
        assert_eq!(
            url,
            "https://donneespubliques.meteofrance.fr/donnees_libres/Txt/Synop/synop.2021020812.csv"
        );
    }

    #[test]
    fn numeric_datetime_and_custom_base() {
        let src = SynopSource::with_base_url("http://127.0.0.1:8080");
        let d = ResourceDescriptor::new("synop").param("datetime_ref", 2021020800i64);
        assert_eq!(
            src.resolve(&d).unwrap(),
            "http://127.0.0.1:8080/Txt/Synop/synop.2021020800.csv"
        );
    }

    #[test]
    fn rejects_bad_requests() {
        let src = SynopSource::default();
        assert!(src.resolve(&synop_descriptor("20210208")).is_err());
        assert!(src.resolve(&synop_descriptor("2021-02-08")).is_err());
        assert!(src.resolve(&ResourceDescriptor::new("synop")).is_err());
        assert!(src
            .resolve(&ResourceDescriptor::new("metar").param("datetime_ref", "2021020812"))
            .is_err());
    }

    #[test]
    fn distinct_hours_have_distinct_keys() {
        assert_ne!(
            synop_descriptor("2021020800").key(),
            synop_descriptor("2021020812").key()
        );
    }
}
