use crate::types::{BoundingBox, SarError, SarResult, Subswath};
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

/// Subset of a Sentinel-1 product annotation.
/// This represents the root <product> element directly
#[derive(Debug, Deserialize)]
pub struct AnnotationRoot {
    #[serde(rename = "adsHeader")]
    pub ads_header: Option<AdsHeader>,
    #[serde(rename = "geolocationGrid")]
    pub geolocation_grid: Option<GeolocationGrid>,
}

#[derive(Debug, Deserialize)]
pub struct AdsHeader {
    #[serde(rename = "swath")]
    pub swath: Option<String>,
}

/// Geolocation grid for geographic coordinate extraction
#[derive(Debug, Deserialize)]
pub struct GeolocationGrid {
    #[serde(rename = "geolocationGridPointList")]
    pub geolocation_grid_point_list: GeolocationGridPointList,
}

#[derive(Debug, Deserialize)]
pub struct GeolocationGridPointList {
    #[serde(rename = "geolocationGridPoint", default)]
    pub geolocation_grid_points: Vec<GeolocationGridPoint>,
}

#[derive(Debug, Deserialize)]
pub struct GeolocationGridPoint {
    #[serde(rename = "latitude")]
    pub latitude: f64,
    #[serde(rename = "longitude")]
    pub longitude: f64,
}

/// Parser for Sentinel-1 annotation XML files
pub struct AnnotationParser;

impl AnnotationParser {
    /// Parse complete annotation XML
    pub fn parse_annotation(xml_content: &str) -> SarResult<AnnotationRoot> {
        from_str::<AnnotationRoot>(xml_content)
            .map_err(|e| SarError::XmlParsing(format!("Failed to parse annotation XML: {}", e)))
    }

    /// Subswath named in the header (`IW1`..`IW3`)
    pub fn extract_subswath(annotation: &AnnotationRoot) -> SarResult<Subswath> {
        annotation
            .ads_header
            .as_ref()
            .and_then(|h| h.swath.as_deref())
            .ok_or_else(|| SarError::Metadata("No swath in annotation header".to_string()))?
            .parse()
    }

    /// Extract bounding box from geolocation grid
    pub fn extract_bounding_box(annotation: &AnnotationRoot) -> SarResult<BoundingBox> {
        let geolocation_grid = annotation.geolocation_grid.as_ref().ok_or_else(|| {
            SarError::Metadata("No geolocation grid found in annotation".to_string())
        })?;
        let points = &geolocation_grid.geolocation_grid_point_list.geolocation_grid_points;

        if points.is_empty() {
            return Err(SarError::Metadata(
                "No geolocation grid points found".to_string(),
            ));
        }

        // Find min/max coordinates from all grid points
        let mut min_lat = f64::INFINITY;
        let mut max_lat = f64::NEG_INFINITY;
        let mut min_lon = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;

        for point in points {
            min_lat = min_lat.min(point.latitude);
            max_lat = max_lat.max(point.latitude);
            min_lon = min_lon.min(point.longitude);
            max_lon = max_lon.max(point.longitude);
        }

        Ok(BoundingBox {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        })
    }
}

/// Stream through `xml_content` and return the first parseable
/// `platformHeading` value, without deserializing the whole document.
pub fn find_platform_heading(xml_content: &str) -> SarResult<Option<f64>> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);
    let mut inside_heading = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                inside_heading = e.local_name().as_ref() == b"platformHeading";
            }
            Ok(Event::Text(text)) if inside_heading => {
                let value = text
                    .unescape()
                    .map_err(|e| SarError::XmlParsing(format!("Bad platformHeading text: {}", e)))?;
                match value.trim().parse::<f64>() {
                    Ok(heading) => return Ok(Some(heading)),
                    Err(_) => log::warn!("Ignoring unparsable platformHeading '{}'", value.trim()),
                }
            }
            Ok(Event::End(_)) => inside_heading = false,
            Ok(Event::Eof) => return Ok(None),
            Err(e) => {
                return Err(SarError::XmlParsing(format!(
                    "Error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }
}
