use anyhow::{bail, Context, Result};
use log::info;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

const DATASERVER_BASE: &str = "https://aviationweather.gov/api/data/dataserver";
const LOOKBACK_HOURS: u32 = 3;

/// One decoded METAR observation from the dataserver.
#[derive(Debug, Clone, Default)]
pub struct MetarReport {
    /// The undecoded report text, exactly as issued.
    pub raw_text: String,
    pub station_id: String,
    /// ISO-8601 observation timestamp, e.g. "2026-08-06T17:56:00Z".
    pub observation_time: String,
    /// VFR / MVFR / IFR / LIFR, empty when the server omits it.
    pub flight_category: String,
}

/// Dataserver retrieve URL for the most recent METAR of `station`.
pub fn request_url(station: &str) -> String {
    format!(
        "{}?requestType=retrieve&dataSource=metars&format=xml\
         &mostRecentForEachStation=constraint&hoursBeforeNow={}&stationString={}",
        DATASERVER_BASE, LOOKBACK_HOURS, station
    )
}

#[derive(Clone, Copy)]
enum Field {
    RawText,
    StationId,
    ObservationTime,
    FlightCategory,
}

/// Parse a dataserver XML response, returning the first METAR element.
///
/// The response wraps results as
/// `<response><data num_results="N"><METAR>…</METAR>…</data></response>`;
/// server-side problems arrive as `<errors><error>…</error></errors>`.
pub fn parse_metar_response(xml: &str) -> Result<MetarReport> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut buf = Vec::with_capacity(128);
    let mut report = MetarReport::default();
    let mut in_metar = false;
    let mut in_error = false;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"METAR" => in_metar = true,
                b"error" => in_error = true,
                b"raw_text" if in_metar => field = Some(Field::RawText),
                b"station_id" if in_metar => field = Some(Field::StationId),
                b"observation_time" if in_metar => field = Some(Field::ObservationTime),
                b"flight_category" if in_metar => field = Some(Field::FlightCategory),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let text = reader.decoder().decode(&e).unwrap_or_default();
                if in_error {
                    bail!("dataserver error: {}", text.trim());
                }
                match field {
                    Some(Field::RawText) => report.raw_text = text.into_owned(),
                    Some(Field::StationId) => report.station_id = text.into_owned(),
                    Some(Field::ObservationTime) => {
                        report.observation_time = text.into_owned()
                    }
                    Some(Field::FlightCategory) => {
                        report.flight_category = text.into_owned()
                    }
                    None => {}
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                // Only the most recent report is wanted.
                b"METAR" => break,
                b"error" => in_error = false,
                _ => field = None,
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => bail!("malformed dataserver XML: {}", e),
        }
        buf.clear();
    }

    if report.raw_text.is_empty() {
        bail!("response contains no METAR for the requested station");
    }
    Ok(report)
}

/// Fetch the latest METAR for `station` from aviationweather.gov.
pub fn fetch_metar(station: &str, user_agent: &str) -> Result<MetarReport> {
    let url = request_url(station);
    let headers = [("User-Agent", user_agent), ("Accept", "application/xml")];

    info!("Fetching METAR for {}...", station);
    let xml = crate::http_client::https_get_with_headers(&url, &headers)?;
    let report = parse_metar_response(&xml)
        .with_context(|| format!("bad dataserver response for {}", station))?;

    info!(
        "METAR {}: {} chars, {}",
        report.station_id,
        report.raw_text.len(),
        if report.flight_category.is_empty() {
            "category unknown"
        } else {
            report.flight_category.as_str()
        }
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<response version="1.2">
  <data num_results="1">
    <METAR>
      <raw_text>KSFO 061756Z 28012KT 10SM FEW008 17/12 A3002 RMK AO2 SLP165</raw_text>
      <station_id>KSFO</station_id>
      <observation_time>2026-08-06T17:56:00Z</observation_time>
      <temp_c>17.2</temp_c>
      <flight_category>VFR</flight_category>
    </METAR>
  </data>
</response>"#;

    #[test]
    fn parses_first_metar_fields() {
        let report = parse_metar_response(SAMPLE).unwrap();
        assert_eq!(
            report.raw_text,
            "KSFO 061756Z 28012KT 10SM FEW008 17/12 A3002 RMK AO2 SLP165"
        );
        assert_eq!(report.station_id, "KSFO");
        assert_eq!(report.observation_time, "2026-08-06T17:56:00Z");
        assert_eq!(report.flight_category, "VFR");
    }

    #[test]
    fn only_the_first_metar_is_taken() {
        let two = SAMPLE.replace(
            "</data>",
            "<METAR><raw_text>KOAK 061753Z 30008KT</raw_text>\
             <station_id>KOAK</station_id></METAR></data>",
        );
        let report = parse_metar_response(&two).unwrap();
        assert_eq!(report.station_id, "KSFO");
    }

    #[test]
    fn empty_result_set_is_an_error() {
        let xml = r#"<response><data num_results="0"></data></response>"#;
        assert!(parse_metar_response(xml).is_err());
    }

    #[test]
    fn server_error_element_is_reported() {
        let xml = "<response><errors><error>Invalid station string</error></errors></response>";
        let err = parse_metar_response(xml).unwrap_err();
        assert!(err.to_string().contains("Invalid station string"));
    }

    #[test]
    fn missing_optional_fields_default_to_empty() {
        let xml = "<response><data><METAR>\
                   <raw_text>KSJC 061753Z 31010KT 10SM CLR 21/09 A3001</raw_text>\
                   </METAR></data></response>";
        let report = parse_metar_response(xml).unwrap();
        assert_eq!(report.station_id, "");
        assert_eq!(report.flight_category, "");
    }

    #[test]
    fn url_addresses_the_requested_station() {
        let url = request_url("KLAX");
        assert!(url.contains("stationString=KLAX"));
        assert!(url.contains("format=xml"));
    }
}
