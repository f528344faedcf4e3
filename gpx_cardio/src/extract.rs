use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use roxmltree::{Document, Node};
use tracing::debug;

use crate::{CardioError, Sample};

/// GPX 1.1 default namespace.
pub const GPX_NS: &str = "http://www.topografix.com/GPX/1/1";
/// Garmin track-point extension namespace (carries the `hr` element).
pub const TPX_NS: &str = "http://www.garmin.com/xmlschemas/TrackPointExtension/v1";

/// One opened GPX recording.
///
/// Extraction assumes the document holds exactly one track with one
/// segment and reads only the first of each; files with additional tracks
/// or segments have the rest silently ignored. Samples are scanned once
/// and memoized on the instance; the cache is private to the instance and
/// never shared.
#[derive(Debug)]
pub struct GpxCardio {
    name: String,
    xml: String,
    samples: Option<Vec<Sample>>,
}

impl GpxCardio {
    /// Reads a GPX file from disk. The document is not parsed until the
    /// first call to [`samples`](Self::samples).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CardioError> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .map_err(|e| CardioError::Unreadable(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_xml(xml, &path.display().to_string()))
    }

    /// Wraps in-memory GPX text. `name` is used in error messages.
    pub fn from_xml(xml: String, name: &str) -> Self {
        Self {
            name: name.to_string(),
            xml,
            samples: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Heart-rate samples in document order.
    ///
    /// The first call scans the XML tree; subsequent calls return the
    /// cached slice. A document whose first track segment holds no track
    /// points yields an empty slice, not an error. A track point missing
    /// its `gpxtpx:hr` or `time` element aborts the whole scan with
    /// [`CardioError::MalformedTrack`]; no partial series is kept.
    pub fn samples(&mut self) -> Result<&[Sample], CardioError> {
        if self.samples.is_none() {
            let scanned = self.scan()?;
            self.samples = Some(scanned);
        }
        Ok(self.samples.as_deref().unwrap_or_default())
    }

    fn scan(&self) -> Result<Vec<Sample>, CardioError> {
        let doc = Document::parse(&self.xml)
            .map_err(|e| CardioError::XmlParse(format!("{}: {}", self.name, e)))?;
        let segment = first_track_segment(&doc)
            .ok_or_else(|| self.malformed("missing <trk>/<trkseg> structure"))?;

        let mut out = Vec::new();
        for point in segment
            .descendants()
            .filter(|n| n.has_tag_name((GPX_NS, "trkpt")))
        {
            let hr_text = descendant_text(point, TPX_NS, "hr")
                .ok_or_else(|| self.malformed("track point without gpxtpx:hr element"))?;
            let bpm: f64 = hr_text
                .trim()
                .parse()
                .map_err(|_| self.malformed(&format!("unparsable heart rate {:?}", hr_text)))?;
            let time_text = descendant_text(point, GPX_NS, "time")
                .ok_or_else(|| self.malformed("track point without time element"))?;
            let time = parse_point_time(time_text)
                .ok_or_else(|| self.malformed(&format!("unparsable timestamp {:?}", time_text)))?;
            debug!("sample {} {:.1} bpm", time, bpm);
            out.push(Sample { time, bpm });
        }
        Ok(out)
    }

    fn malformed(&self, reason: &str) -> CardioError {
        CardioError::MalformedTrack(format!("{}: {}", self.name, reason))
    }
}

/// The hard-coded structural path of the extractor: the document's first
/// track and that track's first segment.
fn first_track_segment<'a, 'input>(doc: &'a Document<'input>) -> Option<Node<'a, 'input>> {
    let track = doc
        .root_element()
        .children()
        .find(|n| n.has_tag_name((GPX_NS, "trk")))?;
    track.children().find(|n| n.has_tag_name((GPX_NS, "trkseg")))
}

fn descendant_text<'a>(node: Node<'a, '_>, ns: &str, name: &str) -> Option<&'a str> {
    node.descendants()
        .find(|n| n.has_tag_name((ns, name)))?
        .text()
}

/// Parses the fixed `YYYY-MM-DDTHH:MM:SSZ` layout by splitting on the
/// separators and dropping the trailing zone marker. The `Z` is stripped,
/// not interpreted: the result is naive, local to whatever the file wrote.
fn parse_point_time(text: &str) -> Option<NaiveDateTime> {
    let (date_part, time_part) = text.trim().split_once('T')?;

    let mut fields = date_part.splitn(3, '-');
    let year: i32 = fields.next()?.parse().ok()?;
    let month: u32 = fields.next()?.parse().ok()?;
    let day: u32 = fields.next()?.parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let time_part = time_part.strip_suffix('Z')?;
    let mut fields = time_part.splitn(3, ':');
    let hour: u32 = fields.next()?.parse().ok()?;
    let minute: u32 = fields.next()?.parse().ok()?;
    let second: u32 = fields.next()?.parse().ok()?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;

    Some(NaiveDateTime::new(date, time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpx_doc(points: &str) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<gpx xmlns="http://www.topografix.com/GPX/1/1" "#,
                r#"xmlns:gpxtpx="http://www.garmin.com/xmlschemas/TrackPointExtension/v1" "#,
                r#"xmlns:gpxx="http://www.garmin.com/xmlschemas/GpxExtensions/v3" version="1.1">"#,
                "<metadata><time>2019-06-02T09:59:58Z</time></metadata>",
                "<trk><name>Morning run</name><trkseg>{}</trkseg></trk>",
                "</gpx>"
            ),
            points
        )
    }

    fn track_point(time: &str, hr: &str) -> String {
        format!(
            concat!(
                r#"<trkpt lat="40.417" lon="-3.703">"#,
                "<ele>655.0</ele><time>{}</time>",
                "<extensions><gpxtpx:TrackPointExtension><gpxtpx:hr>{}</gpxtpx:hr>",
                "</gpxtpx:TrackPointExtension></extensions></trkpt>"
            ),
            time, hr
        )
    }

    fn naive(text: &str) -> NaiveDateTime {
        parse_point_time(text).unwrap()
    }

    #[test]
    fn test_extracts_samples_in_document_order() {
        let points = [
            track_point("2019-06-02T10:00:00Z", "70.0"),
            track_point("2019-06-02T10:00:05Z", "72.5"),
            track_point("2019-06-02T10:00:12Z", "75"),
        ]
        .concat();
        let mut cardio = GpxCardio::from_xml(gpx_doc(&points), "run.gpx");
        let samples = cardio.samples().unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].bpm, 70.0);
        assert_eq!(samples[1].bpm, 72.5);
        assert_eq!(samples[2].bpm, 75.0);
        assert_eq!(samples[0].time, naive("2019-06-02T10:00:00Z"));
        assert_eq!(samples[2].time, naive("2019-06-02T10:00:12Z"));
        assert!(samples.windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn test_repeat_extraction_returns_cached_slice() {
        let points = track_point("2019-06-02T10:00:00Z", "70.0");
        let mut cardio = GpxCardio::from_xml(gpx_doc(&points), "run.gpx");
        let first: Vec<Sample> = cardio.samples().unwrap().to_vec();
        let first_ptr = cardio.samples().unwrap().as_ptr();
        let second = cardio.samples().unwrap();
        assert_eq!(second, first.as_slice());
        assert_eq!(second.as_ptr(), first_ptr);
    }

    #[test]
    fn test_empty_segment_yields_empty_series() {
        let mut cardio = GpxCardio::from_xml(gpx_doc(""), "empty.gpx");
        assert!(cardio.samples().unwrap().is_empty());
    }

    #[test]
    fn test_missing_track_is_malformed() {
        let xml = concat!(
            r#"<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1">"#,
            "<metadata/></gpx>"
        );
        let mut cardio = GpxCardio::from_xml(xml.to_string(), "bare.gpx");
        assert!(matches!(
            cardio.samples(),
            Err(CardioError::MalformedTrack(_))
        ));
    }

    #[test]
    fn test_missing_heart_rate_fails_without_partial_series() {
        let points = [
            track_point("2019-06-02T10:00:00Z", "70.0"),
            concat!(
                r#"<trkpt lat="40.417" lon="-3.703">"#,
                "<time>2019-06-02T10:00:05Z</time></trkpt>"
            )
            .to_string(),
        ]
        .concat();
        let mut cardio = GpxCardio::from_xml(gpx_doc(&points), "gap.gpx");
        assert!(matches!(
            cardio.samples(),
            Err(CardioError::MalformedTrack(_))
        ));
    }

    #[test]
    fn test_missing_time_is_malformed() {
        let point = concat!(
            r#"<trkpt lat="40.417" lon="-3.703">"#,
            "<extensions><gpxtpx:TrackPointExtension><gpxtpx:hr>70</gpxtpx:hr>",
            "</gpxtpx:TrackPointExtension></extensions></trkpt>"
        );
        let mut cardio = GpxCardio::from_xml(gpx_doc(point), "notime.gpx");
        assert!(matches!(
            cardio.samples(),
            Err(CardioError::MalformedTrack(_))
        ));
    }

    #[test]
    fn test_unparsable_xml_is_reported() {
        let mut cardio = GpxCardio::from_xml("<gpx><trk>".to_string(), "broken.gpx");
        assert!(matches!(cardio.samples(), Err(CardioError::XmlParse(_))));
    }

    #[test]
    fn test_point_time_layout() {
        let parsed = parse_point_time("2019-06-02T10:00:05Z").unwrap();
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2019, 6, 2)
                .unwrap()
                .and_hms_opt(10, 0, 5)
                .unwrap()
        );
        assert!(parse_point_time("2019-06-02 10:00:05").is_none());
        assert!(parse_point_time("2019-06-02T10:00:05").is_none());
        assert!(parse_point_time("2019-13-02T10:00:05Z").is_none());
        assert!(parse_point_time("garbage").is_none());
    }
}
