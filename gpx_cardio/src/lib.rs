//! Heart-rate series extraction and time alignment for GPX recordings.
//!
//! A [`GpxCardio`] wraps one GPX 1.1 document carrying Garmin track-point
//! extensions and yields the ordered (timestamp, bpm) samples found in its
//! first track segment. The [`align`] helpers convert absolute timestamps
//! into elapsed seconds from a reference instant so that one or two
//! recordings can be handed to a charting sink on a shared time axis.

mod align;
mod extract;

pub use align::{align, align_comparison, align_from_start, start_reference, AlignedPoint};
pub use extract::{GpxCardio, GPX_NS, TPX_NS};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CardioError {
    #[error("failed to read GPX file: {0}")]
    Unreadable(String),
    #[error("failed to parse GPX XML: {0}")]
    XmlParse(String),
    #[error("malformed track data: {0}")]
    MalformedTrack(String),
    #[error("cannot derive a time reference from an empty series")]
    EmptySeries,
}

/// One heart-rate reading: the track point's timestamp and the beats per
/// minute recorded at it. Timestamps are naive; the `Z` suffix in GPX time
/// strings is stripped, never interpreted as a zone.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: NaiveDateTime,
    pub bpm: f64,
}
