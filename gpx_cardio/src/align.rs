use chrono::NaiveDateTime;

use crate::{CardioError, Sample};

/// Elapsed whole seconds from a reference instant, plus heart rate.
/// Fractional seconds are truncated. The offset is signed: a sample
/// earlier than the reference comes out negative.
pub type AlignedPoint = (i64, f64);

/// Re-anchors every sample to whole seconds elapsed since `reference`.
pub fn align(samples: &[Sample], reference: NaiveDateTime) -> Vec<AlignedPoint> {
    samples
        .iter()
        .map(|s| ((s.time - reference).num_seconds(), s.bpm))
        .collect()
}

/// The timestamp of the first sample, used as the alignment origin.
pub fn start_reference(samples: &[Sample]) -> Result<NaiveDateTime, CardioError> {
    samples
        .first()
        .map(|s| s.time)
        .ok_or(CardioError::EmptySeries)
}

/// Aligns a series against its own first sample, so the result starts at
/// elapsed second zero.
pub fn align_from_start(samples: &[Sample]) -> Result<Vec<AlignedPoint>, CardioError> {
    Ok(align(samples, start_reference(samples)?))
}

/// Aligns two series against the first sample of `a`, giving both a shared
/// time origin for overlaid plotting.
///
/// Caller contract: `a` is the recording that starts first. This is not
/// checked; if `b` begins earlier, its offsets come out negative.
pub fn align_comparison(
    a: &[Sample],
    b: &[Sample],
) -> Result<(Vec<AlignedPoint>, Vec<AlignedPoint>), CardioError> {
    let reference = start_reference(a)?;
    Ok((align(a, reference), align(b, reference)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample(h: u32, m: u32, s: u32, bpm: f64) -> Sample {
        Sample {
            time: NaiveDate::from_ymd_opt(2019, 6, 2)
                .unwrap()
                .and_hms_opt(h, m, s)
                .unwrap(),
            bpm,
        }
    }

    #[test]
    fn test_align_from_start_anchors_at_zero() {
        let series = vec![
            sample(10, 0, 0, 70.0),
            sample(10, 0, 5, 72.5),
            sample(10, 0, 12, 75.0),
        ];
        let aligned = align_from_start(&series).unwrap();
        assert_eq!(aligned, vec![(0, 70.0), (5, 72.5), (12, 75.0)]);
        assert!(aligned.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn test_empty_series_has_no_reference() {
        assert!(matches!(
            align_from_start(&[]),
            Err(CardioError::EmptySeries)
        ));
        assert!(matches!(
            align_comparison(&[], &[sample(10, 0, 0, 70.0)]),
            Err(CardioError::EmptySeries)
        ));
    }

    #[test]
    fn test_comparison_shares_first_series_origin() {
        let a = vec![sample(10, 0, 0, 70.0), sample(10, 0, 5, 72.0)];
        let b = vec![sample(10, 0, 3, 80.0), sample(10, 0, 9, 82.0)];
        let (aligned_a, aligned_b) = align_comparison(&a, &b).unwrap();
        assert_eq!(aligned_a[0].0, 0);
        assert_eq!(aligned_b, vec![(3, 80.0), (9, 82.0)]);
    }

    #[test]
    fn test_out_of_order_comparison_keeps_negative_offsets() {
        let a = vec![sample(10, 0, 10, 70.0)];
        let b = vec![sample(10, 0, 4, 90.0)];
        let (aligned_a, aligned_b) = align_comparison(&a, &b).unwrap();
        assert_eq!(aligned_a[0].0, 0);
        assert_eq!(aligned_b[0].0, -6);
    }
}
