use serde::{Deserialize, Serialize};

use crate::error::NormalizeError;

/// A half-open pixel range `[start, stop)` fit independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub stop: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }
}

/// Ordered, disjoint, non-empty segments of the wavelength axis.
///
/// Detector-chip edges are left out of every range, so the segments need
/// not cover the whole axis. Deserializes from `[[start, stop], ...]` and
/// is validated on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[usize; 2]>", into = "Vec<[usize; 2]>")]
pub struct SegmentRanges(Vec<Segment>);

impl SegmentRanges {
    pub fn new(pairs: &[(usize, usize)]) -> Result<Self, NormalizeError> {
        if pairs.is_empty() {
            return Err(NormalizeError::malformed("no segment ranges given"));
        }
        let mut segments = Vec::with_capacity(pairs.len());
        let mut prev_stop = 0usize;
        for (i, &(start, stop)) in pairs.iter().enumerate() {
            if start >= stop {
                return Err(NormalizeError::malformed(format!(
                    "segment {i} [{start}, {stop}) is empty"
                )));
            }
            if i > 0 && start < prev_stop {
                return Err(NormalizeError::malformed(format!(
                    "segment {i} [{start}, {stop}) overlaps or precedes the previous one ending at {prev_stop}"
                )));
            }
            prev_stop = stop;
            segments.push(Segment { start, stop });
        }
        Ok(SegmentRanges(segments))
    }

    /// The APOGEE chip layout with roughly 50 edge pixels dropped per chip.
    pub fn apogee() -> Self {
        SegmentRanges(vec![
            Segment { start: 371, stop: 3192 },
            Segment { start: 3697, stop: 5997 },
            Segment { start: 6461, stop: 8255 },
        ])
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.0.iter()
    }

    /// Check that every segment lies inside an axis of `npix` pixels.
    pub fn check_bounds(&self, npix: usize) -> Result<(), NormalizeError> {
        match self.0.last() {
            Some(last) if last.stop > npix => Err(NormalizeError::malformed(format!(
                "segment [{}, {}) exceeds wavelength axis of {npix} pixels",
                last.start, last.stop
            ))),
            _ => Ok(()),
        }
    }
}

impl TryFrom<Vec<[usize; 2]>> for SegmentRanges {
    type Error = NormalizeError;

    fn try_from(pairs: Vec<[usize; 2]>) -> Result<Self, Self::Error> {
        let pairs: Vec<(usize, usize)> = pairs.into_iter().map(|[a, b]| (a, b)).collect();
        SegmentRanges::new(&pairs)
    }
}

impl From<SegmentRanges> for Vec<[usize; 2]> {
    fn from(ranges: SegmentRanges) -> Self {
        ranges.0.iter().map(|s| [s.start, s.stop]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_overlapping_and_unordered() {
        assert!(SegmentRanges::new(&[]).is_err());
        assert!(SegmentRanges::new(&[(5, 5)]).is_err());
        assert!(SegmentRanges::new(&[(6, 2)]).is_err());
        assert!(SegmentRanges::new(&[(0, 10), (9, 20)]).is_err());
        assert!(SegmentRanges::new(&[(10, 20), (0, 5)]).is_err());
        assert!(SegmentRanges::new(&[(0, 10), (10, 20)]).is_ok());
    }

    #[test]
    fn test_bounds() {
        let ranges = SegmentRanges::new(&[(1, 3), (5, 7)]).unwrap();
        assert!(ranges.check_bounds(7).is_ok());
        assert!(ranges.check_bounds(6).is_err());
    }

    #[test]
    fn test_apogee_layout_is_valid() {
        let apogee = SegmentRanges::apogee();
        let pairs: Vec<(usize, usize)> = apogee.iter().map(|s| (s.start, s.stop)).collect();
        assert_eq!(SegmentRanges::new(&pairs).unwrap(), apogee);
        assert!(apogee.check_bounds(8575).is_ok());
    }

    #[test]
    fn test_deserializes_from_pairs() {
        let ranges: SegmentRanges = serde_json::from_str("[[0, 4], [6, 9]]").unwrap();
        assert_eq!(ranges.segments().len(), 2);
        assert_eq!(ranges.segments()[1], Segment { start: 6, stop: 9 });

        let bad: Result<SegmentRanges, _> = serde_json::from_str("[[4, 0]]");
        assert!(bad.is_err());

        let json = serde_json::to_string(&ranges).unwrap();
        assert_eq!(json, "[[0,4],[6,9]]");
    }
}
