//! Pure candidate classification.
//!
//! Geometry decides the orientation bucket, tags decide the adult prefix,
//! and popularity gates the result. Rejection is the normal outcome for most
//! records and is never reported as an error. The one network-touching part
//! of classification (fetching a missing popularity count) lives with the
//! strategies; this module only ever looks at values it is handed.

use crate::catalog::CandidateRecord;
use crate::config::{HarvestPolicy, Orientation};

/// Aspect-ratio band (exclusive) for the wide/tall buckets.
const RATIO_BAND: (f32, f32) = (1.4, 2.15);

/// Tag fragment marking adult content.
const ADULT_TAG_MARKER: &str = "r-18";

/// Bucket path segment prepended for adult-tagged records.
const ADULT_BUCKET: &str = "adult";

/// A classified, accepted record awaiting download.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Catalog id.
    pub id: String,
    /// Source URL of the original asset as reported by the catalog.
    pub source_url: String,
    /// Long side / short side.
    pub ratio: f32,
    /// Storage sub-path, e.g. `wide` or `adult/tall`. Strategies prepend
    /// their own root segment (keyword, author name) before dispatch.
    pub bucket: String,
}

/// Whether the popularity gate applies to this record.
///
/// Deep graph-walk candidates skip it: each check on a record without an
/// inline count would cost one extra catalog call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopularityCheck {
    /// Reject records below the policy minimum.
    Enforce,
    /// Accept regardless of popularity.
    Skip,
}

/// Classifies a record against the policy.
///
/// Returns the accepted [`Candidate`] or `None` for the (silent, expected)
/// rejection. `popularity` is the resolved bookmark count when the caller
/// had or fetched one; `None` with [`PopularityCheck::Enforce`] rejects,
/// since an unverifiable record must not bypass the gate.
#[must_use]
pub fn classify(
    record: &CandidateRecord,
    policy: &HarvestPolicy,
    popularity: Option<u64>,
    check: PopularityCheck,
) -> Option<Candidate> {
    let source_url = record.original_url()?.to_owned();

    let (w, h) = (record.width, record.height);
    if w == 0 || h == 0 {
        return None;
    }
    let (max, min) = if w > h { (w, h) } else { (h, w) };
    #[allow(clippy::cast_precision_loss)]
    let ratio = max as f32 / min as f32;

    let orientation = if max >= policy.size_floor && min >= policy.companion_floor {
        if ratio > RATIO_BAND.0 && ratio < RATIO_BAND.1 {
            if w > h { Orientation::Wide } else { Orientation::Tall }
        } else {
            Orientation::Other
        }
    } else {
        Orientation::Small
    };
    if !policy.accepts(orientation) {
        return None;
    }

    let adult = record
        .tags
        .iter()
        .any(|tag| tag.to_lowercase().contains(ADULT_TAG_MARKER));
    if adult && !policy.allow_adult {
        return None;
    }

    if check == PopularityCheck::Enforce && popularity.unwrap_or(0) < policy.min_bookmarks {
        return None;
    }

    let bucket = if adult {
        format!("{ADULT_BUCKET}/{}", orientation.bucket_name())
    } else {
        orientation.bucket_name().to_owned()
    };

    Some(Candidate {
        id: record.id.clone(),
        source_url,
        ratio,
        bucket,
    })
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn record(width: u32, height: u32) -> CandidateRecord {
        CandidateRecord::for_test("12345", "https://cdn.example/img/12345_p0.jpg", width, height)
    }

    fn policy(orientations: &[Orientation]) -> HarvestPolicy {
        HarvestPolicy {
            orientations: orientations.to_vec(),
            ..HarvestPolicy::default()
        }
    }

    #[test]
    fn test_wide_bucket_for_landscape_in_band() {
        let candidate = classify(
            &record(2000, 1000),
            &policy(&[Orientation::Wide]),
            Some(5000),
            PopularityCheck::Enforce,
        )
        .expect("2000x1000 is wide");
        assert_eq!(candidate.bucket, "wide");
        assert!((candidate.ratio - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_tall_bucket_for_portrait_in_band() {
        let candidate = classify(
            &record(1000, 2000),
            &policy(&[Orientation::Tall]),
            Some(5000),
            PopularityCheck::Enforce,
        )
        .expect("1000x2000 is tall");
        assert_eq!(candidate.bucket, "tall");
    }

    #[test]
    fn test_out_of_band_ratio_is_other_only_when_allowed() {
        let rec = record(3000, 1000);
        assert!(
            classify(
                &rec,
                &policy(&[Orientation::Wide, Orientation::Tall]),
                Some(5000),
                PopularityCheck::Enforce,
            )
            .is_none()
        );
        let candidate = classify(
            &rec,
            &policy(&[Orientation::Other]),
            Some(5000),
            PopularityCheck::Enforce,
        )
        .expect("ratio 3.0 goes to other when allowed");
        assert_eq!(candidate.bucket, "other");
    }

    #[test]
    fn test_below_floor_is_small_only_when_allowed() {
        let rec = record(1200, 800);
        assert!(
            classify(
                &rec,
                &policy(&[Orientation::Wide]),
                Some(5000),
                PopularityCheck::Enforce,
            )
            .is_none()
        );
        let candidate = classify(
            &rec,
            &policy(&[Orientation::Small]),
            Some(5000),
            PopularityCheck::Enforce,
        )
        .expect("below floors goes to small when allowed");
        assert_eq!(candidate.bucket, "small");
    }

    #[test]
    fn test_popularity_threshold_boundary() {
        let rec = record(2000, 1000);
        let p = policy(&[Orientation::Wide]);
        assert!(classify(&rec, &p, Some(999), PopularityCheck::Enforce).is_none());
        assert!(classify(&rec, &p, Some(1000), PopularityCheck::Enforce).is_some());
    }

    #[test]
    fn test_popularity_skip_accepts_unknown_count() {
        let rec = record(2000, 1000);
        let p = policy(&[Orientation::Wide]);
        assert!(classify(&rec, &p, None, PopularityCheck::Enforce).is_none());
        assert!(classify(&rec, &p, None, PopularityCheck::Skip).is_some());
    }

    #[test]
    fn test_adult_tag_prefixes_or_rejects() {
        let mut rec = record(2000, 1000);
        rec.tags = vec!["scenery".into(), "R-18".into()];

        let mut p = policy(&[Orientation::Wide]);
        assert!(classify(&rec, &p, Some(5000), PopularityCheck::Enforce).is_none());

        p.allow_adult = true;
        let candidate =
            classify(&rec, &p, Some(5000), PopularityCheck::Enforce).expect("adult allowed");
        assert_eq!(candidate.bucket, "adult/wide");
    }

    #[test]
    fn test_missing_source_url_rejects() {
        let mut rec = record(2000, 1000);
        rec.image_urls.clear();
        assert!(
            classify(
                &rec,
                &policy(&[Orientation::Wide]),
                Some(5000),
                PopularityCheck::Enforce,
            )
            .is_none()
        );
    }

    #[test]
    fn test_zero_dimension_rejects() {
        assert!(
            classify(
                &record(0, 1000),
                &policy(&[Orientation::Small]),
                Some(5000),
                PopularityCheck::Enforce,
            )
            .is_none()
        );
    }
}
