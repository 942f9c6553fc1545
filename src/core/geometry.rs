use crate::types::{BoundingBox, Roi, SarError, SarResult, Subswath};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-subswath extents of one acquisition
pub type Footprint = BTreeMap<Subswath, BoundingBox>;

/// How to pick one subswath when a region overlaps several
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SwathPolicy {
    /// First overlapping subswath in ascending id order
    #[default]
    LowestId,
    /// Subswath sharing the largest area with the region; ties go to the lower id
    LargestOverlap,
}

/// Picks the subswath(s) of a footprint that a region of interest touches
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometrySelector {
    policy: SwathPolicy,
}

impl GeometrySelector {
    pub fn new(policy: SwathPolicy) -> Self {
        Self { policy }
    }

    /// Every subswath whose extent overlaps `roi`, empty when none does
    pub fn select_all(&self, footprint: &Footprint, roi: &Roi) -> BTreeSet<Subswath> {
        let region = roi.to_bounding_box();
        footprint
            .iter()
            .filter(|(_, bbox)| bbox.intersects(&region))
            .map(|(subswath, _)| *subswath)
            .collect()
    }

    /// One overlapping subswath and the region clipped to its extent.
    ///
    /// No overlap at all is a geometry error carrying the offending region.
    pub fn select_one(&self, footprint: &Footprint, roi: &Roi) -> SarResult<(Subswath, Roi)> {
        let candidates: Vec<(Subswath, Roi)> = footprint
            .iter()
            .filter_map(|(subswath, bbox)| roi.clip_to(bbox).map(|clipped| (*subswath, clipped)))
            .collect();

        let chosen = match self.policy {
            SwathPolicy::LowestId => candidates.into_iter().next(),
            SwathPolicy::LargestOverlap => {
                let mut best: Option<(Subswath, Roi)> = None;
                for candidate in candidates {
                    let larger = best
                        .as_ref()
                        .map_or(true, |(_, best_roi)| area(&candidate.1) > area(best_roi));
                    if larger {
                        best = Some(candidate);
                    }
                }
                best
            }
        };

        let (subswath, clipped) = chosen.ok_or(SarError::Geometry { roi: *roi })?;
        log::info!("Found subswath {} to process, clipped region {}", subswath.id(), clipped);
        Ok((subswath, clipped))
    }

    /// Full extent of an explicitly requested subswath
    pub fn swath_extent(&self, footprint: &Footprint, subswath: Subswath) -> SarResult<Roi> {
        footprint
            .get(&subswath)
            .map(Roi::from_bounding_box)
            .ok_or_else(|| {
                SarError::Input(format!(
                    "Sub-swath {} is not present in the reference acquisition",
                    subswath.id()
                ))
            })
    }
}

fn area(roi: &Roi) -> f64 {
    roi.to_bounding_box().area()
}

/// [`GeometrySelector::select_all`] with the default policy
pub fn select_all(footprint: &Footprint, roi: &Roi) -> BTreeSet<Subswath> {
    GeometrySelector::default().select_all(footprint, roi)
}

/// [`GeometrySelector::select_one`] with the default "lowest id wins" policy
pub fn select_one(footprint: &Footprint, roi: &Roi) -> SarResult<(Subswath, Roi)> {
    GeometrySelector::default().select_one(footprint, roi)
}
