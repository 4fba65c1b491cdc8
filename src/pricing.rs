// src/pricing.rs
//
// Converts one frame's part detections into per-part monetary quotes.
// Pure over its inputs: the only effect is catalog lookups.

use crate::catalog::PriceCatalog;
use crate::error::PipelineError;
use crate::part_detection::{PartDetection, PartName};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Parts that are always replaced outright, never repaired.
const ALWAYS_REPLACE: [PartName; 2] = [PartName::Light, PartName::Windshield];

/// Above this share of the frame's total damaged area a part is replaced
/// rather than repaired.
const REPLACE_PERCENTAGE: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairOrReplace {
    Repair,
    Replace,
}

/// One part's cost estimate. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct PriceQuote {
    pub price: f64,
    pub total: f64,
    pub repair_or_replace: RepairOrReplace,
    pub percentage: f64,
}

/// Per-part quotes for one frame, keyed by part name. A part absent from
/// the catalog is excluded, not an error; a duplicate part name keeps the
/// later detection's quote. Catalog unavailability degrades to an empty
/// map.
pub fn estimate(
    catalog: &dyn PriceCatalog,
    brand: &str,
    model: &str,
    detections: &[PartDetection],
) -> BTreeMap<PartName, PriceQuote> {
    let total_area: f64 = detections.iter().map(|d| d.detection.area() as f64).sum();

    // Nothing detected, or all boxes degenerate: no pricing possible.
    if total_area == 0.0 {
        return BTreeMap::new();
    }

    let mut quotes = BTreeMap::new();

    for det in detections {
        let price = match catalog.lookup(brand, model, det.part) {
            Ok(Some(price)) => price,
            Ok(None) => continue,
            Err(e) => {
                let err = PipelineError::CatalogLookup(e.to_string());
                warn!(error = %err, "catalog unavailable, returning empty pricing");
                return BTreeMap::new();
            }
        };

        let box_area = det.detection.area() as f64;
        let percentage = box_area / total_area * 100.0;

        let (total, repair_or_replace) = if ALWAYS_REPLACE.contains(&det.part) {
            (price, RepairOrReplace::Replace)
        } else if percentage > REPLACE_PERCENTAGE {
            (price, RepairOrReplace::Replace)
        } else {
            ((price * percentage / 100.0).ceil(), RepairOrReplace::Repair)
        };

        quotes.insert(
            det.part,
            PriceQuote {
                price,
                total,
                repair_or_replace,
                percentage,
            },
        );
    }

    quotes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FileCatalog;
    use crate::types::DetectionBox;
    use anyhow::Result;

    fn part(name: PartName, x1: f32, y1: f32, x2: f32, y2: f32) -> PartDetection {
        PartDetection {
            part: name,
            detection: DetectionBox {
                bbox: [x1, y1, x2, y2],
                confidence: 0.9,
                class_id: 0,
            },
        }
    }

    fn catalog() -> FileCatalog {
        FileCatalog::from_rows([
            ("Toyota".into(), "Corolla".into(), "Door".into(), 200.0),
            ("Toyota".into(), "Corolla".into(), "Light".into(), 80.0),
            ("Toyota".into(), "Corolla".into(), "Windshield".into(), 300.0),
        ])
    }

    #[test]
    fn test_majority_area_is_replaced_at_unit_price() {
        // Door 90 units of area, Fender 10 (absent from catalog).
        let dets = vec![
            part(PartName::Door, 0.0, 0.0, 90.0, 1.0),
            part(PartName::Fender, 0.0, 0.0, 10.0, 1.0),
        ];
        let quotes = estimate(&catalog(), "Toyota", "Corolla", &dets);

        let door = &quotes[&PartName::Door];
        assert_eq!(door.repair_or_replace, RepairOrReplace::Replace);
        assert_eq!(door.total, 200.0);
        assert!((door.percentage - 90.0).abs() < 1e-9);
        // Fender has no catalog row: excluded silently
        assert!(!quotes.contains_key(&PartName::Fender));
    }

    #[test]
    fn test_minority_area_is_repaired_with_ceil() {
        let dets = vec![
            part(PartName::Door, 0.0, 0.0, 30.0, 1.0),
            part(PartName::Fender, 0.0, 0.0, 70.0, 1.0),
        ];
        let quotes = estimate(&catalog(), "Toyota", "Corolla", &dets);

        let door = &quotes[&PartName::Door];
        assert_eq!(door.repair_or_replace, RepairOrReplace::Repair);
        // ceil(200 * 30 / 100) = 60
        assert_eq!(door.total, 60.0);
        assert!((door.percentage - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_repair_total_rounds_up() {
        // Door at 1/3 of area: 200 * 33.33..% = 66.66.. -> 67
        let dets = vec![
            part(PartName::Door, 0.0, 0.0, 10.0, 1.0),
            part(PartName::Fender, 0.0, 0.0, 20.0, 1.0),
        ];
        let quotes = estimate(&catalog(), "Toyota", "Corolla", &dets);
        assert_eq!(quotes[&PartName::Door].total, 67.0);
    }

    #[test]
    fn test_light_and_windshield_always_replace() {
        // Tiny slivers of area, still a full replacement.
        let dets = vec![
            part(PartName::Light, 0.0, 0.0, 1.0, 1.0),
            part(PartName::Windshield, 0.0, 0.0, 2.0, 1.0),
            part(PartName::Door, 0.0, 0.0, 97.0, 1.0),
        ];
        let quotes = estimate(&catalog(), "Toyota", "Corolla", &dets);

        assert_eq!(
            quotes[&PartName::Light].repair_or_replace,
            RepairOrReplace::Replace
        );
        assert_eq!(quotes[&PartName::Light].total, 80.0);
        assert_eq!(
            quotes[&PartName::Windshield].repair_or_replace,
            RepairOrReplace::Replace
        );
        assert_eq!(quotes[&PartName::Windshield].total, 300.0);
    }

    #[test]
    fn test_zero_total_area_yields_empty_map() {
        assert!(estimate(&catalog(), "Toyota", "Corolla", &[]).is_empty());

        // Degenerate boxes only
        let dets = vec![part(PartName::Door, 5.0, 5.0, 5.0, 9.0)];
        assert!(estimate(&catalog(), "Toyota", "Corolla", &dets).is_empty());
    }

    #[test]
    fn test_duplicate_part_keeps_last_detection() {
        let dets = vec![
            part(PartName::Door, 0.0, 0.0, 10.0, 1.0),
            part(PartName::Fender, 0.0, 0.0, 60.0, 1.0),
            part(PartName::Door, 0.0, 0.0, 30.0, 1.0),
        ];
        let quotes = estimate(&catalog(), "Toyota", "Corolla", &dets);
        assert!((quotes[&PartName::Door].percentage - 30.0).abs() < 1e-9);
    }

    struct BrokenCatalog;

    impl PriceCatalog for BrokenCatalog {
        fn lookup(&self, _: &str, _: &str, _: PartName) -> Result<Option<f64>> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn test_catalog_unavailable_degrades_to_empty() {
        let dets = vec![part(PartName::Door, 0.0, 0.0, 10.0, 10.0)];
        assert!(estimate(&BrokenCatalog, "Toyota", "Corolla", &dets).is_empty());
    }
}
