use serde::{Deserialize, Serialize};

/// Read-only projection of one search-result record, built once per
/// summarization request and serialized into the summary prompt. The search
/// collaborator supplies the structured fields; the free-text scanners below
/// fill in whatever the record itself did not carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArticleDigest {
    pub title: String,
    pub conditions: Vec<String>,
    pub acupoints: Vec<String>,
    pub meridians: Vec<String>,
    pub special_point_categories: Vec<String>,
    pub body_regions: Vec<String>,
    pub surface_regions: Vec<String>,
    pub authors: String,
    pub year: String,
    pub country: String,
    pub journal: String,
    pub methodology: String,
}

const MERIDIANS: &[&str] = &[
    "Lung",
    "Large Intestine",
    "Stomach",
    "Spleen",
    "Heart",
    "Small Intestine",
    "Bladder",
    "Kidney",
    "Pericardium",
    "Triple Energizer",
    "San Jiao",
    "Gallbladder",
    "Liver",
    "LU",
    "LI",
    "ST",
    "SP",
    "HT",
    "SI",
    "BL",
    "KI",
    "PC",
    "TE",
    "SJ",
    "GB",
    "LR",
];

const SPECIAL_POINT_CATEGORIES: &[&str] = &[
    "Yuan-Source",
    "Luo-Connecting",
    "Xi-Cleft",
    "Back-Shu",
    "Front-Mu",
    "Five-Shu",
    "Jing-Well",
    "Ying-Spring",
    "Shu-Stream",
    "Jing-River",
    "He-Sea",
    "Lower He-Sea",
    "Hui-Meeting",
    "Confluent",
    "Influential",
    "Window of the Sky",
    "Eight Convergences",
];

const BODY_REGIONS: &[&str] = &[
    "head",
    "face",
    "neck",
    "chest",
    "abdomen",
    "back",
    "upper limb",
    "arm",
    "forearm",
    "hand",
    "lower limb",
    "thigh",
    "leg",
    "foot",
    "thorax",
    "trunk",
];

/// Study-design labels checked in order; the first match wins.
const METHODOLOGIES: &[(&[&str], &str)] = &[
    (&["randomized", "rct"], "Randomized Controlled Trial (RCT)"),
    (&["systematic review"], "Systematic Review"),
    (&["meta-analysis"], "Meta-Analysis"),
    (&["case stud"], "Case Study"),
    (&["clinical trial"], "Clinical Trial"),
    (&["observational"], "Observational Study"),
    (&["cohort study"], "Cohort Study"),
];

fn scan_vocabulary(text_lower: &str, vocabulary: &[&str]) -> Vec<String> {
    let mut found = Vec::new();
    for term in vocabulary {
        if text_lower.contains(&term.to_lowercase()) && !found.iter().any(|f| f == term) {
            found.push(term.to_string());
        }
    }
    found
}

/// Map record text to a study-design label, or empty when nothing matches.
pub fn infer_methodology(text: &str) -> String {
    let lower = text.to_lowercase();
    for (needles, label) in METHODOLOGIES {
        if needles.iter().any(|n| lower.contains(n)) {
            return label.to_string();
        }
    }
    String::new()
}

impl ArticleDigest {
    /// Enrich a digest by scanning the record's full text for meridians,
    /// special-point categories, body regions, and a methodology label.
    /// Fields the record already populated are left alone.
    pub fn enrich_from_text(mut self, record_text: &str) -> Self {
        let lower = record_text.to_lowercase();
        if self.meridians.is_empty() {
            self.meridians = scan_vocabulary(&lower, MERIDIANS);
        }
        if self.special_point_categories.is_empty() {
            self.special_point_categories = scan_vocabulary(&lower, SPECIAL_POINT_CATEGORIES);
        }
        if self.body_regions.is_empty() {
            self.body_regions = scan_vocabulary(&lower, BODY_REGIONS);
        }
        if self.methodology.is_empty() {
            self.methodology = infer_methodology(record_text);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methodology_first_match_wins() {
        assert_eq!(
            infer_methodology("A randomized trial of acupuncture"),
            "Randomized Controlled Trial (RCT)"
        );
        // "randomized" outranks "clinical trial" even when both appear.
        assert_eq!(
            infer_methodology("a randomized clinical trial"),
            "Randomized Controlled Trial (RCT)"
        );
        assert_eq!(
            infer_methodology("a systematic review of 12 studies"),
            "Systematic Review"
        );
        assert_eq!(infer_methodology("case studies from three clinics"), "Case Study");
        assert_eq!(infer_methodology("an interview survey"), "");
    }

    #[test]
    fn enrich_scans_vocabularies_case_insensitively() {
        let digest = ArticleDigest {
            title: "Electroacupuncture at ST36".to_string(),
            ..Default::default()
        }
        .enrich_from_text("Electroacupuncture at ST36 on the STOMACH meridian for the lower limb; an observational design");

        assert!(digest.meridians.iter().any(|m| m == "Stomach"));
        assert!(digest.body_regions.iter().any(|r| r == "lower limb"));
        assert_eq!(digest.methodology, "Observational Study");
    }

    #[test]
    fn enrich_keeps_prepopulated_fields() {
        let digest = ArticleDigest {
            meridians: vec!["Bladder".to_string()],
            methodology: "Systematic Review".to_string(),
            ..Default::default()
        }
        .enrich_from_text("a randomized trial on the Lung meridian");

        assert_eq!(digest.meridians, vec!["Bladder".to_string()]);
        assert_eq!(digest.methodology, "Systematic Review");
    }
}
