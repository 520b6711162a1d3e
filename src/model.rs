//! Page and document types shared by every pipeline stage.
//!
//! [`PageInfo`] is produced by the classifier stage and only the smoother may
//! change it afterwards (and then only its `sub_type`). [`DocumentGroup`] is a
//! contiguous run of pages forming one logical sub-document, and
//! [`OutputArtifact`] is the planned sub-PDF written for a group.

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Enums ────────────────────────────────────────────────────────────────

/// Structural role of a page inside the scanned bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageType {
    /// Technical check sheet (KTKS) attached to a form.
    Ktks,
    /// Business form page (BM.xx templates).
    Bm,
    /// Original broadcast message as received.
    SourceMessage,
    /// Screenshot of a transmission log (FTP log screen).
    Log,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Ktks => "KTKS",
            PageType::Bm => "BM",
            PageType::SourceMessage => "SOURCE_MESSAGE",
            PageType::Log => "LOG",
        }
    }

    /// Parse a classifier label. Header markers map onto the type they open.
    pub fn from_label(label: &str) -> Option<Self> {
        match normalise_label(label).as_str() {
            "KTKS" => Some(PageType::Ktks),
            "BM" | "FORM" | "FORM_HEADER" => Some(PageType::Bm),
            "SOURCE_MESSAGE" | "SOURCE" | "SOURCE_HEADER" => Some(PageType::SourceMessage),
            "LOG" | "LOG_SCREEN" => Some(PageType::Log),
            _ => None,
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast service a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    /// Radiotelephony broadcast.
    Rtp,
    /// Enhanced Group Call (SafetyNET).
    Egc,
    /// NAVTEX.
    Ntx,
    Other,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Rtp => "RTP",
            ServiceType::Egc => "EGC",
            ServiceType::Ntx => "NTX",
            ServiceType::Other => "OTHER",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match normalise_label(label).as_str() {
            "RTP" | "RADIOTELEPHONY" => Some(ServiceType::Rtp),
            "EGC" | "SAFETYNET" | "INMARSAT_EGC" => Some(ServiceType::Egc),
            "NTX" | "NAVTEX" => Some(ServiceType::Ntx),
            "OTHER" => Some(ServiceType::Other),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content category of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubType {
    /// Meteorological.
    Met,
    /// Navigational warning.
    Nav,
    /// Search and rescue.
    Sar,
    Route,
    /// Weather.
    Wx,
    Other,
}

impl SubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubType::Met => "MET",
            SubType::Nav => "NAV",
            SubType::Sar => "SAR",
            SubType::Route => "ROUTE",
            SubType::Wx => "WX",
            SubType::Other => "OTHER",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match normalise_label(label).as_str() {
            "MET" | "METEO" | "METEOROLOGICAL" => Some(SubType::Met),
            "NAV" | "NAVAREA" | "NAVIGATIONAL" => Some(SubType::Nav),
            "SAR" => Some(SubType::Sar),
            "ROUTE" => Some(SubType::Route),
            "WX" | "WEATHER" => Some(SubType::Wx),
            "OTHER" => Some(SubType::Other),
            _ => None,
        }
    }

    /// `true` for every category except `OTHER`.
    pub fn is_specific(&self) -> bool {
        !matches!(self, SubType::Other)
    }
}

impl fmt::Display for SubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn normalise_label(label: &str) -> String {
    label.trim().to_ascii_uppercase().replace(['-', ' '], "_")
}

/// `Some` and not `OTHER`.
pub fn is_specific(sub_type: Option<SubType>) -> bool {
    sub_type.is_some_and(|s| s.is_specific())
}

// ── PageInfo ─────────────────────────────────────────────────────────────

/// Classification of one physical page.
///
/// `detected_sub_type` keeps the classifier's own answer; smoothing always
/// derives `sub_type` from the detected values so it can be re-applied
/// without drifting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// 1-based page number.
    pub page: usize,
    pub form_code: Option<String>,
    pub is_form_header: bool,
    /// `None` for a generic content page.
    pub page_type: Option<PageType>,
    pub service_type: Option<ServiceType>,
    pub sub_type: Option<SubType>,
    #[serde(default)]
    pub detected_sub_type: Option<SubType>,
    #[serde(default)]
    pub is_source_message_header: bool,
    #[serde(default)]
    pub is_log_page: bool,
}

impl PageInfo {
    /// A bare content page with nothing detected.
    pub fn new(page: usize) -> Self {
        Self {
            page,
            form_code: None,
            is_form_header: false,
            page_type: None,
            service_type: None,
            sub_type: None,
            detected_sub_type: None,
            is_source_message_header: false,
            is_log_page: false,
        }
    }

    pub fn with_form_code(mut self, code: impl Into<String>) -> Self {
        self.form_code = Some(code.into());
        self
    }

    pub fn with_page_type(mut self, page_type: PageType) -> Self {
        self.page_type = Some(page_type);
        self.is_log_page = page_type == PageType::Log;
        self
    }

    pub fn with_service(mut self, service: ServiceType) -> Self {
        self.service_type = Some(service);
        self
    }

    /// Sets both the detected and the effective subtype.
    pub fn with_sub_type(mut self, sub_type: SubType) -> Self {
        self.sub_type = Some(sub_type);
        self.detected_sub_type = Some(sub_type);
        self
    }

    pub fn form_header(mut self) -> Self {
        self.is_form_header = true;
        self
    }

    pub fn source_header(mut self) -> Self {
        self.page_type = Some(PageType::SourceMessage);
        self.is_source_message_header = true;
        self
    }

    /// Form code contains `fragment` (e.g. `"BM.01"`).
    pub fn has_form(&self, fragment: &str) -> bool {
        form_matches(self.form_code.as_deref(), fragment)
    }

    /// Any of the redundant header signals fires.
    pub fn starts_group(&self) -> bool {
        self.is_form_header || self.is_source_message_header || self.is_log_page
    }
}

pub(crate) fn form_matches(code: Option<&str>, fragment: &str) -> bool {
    code.is_some_and(|c| c.to_ascii_uppercase().contains(fragment))
}

// ── DocumentGroup ────────────────────────────────────────────────────────

/// Contiguous run of pages belonging to one logical document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentGroup {
    pub form_code: Option<String>,
    pub service_type: Option<ServiceType>,
    pub sub_type: Option<SubType>,
    /// Taken from the first page.
    pub page_type: Option<PageType>,
    pub pages: Vec<PageInfo>,
}

impl DocumentGroup {
    pub fn start_page(&self) -> usize {
        self.pages.first().map(|p| p.page).unwrap_or(0)
    }

    pub fn end_page(&self) -> usize {
        self.pages.last().map(|p| p.page).unwrap_or(0)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_log(&self) -> bool {
        self.page_type == Some(PageType::Log)
    }

    pub fn has_form(&self, fragment: &str) -> bool {
        form_matches(self.form_code.as_deref(), fragment)
    }

    /// Form code, else the page type label, else `"UNKNOWN"`.
    pub fn code(&self) -> String {
        match (&self.form_code, self.page_type) {
            (Some(code), _) => code.clone(),
            (None, Some(pt)) => pt.as_str().to_string(),
            (None, None) => "UNKNOWN".to_string(),
        }
    }
}

// ── OutputArtifact ───────────────────────────────────────────────────────

/// One planned sub-PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputArtifact {
    pub filename: String,
    pub destination_path: Vec<String>,
    /// Inclusive, 1-based.
    pub page_range: (usize, usize),
    pub code: String,
    pub service_type: Option<ServiceType>,
    pub sub_type: Option<SubType>,
    pub is_log: bool,
}

impl OutputArtifact {
    pub fn page_count(&self) -> usize {
        self.page_range.1 + 1 - self.page_range.0
    }

    /// `SEG/SEG/filename`.
    pub fn display_path(&self) -> String {
        let mut parts = self.destination_path.clone();
        parts.push(self.filename.clone());
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(PageType::from_label("source-message"), Some(PageType::SourceMessage));
        assert_eq!(PageType::from_label("LOG_SCREEN"), Some(PageType::Log));
        assert_eq!(PageType::from_label("content"), None);
        assert_eq!(ServiceType::from_label("navtex"), Some(ServiceType::Ntx));
        assert_eq!(SubType::from_label(" wx "), Some(SubType::Wx));
        assert_eq!(SubType::from_label("garbage"), None);
    }

    #[test]
    fn serde_uses_wire_names() {
        let page = PageInfo::new(3)
            .with_page_type(PageType::SourceMessage)
            .with_service(ServiceType::Egc)
            .with_sub_type(SubType::Met);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["pageType"], "SOURCE_MESSAGE");
        assert_eq!(json["serviceType"], "EGC");
        assert_eq!(json["subType"], "MET");
        assert_eq!(json["isFormHeader"], false);
    }

    #[test]
    fn log_page_type_sets_flag_and_starts_group() {
        let page = PageInfo::new(1).with_page_type(PageType::Log);
        assert!(page.is_log_page);
        assert!(page.starts_group());
        assert!(!PageInfo::new(2).with_page_type(PageType::Bm).starts_group());
    }

    #[test]
    fn form_match_ignores_case() {
        let page = PageInfo::new(1).with_form_code("qt.msi-bm.01");
        assert!(page.has_form("BM.01"));
        assert!(!page.has_form("BM.02"));
        assert!(!PageInfo::new(1).has_form("BM.01"));
    }

    #[test]
    fn group_code_falls_back_to_page_type() {
        let group = DocumentGroup {
            form_code: None,
            service_type: None,
            sub_type: None,
            page_type: Some(PageType::Log),
            pages: vec![PageInfo::new(4)],
        };
        assert_eq!(group.code(), "LOG");
        assert_eq!((group.start_page(), group.end_page()), (4, 4));
    }
}
