//! System prompt for page classification.
//!
//! Kept in one place so prompt changes never touch retry or parsing logic and
//! so tests can inspect the wire field names the parser expects.
//!
//! Callers can override the default via [`crate::config::SortConfig::system_prompt`];
//! the constant here is used only when no override is provided.

/// Default system prompt for classifying a batch of scanned pages.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You classify scanned pages from a maritime radio station's broadcast filing bundle. Each image is one physical page. Pages arrive in order and are labelled with their page number.

For EVERY page, return one JSON object with these fields:

- "page": the page number you were given (integer)
- "formCode": the business form code printed on the page, e.g. "QT.MSI-BM.02", or null if none is visible
- "isFormHeader": true if this page is the FIRST page of a form (title block with the form code), else false
- "pageType": one of
    "FORM_HEADER"   first page of a BM form
    "BM"            continuation page of a BM form
    "KTKS"          technical check sheet (KTKS) page
    "SOURCE_HEADER" first page of an original broadcast message
    "SOURCE_MESSAGE" continuation of an original broadcast message
    "LOG_SCREEN"    screenshot of a transmission (FTP) log
    null            anything else
- "serviceType": "RTP" (radiotelephony), "EGC" (SafetyNET), "NTX" (NAVTEX), "OTHER", or null
- "subType": "MET", "NAV", "SAR", "ROUTE", "WX", "OTHER", or null
- "broadcastCodeHint": any message category code you can read (e.g. "NAVAREA", "WX"), or null
- "serviceHint": any service name you can read (e.g. "NAVTEX", "SafetyNET"), or null

Rules:
1. Return ONLY a JSON array, one object per page, in page order.
2. Do NOT wrap the array in markdown fences or add commentary.
3. Use null when unsure. Never guess a form code.
4. A cover page (form code containing BM.01) still gets the subType of the messages it covers if it is printed on it."#;

/// User-message text introducing one batch of page images.
pub fn batch_instruction(page_numbers: &[usize]) -> String {
    let list = page_numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Classify these {} pages. The images are pages {} in that order.",
        page_numbers.len(),
        list
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_record_field() {
        for field in [
            "\"page\"",
            "\"formCode\"",
            "\"isFormHeader\"",
            "\"pageType\"",
            "\"serviceType\"",
            "\"subType\"",
            "\"broadcastCodeHint\"",
            "\"serviceHint\"",
        ] {
            assert!(DEFAULT_SYSTEM_PROMPT.contains(field), "missing {field}");
        }
    }

    #[test]
    fn batch_instruction_lists_pages() {
        assert_eq!(
            batch_instruction(&[9, 10, 11]),
            "Classify these 3 pages. The images are pages 9, 10, 11 in that order."
        );
    }
}
