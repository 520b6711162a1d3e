//! Subtype smoothing: repair weakly classified pages from strong neighbours.
//!
//! Cover pages (BM.01), KTKS check sheets and pages the classifier could not
//! categorise rarely carry a reliable subtype of their own. They take the
//! subtype of the first strong page within [`FORWARD_WINDOW`] pages after
//! them, else of the nearest categorised page within [`BACKWARD_WINDOW`]
//! pages before them.
//!
//! Every decision reads `detected_sub_type` and only `sub_type` is written,
//! so the pass is a pure function of the classifier output and applying it
//! again changes nothing. Preview and write both call [`smooth_subtypes`].

use crate::model::{is_specific, PageInfo, PageType, SubType};
use tracing::debug;

/// Pages searched after a weak page for a strong one.
pub const FORWARD_WINDOW: usize = 20;

/// Pages searched before a weak page when the forward search fails.
pub const BACKWARD_WINDOW: usize = 10;

/// Whether a page's own subtype should not be trusted.
pub fn is_weak(page: &PageInfo) -> bool {
    !is_specific(page.detected_sub_type)
        || page.has_form("BM.01")
        || page.page_type == Some(PageType::Ktks)
}

/// Whether a page's subtype may be propagated forward onto weak pages.
pub fn is_strong(page: &PageInfo) -> bool {
    is_specific(page.detected_sub_type)
        && (page.page_type == Some(PageType::SourceMessage)
            || (page.form_code.is_some() && !page.has_form("BM.01")))
}

/// Smooth subtypes in place. Returns how many pages changed.
pub fn smooth_subtypes(pages: &mut [PageInfo]) -> usize {
    let resolved: Vec<Option<SubType>> = (0..pages.len())
        .map(|i| resolve(pages, i))
        .collect();

    let mut changed = 0;
    for (page, sub_type) in pages.iter_mut().zip(resolved) {
        if page.sub_type != sub_type {
            debug!(
                "Page {}: subtype {:?} → {:?}",
                page.page, page.sub_type, sub_type
            );
            page.sub_type = sub_type;
            changed += 1;
        }
    }
    changed
}

fn resolve(pages: &[PageInfo], i: usize) -> Option<SubType> {
    let page = &pages[i];
    if !is_weak(page) {
        return page.detected_sub_type;
    }

    let forward_end = (i + FORWARD_WINDOW).min(pages.len().saturating_sub(1));
    if let Some(strong) = pages[i + 1..=forward_end.max(i)]
        .iter()
        .find(|p| is_strong(p))
    {
        return strong.detected_sub_type;
    }

    let backward_start = i.saturating_sub(BACKWARD_WINDOW);
    if let Some(prior) = pages[backward_start..i]
        .iter()
        .rev()
        .find(|p| is_specific(p.detected_sub_type))
    {
        return prior.detected_sub_type;
    }

    page.detected_sub_type
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageType;

    fn other(page: usize) -> PageInfo {
        PageInfo::new(page).with_sub_type(SubType::Other)
    }

    fn source(page: usize, sub: SubType) -> PageInfo {
        PageInfo::new(page)
            .with_page_type(PageType::SourceMessage)
            .with_sub_type(sub)
    }

    fn subs(pages: &[PageInfo]) -> Vec<Option<SubType>> {
        pages.iter().map(|p| p.sub_type).collect()
    }

    #[test]
    fn forward_then_backward() {
        let mut pages = vec![other(1), other(2), source(3, SubType::Met), other(4)];
        smooth_subtypes(&mut pages);
        assert_eq!(subs(&pages), vec![Some(SubType::Met); 4]);
    }

    #[test]
    fn smoothing_is_idempotent() {
        let mut pages = vec![
            PageInfo::new(1)
                .with_page_type(PageType::Ktks)
                .with_form_code("QT.MSI-BM.02")
                .with_sub_type(SubType::Nav),
            PageInfo::new(2)
                .with_page_type(PageType::Ktks)
                .with_form_code("QT.MSI-BM.02")
                .with_sub_type(SubType::Nav),
            source(3, SubType::Met),
            PageInfo::new(4).with_form_code("QT.MSI-BM.01"),
            other(5),
        ];
        smooth_subtypes(&mut pages);
        let once = pages.clone();
        let changed = smooth_subtypes(&mut pages);
        assert_eq!(changed, 0);
        assert_eq!(pages, once);
    }

    #[test]
    fn cover_page_takes_following_form_subtype() {
        let mut pages = vec![
            PageInfo::new(1)
                .with_form_code("QT.MSI-BM.01")
                .with_sub_type(SubType::Nav),
            PageInfo::new(2)
                .with_form_code("QT.MSI-BM.02")
                .with_sub_type(SubType::Sar),
        ];
        smooth_subtypes(&mut pages);
        assert_eq!(pages[0].sub_type, Some(SubType::Sar));
        assert_eq!(pages[1].sub_type, Some(SubType::Sar));
    }

    #[test]
    fn strong_page_beyond_window_is_ignored() {
        let mut pages: Vec<PageInfo> = (1..=22).map(PageInfo::new).collect();
        pages.push(source(23, SubType::Wx));
        smooth_subtypes(&mut pages);
        // page 1 is 22 pages before the strong page
        assert_eq!(pages[0].sub_type, None);
        // page 3 is exactly 20 pages before it
        assert_eq!(pages[2].sub_type, Some(SubType::Wx));
    }

    #[test]
    fn backward_window_is_ten_pages() {
        let mut pages = vec![source(1, SubType::Route)];
        pages.extend((2..=13).map(other));
        smooth_subtypes(&mut pages);
        assert_eq!(pages[10].sub_type, Some(SubType::Route)); // page 11
        assert_eq!(pages[11].sub_type, Some(SubType::Other)); // page 12
    }

    #[test]
    fn unresolved_page_is_left_alone() {
        let mut pages = vec![other(1), PageInfo::new(2)];
        assert_eq!(smooth_subtypes(&mut pages), 0);
        assert_eq!(subs(&pages), vec![Some(SubType::Other), None]);
    }

    #[test]
    fn only_sub_type_changes() {
        let mut pages = vec![
            PageInfo::new(1)
                .with_form_code("QT.MSI-BM.01")
                .with_page_type(PageType::Ktks)
                .form_header(),
            source(2, SubType::Nav),
        ];
        smooth_subtypes(&mut pages);
        assert_eq!(pages[0].form_code.as_deref(), Some("QT.MSI-BM.01"));
        assert_eq!(pages[0].page_type, Some(PageType::Ktks));
        assert!(pages[0].is_form_header);
        assert_eq!(pages[0].detected_sub_type, None);
        assert_eq!(pages[0].sub_type, Some(SubType::Nav));
    }

    #[test]
    fn empty_input() {
        let mut pages: Vec<PageInfo> = vec![];
        assert_eq!(smooth_subtypes(&mut pages), 0);
    }
}
