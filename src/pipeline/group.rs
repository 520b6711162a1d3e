//! Page grouping: split the smoothed page sequence into logical documents.
//!
//! A new group starts on any header signal (form header, source-message
//! header, log screen). The classifier reports these redundantly, so they are
//! OR-ed. A group takes its form code from its opening page and its service
//! and subtype from the first page that has one.

use crate::model::{DocumentGroup, PageInfo};
use tracing::debug;

/// Segment `pages` (already smoothed, in page order) into groups.
///
/// The groups partition the input exactly: concatenating their pages yields
/// `pages` unchanged. Zero pages yield zero groups.
pub fn group_pages(pages: &[PageInfo]) -> Vec<DocumentGroup> {
    let mut groups: Vec<DocumentGroup> = Vec::new();
    let mut current: Option<DocumentGroup> = None;

    for page in pages {
        match current.as_mut() {
            Some(group) if !page.starts_group() => {
                if group.service_type.is_none() {
                    group.service_type = page.service_type;
                }
                if group.sub_type.is_none() {
                    group.sub_type = page.sub_type;
                }
                group.pages.push(page.clone());
            }
            _ => {
                if let Some(done) = current.take() {
                    groups.push(done);
                }
                current = Some(open_group(page));
            }
        }
    }

    if let Some(done) = current {
        groups.push(done);
    }

    debug!("Grouped {} pages into {} documents", pages.len(), groups.len());
    groups
}

fn open_group(page: &PageInfo) -> DocumentGroup {
    DocumentGroup {
        // A leading run without a header has no form of its own.
        form_code: if page.starts_group() {
            page.form_code.clone()
        } else {
            None
        },
        service_type: page.service_type,
        sub_type: page.sub_type,
        page_type: page.page_type,
        pages: vec![page.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PageType, ServiceType, SubType};

    fn header(page: usize, code: &str) -> PageInfo {
        PageInfo::new(page).with_form_code(code).form_header()
    }

    fn ranges(groups: &[DocumentGroup]) -> Vec<(usize, usize)> {
        groups.iter().map(|g| (g.start_page(), g.end_page())).collect()
    }

    #[test]
    fn zero_pages_zero_groups() {
        assert!(group_pages(&[]).is_empty());
    }

    #[test]
    fn no_header_means_one_group() {
        let pages: Vec<PageInfo> = (1..=4)
            .map(|n| PageInfo::new(n).with_form_code("QT.MSI-BM.02"))
            .collect();
        let groups = group_pages(&pages);
        assert_eq!(ranges(&groups), vec![(1, 4)]);
        assert_eq!(groups[0].form_code, None);
    }

    #[test]
    fn headers_split_groups() {
        let mut pages: Vec<PageInfo> = (1..=10).map(PageInfo::new).collect();
        pages[0] = header(1, "QT.MSI-BM.01");
        pages[3] = header(4, "QT.MSI-BM.02");
        pages[7] = header(8, "QT.MSI-BM.04");
        let groups = group_pages(&pages);
        assert_eq!(ranges(&groups), vec![(1, 3), (4, 7), (8, 10)]);
        assert_eq!(groups[1].form_code.as_deref(), Some("QT.MSI-BM.02"));
    }

    #[test]
    fn source_and_log_markers_also_split() {
        let pages = vec![
            header(1, "QT.MSI-BM.02"),
            PageInfo::new(2).source_header(),
            PageInfo::new(3).with_page_type(PageType::SourceMessage),
            PageInfo::new(4).with_page_type(PageType::Log),
            PageInfo::new(5).with_page_type(PageType::Log),
        ];
        let groups = group_pages(&pages);
        assert_eq!(ranges(&groups), vec![(1, 1), (2, 3), (4, 4), (5, 5)]);
        assert!(groups[2].is_log());
    }

    #[test]
    fn first_value_wins_when_backfilling() {
        let pages = vec![
            header(1, "QT.MSI-BM.03"),
            PageInfo::new(2).with_service(ServiceType::Egc),
            PageInfo::new(3)
                .with_service(ServiceType::Ntx)
                .with_sub_type(SubType::Nav),
            PageInfo::new(4).with_sub_type(SubType::Met),
        ];
        let groups = group_pages(&pages);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].service_type, Some(ServiceType::Egc));
        assert_eq!(groups[0].sub_type, Some(SubType::Nav));
    }

    #[test]
    fn leading_content_group_has_no_form_code() {
        let pages = vec![
            PageInfo::new(1)
                .with_form_code("QT.MSI-BM.02")
                .with_service(ServiceType::Rtp),
            header(2, "QT.MSI-BM.04"),
        ];
        let groups = group_pages(&pages);
        assert_eq!(groups[0].form_code, None);
        assert_eq!(groups[0].service_type, Some(ServiceType::Rtp));
        assert_eq!(groups[1].form_code.as_deref(), Some("QT.MSI-BM.04"));
    }

    #[test]
    fn partition_is_exact() {
        let pages: Vec<PageInfo> = (1..=17)
            .map(|n| {
                let p = PageInfo::new(n);
                if n % 3 == 1 {
                    p.form_header()
                } else if n % 5 == 0 {
                    p.with_page_type(PageType::Log)
                } else {
                    p
                }
            })
            .collect();
        let groups = group_pages(&pages);
        let flattened: Vec<PageInfo> = groups.into_iter().flat_map(|g| g.pages).collect();
        assert_eq!(flattened, pages);
    }
}
