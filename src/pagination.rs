//! Pagination button layout for story and category list pages.
//!
//! The layout is a pure function of `(cur_page, num_pages)` and is
//! reproduced verbatim by the client search script, so server-rendered
//! list pages and client-rendered result pages paginate identically.

/// One button slot in a pagination bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLink {
    /// Link to a page.
    Page(u32),
    /// The current page (rendered without a link).
    Current(u32),
    /// A "..." placeholder covering two or more skipped pages.
    Skip,
}

/// Compute the button layout for a list with `num_pages` pages, viewed at
/// `cur` (1-based).
///
/// Single-page lists render no buttons. Otherwise the bar contains a
/// window of two pages around the current one, plus jump buttons to the
/// first and last page when they fall outside the window. A gap of exactly
/// one page is rendered as that page number; only wider gaps collapse into
/// a [`PageLink::Skip`] placeholder.
pub fn layout(cur: u32, num_pages: u32) -> Vec<PageLink> {
    if num_pages <= 1 {
        return Vec::new();
    }
    let cur = cur.clamp(1, num_pages);
    let lo = cur.saturating_sub(2).max(1);
    let hi = (cur + 2).min(num_pages);

    let mut links = Vec::new();
    if lo > 1 {
        links.push(PageLink::Page(1));
        if lo - 1 == 2 {
            links.push(PageLink::Page(2));
        } else if lo > 2 {
            links.push(PageLink::Skip);
        }
    }
    for page in lo..=hi {
        if page == cur {
            links.push(PageLink::Current(page));
        } else {
            links.push(PageLink::Page(page));
        }
    }
    if hi < num_pages {
        if num_pages - hi == 2 {
            links.push(PageLink::Page(num_pages - 1));
        } else if num_pages - hi > 2 {
            links.push(PageLink::Skip);
        }
        links.push(PageLink::Page(num_pages));
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use PageLink::{Current, Page, Skip};

    #[test]
    fn single_page_renders_nothing() {
        assert!(layout(1, 1).is_empty());
        assert!(layout(1, 0).is_empty());
    }

    #[test]
    fn five_pages_all_visible_from_first() {
        assert_eq!(
            layout(1, 5),
            vec![Current(1), Page(2), Page(3), Page(4), Page(5)]
        );
    }

    #[test]
    fn middle_of_twenty_pages() {
        assert_eq!(
            layout(10, 20),
            vec![
                Page(1),
                Skip,
                Page(8),
                Page(9),
                Current(10),
                Page(11),
                Page(12),
                Skip,
                Page(20)
            ]
        );
    }

    #[test]
    fn two_hundred_pages_at_hundred() {
        assert_eq!(
            layout(100, 200),
            vec![
                Page(1),
                Skip,
                Page(98),
                Page(99),
                Current(100),
                Page(101),
                Page(102),
                Skip,
                Page(200)
            ]
        );
    }

    #[test]
    fn first_jump_appears_past_page_three() {
        // cur=3: the window itself reaches page 1.
        assert_eq!(
            layout(3, 10),
            vec![
                Page(1),
                Page(2),
                Current(3),
                Page(4),
                Page(5),
                Skip,
                Page(10)
            ]
        );
        // cur=4: page 1 is a jump button adjacent to the window.
        assert_eq!(layout(4, 10)[0], Page(1));
        assert_eq!(layout(4, 10)[1], Page(2));
    }

    #[test]
    fn one_page_gap_renders_number_not_skip() {
        // Window [3..7], last page 9: only page 8 lies between.
        assert_eq!(
            layout(5, 9),
            vec![
                Page(1),
                Page(2),
                Page(3),
                Page(4),
                Current(5),
                Page(6),
                Page(7),
                Page(8),
                Page(9)
            ]
        );
    }

    #[test]
    fn wide_gap_collapses_to_skip() {
        assert_eq!(
            layout(6, 12),
            vec![
                Page(1),
                Skip,
                Page(4),
                Page(5),
                Current(6),
                Page(7),
                Page(8),
                Skip,
                Page(12)
            ]
        );
    }

    #[test]
    fn last_page_view_mirrors_first() {
        assert_eq!(
            layout(5, 5),
            vec![Page(1), Page(2), Page(3), Page(4), Current(5)]
        );
    }

    #[test]
    fn out_of_range_current_is_clamped() {
        assert_eq!(
            layout(99, 3),
            vec![Page(1), Page(2), Current(3)]
        );
    }
}
