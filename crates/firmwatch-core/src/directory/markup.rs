//! CSS-selector extraction over directory pages.
//!
//! Everything here is synchronous and works on a markup string, so parsed
//! documents never live across an await point.

use std::sync::OnceLock;

use scraper::{ElementRef, Html, Selector};

use super::error::{CrawlError, NavigationError};
use super::extract::{self, PageIndicator};
use crate::models::RawRecord;
use crate::utils::collapse_whitespace;

/// Query input on the directory search page
pub const SEARCH_INPUT_SELECTOR: &str = "#sWork";

/// Label shared by the submit control and the result counter
const SEARCH_LABEL: &str = "검색";
const RESULT_LABEL: &str = "검색결과";

macro_rules! css {
    ($name:ident, $css:expr) => {
        fn $name() -> &'static Selector {
            static SEL: OnceLock<Selector> = OnceLock::new();
            SEL.get_or_init(|| Selector::parse($css).expect(concat!("invalid selector: ", $css)))
        }
    };
}

css!(result_list_sel, "ol.list");
css!(result_row_sel, "ol.list > li");
css!(profile_link_sel, "a[href*=\"ContentView\"]");
css!(name_link_sel, "h3 a");
css!(demographics_sel, "div > span");
css!(summary_sel, ".co_searchResults_summary");
css!(div_sel, "div");
css!(pager_anchor_sel, ".navigationLinks a");
css!(pager_next_sel, ".navigationLinks a.navNext");
css!(form_hidden_sel, "input[type=\"hidden\"]");
css!(submit_candidates_sel, "button, input[type=\"submit\"], input[type=\"button\"]");

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

// ============================================================================
// Results view
// ============================================================================

/// One parsed results page.
#[derive(Debug, Clone, Default)]
pub struct ResultsPage {
    pub indicator: Option<PageIndicator>,
    pub result_count: Option<u32>,
    pub records: Vec<RawRecord>,
    /// Rows that looked like results, including the ones dropped for missing fields
    pub rows_seen: usize,
}

impl ResultsPage {
    pub fn rows_dropped(&self) -> usize {
        self.rows_seen - self.records.len()
    }
}

/// The innermost `div` whose text carries the result counter.
fn indicator_scope(document: &Html) -> Option<ElementRef<'_>> {
    document
        .select(div_sel())
        .filter_map(|el| {
            let text = element_text(el);
            (text.contains(RESULT_LABEL) && text.contains('건')).then(|| (el, text.chars().count()))
        })
        .min_by_key(|(_, len)| *len)
        .map(|(el, _)| el)
}

fn find_page_indicator(document: &Html) -> Option<PageIndicator> {
    let mut scope = indicator_scope(document)?;
    loop {
        if let Some(indicator) = extract::parse_page_indicator(&element_text(scope)) {
            return Some(indicator);
        }
        scope = scope.parent().and_then(ElementRef::wrap)?;
    }
}

/// `current / total` page indicator of a results view.
pub fn page_indicator(html: &str) -> Option<PageIndicator> {
    find_page_indicator(&Html::parse_document(html))
}

/// Total result count of a results view, if the counter is shown.
pub fn result_count(html: &str) -> Option<u32> {
    let document = Html::parse_document(html);
    indicator_scope(&document).and_then(|scope| extract::parse_result_count(&element_text(scope)))
}

fn extract_row(row: ElementRef<'_>) -> Option<RawRecord> {
    let link = row.select(name_link_sel()).next()?;
    let profile_url = link.value().attr("href").unwrap_or_default().trim().to_string();
    let external_id = extract::external_id_from_url(&profile_url)?;
    let identity = extract::parse_identity(&element_text(link))?;

    let role = row
        .select(summary_sel())
        .next()
        .and_then(|el| extract::parse_current_role(&element_text(el)))?;

    let demographics = row
        .select(demographics_sel())
        .next()
        .and_then(|el| extract::parse_demographics(&element_text(el)))
        .unwrap_or_default();
    let credential = demographics.credential.unwrap_or_default();

    Some(RawRecord {
        external_id,
        name: identity.name,
        alias: identity.alias,
        birth_year: demographics.birth_year,
        gender: demographics.gender,
        credential_type: Some(credential.label).filter(|l| !l.is_empty()),
        credential_number: credential.number,
        role_title: Some(role.title),
        organization: role.organization,
        profile_url,
    })
}

/// Parse one results page into raw records.
///
/// Rows without an external id, a name, or a current-role line are dropped.
/// A page that shows neither a result list nor a result counter is not a
/// results view at all and fails with `PageExtraction`.
pub fn parse_results_page(html: &str, page: u32) -> Result<ResultsPage, CrawlError> {
    let document = Html::parse_document(html);

    let has_list = document.select(result_list_sel()).next().is_some();
    let scope_text = indicator_scope(&document).map(element_text);
    if !has_list && scope_text.is_none() {
        return Err(CrawlError::PageExtraction {
            page,
            reason: "neither a result list nor a result counter was found".to_string(),
        });
    }

    let rows: Vec<ElementRef<'_>> = document
        .select(result_row_sel())
        .filter(|li| li.select(profile_link_sel()).next().is_some())
        .collect();

    Ok(ResultsPage {
        indicator: find_page_indicator(&document),
        result_count: scope_text.as_deref().and_then(extract::parse_result_count),
        rows_seen: rows.len(),
        records: rows.into_iter().filter_map(extract_row).collect(),
    })
}

// ============================================================================
// Pager
// ============================================================================

/// A pagination control found in the pager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerLink {
    /// Followable link target, `None` for script-driven controls
    pub href: Option<String>,
    /// Page number the control leads to, when it can be read off the control
    pub page: Option<u32>,
}

fn followable_href(el: ElementRef<'_>) -> Option<String> {
    el.value()
        .attr("href")
        .map(str::trim)
        .filter(|h| !h.is_empty() && *h != "#" && !h.to_ascii_lowercase().starts_with("javascript:"))
        .map(str::to_string)
}

fn script_page_number(el: ElementRef<'_>) -> Option<u32> {
    let script = el
        .value()
        .attr("onclick")
        .or_else(|| el.value().attr("href"))
        .unwrap_or_default();
    script
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .last()
        .and_then(|s| s.parse().ok())
}

/// The pager's direct link for `page`, if shown.
pub fn pager_link(html: &str, page: u32) -> Option<PagerLink> {
    let document = Html::parse_document(html);
    let wanted = page.to_string();
    document
        .select(pager_anchor_sel())
        .find(|a| element_text(*a) == wanted)
        .map(|a| PagerLink {
            href: followable_href(a),
            page: Some(page),
        })
}

/// The pager's "next" control, if shown.
pub fn next_link(html: &str) -> Option<PagerLink> {
    let document = Html::parse_document(html);
    document.select(pager_next_sel()).next().map(|a| PagerLink {
        href: followable_href(a),
        page: script_page_number(a),
    })
}

// ============================================================================
// Search form
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitControl {
    pub name: Option<String>,
    pub value: String,
}

/// What is needed to submit the directory search without a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchForm {
    /// Form action; `None` submits to the page's own URL
    pub action: Option<String>,
    pub is_post: bool,
    pub query_field: String,
    pub hidden_fields: Vec<(String, String)>,
    pub submit: Option<SubmitControl>,
}

fn enclosing_form(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let mut node = el.parent();
    while let Some(n) = node {
        if let Some(parent) = ElementRef::wrap(n) {
            if parent.value().name() == "form" {
                return Some(parent);
            }
        }
        node = n.parent();
    }
    None
}

fn find_submit(document: &Html) -> Option<SubmitControl> {
    document.select(submit_candidates_sel()).find_map(|el| {
        let value = el.value().attr("value").unwrap_or_default().trim().to_string();
        let text = element_text(el);
        if text.contains(SEARCH_LABEL) || value.contains(SEARCH_LABEL) {
            Some(SubmitControl {
                name: el.value().attr("name").map(str::to_string),
                value: if value.is_empty() { text } else { value },
            })
        } else {
            None
        }
    })
}

/// Locate the search input, its form and the submit control.
///
/// A missing input is an error; a missing submit control is reported as
/// `submit: None` so the caller can fail at submission time.
pub fn parse_search_form(html: &str, input_selector: &str) -> Result<SearchForm, NavigationError> {
    let document = Html::parse_document(html);
    let input_sel = Selector::parse(input_selector)
        .map_err(|_| NavigationError::SearchInputNotFound(input_selector.to_string()))?;
    let input = document
        .select(&input_sel)
        .next()
        .ok_or_else(|| NavigationError::SearchInputNotFound(input_selector.to_string()))?;

    let query_field = input
        .value()
        .attr("name")
        .or_else(|| input.value().attr("id"))
        .unwrap_or("sWork")
        .to_string();

    let form = enclosing_form(input);
    let hidden_fields = form
        .map(|f| {
            f.select(form_hidden_sel())
                .filter_map(|h| {
                    let name = h.value().attr("name")?;
                    Some((name.to_string(), h.value().attr("value").unwrap_or_default().to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(SearchForm {
        action: form
            .and_then(|f| f.value().attr("action"))
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string),
        is_post: form
            .and_then(|f| f.value().attr("method"))
            .map(|m| m.eq_ignore_ascii_case("post"))
            .unwrap_or(false),
        query_field,
        hidden_fields,
        submit: find_submit(&document),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_PAGE: &str = r#"
        <html><body>
        <div id="wrap">
          <div class="resultHead">검색결과 <strong>1,245</strong> 건 <span class="pageNo">2 / 63</span></div>
          <ol class="list lawyer">
            <li>
              <h3><a href="/Info/ContentView?sid=L0001">강검윤(姜鈐允)</a></h3>
              <div><span>1991년생 / 남자 / 변호사시험 8</span></div>
              <p class="co_searchResults_summary">현직 : 변호사 / 법무법인(유) 로고스</p>
            </li>
            <li>
              <h3><a href="/Info/ContentView?sid=L0002">김철수</a></h3>
              <p class="co_searchResults_summary">현직 : 파트너 / 법무법인 로고스 / 송무팀</p>
            </li>
            <li>
              <h3><a href="/Info/ContentView?sid=L0003">박영희</a></h3>
              <p class="co_searchResults_summary">전직 : 판사</p>
            </li>
            <li><span>광고</span></li>
          </ol>
          <div class="navigationLinks">
            <a class="navPages" href="?page=1">1</a>
            <a class="navPages" href="javascript:goPage(3)">3</a>
            <a class="navNext" href="javascript:void(0)" onclick="goPage(11)">다음</a>
          </div>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_results_page_extracts_rows() {
        let page = parse_results_page(RESULTS_PAGE, 2).unwrap();
        assert_eq!(page.rows_seen, 3);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.rows_dropped(), 1);

        let first = &page.records[0];
        assert_eq!(first.external_id, "L0001");
        assert_eq!(first.name, "강검윤");
        assert_eq!(first.alias.as_deref(), Some("姜鈐允"));
        assert_eq!(first.birth_year, Some(1991));
        assert_eq!(first.gender.as_deref(), Some("남자"));
        assert_eq!(first.credential_type.as_deref(), Some("변호사시험"));
        assert_eq!(first.credential_number, Some(8));
        assert_eq!(first.role_title.as_deref(), Some("변호사"));
        assert_eq!(first.organization, "법무법인(유) 로고스");
        assert_eq!(first.profile_url, "/Info/ContentView?sid=L0001");

        let second = &page.records[1];
        assert_eq!(second.birth_year, None);
        assert_eq!(second.credential_type, None);
        assert_eq!(second.organization, "법무법인 로고스 / 송무팀");
    }

    #[test]
    fn test_indicator_and_count() {
        assert_eq!(page_indicator(RESULTS_PAGE), Some(PageIndicator { current: 2, total: 63 }));
        assert_eq!(result_count(RESULTS_PAGE), Some(1245));
        let page = parse_results_page(RESULTS_PAGE, 2).unwrap();
        assert_eq!(page.result_count, Some(1245));
    }

    #[test]
    fn test_indicator_found_in_enclosing_div() {
        let html = r#"<div class="outer"><div>검색결과 12 건</div><div>1 / 2</div></div>"#;
        assert_eq!(page_indicator(html), Some(PageIndicator { current: 1, total: 2 }));
        assert_eq!(result_count(html), Some(12));
    }

    #[test]
    fn test_empty_results_view_is_not_an_error() {
        let html = r#"<div>검색결과 0 건</div><ol class="list lawyer"></ol>"#;
        let page = parse_results_page(html, 1).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.result_count, Some(0));
        assert_eq!(page.indicator, None);
    }

    #[test]
    fn test_unrecognized_page_is_extraction_error() {
        let err = parse_results_page("<html><body>점검 중입니다</body></html>", 4).unwrap_err();
        assert!(matches!(err, CrawlError::PageExtraction { page: 4, .. }));
    }

    #[test]
    fn test_pager_links() {
        assert_eq!(
            pager_link(RESULTS_PAGE, 1),
            Some(PagerLink { href: Some("?page=1".to_string()), page: Some(1) })
        );
        assert_eq!(pager_link(RESULTS_PAGE, 3), Some(PagerLink { href: None, page: Some(3) }));
        assert_eq!(pager_link(RESULTS_PAGE, 7), None);
        assert_eq!(next_link(RESULTS_PAGE), Some(PagerLink { href: None, page: Some(11) }));
        assert_eq!(next_link("<div></div>"), None);
    }

    #[test]
    fn test_parse_search_form() {
        let html = r#"
            <form id="searchForm" action="/Info/ContentMain/LawyerList" method="POST">
              <input type="hidden" name="menu" value="lawyer">
              <input type="text" id="sWork" name="sWork">
              <button type="button" name="btnSearch">검색</button>
            </form>
        "#;
        let form = parse_search_form(html, SEARCH_INPUT_SELECTOR).unwrap();
        assert_eq!(form.action.as_deref(), Some("/Info/ContentMain/LawyerList"));
        assert!(form.is_post);
        assert_eq!(form.query_field, "sWork");
        assert_eq!(form.hidden_fields, vec![("menu".to_string(), "lawyer".to_string())]);
        assert_eq!(
            form.submit,
            Some(SubmitControl { name: Some("btnSearch".to_string()), value: "검색".to_string() })
        );
    }

    #[test]
    fn test_parse_search_form_missing_pieces() {
        let err = parse_search_form("<form></form>", SEARCH_INPUT_SELECTOR).unwrap_err();
        assert!(matches!(err, NavigationError::SearchInputNotFound(_)));

        let form = parse_search_form(r#"<input id="sWork">"#, SEARCH_INPUT_SELECTOR).unwrap();
        assert_eq!(form.submit, None);
        assert_eq!(form.action, None);
        assert!(!form.is_post);
    }
}
