//! HTML templates and the filter table.
//!
//! Pages are rendered through the [`Template`] enum: every page the build
//! can produce is one variant, carrying its context by reference. The
//! filter set is closed; templates call [`Filter::apply`] and the small
//! URL helpers below, nothing else.

use chrono::{Datelike, NaiveDate};

use crate::aggregate::StoryListStats;
use crate::html;
use crate::models::{Chapter, Story, StorySummary, TagKind, TagRef};
use crate::pagination::{self, PageLink};
use crate::slug;
use crate::util::{format_grouped, format_number};

/// Options the renderer honors on every page.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Ship links that leave the archive (original story/author URLs).
    pub include_external_links: bool,
}

/// The closed set of template filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Escape,
    StripTags,
    FormatDate,
    FormatNumber,
    NormalizeTag,
    RepairHtml,
    RenderStorytext,
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

impl Filter {
    /// Apply the filter to a string input. All filters are pure; inputs
    /// that do not parse pass through unchanged.
    pub fn apply(&self, input: &str) -> String {
        match self {
            Filter::Escape => html::escape(input),
            Filter::StripTags => html::striptags(input),
            Filter::FormatDate => match input.parse::<NaiveDate>() {
                Ok(date) => format_date(date),
                Err(_) => input.to_string(),
            },
            Filter::FormatNumber => match input.parse::<u64>() {
                Ok(n) => format_grouped(n),
                Err(_) => input.to_string(),
            },
            Filter::NormalizeTag => slug::normalize(input),
            Filter::RepairHtml => html::repair_html(input),
            Filter::RenderStorytext => html::render_storytext(input),
        }
    }
}

/// ISO date -> "January 5, 2019".
pub fn format_date(date: NaiveDate) -> String {
    format!(
        "{} {}, {}",
        MONTH_NAMES[date.month0() as usize],
        date.day(),
        date.year()
    )
}

/// `list[i]`, or `fallback` when out of range.
pub fn default_index<'a>(list: &'a [String], i: usize, fallback: &'a str) -> &'a str {
    list.get(i).map(String::as_str).unwrap_or(fallback)
}

// =============== URL HELPERS ================

pub fn story_path(publisher: &str, id: i64) -> String {
    format!("story/{}/{}", publisher, id)
}

pub fn story_href(to_root: &str, publisher: &str, id: i64) -> String {
    format!("{}/story/{}/{}/1", to_root, publisher, id)
}

pub fn author_path(publisher: &str, name: &str) -> String {
    format!("author/{}/{}", publisher, slug::normalize(name))
}

pub fn tag_path(kind: TagKind, name: &str) -> String {
    format!("tag/{}/{}", kind.as_str(), slug::normalize(name))
}

pub fn category_path(publisher: &str, name: &str) -> String {
    format!("category/{}/{}", publisher, slug::normalize(name))
}

pub fn series_path(publisher: &str, name: &str) -> String {
    format!("series/{}/{}", publisher, slug::normalize(name))
}

pub fn publisher_path(publisher: &str) -> String {
    format!("publisher/{}/", publisher)
}

fn esc(s: &str) -> String {
    html::escape(s)
}

// =============== PAGE SHELL ================

fn shell(to_root: &str, title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n\
         <link rel=\"icon\" href=\"{root}/favicon.png\">\n\
         <link rel=\"stylesheet\" href=\"{root}/style_light.css\" media=\"(prefers-color-scheme: light)\">\n\
         <link rel=\"stylesheet\" href=\"{root}/style_dark.css\" media=\"(prefers-color-scheme: dark)\">\n\
         </head>\n<body>\n\
         <header class=\"site-header\"><a href=\"{root}/index.html\">ZimFiction</a>\
         <nav><a href=\"{root}/statistics.html\">Statistics</a> \
         <a href=\"{root}/info/index.html\">Info</a></nav></header>\n\
         <main>\n{body}\n</main>\n</body>\n</html>\n",
        title = esc(title),
        root = to_root,
        body = body,
    )
}

/// Pagination bar linking to sibling page files ("1", "2", ...).
pub fn pagination_bar(cur: u32, num_pages: u32) -> String {
    let links = pagination::layout(cur, num_pages);
    if links.is_empty() {
        return String::new();
    }
    let mut out = String::from("<nav class=\"pagination\">");
    for link in links {
        match link {
            PageLink::Page(page) => {
                out.push_str(&format!("<a class=\"page\" href=\"{0}\">{0}</a>", page))
            }
            PageLink::Current(page) => {
                out.push_str(&format!("<span class=\"page current\">{}</span>", page))
            }
            PageLink::Skip => out.push_str("<span class=\"page skip\">…</span>"),
        }
    }
    out.push_str("</nav>");
    out
}

// =============== STORY CARDS ================

fn tag_row(to_root: &str, tags: &[&TagRef]) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let mut out = String::from("<div class=\"story-tags\">");
    for tag in tags {
        out.push_str(&format!(
            "<a class=\"tag tag-{kind}\" href=\"{root}/{path}/1\">{name}</a>",
            kind = tag.kind.as_str(),
            root = to_root,
            path = tag_path(tag.kind, &tag.name),
            name = esc(&tag.name),
        ));
    }
    out.push_str("</div>");
    out
}

fn category_row(to_root: &str, summary: &StorySummary) -> String {
    let categories: Vec<String> = summary
        .explicit_categories()
        .map(|c| {
            format!(
                "<a class=\"category\" href=\"{root}/{path}/1\">{name}</a>",
                root = to_root,
                path = category_path(&summary.publisher, &c.name),
                name = esc(&c.name),
            )
        })
        .collect();
    if categories.is_empty() {
        String::new()
    } else {
        format!("<div class=\"story-categories\">{}</div>", categories.join(" "))
    }
}

fn series_row(to_root: &str, summary: &StorySummary) -> String {
    let parts: Vec<String> = summary
        .series
        .iter()
        .map(|s| {
            format!(
                "Part {idx} of <a href=\"{root}/{path}/\">{name}</a>",
                idx = s.index,
                root = to_root,
                path = series_path(&summary.publisher, &s.name),
                name = esc(&s.name),
            )
        })
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("<div class=\"story-series\">{}</div>", parts.join(" · "))
    }
}

fn meta_row(to_root: &str, summary: &StorySummary) -> String {
    format!(
        "<div class=\"story-meta\">\
         <span class=\"language\">{language}</span> · \
         <span class=\"status\">{status}</span> · \
         <span class=\"rating\">{rating}</span> · \
         <span class=\"words\">{words} words</span> · \
         <span class=\"chapters\">{chapters} chapters</span> · \
         <span class=\"score\">score {score}</span> · \
         <span class=\"updated\">updated {updated}</span> · \
         <a href=\"{root}/publisher/{publisher}/\">{publisher_esc}</a>\
         </div>",
        language = esc(&summary.language),
        status = summary.status.as_str(),
        rating = esc(&summary.rating_title()),
        words = format_number(summary.total_words),
        chapters = summary.num_chapters,
        score = summary.score,
        updated = format_date(summary.updated),
        root = to_root,
        publisher = summary.publisher,
        publisher_esc = esc(&summary.publisher),
    )
}

/// Compact story card used inside list pages.
pub fn story_card(to_root: &str, summary: &StorySummary) -> String {
    format!(
        "<div class=\"story-card\" id=\"story-{publisher}-{id}\">\
         <div class=\"story-head\"><a class=\"story-title\" href=\"{href}\">{title}</a> \
         by <a class=\"story-author\" href=\"{root}/{author_path}/1\">{author}</a></div>\
         {categories}{summary_html}{tags}{series}{meta}</div>",
        publisher = summary.publisher,
        id = summary.id,
        href = story_href(to_root, &summary.publisher, summary.id),
        title = esc(&summary.title),
        root = to_root,
        author_path = author_path(&summary.publisher, &summary.author),
        author = esc(&summary.author),
        categories = category_row(to_root, summary),
        summary_html = format!("<div class=\"story-summary\">{}</div>", summary.summary),
        tags = tag_row(to_root, &summary.ordered_visible_tags()),
        series = series_row(to_root, summary),
        meta = meta_row(to_root, summary),
    )
}

/// Extended story card shown above the first chapter.
pub fn story_card_extended(to_root: &str, story: &Story, options: &RenderOptions) -> String {
    let summary = story.summarize();
    let external = if options.include_external_links && !story.url.is_empty() {
        format!(
            "<div class=\"story-source\"><a href=\"{}\" rel=\"external\">Original</a></div>",
            esc(&story.url)
        )
    } else {
        String::new()
    };
    format!(
        "<div class=\"story-card extended\">\
         <h1 class=\"story-title\">{title}</h1>\
         <div class=\"story-head\">by <a class=\"story-author\" href=\"{root}/{author_path}/1\">{author}</a></div>\
         {categories}<div class=\"story-summary\">{summary_html}</div>{tags}{series}{meta}\
         <div class=\"story-dates\">Published {published} · Packaged {packaged}</div>{external}</div>",
        title = esc(&story.title),
        root = to_root,
        author_path = author_path(&story.publisher, &story.author),
        author = esc(&story.author),
        categories = category_row(to_root, &summary),
        summary_html = story.summary,
        tags = tag_row(to_root, &summary.ordered_visible_tags()),
        series = series_row(to_root, &summary),
        meta = meta_row(to_root, &summary),
        published = format_date(story.published),
        packaged = format_date(story.packaged),
        external = external,
    )
}

// =============== TEMPLATES ================

/// Every page the build renders, keyed by a stable variant instead of a
/// template name looked up at runtime.
pub enum Template<'a> {
    Chapter {
        story: &'a Story,
        chapter: &'a Chapter,
        options: &'a RenderOptions,
    },
    ChapterIndex {
        story: &'a Story,
    },
    /// Paginated story list (tags, categories, authors).
    StoryList {
        title: &'a str,
        heading: &'a str,
        /// Extra block rendered between heading and list (search UI,
        /// alt-identity links, stats link).
        intro: &'a str,
        stories: &'a [StorySummary],
        cur_page: u32,
        num_pages: u32,
        to_root: &'a str,
    },
    SeriesPage {
        publisher: &'a str,
        name: &'a str,
        members: &'a [(u32, StorySummary)],
    },
    StatsPage {
        heading: &'a str,
        stats: &'a StoryListStats,
        to_root: &'a str,
    },
    PublisherPage {
        name: &'a str,
        story_count: u64,
        word_count: u64,
        categories: &'a [(String, u64)],
        num_category_pages: u32,
    },
    CategoryListPage {
        publisher: &'a str,
        categories: &'a [(String, u64)],
        cur_page: u32,
        num_pages: u32,
    },
    IndexPage {
        publishers: &'a [(String, u64)],
    },
    StatisticsPage {
        stats: &'a StoryListStats,
    },
    InfoIndex,
    Acknowledgements,
}

impl<'a> Template<'a> {
    /// Stable template name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Template::Chapter { .. } => "chapter",
            Template::ChapterIndex { .. } => "chapter_index",
            Template::StoryList { .. } => "storylist",
            Template::SeriesPage { .. } => "series",
            Template::StatsPage { .. } => "stats",
            Template::PublisherPage { .. } => "publisher",
            Template::CategoryListPage { .. } => "publisher_categories",
            Template::IndexPage { .. } => "index",
            Template::StatisticsPage { .. } => "statistics",
            Template::InfoIndex => "info_index",
            Template::Acknowledgements => "acknowledgements",
        }
    }
}

/// Expand a template into a full HTML page.
pub fn render(template: &Template<'_>) -> String {
    match template {
        Template::Chapter {
            story,
            chapter,
            options,
        } => render_chapter(story, chapter, options),
        Template::ChapterIndex { story } => render_chapter_index(story),
        Template::StoryList {
            title,
            heading,
            intro,
            stories,
            cur_page,
            num_pages,
            to_root,
        } => render_story_list(title, heading, intro, stories, *cur_page, *num_pages, to_root),
        Template::SeriesPage {
            publisher,
            name,
            members,
        } => render_series(publisher, name, members),
        Template::StatsPage {
            heading,
            stats,
            to_root,
        } => render_stats_page(heading, stats, to_root),
        Template::PublisherPage {
            name,
            story_count,
            word_count,
            categories,
            num_category_pages,
        } => render_publisher(name, *story_count, *word_count, categories, *num_category_pages),
        Template::CategoryListPage {
            publisher,
            categories,
            cur_page,
            num_pages,
        } => render_category_list(publisher, categories, *cur_page, *num_pages),
        Template::IndexPage { publishers } => render_index(publishers),
        Template::StatisticsPage { stats } => render_statistics(stats),
        Template::InfoIndex => render_info_index(),
        Template::Acknowledgements => render_acknowledgements(),
    }
}

fn render_chapter(story: &Story, chapter: &Chapter, options: &RenderOptions) -> String {
    let to_root = "../../..";
    let mut body = String::new();
    if chapter.index == 1 {
        body.push_str(&story_card_extended(to_root, story, options));
    } else {
        body.push_str(&format!(
            "<div class=\"chapter-story\"><a href=\"1\">{}</a> by {}</div>",
            esc(&story.title),
            esc(&story.author)
        ));
    }
    body.push_str(&format!(
        "<h2 class=\"chapter-title\">Chapter {}: {}</h2>",
        chapter.index,
        esc(&chapter.title)
    ));
    body.push_str(&Filter::RenderStorytext.apply(&chapter.text));
    body.push_str("<nav class=\"chapter-nav\">");
    if chapter.index > 1 {
        body.push_str(&format!(
            "<a class=\"prev\" href=\"{}\">Previous chapter</a> ",
            chapter.index - 1
        ));
    }
    body.push_str("<a class=\"toc\" href=\"index\">Chapters</a>");
    if (chapter.index as usize) < story.chapters.len() {
        body.push_str(&format!(
            " <a class=\"next\" href=\"{}\">Next chapter</a>",
            chapter.index + 1
        ));
    }
    body.push_str("</nav>");
    let title = format!(
        "{} by {} - Chapter {} - {}",
        story.title, story.author, chapter.index, chapter.title
    );
    shell(to_root, &title, &body)
}

fn render_chapter_index(story: &Story) -> String {
    let to_root = "../../..";
    let mut body = format!(
        "<h1>{} by <a href=\"{root}/{author}/1\">{name}</a></h1><ol class=\"chapter-list\">",
        esc(&story.title),
        root = to_root,
        author = author_path(&story.publisher, &story.author),
        name = esc(&story.author),
    );
    for chapter in &story.chapters {
        body.push_str(&format!(
            "<li><a href=\"{}\">{}</a> <span class=\"words\">({} words)</span></li>",
            chapter.index,
            esc(&chapter.title),
            format_number(u64::from(chapter.num_words)),
        ));
    }
    body.push_str("</ol>");
    let title = format!(
        "{} by {} on {} - List of chapters",
        story.title, story.author, story.publisher
    );
    shell(to_root, &title, &body)
}

#[allow(clippy::too_many_arguments)]
fn render_story_list(
    title: &str,
    heading: &str,
    intro: &str,
    stories: &[StorySummary],
    cur_page: u32,
    num_pages: u32,
    to_root: &str,
) -> String {
    let mut body = format!("<h1>{}</h1>{}", esc(heading), intro);
    body.push_str("<div class=\"story-list\">");
    for summary in stories {
        body.push_str(&story_card(to_root, summary));
    }
    body.push_str("</div>");
    body.push_str(&pagination_bar(cur_page, num_pages));
    shell(to_root, title, &body)
}

fn render_series(publisher: &str, name: &str, members: &[(u32, StorySummary)]) -> String {
    // the page lives at series/<publisher>/<slug>/ (directory-style path)
    let to_root = "../../..";
    let mut body = format!(
        "<h1>Series: {} <span class=\"publisher\">on {}</span></h1><ol class=\"series-list\">",
        esc(name),
        esc(publisher)
    );
    for (index, summary) in members {
        body.push_str(&format!(
            "<li value=\"{}\">{}</li>",
            index,
            story_card(to_root, summary)
        ));
    }
    body.push_str("</ol>");
    let title = format!("Series: '{}' on {}", name, publisher);
    shell(to_root, &title, &body)
}

fn stats_rows(stats: &StoryListStats) -> String {
    let row = |label: &str, value: String| {
        format!("<tr><th>{}</th><td>{}</td></tr>", label, value)
    };
    let mut out = String::from("<table class=\"stats\">");
    out.push_str(&row("Stories", format_grouped(stats.story_count)));
    out.push_str(&row("Total words", format_grouped(stats.total_words)));
    out.push_str(&row(
        "Words per story",
        format!(
            "{} min / {:.0} avg / {} max",
            format_grouped(stats.min_story_words),
            stats.average_story_words,
            format_grouped(stats.max_story_words)
        ),
    ));
    out.push_str(&row("Chapters", format_grouped(stats.chapter_count)));
    out.push_str(&row(
        "Chapters per story",
        format!(
            "{} min / {:.1} avg / {} max",
            stats.min_chapter_count, stats.average_chapter_count, stats.max_chapter_count
        ),
    ));
    if stats.max_chapter_words > 0 {
        out.push_str(&row(
            "Words per chapter",
            format!(
                "{} min / {:.0} avg / {} max",
                format_grouped(stats.min_chapter_words),
                stats.average_chapter_words,
                format_grouped(stats.max_chapter_words)
            ),
        ));
    }
    out.push_str(&row(
        "Categories",
        format!(
            "{} unique / {} total",
            format_grouped(stats.category_count),
            format_grouped(stats.total_category_count)
        ),
    ));
    out.push_str(&row(
        "Tags",
        format!(
            "{} unique / {} total",
            format_grouped(stats.tag_count),
            format_grouped(stats.total_tag_count)
        ),
    ));
    out.push_str(&row(
        "Authors",
        format!(
            "{} ({:.1} stories each)",
            format_grouped(stats.author_count),
            stats.average_stories_per_author
        ),
    ));
    out.push_str(&row(
        "Series",
        format!(
            "{} unique / {} memberships",
            format_grouped(stats.series_count),
            format_grouped(stats.total_series_count)
        ),
    ));
    out.push_str("</table>");
    out
}

fn chart_block(to_root: &str) -> String {
    format!(
        "<canvas id=\"storytimechart\" width=\"800\" height=\"240\"></canvas>\
         <script src=\"{root}/scripts/chart.js\"></script>\
         <script src=\"{root}/scripts/storytimechart.js\"></script>",
        root = to_root
    )
}

fn render_stats_page(heading: &str, stats: &StoryListStats, to_root: &str) -> String {
    let body = format!(
        "<h1>{}</h1>{}{}",
        esc(heading),
        stats_rows(stats),
        chart_block(to_root)
    );
    shell(to_root, heading, &body)
}

fn render_publisher(
    name: &str,
    story_count: u64,
    word_count: u64,
    categories: &[(String, u64)],
    num_category_pages: u32,
) -> String {
    // the page lives at publisher/<name>/ (directory-style path)
    let to_root = "../..";
    let mut body = format!(
        "<h1>{}</h1><p class=\"publisher-counts\">{} stories · {} words</p>",
        esc(name),
        format_grouped(story_count),
        format_number(word_count),
    );
    body.push_str("<h2>Categories</h2><ul class=\"category-list\">");
    for (category, count) in categories {
        body.push_str(&format!(
            "<li><a href=\"{root}/{path}/1\">{cat}</a> <span class=\"count\">({count})</span></li>",
            root = to_root,
            path = category_path(name, category),
            cat = esc(category),
            count = format_grouped(*count),
        ));
    }
    body.push_str("</ul>");
    if num_category_pages > 0 {
        body.push_str(&format!(
            "<p><a href=\"categories/1\">All {} category pages</a></p>",
            num_category_pages
        ));
    }
    body.push_str(&chart_block(to_root));
    shell(to_root, &format!("Publisher: {}", name), &body)
}

fn render_category_list(
    publisher: &str,
    categories: &[(String, u64)],
    cur_page: u32,
    num_pages: u32,
) -> String {
    let to_root = "../../..";
    let mut body = format!("<h1>Categories on {}</h1><ul class=\"category-list\">", esc(publisher));
    for (category, count) in categories {
        body.push_str(&format!(
            "<li><a href=\"{root}/{path}/1\">{cat}</a> <span class=\"count\">({count})</span></li>",
            root = to_root,
            path = category_path(publisher, category),
            cat = esc(category),
            count = format_grouped(*count),
        ));
    }
    body.push_str("</ul>");
    body.push_str(&pagination_bar(cur_page, num_pages));
    shell(
        to_root,
        &format!("Categories on {} - Page {}", publisher, cur_page),
        &body,
    )
}

fn render_index(publishers: &[(String, u64)]) -> String {
    let to_root = ".";
    let mut body = String::from(
        "<h1>Welcome to ZimFiction!</h1>\
         <p>An offline archive of fanfiction, browsable by publisher, author, tag and category.</p>\
         <ul class=\"publisher-list\">",
    );
    for (publisher, count) in publishers {
        body.push_str(&format!(
            "<li><a href=\"{root}/publisher/{publisher}/\">{name}</a> \
             <span class=\"count\">({count} stories)</span></li>",
            root = to_root,
            publisher = publisher,
            name = esc(publisher),
            count = format_grouped(*count),
        ));
    }
    body.push_str("</ul>");
    shell(to_root, "Welcome to ZimFiction!", &body)
}

fn render_statistics(stats: &StoryListStats) -> String {
    let to_root = ".";
    let body = format!("<h1>Statistics</h1>{}{}", stats_rows(stats), chart_block(to_root));
    shell(to_root, "Statistics", &body)
}

fn render_info_index() -> String {
    let to_root = "..";
    let body = "<h1>About this archive</h1>\
         <p>This ZIM file was produced by zimfiction from dumps of various \
         fanfiction communities. All stories belong to their authors.</p>\
         <ul><li><a href=\"acknowledgements.html\">Acknowledgements</a></li></ul>";
    shell(to_root, "About", body)
}

fn render_acknowledgements() -> String {
    let to_root = "..";
    let body = "<h1>Acknowledgements</h1>\
         <p>Thanks to the authors and archivists of the fanfiction communities \
         whose work this collection preserves, and to the openZIM project for \
         the container format and readers.</p>";
    shell(to_root, "Acknowledgements", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_story;

    #[test]
    fn filters_are_pure_and_total() {
        assert_eq!(Filter::Escape.apply("<x>"), "&lt;x&gt;");
        assert_eq!(Filter::StripTags.apply("<b>x</b>"), "x");
        assert_eq!(Filter::FormatDate.apply("2019-01-05"), "January 5, 2019");
        assert_eq!(Filter::FormatDate.apply("not a date"), "not a date");
        assert_eq!(Filter::FormatNumber.apply("1234567"), "1,234,567");
        assert_eq!(Filter::FormatNumber.apply("n/a"), "n/a");
        assert_eq!(Filter::NormalizeTag.apply("a b/c"), "a+b__c");
        assert_eq!(Filter::RepairHtml.apply("<p>x"), "<p>x</p>");
        assert!(Filter::RenderStorytext.apply("<p>x").contains("storytext"));
    }

    #[test]
    fn default_index_falls_back() {
        let list = vec!["a".to_string()];
        assert_eq!(default_index(&list, 0, "z"), "a");
        assert_eq!(default_index(&list, 3, "z"), "z");
    }

    #[test]
    fn chapter_one_gets_extended_card() {
        let story = sample_story();
        let options = RenderOptions::default();
        let page = render(&Template::Chapter {
            story: &story,
            chapter: &story.chapters[0],
            options: &options,
        });
        assert!(page.contains("story-card extended"));
        assert!(page.contains("Chapter 1: One"));
        assert!(page.contains("storytext"));
        // next link but no prev on chapter 1
        assert!(page.contains("class=\"next\""));
        assert!(!page.contains("class=\"prev\""));
    }

    #[test]
    fn later_chapter_gets_compact_header_and_prev() {
        let story = sample_story();
        let options = RenderOptions::default();
        let page = render(&Template::Chapter {
            story: &story,
            chapter: &story.chapters[1],
            options: &options,
        });
        assert!(!page.contains("story-card extended"));
        assert!(page.contains("class=\"prev\""));
        assert!(!page.contains("class=\"next\""));
    }

    #[test]
    fn external_links_are_opt_in() {
        let story = sample_story();
        let without = render(&Template::Chapter {
            story: &story,
            chapter: &story.chapters[0],
            options: &RenderOptions {
                include_external_links: false,
            },
        });
        assert!(!without.contains("demo.example"));
        let with = render(&Template::Chapter {
            story: &story,
            chapter: &story.chapters[0],
            options: &RenderOptions {
                include_external_links: true,
            },
        });
        assert!(with.contains("demo.example"));
    }

    #[test]
    fn chapter_index_lists_all_chapters() {
        let story = sample_story();
        let page = render(&Template::ChapterIndex { story: &story });
        assert!(page.contains("<li><a href=\"1\">One</a>"));
        assert!(page.contains("<li><a href=\"2\">Two</a>"));
    }

    #[test]
    fn story_card_links_use_slugs() {
        let mut story = sample_story();
        story.tags[0].name = "Slash/Pairing Tag".to_string();
        let card = story_card("../../..", &story.summarize());
        assert!(card.contains("tag/genre/Slash__Pairing+Tag/1"));
        assert!(card.contains("author/Demo/Alice/1"));
        // display name stays readable, escaped
        assert!(card.contains("Slash/Pairing Tag"));
    }

    #[test]
    fn story_list_renders_cards_and_pagination() {
        let story = sample_story();
        let stories = vec![story.summarize()];
        let page = render(&Template::StoryList {
            title: "Stories tagged 'Romance' [genre]",
            heading: "Stories tagged 'Romance'",
            intro: "",
            stories: &stories,
            cur_page: 2,
            num_pages: 3,
            to_root: "../../..",
        });
        assert!(page.contains("story-card"));
        assert!(page.contains("class=\"pagination\""));
        assert!(page.contains("<span class=\"page current\">2</span>"));
    }

    #[test]
    fn single_page_list_has_no_pagination() {
        let page = render(&Template::StoryList {
            title: "t",
            heading: "h",
            intro: "",
            stories: &[],
            cur_page: 1,
            num_pages: 1,
            to_root: "..",
        });
        assert!(!page.contains("class=\"pagination\""));
    }

    #[test]
    fn publisher_page_shows_categories() {
        let categories = vec![("Example Fandom".to_string(), 12u64)];
        let page = render(&Template::PublisherPage {
            name: "Demo",
            story_count: 12,
            word_count: 100_000,
            categories: &categories,
            num_category_pages: 1,
        });
        assert!(page.contains("category/Demo/Example+Fandom/1"));
        assert!(page.contains("storytimechart"));
    }

    #[test]
    fn template_names_are_stable() {
        let story = sample_story();
        assert_eq!(Template::ChapterIndex { story: &story }.name(), "chapter_index");
        assert_eq!(Template::InfoIndex.name(), "info_index");
    }

    #[test]
    fn shell_links_both_theme_variants() {
        let page = render(&Template::InfoIndex);
        assert!(page.contains("style_light.css"));
        assert!(page.contains("style_dark.css"));
        assert!(page.contains("prefers-color-scheme"));
    }
}
