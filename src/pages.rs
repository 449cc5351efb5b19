//! Per-entity page rendering: entities in, [`Artifact`]s out.
//!
//! Workers fetch and order the data, the functions here expand it through
//! the template registry and attach paths, titles and hints. Nothing in
//! this module performs I/O.

use serde::Serialize;

use crate::aggregate::{ChartData, StoryListStats};
use crate::config::{CATEGORIES_PER_PAGE, STORIES_PER_PAGE};
use crate::error::BuildResult;
use crate::models::{Story, StorySummary, TagKind};
use crate::queue::Artifact;
use crate::search::SearchCorpus;
use crate::templates::{self, render, RenderOptions, Template};

/// Payload of a story's `preview.json`, consumed by the client search
/// script when it hydrates result placeholders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewData {
    pub title: String,
    pub publisher: String,
    pub id: i64,
    pub author: String,
    pub categories: Vec<String>,
    pub tags: Vec<(String, String)>,
    pub updated: String,
    pub summary: String,
    pub language: String,
    pub status: String,
    pub words: u64,
    pub chapters: u32,
    pub score: i64,
    pub series: Vec<(String, u32)>,
    pub rating: String,
}

impl PreviewData {
    pub fn from_story(story: &Story) -> Self {
        let summary = story.summarize();
        PreviewData {
            title: story.title.clone(),
            publisher: story.publisher.clone(),
            id: story.id,
            author: story.author.clone(),
            categories: summary
                .explicit_categories()
                .map(|c| c.name.clone())
                .collect(),
            tags: summary
                .ordered_visible_tags()
                .iter()
                .map(|t| (t.kind.as_str().to_string(), t.name.clone()))
                .collect(),
            updated: story.updated.format("%Y-%m-%d").to_string(),
            summary: story.summary.clone(),
            language: story.language.clone(),
            status: story.status.as_str().to_string(),
            words: story.total_words(),
            chapters: story.chapters.len() as u32,
            score: story.score,
            series: story.series.iter().map(|s| (s.name.clone(), s.index)).collect(),
            rating: story.rating_title(),
        }
    }
}

/// Render everything a single story produces: one page per chapter, the
/// chapter listing, `preview.json` and the bare-path redirect.
pub fn render_story(story: &Story, options: &RenderOptions) -> BuildResult<Vec<Artifact>> {
    story.validate()?;
    let base = templates::story_path(&story.publisher, story.id);
    let mut artifacts = Vec::with_capacity(story.chapters.len() + 3);
    for chapter in &story.chapters {
        let page = render(&Template::Chapter {
            story,
            chapter,
            options,
        });
        artifacts.push(Artifact::html(
            format!("{}/{}", base, chapter.index),
            format!(
                "{} by {} - Chapter {} - {}",
                story.title, story.author, chapter.index, chapter.title
            ),
            page,
            chapter.index == 1,
        ));
    }
    artifacts.push(Artifact::html(
        format!("{}/index", base),
        format!(
            "{} by {} on {} - List of chapters",
            story.title, story.author, story.publisher
        ),
        render(&Template::ChapterIndex { story }),
        false,
    ));
    artifacts.push(Artifact::json(
        format!("{}/preview.json", base),
        format!("{} - preview data", story.title),
        &PreviewData::from_story(story),
    )?);
    artifacts.push(Artifact::redirect(
        format!("{}/", base),
        format!("{} by {} on {}", story.title, story.author, story.publisher),
        format!("{}/1", base),
        false,
    ));
    Ok(artifacts)
}

/// Split `stories` into list pages of [`STORIES_PER_PAGE`]. Always at
/// least one (possibly empty) page so the redirect target exists.
fn list_pages(stories: &[StorySummary]) -> Vec<&[StorySummary]> {
    if stories.is_empty() {
        return vec![&[]];
    }
    stories.chunks(STORIES_PER_PAGE).collect()
}

struct ListScope<'a> {
    /// Path prefix without trailing slash, e.g. `tag/genre/Romance`.
    base: String,
    title: &'a str,
    heading: &'a str,
    intro: String,
}

/// Shared paginated-list emission for authors, tags and categories.
fn render_list_scope(
    scope: ListScope<'_>,
    stories: &[StorySummary],
    chart: &ChartData,
) -> BuildResult<Vec<Artifact>> {
    let pages = list_pages(stories);
    let num_pages = pages.len() as u32;
    let mut artifacts = Vec::with_capacity(pages.len() + 2);
    artifacts.push(Artifact::redirect(
        format!("{}/", scope.base),
        scope.title,
        format!("{}/1", scope.base),
        true,
    ));
    for (i, chunk) in pages.iter().enumerate() {
        let cur_page = i as u32 + 1;
        let intro = if cur_page == 1 { scope.intro.as_str() } else { "" };
        let page = render(&Template::StoryList {
            title: scope.title,
            heading: scope.heading,
            intro,
            stories: chunk,
            cur_page,
            num_pages,
            to_root: "../../..",
        });
        artifacts.push(Artifact::html(
            format!("{}/{}", scope.base, cur_page),
            format!("{} - Page {}", scope.title, cur_page),
            page,
            false,
        ));
    }
    artifacts.push(Artifact::json(
        format!("{}/storyupdates.json", scope.base),
        format!("{} - update chart data", scope.title),
        chart,
    )?);
    Ok(artifacts)
}

/// Search block placed on the first list page of searchable scopes.
fn search_intro() -> String {
    "<div id=\"search\" class=\"search\"></div>\
     <script src=\"../../../scripts/search.js\"></script>"
        .to_string()
}

fn search_artifacts(base: &str, title: &str, corpus: &SearchCorpus) -> BuildResult<Vec<Artifact>> {
    let mut artifacts = Vec::with_capacity(corpus.shards.len() + 1);
    artifacts.push(Artifact::json(
        format!("{}/search_header.json", base),
        format!("{} - search header", title),
        &corpus.header,
    )?);
    for (i, shard) in corpus.shards.iter().enumerate() {
        artifacts.push(Artifact::json(
            format!("{}/search_content_{}.json", base, i),
            format!("{} - search content {}", title, i),
            shard,
        )?);
    }
    Ok(artifacts)
}

/// Render an author: paginated story list, alt-identity links, chart data.
pub fn render_author(
    publisher: &str,
    name: &str,
    url: Option<&str>,
    alt_publishers: &[String],
    stories: &[StorySummary],
    chart: &ChartData,
    options: &RenderOptions,
) -> BuildResult<Vec<Artifact>> {
    let mut intro = String::new();
    if !alt_publishers.is_empty() {
        let links: Vec<String> = alt_publishers
            .iter()
            .map(|p| {
                format!(
                    "<a href=\"../../../{}1\">{}</a>",
                    templates::author_path(p, name) + "/",
                    crate::html::escape(p)
                )
            })
            .collect();
        intro.push_str(&format!(
            "<p class=\"alt-identities\">Also writes on: {}</p>",
            links.join(", ")
        ));
    }
    if options.include_external_links {
        if let Some(url) = url {
            intro.push_str(&format!(
                "<p class=\"author-source\"><a href=\"{}\" rel=\"external\">Profile on {}</a></p>",
                crate::html::escape(url),
                crate::html::escape(publisher)
            ));
        }
    }
    let title = format!("Author {} on {}", name, publisher);
    render_list_scope(
        ListScope {
            base: templates::author_path(publisher, name),
            title: &title,
            heading: &title,
            intro,
        },
        stories,
        chart,
    )
}

/// Render a tag scope: list pages, stats page, chart data and (when the
/// scope is searchable) the search corpus.
pub fn render_tag(
    kind: TagKind,
    name: &str,
    stories: &[StorySummary],
    stats: &StoryListStats,
    chart: &ChartData,
    corpus: Option<&SearchCorpus>,
) -> BuildResult<Vec<Artifact>> {
    let base = templates::tag_path(kind, name);
    let title = format!("Stories tagged '{}' [{}]", name, kind.as_str());
    scope_with_stats(base, title, stories, stats, chart, corpus)
}

/// Render a category scope; same shape as a tag, scoped by publisher.
pub fn render_category(
    publisher: &str,
    name: &str,
    stories: &[StorySummary],
    stats: &StoryListStats,
    chart: &ChartData,
    corpus: Option<&SearchCorpus>,
) -> BuildResult<Vec<Artifact>> {
    let base = templates::category_path(publisher, name);
    let title = format!("Category: {} on {}", name, publisher);
    scope_with_stats(base, title, stories, stats, chart, corpus)
}

fn scope_with_stats(
    base: String,
    title: String,
    stories: &[StorySummary],
    stats: &StoryListStats,
    chart: &ChartData,
    corpus: Option<&SearchCorpus>,
) -> BuildResult<Vec<Artifact>> {
    let mut intro =
        String::from("<p class=\"scope-links\"><a href=\"stats\">Statistics</a></p>");
    if corpus.is_some() {
        intro.push_str(&search_intro());
    }
    let mut artifacts = render_list_scope(
        ListScope {
            base: base.clone(),
            title: &title,
            heading: &title,
            intro,
        },
        stories,
        chart,
    )?;
    artifacts.push(Artifact::html(
        format!("{}/stats", base),
        format!("{} - Statistics", title),
        render(&Template::StatsPage {
            heading: &title,
            stats,
            to_root: "../../..",
        }),
        false,
    ));
    if let Some(corpus) = corpus {
        artifacts.extend(search_artifacts(&base, &title, corpus)?);
    }
    Ok(artifacts)
}

/// Render a series page with its ordered members, plus chart data.
pub fn render_series(
    publisher: &str,
    name: &str,
    members: &[(u32, StorySummary)],
    chart: &ChartData,
) -> BuildResult<Vec<Artifact>> {
    let base = templates::series_path(publisher, name);
    let title = format!("Series: '{}' on {}", name, publisher);
    let page = render(&Template::SeriesPage {
        publisher,
        name,
        members,
    });
    Ok(vec![
        Artifact::html(format!("{}/", base), title.clone(), page, true),
        Artifact::json(
            format!("{}/storyupdates.json", base),
            format!("{} - update chart data", title),
            chart,
        )?,
    ])
}

/// Render a publisher landing page plus the paginated category listing.
pub fn render_publisher(
    name: &str,
    story_count: u64,
    word_count: u64,
    categories: &[(String, u64)],
    chart: &ChartData,
) -> BuildResult<Vec<Artifact>> {
    let category_pages: Vec<&[(String, u64)]> = if categories.is_empty() {
        vec![&[]]
    } else {
        categories.chunks(CATEGORIES_PER_PAGE).collect()
    };
    let num_pages = category_pages.len() as u32;
    let mut artifacts = Vec::with_capacity(category_pages.len() + 2);
    let landing = render(&Template::PublisherPage {
        name,
        story_count,
        word_count,
        categories: &categories[..categories.len().min(CATEGORIES_PER_PAGE)],
        num_category_pages: num_pages,
    });
    artifacts.push(Artifact::html(
        templates::publisher_path(name),
        format!("Publisher: {}", name),
        landing,
        true,
    ));
    for (i, chunk) in category_pages.iter().enumerate() {
        let cur_page = i as u32 + 1;
        artifacts.push(Artifact::html(
            format!("publisher/{}/categories/{}", name, cur_page),
            format!("Categories on {} - Page {}", name, cur_page),
            render(&Template::CategoryListPage {
                publisher: name,
                categories: chunk,
                cur_page,
                num_pages,
            }),
            false,
        ));
    }
    artifacts.push(Artifact::json(
        format!("publisher/{}/storyupdates.json", name),
        format!("Publisher {} - update chart data", name),
        chart,
    )?);
    Ok(artifacts)
}

/// Render the global pages: root redirect, landing, statistics, info.
pub fn render_global(
    publishers: &[(String, u64)],
    stats: &StoryListStats,
    chart: &ChartData,
) -> BuildResult<Vec<Artifact>> {
    Ok(vec![
        Artifact::redirect("", "ZimFiction", "index.html", true),
        Artifact::json(
            "storyupdates.json",
            "Global update chart data",
            chart,
        )?,
        Artifact::html(
            "index.html",
            "Welcome to ZimFiction!",
            render(&Template::IndexPage { publishers }),
            true,
        ),
        Artifact::html(
            "statistics.html",
            "Statistics",
            render(&Template::StatisticsPage { stats }),
            true,
        ),
        Artifact::html("info/index.html", "About", render(&Template::InfoIndex), false),
        Artifact::html(
            "info/acknowledgements.html",
            "Acknowledgements",
            render(&Template::Acknowledgements),
            false,
        ),
    ])
}
