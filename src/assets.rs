//! Static assets embedded at compile time and emitted in the global phase.

use crate::error::BuildResult;
use crate::queue::Artifact;

pub const STYLE_LIGHT: &str = include_str!("../resources/style_light.css");
pub const STYLE_DARK: &str = include_str!("../resources/style_dark.css");
pub const SEARCH_JS: &str = include_str!("../resources/scripts/search.js");
pub const CHART_JS: &str = include_str!("../resources/scripts/chart.js");
pub const STORYTIMECHART_JS: &str = include_str!("../resources/scripts/storytimechart.js");
pub const FAVICON_PNG: &[u8] = include_bytes!("../resources/favicon.png");

/// The fixed asset artifacts every ZIM carries.
pub fn asset_artifacts() -> BuildResult<Vec<Artifact>> {
    Ok(vec![
        Artifact::stylesheet("style_light.css", "Stylesheet (light)", STYLE_LIGHT),
        Artifact::stylesheet("style_dark.css", "Stylesheet (dark)", STYLE_DARK),
        Artifact::script("scripts/search.js", "Search script", SEARCH_JS),
        Artifact::script("scripts/chart.js", "Chart helpers", CHART_JS),
        Artifact::script(
            "scripts/storytimechart.js",
            "Story update chart script",
            STORYTIMECHART_JS,
        ),
        Artifact::png("favicon.png", "Favicon (PNG)", FAVICON_PNG),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assets_cover_the_fixed_layout() {
        let artifacts = asset_artifacts().unwrap();
        let paths: Vec<&str> = artifacts.iter().map(|a| a.path.as_str()).collect();
        for path in [
            "style_light.css",
            "style_dark.css",
            "scripts/search.js",
            "scripts/chart.js",
            "scripts/storytimechart.js",
            "favicon.png",
        ] {
            assert!(paths.contains(&path), "missing {}", path);
        }
    }

    #[test]
    fn shared_assets_are_dedupable() {
        for artifact in asset_artifacts().unwrap() {
            assert!(artifact.dedup, "{} should be dedup-hinted", artifact.path);
        }
    }

    #[test]
    fn favicon_is_a_png() {
        assert_eq!(&FAVICON_PNG[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn client_slug_function_matches_server() {
        // the critical line the client must carry verbatim
        assert!(SEARCH_JS.contains("name.split(\" \").join(\"+\").split(\"/\").join(\"__\")"));
    }

    #[test]
    fn client_constants_match_server() {
        assert!(SEARCH_JS.contains("STORIES_PER_PAGE = 20"));
        assert!(SEARCH_JS.contains("MAX_AUTOCOMPLETE = 10"));
    }
}
