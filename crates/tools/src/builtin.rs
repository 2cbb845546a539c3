//! The built-in tool set.
//!
//! The gateway is agnostic to the specific tools registered; these are the
//! defaults a stock deployment ships with. Each one is an ordinary `Tool`
//! implementation and could equally live outside this crate.

mod calc;
mod scrape;
mod search;
mod time;
mod youtube;

use std::sync::Arc;

use config::ToolsConfig;

pub use calc::CalculateTool;
pub use scrape::ScrapePageTool;
pub use search::WebSearchTool;
pub use time::GetTimeTool;
pub use youtube::YoutubeTranscriptTool;

use crate::ToolRegistry;

/// Tool names considered safe for the planning endpoint: read-only
/// research tools with no side effects beyond fetching.
pub const PLANNING_TOOLS: &[&str] = &["web_search", "scrape_page", "get_time"];

/// Register the default tool set according to configuration.
pub fn register_defaults(registry: &mut ToolRegistry, config: &ToolsConfig) {
    registry.register(Arc::new(GetTimeTool::new(config)));
    registry.register(Arc::new(CalculateTool::new(config)));

    if config.search.enabled {
        registry.register(Arc::new(WebSearchTool::new(config)));
    }

    if config.scrape.enabled {
        registry.register(Arc::new(ScrapePageTool::new(config)));
    }

    registry.register(Arc::new(YoutubeTranscriptTool::new(config)));
}
