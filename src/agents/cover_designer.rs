//! Cover stage: asks for an SVG cover and keeps only a safe `<svg>` element.

use anyhow::Result;
use async_trait::async_trait;

use super::{Agent, AgentContext, Disposition, DropReason};
use crate::domain::{Action, Message, Payload, Story};

pub const SYSTEM_PROMPT: &str = "You design book covers as standalone SVG documents. \
Use a 600x900 viewBox, bold shapes and at most two short text elements (title and imprint). \
Reply with the SVG markup only.";

/// Placeholder used when no usable SVG comes back
pub const FALLBACK_SVG: &str = concat!(
    r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 600 900">"#,
    r##"<rect width="600" height="900" fill="#1a1a2e"/>"##,
    r##"<text x="300" y="400" text-anchor="middle" font-family="serif" font-size="36" fill="#e0e0e0">Cover Unavailable</text>"##,
    r##"<text x="300" y="850" text-anchor="middle" font-family="sans-serif" font-size="16" fill="#888">Folio Press</text>"##,
    "</svg>"
);

const SVG_NS: &str = r#"xmlns="http://www.w3.org/2000/svg""#;
const SYNOPSIS_WORDS: usize = 200;

pub struct CoverDesigner {
    ctx: AgentContext,
}

impl CoverDesigner {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Agent for CoverDesigner {
    fn context(&self) -> &AgentContext {
        &self.ctx
    }

    async fn handle(&self, message: &Message) -> Result<Disposition> {
        if message.action != Action::DesignCover {
            return Ok(Disposition::Dropped(DropReason::UnknownAction));
        }

        let story_id = message.story_id.as_str();
        self.ctx
            .log_activity(story_id, "designing_cover", format!("Designing cover for {}", story_id))
            .await;

        let Some(mut story) = self.ctx.load_story(story_id).await? else {
            return Ok(Disposition::Dropped(DropReason::StoryNotFound));
        };

        let request = cover_request(&story);
        let text = self.ctx.generate(&mut story, "design_cover", 0, request).await?;

        story.cover_svg = extract_svg(&text);
        self.ctx.save_story(&mut story).await?;

        self.ctx
            .log_activity(
                story_id,
                "cover_designed",
                format!("Cover ready ({} chars)", story.cover_svg.len()),
            )
            .await;

        self.ctx.reply(story_id, Action::CoverReady, Payload::new()).await?;
        Ok(Disposition::Completed)
    }
}

fn cover_request(story: &Story) -> String {
    let title = if story.title.is_empty() { "Untitled" } else { story.title.as_str() };
    let (genre, theme) = story
        .prompt
        .as_ref()
        .map(|p| (p.genre.as_str(), p.theme.as_str()))
        .unwrap_or(("fiction", ""));

    let words: Vec<&str> = story.current_draft.split_whitespace().collect();
    let mut synopsis = words[..words.len().min(SYNOPSIS_WORDS)].join(" ");
    if words.len() > SYNOPSIS_WORDS {
        synopsis.push_str("...");
    }

    format!(
        "Design an SVG book cover for:\n\nTitle: {}\nGenre: {}\nTheme: {}\nSynopsis: {}\n",
        title, genre, theme, synopsis
    )
}

/// First `<svg>...</svg>` element in `text`, sanitized; the placeholder otherwise
pub fn extract_svg(text: &str) -> String {
    let Some(start) = text.find("<svg") else {
        return FALLBACK_SVG.to_string();
    };
    let Some(end) = text[start..].find("</svg>") else {
        return FALLBACK_SVG.to_string();
    };

    let svg = &text[start..start + end + "</svg>".len()];
    normalize_open_tag(&strip_scripts(svg))
}

/// Remove every `<script ...>...</script>` block (case-insensitive)
fn strip_scripts(svg: &str) -> String {
    let lower = svg.to_ascii_lowercase();
    let mut out = String::with_capacity(svg.len());
    let mut pos = 0;

    while let Some(offset) = lower[pos..].find("<script") {
        let start = pos + offset;
        out.push_str(&svg[pos..start]);

        pos = match lower[start..].find("</script>") {
            Some(close) => start + close + "</script>".len(),
            // Unterminated script swallows the rest of the element
            None => match lower[start..].find("</svg>") {
                Some(close) => start + close,
                None => svg.len(),
            },
        };
    }
    out.push_str(&svg[pos..]);
    out
}

/// Ensure the root element declares the SVG namespace and a viewBox
fn normalize_open_tag(svg: &str) -> String {
    let Some(tag_end) = svg.find('>') else {
        return svg.to_string();
    };
    let attrs = &svg["<svg".len()..tag_end];

    let view_box = attrs.find("viewBox=\"").and_then(|i| {
        let rest = &attrs[i + "viewBox=\"".len()..];
        rest.find('"').map(|j| &rest[..j])
    });

    if attrs.contains(SVG_NS) && view_box.is_some() {
        return svg.to_string();
    }

    format!(
        "<svg {} viewBox=\"{}\">{}",
        SVG_NS,
        view_box.unwrap_or("0 0 600 900"),
        &svg[tag_end + 1..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_svg_from_chatter() {
        let text = r#"Here you go:
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 600 900"><rect width="600" height="900"/></svg>
Hope you like it!"#;
        let svg = extract_svg(text);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(!svg.contains("Hope"));
    }

    #[test]
    fn test_scripts_are_stripped() {
        let text = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><SCRIPT>alert(1)</SCRIPT><rect/><script type="x">y</script></svg>"#;
        let svg = extract_svg(text);
        assert!(!svg.to_lowercase().contains("script"));
        assert!(svg.contains("<rect/>"));
    }

    #[test]
    fn test_missing_svg_falls_back() {
        assert_eq!(extract_svg("I cannot draw."), FALLBACK_SVG);
        assert_eq!(extract_svg("<svg><rect/>"), FALLBACK_SVG);
    }

    #[test]
    fn test_open_tag_gets_namespace_and_viewbox() {
        let svg = extract_svg(r#"<svg width="600"><rect/></svg>"#);
        assert_eq!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 600 900"><rect/></svg>"#
        );

        let kept = extract_svg(r#"<svg viewBox="0 0 300 450"><rect/></svg>"#);
        assert!(kept.contains(r#"viewBox="0 0 300 450""#));
        assert!(kept.contains(SVG_NS));
    }

    #[test]
    fn test_synopsis_is_truncated() {
        let mut story = Story::new("s1", 3);
        story.title = "Low Tide".to_string();
        story.current_draft = "word ".repeat(250);
        let request = cover_request(&story);
        assert!(request.contains("Title: Low Tide"));
        assert!(request.contains("Genre: fiction"));
        assert!(request.trim_end().ends_with("..."));
    }
}
