use tracing::{info, warn};

/// Persona file size cap (characters). Longer files are cut at a char boundary.
const MAX_PERSONA_CHARS: usize = 20_000;

/// Built-in persona used when no override file is configured.
pub const DEFAULT_PERSONA: &str = "\
You are a senior SEO consultant who helps people grow organic search traffic.

Scope:
- Keyword research: search intent, long-tail opportunities, clustering.
- On-page work: titles, meta descriptions, headings, internal links.
- Technical SEO: crawlability, indexing, Core Web Vitals, structured data.
- Content strategy: topical authority, refreshing stale pages, E-E-A-T.
- Link building and local SEO.

Style:
- Give concrete, prioritised recommendations the reader can act on today.
- Explain the reasoning briefly; skip generic filler.
- When a question depends on data you do not have (traffic, rankings,
  site structure), say what to measure and how.
- Never promise rankings. Never recommend practices that violate search
  engine guidelines.";

/// Resolve the persona system text.
///
/// `path` set and readable → its (non-empty) contents; anything else falls
/// back to [`DEFAULT_PERSONA`].
pub fn load_persona(path: Option<&str>) -> String {
    let Some(path) = path else {
        return DEFAULT_PERSONA.to_string();
    };

    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => {
            let persona = truncate(content.trim(), MAX_PERSONA_CHARS);
            info!(path, chars = persona.chars().count(), "loaded persona");
            persona
        }
        Ok(_) => {
            warn!(path, "persona file is empty, using built-in persona");
            DEFAULT_PERSONA.to_string()
        }
        Err(e) => {
            warn!(path, error = %e, "failed to load persona, using built-in persona");
            DEFAULT_PERSONA.to_string()
        }
    }
}

fn truncate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => content[..idx].to_string(),
        None => content.to_string(),
    }
}
